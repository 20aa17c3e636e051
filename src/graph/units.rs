//! Partitioning a body's blended edges into units and coupled groups.

use std::collections::{BTreeMap, HashSet};

use super::{find_smooth_sequence, BlendUnit};
use crate::attrib::blended_edges;
use crate::error::BlendResult;
use crate::topo::{BodyId, TopoStore, VertexId};

/// One end of a unit meeting a junction vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitEnd {
    pub unit: usize,
    pub at_start: bool,
}

/// Every blended edge of `body` assigned to exactly one sequence, in
/// ascending order of the lowest edge id.
pub fn partition_units(store: &TopoStore, body: BodyId) -> BlendResult<Vec<BlendUnit>> {
    let mut assigned = HashSet::new();
    let mut units = Vec::new();
    for e in blended_edges(store, body)? {
        if assigned.contains(&e) {
            continue;
        }
        let unit = find_smooth_sequence(store, e)?;
        assigned.extend(unit.edges.iter().copied());
        units.push(unit);
    }
    Ok(units)
}

/// Unit ends grouped by the vertex they terminate at. Closed rings have
/// no ends.
pub fn unit_ends(units: &[BlendUnit]) -> BTreeMap<VertexId, Vec<UnitEnd>> {
    let mut map: BTreeMap<VertexId, Vec<UnitEnd>> = BTreeMap::new();
    for (i, u) in units.iter().enumerate().filter(|(_, u)| !u.closed) {
        map.entry(u.start_vertex()).or_default().push(UnitEnd { unit: i, at_start: true });
        map.entry(u.end_vertex()).or_default().push(UnitEnd { unit: i, at_start: false });
    }
    map
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Units that share a vertex end up in one group; groups are resolved
/// atomically. Group order follows the first unit of each group.
pub fn coupled_groups(units: &[BlendUnit]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..units.len()).collect();
    let mut owner: BTreeMap<VertexId, usize> = BTreeMap::new();
    for (i, u) in units.iter().enumerate() {
        for &v in &u.vertices {
            match owner.get(&v) {
                Some(&j) => {
                    let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(v, i);
                }
            }
        }
    }
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..units.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{set_const_round, BlendEnds};
    use crate::primitive::make_box;
    use crate::topo::EdgeId;

    fn box_with_rounds(n: usize) -> (TopoStore, BodyId, Vec<EdgeId>) {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
        let edges = store.body_edges(body).unwrap();
        set_const_round(&mut store, &edges[..n], 1.0, &BlendEnds::default()).unwrap();
        (store, body, edges)
    }

    #[test]
    fn every_blended_edge_lands_in_one_unit() {
        let (store, body, _) = box_with_rounds(12);
        let units = partition_units(&store, body).unwrap();
        assert_eq!(units.len(), 12);
        let total: usize = units.iter().map(|u| u.edges.len()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn box_edges_couple_into_a_single_group() {
        let (store, body, _) = box_with_rounds(12);
        let units = partition_units(&store, body).unwrap();
        let groups = coupled_groups(&units);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 12);
        let ends = unit_ends(&units);
        assert_eq!(ends.len(), 8);
        assert!(ends.values().all(|v| v.len() == 3));
    }

    #[test]
    fn disjoint_edges_stay_separate() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 5.0, 5.0, 5.0).unwrap();
        let edges = store.body_edges(body).unwrap();
        let first = store.edge(edges[0]).unwrap().clone();
        let far = edges
            .iter()
            .copied()
            .find(|&e| {
                let ed = store.edge(e).unwrap();
                ![ed.start, ed.end].iter().any(|v| *v == first.start || *v == first.end)
            })
            .unwrap();
        set_const_round(&mut store, &[edges[0], far], 1.0, &BlendEnds::default()).unwrap();
        let units = partition_units(&store, body).unwrap();
        assert_eq!(coupled_groups(&units).len(), 2);
    }
}
