//! Blend graph analysis: which blended edges must be resolved together.
//!
//! A *sequence* is a maximal run of tangent-continuous edges with
//! compatible blends; it becomes one blend surface. The *blend graph* also
//! crosses vertex-blended junctions and so returns the whole network.
//! Both are plain traversals over vertex→edge adjacency and visit each edge
//! at most once, so closed rings terminate.

pub mod detect;
pub mod units;

pub use detect::{detect_blend_network, detect_blend_sequence};
pub use units::{coupled_groups, partition_units, unit_ends, UnitEnd};

use std::collections::{HashSet, VecDeque};

use crate::attrib::{
    blend_attribute, instruction, vertex_blend, BlendAttribute, BlendFamily, BlendKind, Convexity,
    Directive, VertexProperty,
};
use crate::error::{BlendError, BlendResult};
use crate::math::SMOOTH_ANGLE_TOL;
use crate::topo::{EdgeId, EntityRef, TopoStore, VertexId};

const RADIUS_MATCH_TOL: f64 = 1e-6;

/// An ordered run of edges resolved as one smooth blend.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendUnit {
    pub edges: Vec<EdgeId>,
    /// Whether each edge is traversed start→end in unit order.
    pub forward: Vec<bool>,
    /// `edges.len() + 1` vertices; first equals last for a closed ring.
    pub vertices: Vec<VertexId>,
    pub closed: bool,
    pub family: BlendFamily,
    pub convexity: Convexity,
}

impl BlendUnit {
    pub fn start_vertex(&self) -> VertexId {
        self.vertices[0]
    }

    pub fn end_vertex(&self) -> VertexId {
        self.vertices[self.vertices.len() - 1]
    }

    pub fn contains_edge(&self, e: EdgeId) -> bool {
        self.edges.contains(&e)
    }

    /// The attribute of edge `k` read in unit direction.
    pub fn attribute(&self, store: &TopoStore, k: usize) -> BlendResult<BlendAttribute> {
        let e = self.edges[k];
        let a = blend_attribute(store, e).ok_or(BlendError::NotAnEdgeBlend(EntityRef::Edge(e)))?;
        Ok(if self.forward[k] { a.clone() } else { a.reversed() })
    }

    /// Edge set as a sorted list, for order-free comparison.
    pub fn edge_set(&self) -> Vec<EdgeId> {
        let mut v = self.edges.clone();
        v.sort();
        v
    }
}

/// The blended network reachable from a seed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendGraph {
    pub edges: Vec<EdgeId>,
    pub vertices: Vec<VertexId>,
}

/// Blend attribute of `e` read as if traversed leaving `from`.
fn attr_leaving(
    store: &TopoStore,
    e: EdgeId,
    from: VertexId,
) -> BlendResult<Option<(BlendAttribute, bool)>> {
    let Some(a) = blend_attribute(store, e) else { return Ok(None) };
    let fwd = store.edge(e)?.start == from;
    Ok(Some((if fwd { a.clone() } else { a.reversed() }, fwd)))
}

/// True when the two edges continue each other through `v` without a kink.
pub(crate) fn smooth_at(store: &TopoStore, a: EdgeId, b: EdgeId, v: VertexId) -> BlendResult<bool> {
    let da = store.edge_direction_from(a, v)?;
    let db = store.edge_direction_from(b, v)?;
    Ok((-da).dot(&db) > SMOOTH_ANGLE_TOL.cos())
}

/// Whether `next` (read in unit direction) may follow `prev` in one sequence.
pub(crate) fn compatible(prev: &BlendAttribute, next: &BlendAttribute) -> bool {
    if prev.family() != next.family() || prev.convexity != next.convexity {
        return false;
    }
    match (&prev.kind, &next.kind) {
        (
            BlendKind::ConstChamfer { left_range: l1, right_range: r1 },
            BlendKind::ConstChamfer { left_range: l2, right_range: r2 },
        ) => {
            (l1 - l2).abs() < RADIUS_MATCH_TOL && (r1 - r2).abs() < RADIUS_MATCH_TOL
        }
        _ => {
            if prev.cross_section() != next.cross_section() {
                return false;
            }
            match (prev.end_radius(false), next.end_radius(true)) {
                (Some(a), Some(b)) => a.approx_eq(&b, RADIUS_MATCH_TOL),
                _ => false,
            }
        }
    }
}

fn blended_at(store: &TopoStore, v: VertexId) -> Vec<EdgeId> {
    store.vertex_edges(v).iter().copied().filter(|&e| blend_attribute(store, e).is_some()).collect()
}

/// A vertex blend lets a smooth run through unless it asks for a point or
/// a run-out there. A cap instruction always ends the run.
fn hard_stop(store: &TopoStore, v: VertexId) -> bool {
    if let Some(BlendKind::VertexBlend { property, .. }) = vertex_blend(store, v).map(|a| &a.kind) {
        if matches!(property, VertexProperty::Cusp | VertexProperty::Runout) {
            return true;
        }
    }
    matches!(
        instruction(store, v).map(|a| &a.kind),
        Some(BlendKind::Instruction { directive: Directive::Cap, .. })
    )
}

/// Walk from `v`, having arrived along `current` (read in walk direction as
/// `attr`), collecting `(edge, forward, far vertex)` steps.
fn walk(
    store: &TopoStore,
    mut current: EdgeId,
    mut attr: BlendAttribute,
    mut v: VertexId,
    visited: &mut HashSet<EdgeId>,
    seed: EdgeId,
) -> BlendResult<(Vec<(EdgeId, bool, VertexId)>, bool)> {
    let mut steps = Vec::new();
    loop {
        if hard_stop(store, v) {
            return Ok((steps, false));
        }
        let here = blended_at(store, v);
        if here.len() != 2 {
            return Ok((steps, false));
        }
        let Some(&next) = here.iter().find(|&&e| e != current) else {
            return Ok((steps, false));
        };
        let Some((next_attr, fwd)) = attr_leaving(store, next, v)? else {
            return Ok((steps, false));
        };
        if !compatible(&attr, &next_attr) || !smooth_at(store, current, next, v)? {
            return Ok((steps, false));
        }
        if next == seed {
            return Ok((steps, true));
        }
        if !visited.insert(next) {
            return Ok((steps, false));
        }
        let e = store.edge(next)?;
        let far = if fwd { e.end } else { e.start };
        steps.push((next, fwd, far));
        current = next;
        attr = next_attr;
        v = far;
    }
}

/// The maximal smooth, homogeneous run of blended edges through `seed`.
pub fn find_smooth_sequence(store: &TopoStore, seed: EdgeId) -> BlendResult<BlendUnit> {
    let seed_attr = blend_attribute(store, seed)
        .ok_or(BlendError::NotAnEdgeBlend(EntityRef::Edge(seed)))?
        .clone();
    let e = store.edge(seed)?;
    let (start, end) = (e.start, e.end);
    let mut visited = HashSet::from([seed]);

    let (ahead, closed) = walk(store, seed, seed_attr.clone(), end, &mut visited, seed)?;
    let mut behind = Vec::new();
    if !closed {
        // Walk backwards: read the seed reversed.
        let (steps, _) = walk(store, seed, seed_attr.reversed(), start, &mut visited, seed)?;
        behind = steps;
    }

    let mut edges = Vec::new();
    let mut forward = Vec::new();
    let mut vertices = Vec::new();
    for &(edge, fwd, far) in behind.iter().rev() {
        edges.push(edge);
        forward.push(!fwd);
        vertices.push(far);
    }
    vertices.push(start);
    edges.push(seed);
    forward.push(true);
    vertices.push(end);
    for &(edge, fwd, far) in &ahead {
        edges.push(edge);
        forward.push(fwd);
        vertices.push(far);
    }

    Ok(BlendUnit {
        edges,
        forward,
        vertices,
        closed,
        family: seed_attr.family(),
        convexity: seed_attr.convexity,
    })
}

/// The connected blend network from an edge or vertex seed, crossing
/// junctions that carry a vertex blend even where radius or convexity
/// change.
pub fn find_blend_graph(store: &TopoStore, seed: EntityRef) -> BlendResult<BlendGraph> {
    store.ensure(seed)?;
    let mut graph = BlendGraph::default();
    let mut seen_edges = HashSet::new();
    let mut seen_vertices = HashSet::new();
    let mut queue = VecDeque::new();
    match seed {
        EntityRef::Edge(e) => {
            blend_attribute(store, e).ok_or(BlendError::NotAnEdgeBlend(seed))?;
            seen_edges.insert(e);
            graph.edges.push(e);
            let edge = store.edge(e)?;
            queue.push_back((edge.start, Some(e)));
            queue.push_back((edge.end, Some(e)));
        }
        EntityRef::Vertex(v) => queue.push_back((v, None)),
        other => return Err(BlendError::NotAnEdgeBlend(other)),
    }

    while let Some((v, via)) = queue.pop_front() {
        if seen_vertices.insert(v) {
            graph.vertices.push(v);
        }
        let junction_blended = vertex_blend(store, v).is_some();
        for next in blended_at(store, v) {
            if seen_edges.contains(&next) {
                continue;
            }
            let follow = match via {
                None => true,
                Some(_) if junction_blended => true,
                Some(prev) => {
                    let here = blended_at(store, v);
                    let Some((a, _)) = attr_leaving(store, prev, v)? else { continue };
                    let Some((b, _)) = attr_leaving(store, next, v)? else { continue };
                    here.len() == 2
                        && compatible(&a.reversed(), &b)
                        && smooth_at(store, prev, next, v)?
                }
            };
            if follow {
                seen_edges.insert(next);
                graph.edges.push(next);
                let e = store.edge(next)?;
                let far = if e.start == v { e.end } else { e.start };
                queue.push_back((far, Some(next)));
            }
        }
    }
    Ok(graph)
}
