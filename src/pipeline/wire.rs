//! Phase 2: where the sheet meets the blank.
//!
//! Nothing is modified here. The graph lists, for every free sheet edge,
//! the blank face it lies on and, for every sheet vertex, the blank vertex,
//! blank edge or blank face it lands on.

use std::collections::BTreeMap;

use crate::error::{BlendError, BlendResult};
use crate::math::Point3;
use crate::topo::{BodyId, EdgeId, EntityRef, FaceId, TopoStore, VertexId};

use super::sheet::BlendSheet;
use super::BlendContext;

/// Where a sheet vertex lands on the blank.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VertexHit {
    /// Coincides with a blank vertex; the two are merged.
    Vertex(VertexId),
    /// Lies inside a blank edge, which is split there.
    Edge { edge: EdgeId, param: f64 },
    /// Lies inside a blank face.
    Face(FaceId),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntersectionGraph {
    /// Blank face under each free sheet edge.
    pub edge_faces: BTreeMap<EdgeId, FaceId>,
    pub vertex_hits: Vec<(VertexId, VertexHit)>,
    /// Blank edges and vertices the sheet replaces.
    pub consumed_edges: Vec<EdgeId>,
    pub consumed_vertices: Vec<VertexId>,
}

impl IntersectionGraph {
    pub fn hit(&self, v: VertexId) -> Option<VertexHit> {
        self.vertex_hits.iter().find(|(s, _)| *s == v).map(|(_, h)| *h)
    }

    /// Sheet vertices landing inside `edge`, ordered along it.
    pub fn edge_splits(&self, edge: EdgeId) -> Vec<(f64, VertexId)> {
        let mut out: Vec<(f64, VertexId)> = self
            .vertex_hits
            .iter()
            .filter_map(|(v, h)| match h {
                VertexHit::Edge { edge: e, param } if *e == edge => Some((*param, *v)),
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.total_cmp(&b.0));
        out
    }
}

/// Free edges of a sheet: those used by a single face.
pub(crate) fn free_edges(store: &TopoStore, sheet: BodyId) -> BlendResult<Vec<EdgeId>> {
    Ok(store.body_edges(sheet)?.into_iter().filter(|&e| store.edge_coedges(e).len() == 1).collect())
}

/// Phase 2: compute the intersection graph of a sheet with its blank.
pub fn make_wire(
    store: &TopoStore,
    sheet: &BlendSheet,
    ctx: &BlendContext,
) -> BlendResult<IntersectionGraph> {
    let tol = ctx.options.weld_tolerance();
    let mut bodies = vec![sheet.blank];
    bodies.extend(sheet.others.iter().copied());
    let mut blank_faces = Vec::new();
    let mut blank_edges = Vec::new();
    let mut blank_vertices = Vec::new();
    for &b in &bodies {
        blank_faces.extend(store.body_faces(b)?);
        blank_edges.extend(store.body_edges(b)?);
        blank_vertices.extend(store.body_vertices(b)?);
    }

    let mut graph = IntersectionGraph::default();
    for unit in &sheet.units {
        for &e in &unit.consumed_edges {
            if !graph.consumed_edges.contains(&e) {
                graph.consumed_edges.push(e);
            }
        }
        for &v in &unit.consumed_vertices {
            if !graph.consumed_vertices.contains(&v) {
                graph.consumed_vertices.push(v);
            }
        }
    }

    for e in free_edges(store, sheet.body)? {
        let face = match sheet.edge_hints.get(&e) {
            Some(&f) => f,
            None => {
                let edge = store.edge(e)?;
                let mid = edge.midpoint();
                face_under(store, &blank_faces, &mid, tol)?.ok_or_else(|| {
                    let reason = "free sheet edge lies on no blank face";
                    BlendError::unsupported(reason, vec![EntityRef::Edge(e)])
                })?
            }
        };
        graph.edge_faces.insert(e, face);
    }

    for v in store.body_vertices(sheet.body)? {
        let p = store.vertex(v)?.point;
        let coincident = blank_vertices
            .iter()
            .find(|&&b| store.vertex(b).map_or(false, |x| (x.point - p).norm() <= tol));
        let hit = if let Some(&b) = coincident {
            graph.consumed_vertices.retain(|c| *c != b);
            VertexHit::Vertex(b)
        } else if let Some((edge, param)) =
            edge_under(store, &blank_edges, &graph.consumed_edges, &p, tol)?
        {

            VertexHit::Edge { edge, param }
        } else {
            let hinted =
                store.vertex_edges(v).iter().find_map(|e| graph.edge_faces.get(e).copied());
            match hinted {
                Some(f) => VertexHit::Face(f),
                None => match face_under(store, &blank_faces, &p, tol)? {
                    Some(f) => VertexHit::Face(f),
                    // Interior to the sheet, e.g. a mitre apex.
                    None => continue,
                },
            }
        };
        graph.vertex_hits.push((v, hit));
    }

    log::debug!(
        "intersection graph: {} free edges, {} vertex hits, {} consumed edges",
        graph.edge_faces.len(),
        graph.vertex_hits.len(),
        graph.consumed_edges.len()
    );
    Ok(graph)
}

/// The blank face whose surface passes within `tol` of `p` and whose
/// boundary contains it.
fn face_under(
    store: &TopoStore,
    faces: &[FaceId],
    p: &Point3,
    tol: f64,
) -> BlendResult<Option<FaceId>> {
    for &f in faces {
        let surface = &store.face(f)?.surface;
        let (u, v) = surface.closest_parameters(p);
        if (surface.evaluate(u, v) - p).norm() <= tol && store.face_contains(f, p)? {
            return Ok(Some(f));
        }
    }
    Ok(None)
}

/// The blank edge passing within `tol` of `p`, strictly inside its
/// parameter range. Edges the sheet keeps are preferred.
fn edge_under(
    store: &TopoStore,
    edges: &[EdgeId],
    consumed: &[EdgeId],
    p: &Point3,
    tol: f64,
) -> BlendResult<Option<(EdgeId, f64)>> {
    let mut best: Option<(bool, f64, EdgeId, f64)> = None;
    for &e in edges {
        let edge = store.edge(e)?;
        let (d, t) = edge.curve.distance_within(p, edge.t_start, edge.t_end);
        if d > tol {
            continue;
        }
        let span = edge.t_end - edge.t_start;
        if t - edge.t_start <= 1e-9 * span.max(1.0) || edge.t_end - t <= 1e-9 * span.max(1.0) {
            continue;
        }
        let used = consumed.contains(&e);
        let better = match best {
            None => true,
            Some((b_used, b_d, _, _)) => (!used && b_used) || (used == b_used && d < b_d),
        };
        if better {
            best = Some((used, d, e, t));
        }
    }
    Ok(best.map(|(_, _, e, t)| (e, t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{set_const_round, BlendEnds};
    use crate::pipeline::{discard_sheet, make_sheet};
    use crate::primitive::make_box;

    #[test]
    fn round_on_a_box_edge_lands_on_four_edges() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .find(|&e| {
                let m = store.edge(e).unwrap().midpoint();
                (m.x - 10.0).abs() < 1e-9 && (m.y - 10.0).abs() < 1e-9
            })
            .unwrap();
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let ctx = BlendContext::default();
        let sheet = make_sheet(&mut store, body, &ctx).unwrap();
        let graph = make_wire(&store, &sheet, &ctx).unwrap();

        assert_eq!(graph.edge_faces.len(), 4);
        assert_eq!(graph.consumed_edges, vec![e]);
        assert_eq!(graph.consumed_vertices.len(), 2);
        let on_edges =
            graph.vertex_hits.iter().filter(|(_, h)| matches!(h, VertexHit::Edge { .. })).count();

        assert_eq!(on_edges, 4);
        for (_, h) in &graph.vertex_hits {
            if let VertexHit::Edge { edge, .. } = h {
                assert_eq!(graph.edge_splits(*edge).len(), 1);
            }
        }
        discard_sheet(&mut store, sheet);
    }
}
