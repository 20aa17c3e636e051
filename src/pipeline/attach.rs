//! Phase 3: splicing a sheet into its blank.
//!
//! Blank edges under sheet vertices are split, replaced edges and vertices
//! are dropped, and every blank face the sheet touches has its loops
//! rebuilt from what is left of its boundary plus the sheet edges lying on
//! it. The sheet's faces then move into the blank's shell.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use crate::attrib::explicit::write_explicit;
use crate::attrib::AttributeSlot;
use crate::error::{BlendError, BlendResult};
use crate::math::Vector3;
use crate::primitive::make_wire;
use crate::topo::{validate_body, Edge, EdgeId, EntityRef, FaceId, TopoStore, VertexId};

use super::report::{Annotation, BlendReport};
use super::sheet::BlendSheet;
use super::wire::{IntersectionGraph, VertexHit};
use super::BlendContext;

const SLOTS: [AttributeSlot; 5] = [
    AttributeSlot::EdgeBlend,
    AttributeSlot::VertexBlend,
    AttributeSlot::EntityEntity,
    AttributeSlot::Instruction,
    AttributeSlot::Explicit,
];

/// Joins a blend sheet to its blank.
pub trait SheetAttach {
    /// Splice `sheet` into its blank. On error the store is left
    /// half-modified; the caller rolls back to the sheet's checkpoint.
    fn attach(
        &self,
        store: &mut TopoStore,
        sheet: &BlendSheet,
        graph: &IntersectionGraph,
        ctx: &BlendContext,
    ) -> BlendResult<BlendReport>;
}

/// Attaches by rebuilding the loops of every touched blank face.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopSplice;

/// One oriented edge use while loops are being rebuilt.
#[derive(Clone, Copy, Debug)]
struct Use {
    edge: EdgeId,
    forward: bool,
    from: VertexId,
    to: VertexId,
}

impl SheetAttach for LoopSplice {
    fn attach(
        &self,
        store: &mut TopoStore,
        sheet: &BlendSheet,
        graph: &IntersectionGraph,
        ctx: &BlendContext,
    ) -> BlendResult<BlendReport> {
        let genus = validate_body(store, sheet.blank)?.genus;
        let blank_shell = *store
            .body(sheet.blank)?
            .shells
            .first()
            .ok_or_else(|| {
                BlendError::unsupported("blank body has no shell", vec![sheet.blank.into()])
            })?;
        let mut bodies = vec![sheet.blank];
        bodies.extend(sheet.others.iter().copied());
        let mut blank_faces = Vec::new();
        let mut blank_edges = Vec::new();
        for &b in &bodies {
            blank_faces.extend(store.body_faces(b)?);
            blank_edges.extend(store.body_edges(b)?);
        }

        let mut consumed_edges: BTreeSet<EdgeId> =
            graph.consumed_edges.iter().copied().collect();
        let consumed_vertices: BTreeSet<VertexId> =
            graph.consumed_vertices.iter().copied().collect();

        for (sv, hit) in &graph.vertex_hits {
            if let VertexHit::Vertex(bv) = hit {
                merge_vertex(store, *sv, *bv)?;
            }
        }

        let pieces = split_edges(store, graph, &consumed_vertices, &mut consumed_edges)?;
        for &e in &blank_edges {
            if consumed_edges.contains(&e) || pieces.contains_key(&e) {
                continue;
            }
            let edge = store.edge(e)?;
            if consumed_vertices.contains(&edge.start) || consumed_vertices.contains(&edge.end) {
                consumed_edges.insert(e);
            }
        }

        // Work out every new loop before touching any face.
        let mut affected: BTreeSet<FaceId> = graph.edge_faces.values().copied().collect();
        for &f in &blank_faces {
            let edges = store.face_edges(f)?;
            if edges.iter().any(|e| consumed_edges.contains(e) || pieces.contains_key(e)) {
                affected.insert(f);
            }
        }
        let mut rebuilt = Vec::with_capacity(affected.len());
        for &f in &affected {
            let loops = face_loops(store, f, graph, &consumed_edges, &pieces)?;
            rebuilt.push((f, loops));
        }
        for (f, (outer, inner)) in rebuilt {
            for w in store.face_wires(f)? {
                for c in store.wire_coedges(w)? {
                    store.remove_coedge(c)?;
                }
                store.remove_wire(w)?;
            }
            let outer = make_wire(store, f, &outer);
            let inner: Vec<_> = inner.iter().map(|l| make_wire(store, f, l)).collect();
            store.modify_face(f, |face| {
                face.outer_wire = outer;
                face.inner_wires = inner;
            })?;
        }

        // Sheet faces and any joined bodies move into the blank's shell.
        let mut moved = store.shell(sheet.shell)?.faces.clone();
        store.remove_shell(sheet.shell)?;
        store.remove_body(sheet.body)?;
        for &other in &sheet.others {
            for s in store.body(other)?.shells.clone() {
                moved.extend(store.shell(s)?.faces.iter().copied());
                store.remove_shell(s)?;
            }
            store.remove_body(other)?;
        }
        for &f in &moved {
            store.modify_face(f, |face| face.shell = blank_shell)?;
        }
        store.modify_shell(blank_shell, |s| s.faces.extend(moved.iter().copied()))?;

        for &e in &consumed_edges {
            if store.edge(e).is_ok() && store.edge_coedges(e).is_empty() {
                clear_attributes(store, e.into());
                store.remove_edge(e)?;
            }
        }
        for &v in &consumed_vertices {
            if store.vertex(v).is_ok() && store.vertex_edges(v).is_empty() {
                clear_attributes(store, v.into());
                store.remove_vertex(v)?;
            }
        }

        let mut report = BlendReport::default();
        for unit in &sheet.units {
            for &src in &unit.sources {
                for slot in &SLOTS[..4] {
                    store.remove_attribute(src, *slot);
                }
            }
            for (face, record) in &unit.explicit {
                write_explicit(store, *face, record.clone());
            }
            report.faces.extend(unit.faces.iter().copied());
        }

        let check = validate_body(store, sheet.blank)?;
        if !check.valid || check.genus != genus {
            let reason = if check.valid {
                format!("genus changed from {genus} to {}", check.genus)
            } else {
                check.errors.join("; ")
            };
            let entities = vec![sheet.blank.into()];
            return Err(BlendError::TopologyCorrupted { reason, entities });
        }

        if ctx.annotations_enabled() {
            for unit in &sheet.units {
                for &f in &unit.faces {
                    let replaces = unit.sources.clone();
                    report.annotations.push(Annotation { entity: f.into(), replaces });
                }
            }
            for (&original, ids) in &pieces {
                for &p in ids.iter().filter(|p| **p != original) {
                    let replaces = vec![original.into()];
                    report.annotations.push(Annotation { entity: p.into(), replaces });
                }
            }
        }
        log::debug!(
            "spliced {} faces into {:?}, rebuilt {} blank faces",
            moved.len(),
            sheet.blank,
            affected.len()
        );
        Ok(report)
    }
}

fn clear_attributes(store: &mut TopoStore, owner: EntityRef) {
    for slot in SLOTS {
        store.remove_attribute(owner, slot);
    }
}

/// Replace sheet vertex `sv` by blank vertex `bv` in every sheet edge.
fn merge_vertex(store: &mut TopoStore, sv: VertexId, bv: VertexId) -> BlendResult<()> {
    for e in store.vertex_edges(sv).to_vec() {
        store.modify_edge(e, |edge| {
            if edge.start == sv {
                edge.start = bv;
            }
            if edge.end == sv {
                edge.end = bv;
            }
        })?;
    }
    store.remove_vertex(sv)?;
    Ok(())
}

/// Split blank edges at the sheet vertices landing on them. Pieces that
/// reach a replaced vertex are dropped. Returns the kept pieces of each
/// split edge in edge direction; the first keeps the original id.
fn split_edges(
    store: &mut TopoStore,
    graph: &IntersectionGraph,
    consumed_vertices: &BTreeSet<VertexId>,
    consumed_edges: &mut BTreeSet<EdgeId>,
) -> BlendResult<BTreeMap<EdgeId, Vec<EdgeId>>> {
    let hit_edges: BTreeSet<EdgeId> = graph
        .vertex_hits
        .iter()
        .filter_map(|(_, h)| match h {
            VertexHit::Edge { edge, .. } => Some(*edge),
            _ => None,
        })
        .collect();

    let mut pieces = BTreeMap::new();
    for e in hit_edges {
        let edge = store.edge(e)?.clone();
        if edge.is_closed() {
            return Err(BlendError::unsupported("sheet meets a closed edge", vec![e.into()]));
        }
        let splits = graph.edge_splits(e);
        let mut params = vec![edge.t_start];
        let mut verts = vec![edge.start];
        for (t, v) in splits {
            params.push(t);
            verts.push(v);
        }
        params.push(edge.t_end);
        verts.push(edge.end);

        let mut kept = Vec::new();
        for i in 0..params.len() - 1 {
            let (va, vb) = (verts[i], verts[i + 1]);
            if consumed_vertices.contains(&va) || consumed_vertices.contains(&vb) {
                continue;
            }
            let piece = Edge {
                curve: edge.curve.clone(),
                t_start: params[i],
                t_end: params[i + 1],
                start: va,
                end: vb,
            };
            if kept.is_empty() {
                store.modify_edge(e, |ed| *ed = piece)?;
                kept.push(e);
            } else {
                kept.push(store.add_edge(piece));
            }
        }
        if kept.is_empty() {
            consumed_edges.insert(e);
        } else {
            pieces.insert(e, kept);
        }
    }
    Ok(pieces)
}

/// New loops of `face`: outer loop first, then holes.
fn face_loops(
    store: &TopoStore,
    face: FaceId,
    graph: &IntersectionGraph,
    consumed: &BTreeSet<EdgeId>,
    pieces: &BTreeMap<EdgeId, Vec<EdgeId>>,
) -> BlendResult<(Vec<(EdgeId, bool)>, Vec<Vec<(EdgeId, bool)>>)> {
    let outer_wire = store.face(face)?.outer_wire;
    let mut outer_edges = BTreeSet::new();
    let mut uses = Vec::new();
    for w in store.face_wires(face)? {
        for c in store.wire_coedges(w)? {
            let co = store.coedge(c)?;
            if consumed.contains(&co.edge) {
                continue;
            }
            let parts: Vec<EdgeId> = match pieces.get(&co.edge) {
                Some(ps) if co.forward => ps.clone(),
                Some(ps) => ps.iter().rev().copied().collect(),
                None => vec![co.edge],
            };
            for e in parts {
                if w == outer_wire {
                    outer_edges.insert(e);
                }
                uses.push(oriented(store, e, co.forward)?);
            }
        }
    }
    for (&e, &f) in &graph.edge_faces {
        if f != face {
            continue;
        }
        let sheet_use = store
            .edge_coedges(e)
            .first()
            .copied()
            .ok_or_else(|| BlendError::unsupported("free sheet edge has no face", vec![e.into()]))?;
        uses.push(oriented(store, e, !store.coedge(sheet_use)?.forward)?);
    }

    let loops = chain(store, face, &uses)?;
    let candidates: Vec<usize> = (0..loops.len())
        .filter(|&i| loops[i].iter().any(|(e, _)| outer_edges.contains(e)))
        .collect();
    let outer = match candidates.as_slice() {
        [one] => *one,
        [] => {
            let mut best = (0, f64::MIN);
            for (i, l) in loops.iter().enumerate() {
                let a = loop_area(store, l)?;
                if a > best.1 {
                    best = (i, a);
                }
            }
            best.0
        }
        _ => return Err(BlendError::unsupported("blend splits a face in two", vec![face.into()])),
    };
    let mut loops = loops;
    if loops.is_empty() {
        let reason = "blend leaves a face without boundary";
        return Err(BlendError::unsupported(reason, vec![face.into()]));
    }
    let outer_loop = loops.remove(outer);
    Ok((outer_loop, loops))
}

fn oriented(store: &TopoStore, edge: EdgeId, forward: bool) -> BlendResult<Use> {
    let e = store.edge(edge)?;
    let (from, to) = if forward { (e.start, e.end) } else { (e.end, e.start) };
    Ok(Use { edge, forward, from, to })
}

/// Direction of travel leaving the start of a use.
fn out_direction(edge: &Edge, forward: bool) -> Vector3 {
    if forward { edge.curve.tangent(edge.t_start) } else { -edge.curve.tangent(edge.t_end) }
}

/// Direction of travel arriving at the end of a use.
fn in_direction(edge: &Edge, forward: bool) -> Vector3 {
    if forward { edge.curve.tangent(edge.t_end) } else { -edge.curve.tangent(edge.t_start) }
}

/// Chain edge uses into closed loops. Where several uses leave a vertex
/// the one turning least clockwise from the way back is taken, which
/// keeps the face on the left.
fn chain(store: &TopoStore, face: FaceId, uses: &[Use]) -> BlendResult<Vec<Vec<(EdgeId, bool)>>> {
    let mut used = vec![false; uses.len()];
    let mut loops = Vec::new();
    while let Some(first) = used.iter().position(|u| !*u) {
        used[first] = true;
        let origin = uses[first].from;
        let mut current = first;
        let mut members = vec![first];
        loop {
            let at = uses[current].to;
            let mut leaving: Vec<usize> =
                (0..uses.len()).filter(|&i| !used[i] && uses[i].from == at).collect();
            // Back at the origin the loop may still pass through it again,
            // as on a seamed face met by a ring at the seam vertex.
            if at == origin {
                if leaving.is_empty() {
                    break;
                }
                leaving.push(first);
            }
            let next = match leaving.as_slice() {
                [] => {
                    return Err(BlendError::unsupported(
                        "rebuilt face loop does not close",
                        vec![face.into(), uses[current].edge.into()],
                    ))
                }
                [one] => *one,
                _ => sharpest_turn(store, face, &uses[current], &leaving, uses)?,
            };
            if next == first {
                break;
            }
            used[next] = true;
            members.push(next);
            current = next;
        }
        loops.push(members.into_iter().map(|i| (uses[i].edge, uses[i].forward)).collect());
    }
    Ok(loops)
}

fn sharpest_turn(
    store: &TopoStore,
    face: FaceId,
    incoming: &Use,
    leaving: &[usize],
    uses: &[Use],
) -> BlendResult<usize> {
    let p = store.vertex(incoming.to)?.point;
    let normal = store.face_normal_at(face, &p)?;
    let back = -in_direction(store.edge(incoming.edge)?, incoming.forward);
    let mut best: Option<(f64, usize)> = None;
    for &i in leaving {
        let out = out_direction(store.edge(uses[i].edge)?, uses[i].forward);
        let mut angle = (-back.cross(&out).dot(&normal)).atan2(back.dot(&out));
        if angle <= 1e-12 {
            angle += TAU;
        }
        if best.map_or(true, |(a, _)| angle < a) {
            best = Some((angle, i));
        }
    }
    best.map(|(_, i)| i)
        .ok_or_else(|| BlendError::unsupported("no way out of a loop vertex", vec![face.into()]))
}

/// Magnitude of the vector area of a loop, from a few points per edge.
fn loop_area(store: &TopoStore, loop_: &[(EdgeId, bool)]) -> BlendResult<f64> {
    let mut points = Vec::new();
    for &(e, forward) in loop_ {
        let edge = store.edge(e)?;
        for k in 0..4 {
            let s = k as f64 / 4.0;
            let s = if forward { s } else { 1.0 - s };
            points.push(edge.curve.evaluate(edge.t_start + s * (edge.t_end - edge.t_start)));
        }
    }
    let Some(&o) = points.first() else { return Ok(0.0) };
    let mut area = Vector3::zeros();
    for w in points.windows(2) {
        area += (w[0] - o).cross(&(w[1] - o));
    }
    Ok(0.5 * area.norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{blend_attribute, explicit_blend, set_const_round, BlendEnds, ExplicitKind};
    use crate::pipeline::{complete, make_sheet, make_wire as intersect};
    use crate::curve::Curve3;
    use crate::math::Point3;
    use crate::primitive::make_box;
    use crate::topo::{BodyId, Vertex};

    fn vertical_edge(store: &TopoStore, body: BodyId) -> EdgeId {
        store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .find(|&e| {
                let m = store.edge(e).unwrap().midpoint();
                (m.x - 10.0).abs() < 1e-9 && (m.y - 10.0).abs() < 1e-9
            })
            .unwrap()
    }

    /// Top face of a unit cube.
    fn unit_top(store: &mut TopoStore) -> FaceId {
        let body = make_box(store, 1.0, 1.0, 1.0).unwrap();
        store
            .body_faces(body)
            .unwrap()
            .into_iter()
            .find(|&f| store.face_normal_at(f, &Point3::new(0.0, 0.0, 1.0)).unwrap().z > 0.9)
            .unwrap()
    }

    fn on_top(store: &mut TopoStore, x: f64, y: f64) -> VertexId {
        store.add_vertex(Vertex { point: Point3::new(x, y, 1.0) })
    }

    fn line(store: &mut TopoStore, start: VertexId, end: VertexId) -> EdgeId {
        let (ps, pe) = (store.vertex(start).unwrap().point, store.vertex(end).unwrap().point);
        let curve = Curve3::segment(ps, pe);
        store.add_edge(Edge { curve, t_start: 0.0, t_end: 1.0, start, end })
    }

    #[test]
    fn sharpest_turn_keeps_the_face_on_the_left() {
        let mut store = TopoStore::new();
        let top = unit_top(&mut store);
        let o = on_top(&mut store, 0.0, 0.0);
        let a = on_top(&mut store, -1.0, 0.0);
        let b = on_top(&mut store, 0.0, 1.0);
        let c = on_top(&mut store, 0.0, -1.0);
        let incoming = line(&mut store, a, o);
        let up = line(&mut store, o, b);
        let down = line(&mut store, o, c);
        let uses = [
            oriented(&store, incoming, true).unwrap(),
            oriented(&store, up, true).unwrap(),
            oriented(&store, down, true).unwrap(),
        ];
        // Arriving along +x with the face above, the loop turns left.
        assert_eq!(sharpest_turn(&store, top, &uses[0], &[1, 2], &uses).unwrap(), 1);
    }

    #[test]
    fn slit_through_the_start_vertex_stays_one_loop() {
        let mut store = TopoStore::new();
        let top = unit_top(&mut store);
        let o = on_top(&mut store, 0.0, 0.0);
        let p = on_top(&mut store, 0.0, 0.5);
        let q = on_top(&mut store, 0.5, -0.5);
        let r = on_top(&mut store, -0.5, -0.5);
        let slit = line(&mut store, o, p);
        let ring = [line(&mut store, o, q), line(&mut store, q, r), line(&mut store, r, o)];
        let mut uses = vec![oriented(&store, slit, true).unwrap()];
        uses.push(oriented(&store, slit, false).unwrap());
        uses.extend(ring.iter().map(|&e| oriented(&store, e, true).unwrap()));

        let loops = chain(&store, top, &uses).unwrap();
        assert_eq!(loops.len(), 1);
        let want = vec![
            (slit, true),
            (slit, false),
            (ring[0], true),
            (ring[1], true),
            (ring[2], true),
        ];
        assert_eq!(loops[0], want);
    }

    #[test]
    fn attached_round_replaces_its_edge() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge(&store, body);
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let ctx = BlendContext::default();
        let sheet = make_sheet(&mut store, body, &ctx).unwrap();
        let graph = intersect(&store, &sheet, &ctx).unwrap();
        let report = complete(&mut store, sheet, graph, &ctx).unwrap();

        assert_eq!(report.faces.len(), 1);
        assert!(store.edge(e).is_err());
        assert!(blend_attribute(&store, e).is_none());
        let record = explicit_blend(&store, report.faces[0]).unwrap();
        assert_eq!(record.kind, ExplicitKind::Round);
        assert_eq!(record.supports.len(), 2);
        let check = validate_body(&store, body).unwrap();
        assert!(check.valid, "{:?}", check.errors);
        assert_eq!(check.genus, 0);
    }

    #[test]
    fn annotations_map_pieces_to_their_edges() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = vertical_edge(&store, body);
        set_const_round(&mut store, &[e], 4.0, &BlendEnds::default()).unwrap();
        let ctx = BlendContext::default();
        let report = ctx
            .with_annotations(true, |ctx| crate::pipeline::fix_blends(&mut store, body, ctx))
            .unwrap();

        let face = report.faces[0];
        let mapped = report.annotations.iter().find(|a| a.entity == EntityRef::Face(face)).unwrap();
        assert_eq!(mapped.replaces, vec![EntityRef::Edge(e)]);
    }
}
