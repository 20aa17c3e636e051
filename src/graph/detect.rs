//! Recovering resolved blends from their explicit face records.

use std::collections::{HashSet, VecDeque};

use crate::attrib::explicit_blend;
use crate::error::{BlendError, BlendResult};
use crate::topo::{EntityRef, FaceId, TopoStore};

fn neighbours(store: &TopoStore, face: FaceId) -> BlendResult<Vec<FaceId>> {
    let mut out = Vec::new();
    for e in store.face_edges(face)? {
        for (f, _) in store.edge_faces(e)? {
            if f != face && !out.contains(&f) {
                out.push(f);
            }
        }
    }
    Ok(out)
}

fn flood(
    store: &TopoStore,
    seed: FaceId,
    same: impl Fn(FaceId) -> bool,
) -> BlendResult<Vec<FaceId>> {
    let mut seen = HashSet::from([seed]);
    let mut out = vec![seed];
    let mut queue = VecDeque::from([seed]);
    while let Some(f) = queue.pop_front() {
        for n in neighbours(store, f)? {
            if !seen.contains(&n) && same(n) {
                seen.insert(n);
                out.push(n);
                queue.push_back(n);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Faces produced for the same smooth sequence as `face`.
pub fn detect_blend_sequence(store: &TopoStore, face: FaceId) -> BlendResult<Vec<FaceId>> {
    let tag = explicit_blend(store, face)
        .ok_or(BlendError::NotAnEdgeBlend(EntityRef::Face(face)))?
        .unit_tag;
    flood(store, face, |f| explicit_blend(store, f).is_some_and(|b| b.unit_tag == tag))
}

/// Faces produced by the same resolution call as `face`, connected to it.
pub fn detect_blend_network(store: &TopoStore, face: FaceId) -> BlendResult<Vec<FaceId>> {
    let tag = explicit_blend(store, face)
        .ok_or(BlendError::NotAnEdgeBlend(EntityRef::Face(face)))?
        .op_tag;

    flood(store, face, |f| explicit_blend(store, f).is_some_and(|b| b.op_tag == tag))
}
