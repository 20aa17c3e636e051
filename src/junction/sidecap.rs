//! Side caps.
//!
//! Near a capped end a spring can run off its support face before the
//! blend reaches the cap face, for instance when the blend is wider than
//! the face beside it. The blend is then stopped by the face the spring
//! runs onto, provided that face is planar and meets the support in an
//! unblended convex edge.

use crate::attrib::{blend_attribute, edge_convexity, Convexity};
use crate::error::BlendResult;
use crate::math::{Point3, Vector3};
use crate::spine::Spine;
use crate::surface::Surface;
use crate::topo::{EdgeId, FaceId, TopoStore};

const SAMPLES: usize = 8;
const PARALLEL_TOL: f64 = 1e-3;

/// The face a spring runs onto near the end of `spine`, if any.
pub fn side_cap_face(
    store: &TopoStore,
    spine: &Spine,
    at_start: bool,
) -> BlendResult<Option<(FaceId, Surface)>> {
    let seg = super::end_segment(spine, at_start);
    // Walk from the far end of the segment towards the junction.
    let (_, tangent) = spine.frame(if at_start { 0.0 } else { spine.length() });
    let order: Vec<usize> =
        if at_start { (1..=SAMPLES).rev().collect() } else { (1..=SAMPLES).collect() };
    for k in order {
        let sigma = seg.start + seg.length() * k as f64 / (SAMPLES + 1) as f64;
        let section = spine.section(sigma)?;
        for (side, support) in seg.supports.iter().enumerate() {
            let contact = section.contacts[side];
            if store.face_contains(support.face, &contact)? {
                continue;
            }
            if let Some(found) = crossing_face(store, support.face, &contact, seg.edge, &tangent)? {
                log::debug!(
                    "spring of {:?} leaves {:?}; side cap on {:?}",
                    seg.edge,
                    support.face,
                    found.0
                );
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// Across which unblended convex edge of `face` the point `p` lies, and
/// the planar face on the other side. That face must hold the foot of `p`
/// and be crossed by the section plane.
fn crossing_face(
    store: &TopoStore,
    face: FaceId,
    p: &Point3,
    spine_edge: EdgeId,
    tangent: &Vector3,
) -> BlendResult<Option<(FaceId, Surface)>> {
    let mut best: Option<(f64, EdgeId)> = None;
    for e in store.face_edges(face)? {
        if e == spine_edge || blend_attribute(store, e).is_some() {
            continue;
        }
        let edge = store.edge(e)?;
        let (d, _) = edge.curve.distance_within(p, edge.t_start, edge.t_end);
        if best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, e));
        }
    }
    let Some((_, e)) = best else { return Ok(None) };
    if edge_convexity(store, e)? != Convexity::Convex {
        return Ok(None);
    }
    let Some((other, _)) = store.edge_faces(e)?.into_iter().find(|(f, _)| *f != face) else {
        return Ok(None);
    };
    let surface = store.face(other)?.surface.clone();
    let Surface::Plane { origin, normal } = surface else { return Ok(None) };
    if normal.cross(tangent).norm() < PARALLEL_TOL {
        return Ok(None);
    }
    let foot = *p - normal * normal.dot(&(*p - origin));
    if !store.face_contains(other, &foot)? {
        return Ok(None);
    }
    Ok(Some((other, surface)))
}

/// Whether a side cap on `surface` runs along the spine rather than
/// across it.
pub(crate) fn runs_along(surface: &Surface, tangent: &Vector3) -> bool {
    matches!(surface, Surface::Plane { normal, .. } if normal.dot(tangent).abs() < PARALLEL_TOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::{set_const_round, BlendEnds};
    use crate::graph::find_smooth_sequence;
    use crate::primitive::make_box;

    fn top_edge(store: &TopoStore, body: crate::topo::BodyId) -> EdgeId {
        store
            .body_edges(body)
            .unwrap()
            .into_iter()
            .find(|&e| {
                let ed = store.edge(e).unwrap();
                let dir = ed.curve.tangent(ed.t_start);
                ed.midpoint().z > 0.0 && dir.dot(&Vector3::x()).abs() > 0.99
            })
            .unwrap()
    }

    #[test]
    fn narrow_side_face_caps_the_blend() {
        // Side faces are 2 high; a radius 3 spring runs below them.
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 1.0).unwrap();
        let e = top_edge(&store, body);
        set_const_round(&mut store, &[e], 3.0, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(&store, e).unwrap();
        let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
        let (face, surface) = side_cap_face(&store, &spine, false).unwrap().unwrap();
        let Surface::Plane { normal, .. } = surface else { panic!() };
        assert!(normal.z.abs() > 0.99);
        assert!(store.face_normal_at(face, &Point3::new(0.0, 0.0, -1.0)).unwrap().z < 0.0);
        assert!(runs_along(&surface, &spine.frame(0.0).1));
    }

    #[test]
    fn cap_on_a_face_along_the_spine_is_refused() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 1.0).unwrap();
        let e = top_edge(&store, body);
        set_const_round(&mut store, &[e], 3.0, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(&store, e).unwrap();
        let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
        let v = unit.end_vertex();
        let err = super::super::cap_condition(&store, &spine, false, v).unwrap_err();
        assert!(matches!(err, crate::error::BlendError::UnsupportedTopology { .. }), "{err:?}");
    }

    #[test]
    fn small_round_needs_no_side_cap() {
        let mut store = TopoStore::new();
        let body = make_box(&mut store, 10.0, 10.0, 10.0).unwrap();
        let e = top_edge(&store, body);
        set_const_round(&mut store, &[e], 2.0, &BlendEnds::default()).unwrap();
        let unit = find_smooth_sequence(&store, e).unwrap();
        let spine = Spine::from_unit(&store, &unit, 1e-5).unwrap();
        assert_eq!(side_cap_face(&store, &spine, true).unwrap(), None);
        assert_eq!(side_cap_face(&store, &spine, false).unwrap(), None);
    }
}
