//! Cylinder primitive: a prism over a circle split into two half arcs.
//!
//! 4 vertices, 6 edges (2 arcs per rim, 2 seam lines), 4 faces
//! (2 half barrels, 2 caps). V(4) − E(6) + F(4) = 2.

use super::prism::{make_prism, Profile, ProfileSegment};
use crate::error::{BlendError, BlendResult};
use crate::math::Point3;
use crate::topo::*;

/// Cylinder about the z axis through `base`, from `base.z` to
/// `base.z + height`.
pub fn make_cylinder(
    store: &mut TopoStore,
    base: Point3,
    radius: f64,
    height: f64,
) -> BlendResult<BodyId> {

    if radius <= 0.0 {
        return Err(BlendError::InvalidRadius { value: radius, entities: Vec::new() });
    }
    let c = (base.x, base.y);
    let profile = Profile {
        start: (c.0 + radius, c.1),
        segments: vec![
            ProfileSegment::Arc { to: (c.0 - radius, c.1), center: c, ccw: true },
            ProfileSegment::Arc { to: (c.0 + radius, c.1), center: c, ccw: true },
        ],
    };
    make_prism(store, &profile, base.z, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;

    #[test]
    fn cylinder_topology_and_rims() {
        let mut store = TopoStore::new();
        let body = make_cylinder(&mut store, Point3::new(1.0, 0.0, 0.0), 2.0, 5.0).unwrap();
        let r = validate_body(&store, body).unwrap();
        assert!(r.valid, "{:?}", r.errors);
        let barrels = store
            .body_faces(body)
            .unwrap()
            .into_iter()
            .filter(|&f| matches!(store.face(f).unwrap().surface, Surface::Cylinder { .. }))
            .count();
        assert_eq!(barrels, 2);
        for e in store.body_edges(body).unwrap() {
            let edge = store.edge(e).unwrap();
            let a = store.vertex(edge.start).unwrap().point;
            let b = store.vertex(edge.end).unwrap().point;
            assert!((edge.curve.evaluate(edge.t_start) - a).norm() < 1e-9);
            assert!((edge.curve.evaluate(edge.t_end) - b).norm() < 1e-9);
        }
    }
}
