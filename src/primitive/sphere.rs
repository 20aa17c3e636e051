//! Sphere primitive: one face bounded by a single seam edge walked both ways.
//!
//! 2 pole vertices, 1 seam edge (half meridian), 1 face.
//! V(2) − E(1) + F(1) = 2.

use super::{arc_through, make_face, new_body};
use crate::error::{BlendError, BlendResult};
use crate::math::{plane_frame, Point3, Vector3};
use crate::surface::Surface;
use crate::topo::*;

pub fn make_sphere(store: &mut TopoStore, center: Point3, radius: f64) -> BlendResult<BodyId> {
    if radius <= 0.0 {
        return Err(BlendError::InvalidRadius { value: radius, entities: Vec::new() });
    }
    let (body, shell) = new_body(store, BodyKind::Solid);
    let south = center - Vector3::z() * radius;
    let north = center + Vector3::z() * radius;
    let vs = store.add_vertex(Vertex { point: south });
    let vn = store.add_vertex(Vertex { point: north });

    // The seam runs along the u = 0 meridian of the sphere surface.
    let (e1, _) = plane_frame(&Vector3::z());
    let axis = Vector3::z().cross(&e1);
    let (mut curve, mut t0, mut t1) = arc_through(center, axis, south, north);
    if (curve.evaluate(0.5 * (t0 + t1)) - (center + e1 * radius)).norm() > 1e-6 * radius.max(1.0) {
        (curve, t0, t1) = arc_through(center, -axis, south, north);
    }
    let seam = store.add_edge(Edge { curve, t_start: t0, t_end: t1, start: vs, end: vn });

    let loops = [vec![(seam, true), (seam, false)]];
    make_face(store, shell, Surface::Sphere { center, radius }, &loops, true, None);

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_is_valid_and_contains_its_points() {
        let mut store = TopoStore::new();
        let body = make_sphere(&mut store, Point3::new(0.0, 0.0, 10.0), 3.0).unwrap();
        let r = validate_body(&store, body).unwrap();
        assert!(r.valid, "{:?}", r.errors);
        let face = store.body_faces(body).unwrap()[0];
        assert!(store.face_contains(face, &Point3::new(3.0, 0.0, 10.0)).unwrap());
        assert!(store.face_contains(face, &Point3::new(0.0, -3.0, 10.0)).unwrap());
    }

    #[test]
    fn seam_lies_on_sphere() {
        let mut store = TopoStore::new();
        let body = make_sphere(&mut store, Point3::origin(), 2.0).unwrap();
        let e = store.body_edges(body).unwrap()[0];
        let edge = store.edge(e).unwrap();
        for i in 0..=10 {
            let p = edge.point_at(i as f64 / 10.0);
            assert!((p.coords.norm() - 2.0).abs() < 1e-9);
        }
    }
}
