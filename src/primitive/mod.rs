//! Primitive body constructors.
//!
//! Each function builds a complete B-rep solid (topology and geometry) in a
//! `TopoStore`. They are the test fixtures and demo inputs of the blend
//! engine.

mod cylinder;
mod prism;
mod sphere;

pub use cylinder::make_cylinder;
pub use prism::{make_box, make_prism, Profile, ProfileSegment};
pub use sphere::make_sphere;

use crate::curve::Curve3;
use crate::error::BlendResult;
use crate::math::{wrap_angle_near, Point3, Vector3};
use crate::surface::Surface;
use crate::topo::*;

/// An empty body with one shell.
pub(crate) fn new_body(store: &mut TopoStore, kind: BodyKind) -> (BodyId, ShellId) {
    let body = store.add_body(Body { kind, shells: Vec::new() });
    let shell = store.add_shell(Shell { faces: Vec::new(), body });
    // Freshly created entities always exist.
    let _ = store.modify_body(body, |b| b.shells.push(shell));
    (body, shell)
}

/// Build a face from coedge loops (outer first) and register it with its
/// shell.
pub(crate) fn make_face(
    store: &mut TopoStore,
    shell: ShellId,
    surface: Surface,
    loops: &[Vec<(EdgeId, bool)>],
    outward: bool,
    domain: Option<UvBox>,
) -> FaceId {
    // Pre-allocate the face so coedges can reference it.
    let face_id = store.add_face(Face {
        surface,
        outer_wire: WireId(usize::MAX),
        inner_wires: Vec::new(),
        outward,
        shell,
        domain,
    });

    let mut wires = Vec::with_capacity(loops.len());
    for edge_dirs in loops {
        wires.push(make_wire(store, face_id, edge_dirs));
    }
    let _ = store.modify_face(face_id, |f| {
        f.outer_wire = wires[0];
        f.inner_wires = wires[1..].to_vec();
    });
    let _ = store.modify_shell(shell, |s| s.faces.push(face_id));
    face_id
}

/// Link coedges for one loop of `face` and wrap them in a wire.
pub(crate) fn make_wire(
    store: &mut TopoStore,
    face: FaceId,
    edge_dirs: &[(EdgeId, bool)],
) -> WireId {
    let n = edge_dirs.len();
    let mut coedge_ids = Vec::with_capacity(n);
    for &(edge, forward) in edge_dirs {
        let coedge = CoEdge { edge, forward, next: CoEdgeId(usize::MAX), face };
        coedge_ids.push(store.add_coedge(coedge));
    }
    for i in 0..n {
        let next = coedge_ids[(i + 1) % n];
        let _ = store.modify_coedge(coedge_ids[i], |c| c.next = next);
    }
    store.add_wire(Wire { first_coedge: coedge_ids[0] })
}

pub(crate) fn add_line_edge(
    store: &mut TopoStore,
    a: VertexId,
    b: VertexId,
) -> BlendResult<EdgeId> {
    let pa = store.vertex(a)?.point;
    let pb = store.vertex(b)?.point;
    let curve = Curve3::segment(pa, pb);
    Ok(store.add_edge(Edge { curve, t_start: 0.0, t_end: 1.0, start: a, end: b }))
}

/// Circular arc edge from `a` to `b` about `center`, turning positively
/// about `axis`. Equal endpoints give a full circle.
pub(crate) fn add_arc_edge(
    store: &mut TopoStore,
    a: VertexId,
    b: VertexId,
    center: Point3,
    axis: Vector3,
) -> BlendResult<EdgeId> {
    let pa = store.vertex(a)?.point;
    let pb = store.vertex(b)?.point;
    let (curve, t0, t1) = arc_through(center, axis, pa, pb);
    Ok(store.add_edge(Edge { curve, t_start: t0, t_end: t1, start: a, end: b }))
}

/// Circle carrier and increasing parameter range for the arc `pa → pb`.
pub(crate) fn arc_through(
    center: Point3,
    axis: Vector3,
    pa: Point3,
    pb: Point3,
) -> (Curve3, f64, f64) {

    let radius = (pa - center).norm();
    let curve = Curve3::Circle { center, axis: axis.normalize(), radius };
    let t0 = curve.closest_parameter(&pa);
    let mut t1 = wrap_angle_near(curve.closest_parameter(&pb), t0 + std::f64::consts::PI);
    if t1 <= t0 + 1e-12 {
        t1 += std::f64::consts::TAU;
    }
    (curve, t0, t1)
}
