//! Entity-entity blends between a planar face and a spherical face.
//!
//! A ball of radius `r` rolling on the plane while touching the sphere
//! sweeps a torus coaxial with the plane normal through the sphere centre.
//! The blend is the inner part of that torus between the two contact
//! circles. The sphere's body, if different from the blank, is joined to
//! the blank by the attach phase.
//!
//! Only the concave blend is built, on the side of both supports that
//! holds the help point. Other surface pairs, convexities and radius
//! functions fail for their unit alone.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::attrib::{entity_entity_blend, BlendKind, Convexity, ExplicitBlend, ExplicitKind};
use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::math::solve::brent;
use crate::math::{plane_frame, Point3, Vector3};
use crate::nurbs::fit::interpolate_grid;
use crate::nurbs::NurbsSurface;
use crate::primitive::arc_through;
use crate::radius::RadiusFunction;
use crate::surface::Surface;
use crate::topo::{BodyId, EntityRef, FaceId, TopoStore, UvBox};

use super::report::{BlendReport, WarningKind};
use super::sheet::{SheetBuilder, SheetUnit};
use super::BlendContext;

const SEAM_TOL: f64 = 1e-12;
const SEAM_ITER: usize = 100;

struct PlaneSide {
    face: FaceId,
    origin: Point3,
    /// Outward normal of the face.
    normal: Vector3,
}

struct SphereSide {
    face: FaceId,
    center: Point3,
    radius: f64,
}

/// Build the sheet face of the entity-entity blend stored on `face`.
/// Returns the unit and the body of the support that is not the blank.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build(
    store: &mut TopoStore,
    builder: &mut SheetBuilder,
    blank: BodyId,
    face: FaceId,
    ctx: &BlendContext,
    op_tag: u64,
    report: &mut BlendReport,
    previews: Option<&mut Vec<NurbsSurface>>,
) -> BlendResult<(SheetUnit, Option<BodyId>)> {
    let missing =
        || BlendError::unsupported("face carries no entity-entity blend", vec![face.into()]);
    let attr = entity_entity_blend(store, face).ok_or_else(missing)?;
    let BlendKind::EntityEntity { supports, function, help_point } = &attr.kind else {
        return Err(missing());
    };
    let faces = support_faces(supports)?;
    let function = function.clone();
    let help_point = *help_point;
    let convexity = attr.convexity;
    let entities = vec![faces[0].into(), faces[1].into()];

    if touching(store, faces[0], faces[1])? {
        let message = "blend supports share topology";
        report.warn(WarningKind::OverlappingSupports, entities.clone(), message);
        return Err(BlendError::OverlappingSupports { entities });
    }
    if convexity != Convexity::Concave {
        let reason = "only concave entity-entity blends are built";
        return Err(BlendError::unsupported(reason, entities));
    }
    let &RadiusFunction::Constant(r) = &function else {
        let reason = "entity-entity blends need a constant radius";
        return Err(BlendError::unsupported(reason, entities));
    };
    let (plane, sphere) = classify(store, faces)?;
    // The ball rolls in the region outside both supports that holds the
    // help point.
    let above = (help_point - plane.origin).dot(&plane.normal) > 0.0;
    if !above || (help_point - sphere.center).norm() <= sphere.radius {
        return Err(BlendError::unsupported("help point lies inside a support", entities));
    }

    let n = plane.normal;
    let h = (sphere.center - plane.origin).dot(&n);
    let rs = sphere.radius;
    if h <= rs + ctx.options.tolerance {
        return Err(BlendError::unsupported("sphere must lie clear of the plane", entities));
    }
    if r <= 0.5 * (h - rs) {
        return Err(BlendError::InvalidRadius { value: r, entities });
    }
    let rho = ((rs + r).powi(2) - (h - r).powi(2)).sqrt();
    let center = sphere.center + n * (r - h);
    // Height of the sphere contact circle above the sphere centre.
    let lift = rs * (r - h) / (rs + r);

    let seam = sphere_seam_point(store, &sphere, &n, lift)?;
    let radial = {
        let d = seam - center;
        let d = d - n * d.dot(&n);
        if d.norm() < 1e-12 {
            return Err(BlendError::unsupported("sphere seam lies on the blend axis", entities));
        }
        d.normalize()
    };
    let tube = center + radial * rho;
    let plane_contact = tube - n * r;

    let (x_curve, x0, x1) = arc_through(tube, radial.cross(&n), seam, plane_contact);
    let (x_edge, x_fwd) = builder.edge(store, x_curve, x0, x1)?;

    let plane_circle = Curve3::Circle { center: center - n * r, axis: n, radius: rho };
    let tp = plane_circle.closest_parameter(&plane_contact);
    let (plane_spring, plane_fwd) = builder.edge(store, plane_circle, tp, tp + TAU)?;
    builder.hint(plane_spring, plane.face);

    let sphere_circle =
        Curve3::Circle { center: sphere.center + n * lift, axis: n, radius: rs * rho / (rs + r) };
    let ts = sphere_circle.closest_parameter(&seam);
    let (sphere_spring, sphere_fwd) = builder.edge(store, sphere_circle, ts, ts + TAU)?;
    builder.hint(sphere_spring, sphere.face);

    for k in 0..8 {
        let angle = TAU * k as f64 / 8.0;
        let p = store.edge(plane_spring)?.curve.evaluate(tp + angle);
        if !store.face_contains(plane.face, &p)? {
            return Err(BlendError::unsupported("blend runs off its planar support", entities));
        }
    }

    let (e1, e2) = plane_frame(&n);
    let u0 = radial.dot(&e2).atan2(radial.dot(&e1));
    let mut v0 = (h - r).atan2(-rho);
    if v0 < 0.0 {
        v0 += TAU;
    }
    let v1 = PI + FRAC_PI_2;
    let surface = Surface::Torus { center, axis: n, major_r: rho, minor_r: r };
    let loop_ = vec![
        (x_edge, x_fwd),
        (plane_spring, plane_fwd),
        (x_edge, !x_fwd),
        (sphere_spring, !sphere_fwd),
    ];
    let domain = UvBox { u0, u1: u0 + TAU, v0, v1 };
    let blend_face = builder.face(store, surface.clone(), loop_, false, Some(domain));

    let mut consumed_vertices = Vec::new();
    for e in store.face_edges(sphere.face)? {
        let edge = store.edge(e)?;
        for v in [edge.start, edge.end] {
            let q = store.vertex(v)?.point;
            if (q - sphere.center).dot(&n) < lift && !consumed_vertices.contains(&v) {
                consumed_vertices.push(v);
            }
        }
    }

    if let Some(out) = previews {
        out.extend(torus_patch(&surface, &domain));
    }

    let unit_tag = store.fresh_tag();
    let explicit = ExplicitBlend {
        kind: ExplicitKind::EntityEntity,
        supports: vec![faces[0], faces[1]],
        function: Some(function),
        op_tag,
        unit_tag,
    };
    let mut other = None;
    for f in faces {
        let b = store.face_body(f)?;
        if b != blank {
            other = Some(b);
        }
    }
    log::debug!("entity-entity blend of radius {r} between {:?} and {:?}", plane.face, sphere.face);
    Ok((
        SheetUnit {
            sources: vec![face.into()],
            faces: vec![blend_face],
            explicit: vec![(blend_face, explicit)],
            consumed_edges: Vec::new(),
            consumed_vertices,
        },
        other,
    ))
}

fn support_faces(supports: &[EntityRef; 2]) -> BlendResult<[FaceId; 2]> {
    match supports {
        [EntityRef::Face(a), EntityRef::Face(b)] => Ok([*a, *b]),
        _ => {
            let reason = "entity-entity supports must be faces";
            Err(BlendError::unsupported(reason, supports.to_vec()))
        }

    }
}

fn touching(store: &TopoStore, a: FaceId, b: FaceId) -> BlendResult<bool> {
    let edges_a = store.face_edges(a)?;
    let edges_b = store.face_edges(b)?;
    if edges_a.iter().any(|e| edges_b.contains(e)) {
        return Ok(true);
    }
    let mut verts_a = Vec::new();
    for e in &edges_a {
        let edge = store.edge(*e)?;
        verts_a.extend([edge.start, edge.end]);
    }
    for e in &edges_b {
        let edge = store.edge(*e)?;
        if verts_a.contains(&edge.start) || verts_a.contains(&edge.end) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn classify(store: &TopoStore, faces: [FaceId; 2]) -> BlendResult<(PlaneSide, SphereSide)> {
    let side = |f: FaceId| -> BlendResult<(Option<PlaneSide>, Option<SphereSide>)> {
        let face = store.face(f)?;
        Ok(match &face.surface {
            Surface::Plane { origin, normal } => {
                let normal = if face.outward { normal.normalize() } else { -normal.normalize() };
                (Some(PlaneSide { face: f, origin: *origin, normal }), None)
            }
            Surface::Sphere { center, radius } if face.outward => {
                (None, Some(SphereSide { face: f, center: *center, radius: *radius }))
            }
            _ => (None, None),
        })
    };
    match (side(faces[0])?, side(faces[1])?) {
        ((Some(p), _), (_, Some(s))) | ((_, Some(s)), (Some(p), _)) => Ok((p, s)),
        _ => Err(BlendError::unsupported(
            "entity-entity blends are supported between a plane and a convex sphere",
            vec![faces[0].into(), faces[1].into()],
        )),
    }
}

/// Where the sphere's contact circle crosses the sphere face's seam.
fn sphere_seam_point(
    store: &TopoStore,
    sphere: &SphereSide,
    n: &Vector3,
    lift: f64,
) -> BlendResult<Point3> {
    let missed = || {
        let entities = vec![EntityRef::Face(sphere.face)];
        BlendError::unsupported("contact circle does not cross the sphere seam", entities)
    };
    for e in store.face_edges(sphere.face)? {
        let edge = store.edge(e)?;
        let g = |t: f64| (edge.curve.evaluate(t) - sphere.center).dot(n) - lift;
        if g(edge.t_start) * g(edge.t_end) > 0.0 {
            continue;
        }
        let t = brent(g, edge.t_start, edge.t_end, SEAM_TOL, SEAM_ITER).map_err(|_| missed())?;
        return Ok(edge.curve.evaluate(t));
    }
    Err(missed())
}

fn torus_patch(surface: &Surface, domain: &UvBox) -> Option<NurbsSurface> {
    let us: Vec<f64> =
        (0..13).map(|i| domain.u0 + (domain.u1 - domain.u0) * i as f64 / 12.0).collect();
    let vs: Vec<f64> =
        (0..5).map(|j| domain.v0 + (domain.v1 - domain.v0) * j as f64 / 4.0).collect();
    let grid: Vec<Vec<Point3>> =
        us.iter().map(|&u| vs.iter().map(|&v| surface.evaluate(u, v)).collect()).collect();
    interpolate_grid(&us, &vs, &grid, 3, 3)
}
