//! Extruded profile primitive and the axis-aligned box built on it.
//!
//! A closed planar profile of n line/arc segments extruded along +z gives
//! 2n vertices, 3n edges and n + 2 faces: V − E + F = 2n − 3n + n + 2 = 2.

use super::{add_arc_edge, add_line_edge, make_face, new_body};
use crate::error::{BlendError, BlendResult};
use crate::math::{Point3, Vector3};
use crate::surface::Surface;
use crate::topo::*;

/// One segment of a profile in the xy-plane.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileSegment {
    Line { to: (f64, f64) },
    /// Circular arc about `center`; `ccw` is the turning sense seen from +z.
    Arc { to: (f64, f64), center: (f64, f64), ccw: bool },
}

impl ProfileSegment {
    fn end(&self) -> (f64, f64) {
        match self {
            ProfileSegment::Line { to } | ProfileSegment::Arc { to, .. } => *to,
        }
    }
}

/// A closed counter-clockwise profile. The last segment must end at `start`.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub start: (f64, f64),
    pub segments: Vec<ProfileSegment>,
}

impl Profile {
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Profile {
            start: (x0, y0),
            segments: vec![
                ProfileSegment::Line { to: (x1, y0) },
                ProfileSegment::Line { to: (x1, y1) },
                ProfileSegment::Line { to: (x0, y1) },
                ProfileSegment::Line { to: (x0, y0) },
            ],
        }
    }
}

/// Extrude `profile` from `z0` to `z0 + height`.
pub fn make_prism(
    store: &mut TopoStore,
    profile: &Profile,
    z0: f64,
    height: f64,
) -> BlendResult<BodyId> {
    let n = profile.segments.len();
    let closes = profile.segments.last().map_or(false, |s| {
        let (x, y) = s.end();
        (x - profile.start.0).hypot(y - profile.start.1) < 1e-9
    });
    if n < 2 || !closes {
        let reason = "profile must be closed with at least two segments";
        return Err(BlendError::unsupported(reason, Vec::new()));
    }
    if height <= 0.0 {
        return Err(BlendError::unsupported("prism height must be positive", Vec::new()));
    }
    let z1 = z0 + height;

    let mut corners = vec![profile.start];
    corners.extend(profile.segments[..n - 1].iter().map(ProfileSegment::end));

    let (body, shell) = new_body(store, BodyKind::Solid);
    let b: Vec<VertexId> = corners
        .iter()
        .map(|&(x, y)| store.add_vertex(Vertex { point: Point3::new(x, y, z0) }))
        .collect();
    let t: Vec<VertexId> = corners
        .iter()
        .map(|&(x, y)| store.add_vertex(Vertex { point: Point3::new(x, y, z1) }))
        .collect();

    let mut bottom = Vec::with_capacity(n);
    let mut top = Vec::with_capacity(n);
    for (i, seg) in profile.segments.iter().enumerate() {
        let j = (i + 1) % n;
        match seg {
            ProfileSegment::Line { .. } => {
                bottom.push(add_line_edge(store, b[i], b[j])?);
                top.push(add_line_edge(store, t[i], t[j])?);
            }
            ProfileSegment::Arc { center, ccw, .. } => {
                let axis = if *ccw { Vector3::z() } else { -Vector3::z() };
                let below = Point3::new(center.0, center.1, z0);
                let above = Point3::new(center.0, center.1, z1);
                bottom.push(add_arc_edge(store, b[i], b[j], below, axis)?);
                top.push(add_arc_edge(store, t[i], t[j], above, axis)?);
            }
        }
    }
    let side: Vec<EdgeId> =
        (0..n).map(|i| add_line_edge(store, b[i], t[i])).collect::<BlendResult<_>>()?;

    // Bottom loop runs the profile backwards (CCW about -z).
    let bottom_loop: Vec<(EdgeId, bool)> = bottom.iter().rev().map(|&e| (e, false)).collect();
    make_face(
        store,
        shell,
        Surface::Plane { origin: Point3::new(0.0, 0.0, z0), normal: -Vector3::z() },
        &[bottom_loop],
        true,
        None,
    );
    let top_loop: Vec<(EdgeId, bool)> = top.iter().map(|&e| (e, true)).collect();
    make_face(
        store,
        shell,
        Surface::Plane { origin: Point3::new(0.0, 0.0, z1), normal: Vector3::z() },
        &[top_loop],
        true,
        None,
    );

    for (i, seg) in profile.segments.iter().enumerate() {
        let j = (i + 1) % n;
        let (x0, y0) = corners[i];
        let (surface, outward) = match seg {
            ProfileSegment::Line { to } => {
                let d = Vector3::new(to.0 - x0, to.1 - y0, 0.0);
                let normal = d.cross(&Vector3::z()).normalize();
                (Surface::Plane { origin: Point3::new(x0, y0, z0), normal }, true)
            }
            ProfileSegment::Arc { center, ccw, .. } => {
                let radius = (x0 - center.0).hypot(y0 - center.1);
                let origin = Point3::new(center.0, center.1, z0);
                let cyl = Surface::Cylinder { origin, axis: Vector3::z(), radius };
                // A clockwise arc is a concave wall: material lies outside the cylinder.
                (cyl, *ccw)
            }
        };
        make_face(
            store,
            shell,
            surface,
            &[vec![(bottom[i], true), (side[j], true), (top[i], false), (side[i], false)]],
            outward,
            None,
        );
    }

    log::debug!("prism with {n} side faces built as {body:?}");
    Ok(body)
}

/// Axis-aligned box centred at the origin with half-extents `hx, hy, hz`.
pub fn make_box(store: &mut TopoStore, hx: f64, hy: f64, hz: f64) -> BlendResult<BodyId> {
    make_prism(store, &Profile::rectangle(-hx, -hy, hx, hy), -hz, 2.0 * hz)
}
