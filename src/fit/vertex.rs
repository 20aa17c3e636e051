//! Vertex blend surfaces.
//!
//! A vertex blend closes the hole left where several edge blends (and
//! possibly unblended edges) meet. When every side is the end of a rolling
//! ball blend and all those balls coincide, the hole is exactly a piece of
//! the ball: a sphere. Otherwise an n-sided patch is built over the
//! boundary loop.

use crate::attrib::Continuity;
use crate::error::{BlendError, BlendResult};
use crate::math::{Point3, Vector3};
use crate::nurbs::fit::interpolate_grid;
use crate::nurbs::NurbsSurface;
use crate::surface::{Surface, VblBoundary, VblSurface};

/// One side of the boundary loop.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexSide {
    pub boundary: VblBoundary,
    /// Ball centre and radius at the end of the blend that produced this
    /// side, if it was a round.
    pub ball: Option<(Point3, f64)>,
    /// Side runs along a support face rather than along a blend.
    pub connector: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexFit {
    pub surface: Surface,
    pub outward: bool,
}

/// Shape parameters of the patch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexShape {
    pub bulge: f64,
    pub continuity: Continuity,
    pub cusp: bool,
}

fn common_ball(sides: &[VertexSide], tol: f64) -> Option<(Point3, f64)> {
    let (c0, r0) = sides.first()?.ball?;
    sides
        .iter()
        .all(|s| {
            let same = |(c, r): (Point3, f64)| (c - c0).norm() <= tol && (r - r0).abs() <= tol;
            !s.connector && s.ball.map_or(false, same)
        })
        .then_some((c0, r0))
}

/// Fit the surface closing a vertex.
///
/// `vertex` is the original vertex position and `outward` the mean
/// outward normal of the faces around it.
pub fn fit_vertex_blend(
    sides: Vec<VertexSide>,
    vertex: Point3,
    outward: Vector3,
    shape: VertexShape,
    tol: f64,
) -> BlendResult<VertexFit> {
    if sides.len() < 2 {
        return Err(BlendError::unsupported("vertex blend needs at least two sides", Vec::new()));
    }
    if let Some((center, radius)) = common_ball(&sides, tol) {
        let surface = Surface::Sphere { center, radius };
        let p = sides[0].boundary.point(0.5);
        let out = (p - center).dot(&outward) > 0.0;
        log::debug!("vertex blend is a sphere of radius {radius}");
        return Ok(VertexFit { surface, outward: out });
    }

    let boundaries: Vec<VblBoundary> = sides.into_iter().map(|s| s.boundary).collect();
    let n = boundaries.len() as f64;
    let sum = boundaries
        .iter()
        .fold(Vector3::zeros(), |acc, b| acc + b.point(0.0).coords + b.point(0.5).coords);
    let centroid = Point3::from(sum / (2.0 * n));
    let toward = vertex - centroid;
    let push = if toward.norm() > tol { toward.normalize() } else { outward.normalize() };
    let bulge = if shape.cusp { 0.0 } else { shape.bulge };
    let slope = !matches!(shape.continuity, Continuity::Position);
    let vbl = VblSurface::new(boundaries, push, bulge, slope);

    let n = vbl.sides();
    let surface = Surface::VertexBlend(Box::new(vbl));
    let score: f64 =
        (0..n).map(|j| surface.normal(0.5, (j as f64 + 0.5) / n as f64).dot(&outward)).sum();
    Ok(VertexFit { surface, outward: score > 0.0 })
}

/// Approximate an n-sided patch by one bicubic spline surface per sector,
/// refining each grid until interior and boundary deviations are within
/// tolerance.
pub fn split_vbl(vbl: &VblSurface, interior_tol: f64, boundary_tol: f64) -> Vec<NurbsSurface> {
    let n = vbl.sides();
    (0..n)
        .filter_map(|j| {
            let phi0 = j as f64 / n as f64;
            let phi1 = (j + 1) as f64 / n as f64;
            sector_patch(vbl, phi0, phi1, interior_tol, boundary_tol)
        })
        .collect()
}

fn sector_patch(
    vbl: &VblSurface,
    phi0: f64,
    phi1: f64,
    interior_tol: f64,
    boundary_tol: f64,
) -> Option<NurbsSurface> {
    // Shrink the far end of the sector slightly so the periodic wrap in
    // `VblSurface::boundary` never jumps to the next side.
    let phi1 = phi1 - 1e-9;
    let at = |rho: f64, s: f64| vbl.evaluate(rho, phi0 + s * (phi1 - phi0));
    let mut best = None;
    let mut count = 4;
    while count <= 32 {
        let params: Vec<f64> = (0..count).map(|i| i as f64 / (count - 1) as f64).collect();
        let grid: Vec<Vec<Point3>> =
            params.iter().map(|&r| params.iter().map(|&s| at(r, s)).collect()).collect();
        let patch = interpolate_grid(&params, &params, &grid, 3, 3)?;
        let mid = |k: usize| 0.5 * (params[k] + params[k + 1]);
        let interior = (0..count - 1)
            .flat_map(|a| (0..count - 1).map(move |b| (a, b)))
            .map(|(a, b)| (patch.evaluate(mid(a), mid(b)) - at(mid(a), mid(b))).norm())
            .fold(0.0, f64::max);
        let edge = (0..count - 1)
            .map(|b| (patch.evaluate(1.0, mid(b)) - at(1.0, mid(b))).norm())
            .fold(0.0, f64::max);
        best = Some(patch);
        if interior <= interior_tol && edge <= boundary_tol {
            return best;
        }
        count *= 2;
    }
    log::warn!("vertex blend sector [{phi0}, {phi1}] not within tolerance at the finest grid");
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corner_sides(ball: Option<(Point3, f64)>) -> Vec<VertexSide> {
        // Three quarter arcs of the unit sphere's positive octant.
        let (o, r) = (Point3::origin(), 1.0);
        let arcs = [
            (Vector3::z(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)),
            (Vector3::x(), Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, 0.0, 1.0)),
            (Vector3::y(), Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 0.0)),
        ];
        arcs.iter()
            .map(|(axis, a, b)| {
                let (curve, t0, t1) = crate::primitive::arc_through(o, *axis, *a, *b);
                VertexSide {
                    boundary: VblBoundary { curve, t0, t1, cross: Vec::new() },
                    ball: ball.map(|_| (o, r)),
                    connector: false,
                }
            })
            .collect()
    }

    fn shape() -> VertexShape {
        VertexShape { bulge: 1.0, continuity: Continuity::Slope, cusp: false }
    }

    #[test]
    fn matching_balls_give_a_sphere() {
        let sides = corner_sides(Some((Point3::origin(), 1.0)));
        let out = Vector3::new(1.0, 1.0, 1.0).normalize();
        let fit = fit_vertex_blend(sides, Point3::new(1.0, 1.0, 1.0), out, shape(), 1e-6).unwrap();
        assert_eq!(fit.surface, Surface::Sphere { center: Point3::origin(), radius: 1.0 });
        assert!(fit.outward);
    }

    #[test]
    fn connectors_force_a_patch() {
        let mut sides = corner_sides(Some((Point3::origin(), 1.0)));
        sides[1].connector = true;
        let out = Vector3::new(1.0, 1.0, 1.0).normalize();
        let fit = fit_vertex_blend(sides, Point3::new(1.0, 1.0, 1.0), out, shape(), 1e-6).unwrap();
        let Surface::VertexBlend(vbl) = &fit.surface else { panic!() };
        assert_eq!(vbl.sides(), 3);
        // The centre is pushed towards the vertex.
        assert!(vbl.center.coords.dot(&out) > 0.5);
        assert!(fit.outward);
    }

    #[test]
    fn split_patches_reproduce_the_boundary() {
        let sides = corner_sides(None);
        let out = Vector3::new(1.0, 1.0, 1.0).normalize();
        let fit = fit_vertex_blend(sides, Point3::new(1.0, 1.0, 1.0), out, shape(), 1e-6).unwrap();
        let Surface::VertexBlend(vbl) = &fit.surface else { panic!() };
        let patches = split_vbl(vbl, 1e-2, 1e-3);
        assert_eq!(patches.len(), 3);
        // Corner of the first sector sits on the first boundary's start.
        let corner = Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(patches[0].evaluate(1.0, 0.0), corner, epsilon = 1e-6);

        assert_relative_eq!(patches[0].evaluate(0.0, 0.5), vbl.center, epsilon = 1e-6);
    }
}
