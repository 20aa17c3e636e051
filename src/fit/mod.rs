//! Blend surface fitting.
//!
//! Three strategies, tried in order:
//!
//! - **analytic**: constant radius over a line or circle centre locus gives
//!   an exact cylinder or torus; a constant chamfer between two planes gives
//!   a plane;
//! - **marched**: sections at adaptive stations skinned into a rational
//!   spline surface, cubic along the spine and conic across;
//! - **vertex**: a sphere or n-sided patch closing a vertex (see [`vertex`]).
//!
//! Every blend surface is parametrised so that its cross curves run from
//! the left support (`w = 0`) to the right support (`w = 1`).

pub mod analytic;
pub mod march;
pub mod vertex;

pub use vertex::{fit_vertex_blend, split_vbl, VertexFit, VertexShape, VertexSide};

use rayon::prelude::*;

use crate::curve::Curve3;
use crate::error::BlendResult;
use crate::math::Point3;
use crate::spine::{Section, Spine, SpringCurve};
use crate::surface::Surface;
use crate::topo::UvBox;

/// Tolerances and limits for fitting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOptions {
    pub tolerance: f64,
    pub march_tolerance: f64,
    pub initial_stations: usize,
    pub max_stations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            tolerance: 1e-6,
            march_tolerance: 1e-4,
            initial_stations: 9,
            max_stations: 256,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitKind {
    Cylinder,
    Torus,
    Plane,
    Marched,
}

/// A blend surface over a spine range, with its springs.
#[derive(Clone, Debug, PartialEq)]
pub struct FittedBlend {
    pub kind: FitKind,
    pub surface: Surface,
    /// True if the surface normal is the solid's outward normal.
    pub outward: bool,
    /// Left and right springs.
    pub springs: [SpringCurve; 2],
    /// Sections at the final stations, ascending in `σ`.
    pub sections: Vec<Section>,
    pub range: (f64, f64),
    /// Marching stopped at the station limit before meeting tolerance.
    pub station_limit_hit: bool,
}

impl FittedBlend {
    /// Cross curve at `sigma`, parametrised over `[0, 1]` from left to
    /// right. Marched surfaces return their exact iso-curve.
    pub fn cross_curve(&self, spine: &Spine, sigma: f64) -> BlendResult<Curve3> {
        match &self.surface {
            Surface::Nurbs(n) => Ok(Curve3::Nurbs(n.iso_u(sigma))),
            _ => Ok(spine.section(sigma)?.curve()),
        }
    }

    /// Point of the blend at `(σ, w)`.
    pub fn point(&self, spine: &Spine, sigma: f64, w: f64) -> BlendResult<Point3> {
        match &self.surface {
            Surface::Nurbs(n) => Ok(n.evaluate(sigma, w)),
            _ => Ok(spine.section(sigma)?.point_at(w)),
        }
    }

    /// Parameter rectangle spanned by the four corners of the blend.
    pub fn domain(&self, spine: &Spine) -> BlendResult<UvBox> {
        if let Surface::Nurbs(n) = &self.surface {
            let (u0, u1) = n.domain_u();
            let (v0, v1) = n.domain_v();
            return Ok(UvBox { u0, u1, v0, v1 });
        }
        let (lo, hi) = self.range;
        let corners = [
            self.point(spine, lo, 0.0)?,
            self.point(spine, lo, 1.0)?,
            self.point(spine, hi, 0.0)?,
            self.point(spine, hi, 1.0)?,
        ];
        Ok(corner_box(&self.surface, &corners))
    }
}

/// Bounding parameter box of points on a surface, unwrapping periodic
/// directions next to the first point.
pub(crate) fn corner_box(surface: &Surface, points: &[Point3]) -> UvBox {
    let periodic_u = matches!(
        surface,
        Surface::Cylinder { .. } | Surface::Torus { .. } | Surface::Sphere { .. }
    );
    let periodic_v = matches!(surface, Surface::Torus { .. });
    let mut uv: Vec<(f64, f64)> = points.iter().map(|p| surface.closest_parameters(p)).collect();
    let (u_ref, v_ref) = uv[0];
    for q in uv.iter_mut() {
        if periodic_u {
            q.0 = crate::math::wrap_angle_near(q.0, u_ref);
        }
        if periodic_v {
            q.1 = crate::math::wrap_angle_near(q.1, v_ref);
        }
    }
    let fold = |f: fn(f64, f64) -> f64, init: f64, pick: fn(&(f64, f64)) -> f64| {
        uv.iter().map(pick).fold(init, f)
    };

    UvBox {
        u0: fold(f64::min, f64::MAX, |q| q.0),
        u1: fold(f64::max, f64::MIN, |q| q.0),
        v0: fold(f64::min, f64::MAX, |q| q.1),
        v1: fold(f64::max, f64::MIN, |q| q.1),
    }
}

/// Sections at every parameter, solved in parallel.
pub(crate) fn solve_sections(spine: &Spine, params: &[f64]) -> BlendResult<Vec<Section>> {
    params.par_iter().map(|&s| spine.section(s)).collect()
}

/// Whether `surface`'s normal agrees with the outward direction of the
/// section's middle.
pub(crate) fn faces_outward(surface: &Surface, section: &Section) -> bool {
    let p = section.point_at(0.5);
    let (u, v) = surface.closest_parameters(&p);
    surface.normal(u, v).dot(&section.bisector()) > 0.0
}

/// Fit the blend of `spine` over `[range.0, range.1]`.
pub fn fit_blend(spine: &Spine, range: (f64, f64), opts: &FitOptions) -> BlendResult<FittedBlend> {
    let params = spine.stations(range.0, range.1, opts.initial_stations);
    let sections = solve_sections(spine, &params)?;
    if let Some(fit) = analytic::try_analytic(spine, range, &sections, opts)? {
        log::debug!("analytic {:?} blend over {:?}", fit.kind, spine.entities());
        return Ok(fit);
    }
    let fit = march::march(spine, range, params, sections, opts)?;
    log::debug!("marched blend over {:?} with {} stations", spine.entities(), fit.sections.len());
    Ok(fit)
}
