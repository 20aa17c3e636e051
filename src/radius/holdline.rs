//! Radius derived from a holdline: the spring on one side must pass
//! through an auxiliary curve.

use super::{SectionContext, Side};
use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::math::solve::{brent, expand_bracket};
use crate::math::Point3;

#[derive(Clone, Debug, PartialEq)]
pub struct Holdline {
    pub curve: Curve3,
    pub t0: f64,
    pub t1: f64,
    pub side: Side,
    /// Radius reported by `evaluate`, where no section geometry is known.
    pub nominal: f64,
}

impl Holdline {
    /// Where the holdline pierces the section plane.
    fn crossing(&self, ctx: &dyn SectionContext) -> Option<Point3> {
        let (origin, normal) = ctx.section_plane();
        let g = |t: f64| (self.curve.evaluate(t) - origin).dot(&normal);
        const SCAN: usize = 64;
        let mut best: Option<Point3> = None;
        let mut best_d = f64::MAX;
        let mut prev_t = self.t0;
        let mut prev_g = g(prev_t);
        for i in 1..=SCAN {
            let t = self.t0 + (self.t1 - self.t0) * i as f64 / SCAN as f64;
            let gt = g(t);
            if prev_g == 0.0 || prev_g.signum() != gt.signum() {
                if let Ok(root) = brent(g, prev_t, t, 1e-12, 100) {
                    let p = self.curve.evaluate(root);
                    let d = (p - origin).norm();
                    if d < best_d {
                        best_d = d;
                        best = Some(p);
                    }
                }
            }
            prev_t = t;
            prev_g = gt;
        }
        best
    }

    /// Radius whose spring on `self.side` reaches the holdline at this
    /// section, found with Brent's method on the spring distance.
    pub fn solve(&self, ctx: &dyn SectionContext) -> BlendResult<f64> {
        let fail = || BlendError::HoldlineDidNotConverge {
            param: ctx.spine_param(),
            entities: Vec::new(),
        };

        let target = self.crossing(ctx).ok_or_else(fail)?;
        let (edge_point, _) = ctx.section_plane();
        let want = (target - edge_point).norm();
        let residual = |r: f64| match ctx.spring_point(r, self.side) {
            Some(p) => (p - edge_point).norm() - want,
            None => f64::NAN,
        };
        let hi = self.nominal.max(want).max(crate::math::TOLERANCE * 10.0);
        let (a, b) = expand_bracket(residual, hi * 1e-3, hi, 20).ok_or_else(fail)?;
        brent(residual, a, b, 1e-10 * hi.max(1.0), 200).map_err(|_| fail())
    }

    pub fn reversed(&self) -> Self {
        Holdline { side: self.side.other(), ..self.clone() }
    }
}
