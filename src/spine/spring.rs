//! Spring curves: where a blend meets its supports.

use super::{Section, Spine};
use crate::curve::Curve3;
use crate::math::{Point3, Vector3};
use crate::radius::Side;
use crate::topo::FaceId;

/// A spring carrier with an affine map from spine parameter to curve
/// parameter: `t = offset + rate·σ`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpringCurve {
    pub curve: Curve3,
    pub offset: f64,
    pub rate: f64,
}

/// The part of a spring lying on one support face.
#[derive(Clone, Debug, PartialEq)]
pub struct SpringPiece {
    pub curve: Curve3,
    pub t0: f64,
    pub t1: f64,
    pub face: FaceId,
}

impl SpringPiece {
    pub fn start(&self) -> Point3 {
        self.curve.evaluate(self.t0)
    }

    pub fn end(&self) -> Point3 {
        self.curve.evaluate(self.t1)
    }
}

impl SpringCurve {
    pub fn param(&self, sigma: f64) -> f64 {
        self.offset + self.rate * sigma
    }

    pub fn point(&self, sigma: f64) -> Point3 {
        self.curve.evaluate(self.param(sigma))
    }

    /// Straight spring through the contact of `section`, parallel to a
    /// line spine.
    pub fn line(section: &Section, side: Side, dir: &Vector3) -> Self {
        let dir = dir.normalize();
        let p = section.contact(side);
        let curve = Curve3::Line { origin: p - dir * section.sigma, dir };
        SpringCurve { curve, offset: 0.0, rate: 1.0 }
    }

    /// Circular spring coaxial with a circular spine of radius
    /// `spine_radius`, turning so that the angle grows with `σ`.
    pub fn circle(
        section: &Section,
        side: Side,
        center: &Point3,
        axis: &Vector3,
        spine_radius: f64,
    ) -> Self {
        let p = section.contact(side);
        // Orient the axis so that motion along the spine is counter-clockwise.
        let radial = section.spine_point - center;
        let axis = axis.normalize();
        let axis = if radial.cross(&section.tangent).dot(&axis) >= 0.0 { axis } else { -axis };

        let h = (p - center).dot(&axis);
        let c = center + axis * h;
        let radius = (p - c).norm();
        let curve = Curve3::Circle { center: c, axis, radius };
        let rate = 1.0 / spine_radius;
        let t = curve.closest_parameter(&p);
        SpringCurve { curve, offset: t - rate * section.sigma, rate }
    }

    /// Split the spring over `[from, to]` into one piece per spine segment.
    pub fn pieces(&self, spine: &Spine, side: Side, from: f64, to: f64) -> Vec<SpringPiece> {
        let k = match side {
            Side::Left => 0,
            Side::Right => 1,
        };
        let last = spine.segments.len() - 1;
        let mut out = Vec::new();
        for (i, seg) in spine.segments.iter().enumerate() {
            let lo = if i == 0 { from } else { seg.start.max(from) };
            let hi = if i == last { to } else { seg.end.min(to) };
            if hi - lo <= 1e-12 * (1.0 + to.abs()) {
                continue;
            }
            out.push(SpringPiece {
                curve: self.curve.clone(),
                t0: self.param(lo),
                t1: self.param(hi),
                face: seg.supports[k].face,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spine::Roller;

    fn section(sigma: f64, spine_point: Point3, tangent: Vector3, left: Point3) -> Section {
        Section {
            sigma,
            spine_point,
            tangent,
            center: spine_point,
            contacts: [left, left],
            normals: [Vector3::z(), Vector3::z()],
            roller: Roller::Ball(1.0),
            hints: [(0.0, 0.0); 2],
        }
    }

    #[test]
    fn line_spring_tracks_sigma() {
        let s = section(2.0, Point3::new(2.0, 0.0, 0.0), Vector3::x(), Point3::new(2.0, 1.0, 0.0));
        let spring = SpringCurve::line(&s, Side::Left, &Vector3::x());
        let p = spring.point(5.0);
        assert!((p - Point3::new(5.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn circle_spring_turns_with_the_spine() {
        // Spine: circle of radius 10 about z, moving counter-clockwise.
        let s = section(0.0, Point3::new(10.0, 0.0, 0.0), Vector3::y(), Point3::new(8.0, 0.0, 1.0));
        let spring = SpringCurve::circle(&s, Side::Left, &Point3::origin(), &-Vector3::z(), 10.0);
        let quarter = spring.point(10.0 * std::f64::consts::FRAC_PI_2);
        assert!((quarter - Point3::new(0.0, 8.0, 1.0)).norm() < 1e-9);
    }
}
