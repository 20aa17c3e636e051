//! Radius and cross-section functions along a blend spine.
//!
//! A `RadiusFunction` maps a normalised spine parameter `t ∈ [0, 1]` to the
//! size of the rolling roller: a circle radius, or a rotated ellipse for
//! elliptical cross-sections. Fixed-width and holdline variants depend on
//! the section geometry and are resolved against a `SectionContext`.

pub mod holdline;
pub mod interp;

pub use holdline::Holdline;
pub use interp::HermiteRadius;

use std::f64::consts::FRAC_PI_2;

use crate::curve::Curve3;
use crate::error::{BlendError, BlendResult};
use crate::math::{Point3, Vector3, RUNOUT_RADIUS, TOLERANCE};

/// Which support of a blend: the face using the edge forward is the left one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Roller size at one spine parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RadiusValue {
    Circular(f64),
    /// Semi-axes of the roller and the major axis angle, measured in the
    /// section plane from the support bisector.
    Elliptic { major: f64, minor: f64, angle: f64 },
}

impl RadiusValue {
    /// A single representative size (the circle radius or the larger semi-axis).
    pub fn nominal(&self) -> f64 {
        match *self {
            RadiusValue::Circular(r) => r,
            RadiusValue::Elliptic { major, minor, .. } => major.max(minor),
        }
    }

    pub fn is_runout(&self) -> bool {
        self.nominal() < RUNOUT_RADIUS
    }

    pub fn approx_eq(&self, other: &RadiusValue, tol: f64) -> bool {
        match (self, other) {
            (RadiusValue::Circular(a), RadiusValue::Circular(b)) => (a - b).abs() <= tol,
            (
                RadiusValue::Elliptic { major: a1, minor: b1, angle: c1 },
                RadiusValue::Elliptic { major: a2, minor: b2, angle: c2 },
            ) => (a1 - a2).abs() <= tol && (b1 - b2).abs() <= tol && (c1 - c2).abs() <= 1e-9,
            (RadiusValue::Circular(r), RadiusValue::Elliptic { major, minor, .. })
            | (RadiusValue::Elliptic { major, minor, .. }, RadiusValue::Circular(r)) => {
                (major - r).abs() <= tol && (minor - r).abs() <= tol
            }
        }
    }
}

/// Section geometry needed by the geometry-dependent radius variants.
pub trait SectionContext {
    /// Spine parameter of the section, for error reports.
    fn spine_param(&self) -> f64;
    /// Angle between the two support normals.
    fn normal_angle(&self) -> f64;
    /// Spine point and unit spine tangent: the section plane.
    fn section_plane(&self) -> (Point3, Vector3);
    /// Contact point on `side` for a circular roller of `radius`.
    fn spring_point(&self, radius: f64, side: Side) -> Option<Point3>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum RadiusFunction {
    Constant(f64),
    Linear { start: f64, end: f64 },
    /// Constant chord width of the flat the blend replaces.
    FixedWidth { width: f64 },
    Parametrized(HermiteRadius),
    RotatedEllipse { major: (f64, f64), minor: (f64, f64), angle: (f64, f64) },
    Holdline(Holdline),
}

fn check_radius(r: f64) -> BlendResult<()> {
    if r < -TOLERANCE || !r.is_finite() {
        Err(BlendError::InvalidRadius { value: r, entities: Vec::new() })
    } else {
        Ok(())
    }
}

impl RadiusFunction {
    pub fn constant(r: f64) -> BlendResult<Self> {
        check_radius(r)?;
        Ok(RadiusFunction::Constant(r.max(0.0)))
    }

    /// Two-end linear; equal ends collapse to `Constant`.
    pub fn linear(start: f64, end: f64) -> BlendResult<Self> {
        check_radius(start)?;
        check_radius(end)?;
        if (start - end).abs() <= TOLERANCE {
            return Ok(RadiusFunction::Constant(start));
        }
        Ok(RadiusFunction::Linear { start, end })
    }

    pub fn fixed_width(width: f64) -> BlendResult<Self> {
        if !(width > 0.0) || !width.is_finite() {
            return Err(BlendError::InvalidRadius { value: width, entities: Vec::new() });
        }
        Ok(RadiusFunction::FixedWidth { width })
    }

    /// Fixed-width function whose width matches a round of `radius` on a
    /// right-angled edge.
    pub fn fixed_width_for_radius(radius: f64) -> BlendResult<Self> {
        Self::fixed_width(2.0 * radius * (FRAC_PI_2 / 2.0).sin())
    }

    pub fn parametrized(params: &[f64], radii: &[f64]) -> BlendResult<Self> {
        Ok(RadiusFunction::Parametrized(HermiteRadius::new(params, radii, None)?))
    }

    /// Parametrized radii with the end slopes (dr/dt) pinned.
    pub fn parametrized_with_slopes(
        params: &[f64],
        radii: &[f64],
        start: f64,
        end: f64,
    ) -> BlendResult<Self> {
        Ok(RadiusFunction::Parametrized(HermiteRadius::new(params, radii, Some((start, end)))?))
    }

    /// Smooth monotone change from `r0` to `r1` with zero end slopes.
    pub fn transition(r0: f64, r1: f64) -> BlendResult<Self> {
        Self::parametrized_with_slopes(&[0.0, 1.0], &[r0, r1], 0.0, 0.0)
    }

    pub fn rotated_ellipse(
        major: (f64, f64),
        minor: (f64, f64),
        angle: (f64, f64),
    ) -> BlendResult<Self> {
        for v in [major.0, major.1, minor.0, minor.1] {
            if !(v > 0.0) || !v.is_finite() {
                return Err(BlendError::InvalidRadius { value: v, entities: Vec::new() });
            }
        }
        Ok(RadiusFunction::RotatedEllipse { major, minor, angle })
    }

    pub fn holdline(
        curve: Curve3,
        t0: f64,
        t1: f64,
        side: Side,
        nominal: f64,
    ) -> BlendResult<Self> {
        check_radius(nominal)?;
        if !(t1 > t0) {
            return Err(BlendError::InvalidRadiusFunction { reason: "empty holdline range".into() });
        }
        Ok(RadiusFunction::Holdline(Holdline { curve, t0, t1, side, nominal }))
    }

    /// Check every size the function can take. The variants are public, so
    /// a hand-built value skips the constructors' checks.
    pub fn validate(&self) -> BlendResult<()> {
        match self {
            RadiusFunction::Constant(r) => check_radius(*r),
            RadiusFunction::Linear { start, end } => {
                check_radius(*start)?;
                check_radius(*end)
            }
            RadiusFunction::FixedWidth { width } => {
                if *width > 0.0 && width.is_finite() {
                    Ok(())
                } else {
                    Err(BlendError::InvalidRadius { value: *width, entities: Vec::new() })
                }
            }
            RadiusFunction::Parametrized(h) => h.radii().iter().try_for_each(|r| check_radius(*r)),
            RadiusFunction::RotatedEllipse { major, minor, angle } => {
                for v in [major.0, major.1, minor.0, minor.1] {
                    if !(v > 0.0) || !v.is_finite() {
                        return Err(BlendError::InvalidRadius { value: v, entities: Vec::new() });
                    }
                }
                if !(angle.0.is_finite() && angle.1.is_finite()) {
                    let reason = "ellipse angle is not finite".into();
                    return Err(BlendError::InvalidRadiusFunction { reason });
                }
                Ok(())
            }
            RadiusFunction::Holdline(h) => {
                check_radius(h.nominal)?;
                if h.t1 > h.t0 {
                    Ok(())
                } else {
                    Err(BlendError::InvalidRadiusFunction { reason: "empty holdline range".into() })
                }
            }
        }
    }

    /// Nominal value at `t` (clamped into [0, 1]).
    pub fn evaluate(&self, t: f64) -> RadiusValue {
        let t = t.clamp(0.0, 1.0);
        match self {
            RadiusFunction::Constant(r) => RadiusValue::Circular(*r),
            RadiusFunction::Linear { start, end } => {
                RadiusValue::Circular(start + (end - start) * t)
            }
            RadiusFunction::FixedWidth { width } => {
                RadiusValue::Circular(width / (2.0 * (FRAC_PI_2 / 2.0).sin()))
            }
            RadiusFunction::Parametrized(h) => RadiusValue::Circular(h.evaluate(t)),
            RadiusFunction::RotatedEllipse { major, minor, angle } => {
                let lerp = |(a, b): (f64, f64)| a + (b - a) * t;
                RadiusValue::Elliptic {
                    major: lerp(*major),
                    minor: lerp(*minor),
                    angle: lerp(*angle),
                }
            }
            RadiusFunction::Holdline(h) => RadiusValue::Circular(h.nominal),
        }
    }

    /// Roller size at a concrete section.
    pub fn resolve(&self, t: f64, ctx: &dyn SectionContext) -> BlendResult<RadiusValue> {
        match self {
            RadiusFunction::FixedWidth { width } => {
                let phi = ctx.normal_angle().max(1e-6);
                Ok(RadiusValue::Circular(width / (2.0 * (phi / 2.0).sin())))
            }
            RadiusFunction::Holdline(h) => Ok(RadiusValue::Circular(h.solve(ctx)?)),
            other => Ok(other.evaluate(t)),
        }
    }

    pub fn start_radius(&self) -> f64 {
        self.evaluate(0.0).nominal()
    }

    pub fn end_radius(&self) -> f64 {
        self.evaluate(1.0).nominal()
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, RadiusFunction::Constant(_))
    }

    pub fn is_elliptic(&self) -> bool {
        matches!(self, RadiusFunction::RotatedEllipse { .. })
    }

    /// Whether the value depends only on `t` (no section geometry).
    pub fn is_explicit(&self) -> bool {
        !matches!(self, RadiusFunction::FixedWidth { .. } | RadiusFunction::Holdline(_))
    }

    /// The function seen from the other end of its edge.
    pub fn reversed(&self) -> Self {
        match self {
            RadiusFunction::Constant(r) => RadiusFunction::Constant(*r),
            RadiusFunction::Linear { start, end } => {
                RadiusFunction::Linear { start: *end, end: *start }
            }
            RadiusFunction::FixedWidth { width } => RadiusFunction::FixedWidth { width: *width },
            RadiusFunction::Parametrized(h) => RadiusFunction::Parametrized(h.reversed()),
            RadiusFunction::RotatedEllipse { major, minor, angle } => {
                RadiusFunction::RotatedEllipse {
                    major: (major.1, major.0),
                    minor: (minor.1, minor.0),
                    // The section frame's lateral axis flips with the spine.
                    angle: (-angle.1, -angle.0),
                }
            }
            RadiusFunction::Holdline(h) => RadiusFunction::Holdline(h.reversed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct RightAngle;

    impl SectionContext for RightAngle {
        fn spine_param(&self) -> f64 {
            0.0
        }
        fn normal_angle(&self) -> f64 {
            FRAC_PI_2
        }
        fn section_plane(&self) -> (Point3, Vector3) {
            (Point3::origin(), Vector3::x())
        }
        fn spring_point(&self, radius: f64, side: Side) -> Option<Point3> {
            // Box edge along x between the top (+z) and front (-y) faces.
            Some(match side {
                Side::Left => Point3::new(0.0, radius, 0.0),
                Side::Right => Point3::new(0.0, 0.0, -radius),
            })
        }
    }

    #[test]
    fn linear_with_equal_ends_is_constant() {
        assert_eq!(RadiusFunction::linear(3.0, 3.0).unwrap(), RadiusFunction::Constant(3.0));
    }

    #[test]
    fn negative_radius_rejected() {
        assert!(matches!(RadiusFunction::constant(-1.0), Err(BlendError::InvalidRadius { .. })));
        assert!(RadiusFunction::constant(-1e-12).is_ok());
    }

    #[test]
    fn fixed_width_reports_radius_on_right_angle() {
        let f = RadiusFunction::fixed_width_for_radius(8.0).unwrap();
        assert_relative_eq!(f.evaluate(0.3).nominal(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(f.resolve(0.3, &RightAngle).unwrap().nominal(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn ellipse_degenerates_to_circle() {
        let f = RadiusFunction::rotated_ellipse((2.0, 2.0), (2.0, 2.0), (0.0, 0.0)).unwrap();
        assert!(f.evaluate(0.5).approx_eq(&RadiusValue::Circular(2.0), 1e-12));
    }

    #[test]
    fn holdline_radius_reaches_the_curve() {
        // Holdline on the top face at distance 5 from the edge.
        let line = Curve3::Line { origin: Point3::new(-10.0, 5.0, 0.0), dir: Vector3::x() };
        let f = RadiusFunction::holdline(line, 0.0, 20.0, Side::Left, 3.0).unwrap();
        let r = f.resolve(0.5, &RightAngle).unwrap().nominal();
        assert_relative_eq!(r, 5.0, epsilon = 1e-8);
    }

    #[test]
    fn hand_built_functions_are_validated() {
        let negative = RadiusFunction::Constant(-2.0).validate();
        assert!(matches!(negative, Err(BlendError::InvalidRadius { .. })));
        let linear = RadiusFunction::Linear { start: -3.0, end: 1.0 }.validate();
        assert!(matches!(linear, Err(BlendError::InvalidRadius { value, .. }) if value == -3.0));
        assert!(RadiusFunction::FixedWidth { width: 0.0 }.validate().is_err());
        let flat = RadiusFunction::RotatedEllipse {
            major: (2.0, 0.0),
            minor: (1.0, 1.0),
            angle: (0.0, 0.0),
        };

        assert!(flat.validate().is_err());
        assert!(RadiusFunction::linear(0.0, 4.0).unwrap().validate().is_ok());
        assert!(RadiusFunction::transition(20.0, 36.0).unwrap().validate().is_ok());
    }

    #[test]
    fn clamps_outside_unit_interval() {
        let f = RadiusFunction::linear(1.0, 2.0).unwrap();
        assert_eq!(f.evaluate(-1.0), RadiusValue::Circular(1.0));
        assert_eq!(f.evaluate(7.0), RadiusValue::Circular(2.0));
    }
}
