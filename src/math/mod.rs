//! Linear algebra type aliases, geometric tolerances and small numeric helpers.

pub mod solve;

pub type Point3 = nalgebra::Point3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Vector4 = nalgebra::Vector4<f64>;
pub type Isometry3 = nalgebra::Isometry3<f64>;

/// Geometric tolerance for point coincidence tests (distance in model units).
pub const TOLERANCE: f64 = 1e-9;

/// Parametric tolerance for curve/surface parameter comparisons.
pub const PARAM_TOL: f64 = 1e-12;

/// Angular tolerance (radians) for tangent/normal comparisons.
pub const ANGLE_TOL: f64 = 1e-6;

/// Angle (radians) below which two edges meeting at a vertex count as
/// tangent-continuous for blend sequencing.
pub const SMOOTH_ANGLE_TOL: f64 = 1e-3;

/// Radius below which a blend end is treated as running out to a point.
pub const RUNOUT_RADIUS: f64 = 1e-7;

/// Orthonormal frame `(e1, e2)` spanning the plane perpendicular to `n`,
/// with `e1 × e2 = n̂`.
pub fn plane_frame(n: &Vector3) -> (Vector3, Vector3) {
    let a = n.normalize();
    let seed = if a.x.abs() < 0.9 {
        Vector3::new(1.0, 0.0, 0.0)
    } else {
        Vector3::new(0.0, 1.0, 0.0)
    };
    let e1 = a.cross(&seed).normalize();
    let e2 = a.cross(&e1);
    (e1, e2)
}

/// Any unit vector perpendicular to `v`.
pub fn any_perpendicular(v: &Vector3) -> Vector3 {
    plane_frame(v).0
}

/// Wrap `angle` into the window `[reference - π, reference + π)`.
pub fn wrap_angle_near(angle: f64, reference: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let mut a = angle;
    while a < reference - PI {
        a += TAU;
    }
    while a >= reference + PI {
        a -= TAU;
    }
    a
}

/// Rotate `v` about the unit `axis` by `angle` (Rodrigues).
pub fn rotate_about(v: &Vector3, axis: &Vector3, angle: f64) -> Vector3 {
    let k = axis.normalize();
    let (s, c) = angle.sin_cos();
    v * c + k.cross(v) * s + k * (k.dot(v) * (1.0 - c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn plane_frame_is_right_handed() {
        for n in [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, -2.0, 0.5),
        ] {
            let (e1, e2) = plane_frame(&n);
            assert_relative_eq!(e1.cross(&e2), n.normalize(), epsilon = 1e-12);
            assert_relative_eq!(e1.dot(&n), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn wrap_angle_lands_in_window() {
        let a = wrap_angle_near(-0.1, 2.0 * PI);
        assert_relative_eq!(a, 2.0 * PI - 0.1, epsilon = 1e-12);
        let b = wrap_angle_near(7.0, 0.0);
        assert!(b >= -PI && b < PI);
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = rotate_about(&Vector3::x(), &Vector3::z(), FRAC_PI_2);
        assert_relative_eq!(v, Vector3::y(), epsilon = 1e-12);
    }
}
