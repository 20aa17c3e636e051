//! Face carrier surfaces.
//!
//! Each `Face` carries one `Surface`. Besides evaluation the blend engine
//! needs point inversion, principal curvatures (for the rolling-ball
//! feasibility test) and a geometric equality test (for analytic spines
//! over multi-face sequences).

pub mod vbl;

use crate::math::{plane_frame, Isometry3, Point3, Vector3};
use crate::nurbs::NurbsSurface;
pub use vbl::{VblBoundary, VblSurface};

/// A geometric surface.
///
/// Parameter conventions, with `(e1, e2) = plane_frame(axis)`:
/// - **Plane:** `origin + u·e1 + v·e2`
/// - **Cylinder:** `origin + radius·(cos u·e1 + sin u·e2) + v·â`
/// - **Sphere:** `center + radius·(cos v·(cos u·e1 + sin u·e2) + sin v·ẑ)`, axis fixed to z
/// - **Torus:** `center + (R + r cos v)·(cos u·e1 + sin u·e2) + r sin v·â`
/// - **VertexBlend:** `u = ρ ∈ [0,1]` from the centre, `v = φ ∈ [0,1)` around the boundary
#[derive(Clone, Debug, PartialEq)]
pub enum Surface {
    Plane { origin: Point3, normal: Vector3 },
    Cylinder { origin: Point3, axis: Vector3, radius: f64 },
    Sphere { center: Point3, radius: f64 },
    Torus { center: Point3, axis: Vector3, major_r: f64, minor_r: f64 },
    Nurbs(NurbsSurface),
    VertexBlend(Box<VblSurface>),
}

const FD_STEP: f64 = 1e-6;

impl Surface {
    pub fn evaluate(&self, u: f64, v: f64) -> Point3 {
        match self {
            Surface::Plane { origin, normal } => {
                let (e1, e2) = plane_frame(normal);
                origin + e1 * u + e2 * v
            }
            Surface::Cylinder { origin, axis, radius } => {
                let (e1, e2) = plane_frame(axis);
                origin + (e1 * u.cos() + e2 * u.sin()) * *radius + axis.normalize() * v
            }
            Surface::Sphere { center, radius } => {
                let (e1, e2) = plane_frame(&Vector3::z());
                let radial = e1 * u.cos() + e2 * u.sin();
                center + radial * (v.cos() * radius) + Vector3::z() * (v.sin() * radius)
            }
            Surface::Torus { center, axis, major_r, minor_r } => {
                let (e1, e2) = plane_frame(axis);
                let r = major_r + minor_r * v.cos();
                center + (e1 * u.cos() + e2 * u.sin()) * r + axis.normalize() * (minor_r * v.sin())
            }
            Surface::Nurbs(n) => n.evaluate(u, v),
            Surface::VertexBlend(b) => b.evaluate(u, v),
        }
    }

    pub fn derivative_u(&self, u: f64, v: f64) -> Vector3 {
        match self {
            Surface::Plane { normal, .. } => plane_frame(normal).0,
            Surface::Cylinder { axis, radius, .. } => {
                let (e1, e2) = plane_frame(axis);
                (-e1 * u.sin() + e2 * u.cos()) * *radius
            }
            Surface::Sphere { radius, .. } => {
                let (e1, e2) = plane_frame(&Vector3::z());
                (-e1 * u.sin() + e2 * u.cos()) * (v.cos() * radius)
            }
            Surface::Torus { axis, major_r, minor_r, .. } => {
                let (e1, e2) = plane_frame(axis);
                (-e1 * u.sin() + e2 * u.cos()) * (major_r + minor_r * v.cos())
            }
            Surface::Nurbs(n) => n.derivatives(u, v).1,
            Surface::VertexBlend(_) => {
                let (a, b) = fd_window(u, (0.0, 1.0));
                (self.evaluate(b, v) - self.evaluate(a, v)) / (b - a)
            }
        }
    }

    pub fn derivative_v(&self, u: f64, v: f64) -> Vector3 {
        match self {
            Surface::Plane { normal, .. } => plane_frame(normal).1,
            Surface::Cylinder { axis, .. } => axis.normalize(),
            Surface::Sphere { radius, .. } => {
                let (e1, e2) = plane_frame(&Vector3::z());
                let radial = e1 * u.cos() + e2 * u.sin();
                radial * (-v.sin() * radius) + Vector3::z() * (v.cos() * radius)
            }
            Surface::Torus { axis, minor_r, .. } => {
                let (e1, e2) = plane_frame(axis);
                let radial = e1 * u.cos() + e2 * u.sin();
                radial * (-minor_r * v.sin()) + axis.normalize() * (minor_r * v.cos())
            }
            Surface::Nurbs(n) => n.derivatives(u, v).2,
            Surface::VertexBlend(_) => {
                let h = FD_STEP;
                (self.evaluate(u, v + h) - self.evaluate(u, v - h)) / (2.0 * h)
            }
        }
    }

    /// Unit normal `∂u × ∂v`. At degenerate points (poles, the centre of a
    /// vertex blend) a limiting normal is returned.
    pub fn normal(&self, u: f64, v: f64) -> Vector3 {
        let n = self.derivative_u(u, v).cross(&self.derivative_v(u, v));
        let len = n.norm();
        if len > 1e-12 {
            return n / len;
        }
        match self {
            Surface::Sphere { center, .. } => (self.evaluate(u, v) - center).normalize(),
            Surface::VertexBlend(b) => b.normal,
            Surface::Nurbs(nurbs) => {
                // Step towards the middle of the domain and retry.
                let (u0, u1) = nurbs.domain_u();
                let (v0, v1) = nurbs.domain_v();
                let um = u + 1e-4 * ((u0 + u1) * 0.5 - u).signum() * (u1 - u0);
                let vm = v + 1e-4 * ((v0 + v1) * 0.5 - v).signum() * (v1 - v0);
                nurbs.normal(um, vm)
            }
            _ => Vector3::z(),
        }
    }

    /// Second partials `(S_uu, S_uv, S_vv)`; zero for planes, central
    /// differences of the analytic first derivatives otherwise.
    pub fn second_derivatives(&self, u: f64, v: f64) -> (Vector3, Vector3, Vector3) {
        if let Surface::Plane { .. } = self {
            return (Vector3::zeros(), Vector3::zeros(), Vector3::zeros());
        }
        let h = 1e-5;
        let suu = (self.derivative_u(u + h, v) - self.derivative_u(u - h, v)) / (2.0 * h);
        let suv = (self.derivative_u(u, v + h) - self.derivative_u(u, v - h)) / (2.0 * h);
        let svv = (self.derivative_v(u, v + h) - self.derivative_v(u, v - h)) / (2.0 * h);
        (suu, suv, svv)
    }

    /// Principal curvatures `(k_min, k_max)` measured against [`Surface::normal`].
    ///
    /// Sign convention: a sphere with outward normal has `k = -1/R`.
    pub fn principal_curvatures(&self, u: f64, v: f64) -> (f64, f64) {
        match self {
            Surface::Plane { .. } => return (0.0, 0.0),
            Surface::Sphere { radius, .. } => return (-1.0 / radius, -1.0 / radius),
            Surface::Cylinder { radius, .. } => return (-1.0 / radius, 0.0),
            _ => {}
        }
        let su = self.derivative_u(u, v);
        let sv = self.derivative_v(u, v);
        let n = self.normal(u, v);
        let (suu, suv, svv) = self.second_derivatives(u, v);
        let (e, f, g) = (su.dot(&su), su.dot(&sv), sv.dot(&sv));
        let (l, m, nn) = (suu.dot(&n), suv.dot(&n), svv.dot(&n));
        let a = e * g - f * f;
        if a.abs() < 1e-20 {
            return (0.0, 0.0);
        }
        let b = e * nn - 2.0 * f * m + g * l;
        let c = l * nn - m * m;
        // a k² - b k + c = 0
        let mean = b / (2.0 * a);
        let disc = (mean * mean - c / a).max(0.0).sqrt();
        (mean - disc, mean + disc)
    }

    /// Point inversion: parameters of the surface point nearest `point`.
    pub fn closest_parameters(&self, point: &Point3) -> (f64, f64) {
        match self {
            Surface::Plane { origin, normal } => {
                let (e1, e2) = plane_frame(normal);
                let d = point - origin;
                (d.dot(&e1), d.dot(&e2))
            }
            Surface::Cylinder { origin, axis, .. } => {
                let a = axis.normalize();
                let d = point - origin;
                let v = d.dot(&a);
                let radial = d - a * v;
                let (e1, e2) = plane_frame(axis);
                (radial.dot(&e2).atan2(radial.dot(&e1)), v)
            }
            Surface::Sphere { center, .. } => {
                let d = point - center;
                let (e1, e2) = plane_frame(&Vector3::z());
                let xy = d - Vector3::z() * d.z;
                (xy.dot(&e2).atan2(xy.dot(&e1)), d.z.atan2(xy.norm()))
            }
            Surface::Torus { center, axis, major_r, .. } => {
                let a = axis.normalize();
                let d = point - center;
                let h = d.dot(&a);
                let radial = d - a * h;
                let (e1, e2) = plane_frame(axis);
                let u = radial.dot(&e2).atan2(radial.dot(&e1));
                let v = h.atan2(radial.norm() - major_r);
                (u, v)
            }
            Surface::Nurbs(n) => newton_inversion(self, point, n.domain_u(), n.domain_v(), None),
            Surface::VertexBlend(_) => newton_inversion(self, point, (0.0, 1.0), (0.0, 1.0), None),
        }
    }

    /// Point inversion starting from a parameter guess. Analytic surfaces
    /// ignore the hint.
    pub fn closest_parameters_near(&self, point: &Point3, hint: (f64, f64)) -> (f64, f64) {
        match self {
            Surface::Nurbs(n) => {
                newton_inversion(self, point, n.domain_u(), n.domain_v(), Some(hint))
            }
            Surface::VertexBlend(_) => {
                newton_inversion(self, point, (0.0, 1.0), (0.0, 1.0), Some(hint))
            }
            _ => self.closest_parameters(point),
        }
    }

    /// True when both surfaces describe the same point set up to `tol`.
    pub fn same_geometry(&self, other: &Surface, tol: f64) -> bool {
        let parallel = |a: &Vector3, b: &Vector3| a.normalize().cross(&b.normalize()).norm() < 1e-9;
        match (self, other) {
            (
                Surface::Plane { origin: o1, normal: n1 },
                Surface::Plane { origin: o2, normal: n2 },
            ) => {
                let n1 = n1.normalize();
                n1.dot(&n2.normalize()) > 1.0 - 1e-12 && (o2 - o1).dot(&n1).abs() < tol
            }
            (
                Surface::Cylinder { origin: o1, axis: a1, radius: r1 },
                Surface::Cylinder { origin: o2, axis: a2, radius: r2 },
            ) => {
                let d = o2 - o1;
                parallel(a1, a2) && (r1 - r2).abs() < tol && d.cross(&a1.normalize()).norm() < tol
            }
            (
                Surface::Sphere { center: c1, radius: r1 },
                Surface::Sphere { center: c2, radius: r2 },
            ) => (c1 - c2).norm() < tol && (r1 - r2).abs() < tol,
            (
                Surface::Torus { center: c1, axis: a1, major_r: m1, minor_r: n1 },
                Surface::Torus { center: c2, axis: a2, major_r: m2, minor_r: n2 },
            ) => {
                (c1 - c2).norm() < tol
                    && parallel(a1, a2)
                    && (m1 - m2).abs() < tol
                    && (n1 - n2).abs() < tol
            }
            (a, b) => a == b,
        }
    }

    pub fn transformed(&self, iso: &Isometry3) -> Self {
        match self {
            Surface::Plane { origin, normal } => {
                Surface::Plane { origin: iso * origin, normal: iso * normal }
            }
            Surface::Cylinder { origin, axis, radius } => Surface::Cylinder {
                origin: iso * origin,
                axis: iso * axis,
                radius: *radius,
            },
            Surface::Sphere { center, radius } => {
                Surface::Sphere { center: iso * center, radius: *radius }
            }
            Surface::Torus { center, axis, major_r, minor_r } => Surface::Torus {
                center: iso * center,
                axis: iso * axis,
                major_r: *major_r,
                minor_r: *minor_r,
            },
            Surface::Nurbs(n) => Surface::Nurbs(n.transformed(iso)),
            Surface::VertexBlend(b) => Surface::VertexBlend(Box::new(b.transformed(iso))),
        }
    }
}

/// Difference window of width `2·FD_STEP` kept inside `range`.
fn fd_window(x: f64, range: (f64, f64)) -> (f64, f64) {
    let a = (x - FD_STEP).max(range.0);
    let b = (x + FD_STEP).min(range.1);
    if b - a < FD_STEP { (b - FD_STEP, b) } else { (a, b) }
}

/// Grid search plus Gauss-Newton refinement over a bounded domain.
fn newton_inversion(
    surf: &Surface,
    point: &Point3,
    u_range: (f64, f64),
    v_range: (f64, f64),
    hint: Option<(f64, f64)>,
) -> (f64, f64) {
    let (mut u, mut v) = match hint {
        Some(h) => h,
        None => {
            let n = 20;
            let mut best = (u_range.0, v_range.0);
            let mut best_d = f64::MAX;
            for i in 0..=n {
                for j in 0..=n {
                    let uu = u_range.0 + (u_range.1 - u_range.0) * i as f64 / n as f64;
                    let vv = v_range.0 + (v_range.1 - v_range.0) * j as f64 / n as f64;
                    let d = (surf.evaluate(uu, vv) - point).norm_squared();
                    if d < best_d {
                        best_d = d;
                        best = (uu, vv);
                    }
                }
            }
            best
        }
    };

    for _ in 0..50 {
        let diff = surf.evaluate(u, v) - point;
        let du = surf.derivative_u(u, v);
        let dv = surf.derivative_v(u, v);
        let Some((su, sv)) = crate::math::solve::solve2(
            du.dot(&du),
            du.dot(&dv),
            du.dot(&dv),
            dv.dot(&dv),
            -du.dot(&diff),
            -dv.dot(&diff),
        ) else {
            break;
        };
        u = (u + su).clamp(u_range.0, u_range.1);
        v = (v + sv).clamp(v_range.0, v_range.1);
        if su.abs() < 1e-13 && sv.abs() < 1e-13 {
            break;
        }
    }
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    fn torus(axis: Vector3, major_r: f64, minor_r: f64) -> Surface {
        Surface::Torus { center: Point3::origin(), axis, major_r, minor_r }
    }


    #[test]
    fn cylinder_normal_is_radial_outward() {
        let cyl = Surface::Cylinder { origin: Point3::origin(), axis: Vector3::z(), radius: 5.0 };
        for i in 0..10 {
            let u = TAU * i as f64 / 10.0;
            let p = cyl.evaluate(u, 1.0);
            let radial = Vector3::new(p.x, p.y, 0.0).normalize();
            assert_relative_eq!(cyl.normal(u, 1.0).dot(&radial), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn sphere_and_torus_normals_point_outward() {
        let s = Surface::Sphere { center: Point3::new(1.0, 2.0, 3.0), radius: 3.0 };
        let p = s.evaluate(1.0, 0.3);
        let want = (p - Point3::new(1.0, 2.0, 3.0)) / 3.0;
        assert_relative_eq!(s.normal(1.0, 0.3), want, epsilon = 1e-12);

        let t = torus(Vector3::z(), 10.0, 2.0);
        let (u, v) = (0.4, 1.1);
        let p = t.evaluate(u, v);
        let ring = {
            let r = Vector3::new(p.x, p.y, 0.0).normalize() * 10.0;
            Point3::from(r)
        };
        assert_relative_eq!(t.normal(u, v), (p - ring) / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn inversion_round_trips() {
        let surfaces = [
            Surface::Plane {
                origin: Point3::new(0.0, 0.0, 1.0),
                normal: Vector3::new(0.0, 1.0, 1.0),
            },
            Surface::Cylinder { origin: Point3::origin(), axis: Vector3::x(), radius: 2.0 },
            Surface::Sphere { center: Point3::origin(), radius: 4.0 },
            torus(Vector3::y(), 6.0, 1.5),
        ];
        for s in &surfaces {
            let p = s.evaluate(0.8, 0.4);
            let (u, v) = s.closest_parameters(&p);
            assert_relative_eq!(s.evaluate(u, v), p, epsilon = 1e-9);
        }
    }

    #[test]
    fn torus_curvatures_match_closed_form() {
        let t = torus(Vector3::z(), 10.0, 2.0);
        let (k1, k2) = t.principal_curvatures(0.3, 0.0);
        // Outer equator: tube curvature -1/r and ring curvature -1/(R + r).
        assert_relative_eq!(k1, -0.5, epsilon = 1e-4);
        assert_relative_eq!(k2, -1.0 / 12.0, epsilon = 1e-4);
        let (k1, k2) = t.principal_curvatures(0.3, PI);
        // Inner equator: saddle.
        assert_relative_eq!(k1, -0.5, epsilon = 1e-4);
        assert_relative_eq!(k2, 1.0 / 8.0, epsilon = 1e-4);
    }

    #[test]
    fn same_geometry_ignores_origin_along_axis() {
        let a = Surface::Cylinder { origin: Point3::origin(), axis: Vector3::z(), radius: 3.0 };
        let b = Surface::Cylinder {
            origin: Point3::new(0.0, 0.0, 7.0),
            axis: -Vector3::z(),
            radius: 3.0,
        };
        assert!(a.same_geometry(&b, 1e-9));
        let c = Surface::Plane { origin: Point3::origin(), normal: Vector3::z() };
        assert!(!a.same_geometry(&c, 1e-9));
        let shifted = Surface::Plane { origin: Point3::new(5.0, 1.0, 0.0), normal: Vector3::z() };
        assert!(c.same_geometry(&shifted, 1e-9));

    }

    #[test]
    fn sphere_pole_normal_is_finite() {
        let s = Surface::Sphere { center: Point3::origin(), radius: 2.0 };
        assert_relative_eq!(s.normal(0.0, FRAC_PI_2), Vector3::z(), epsilon = 1e-9);
    }
}
