//! Edge carrier curves.
//!
//! `Curve3` is the geometric carrier of every topological `Edge`: original
//! model edges, spring curves, cross-section arcs and cap curves.

use crate::math::{plane_frame, wrap_angle_near, Isometry3, Point3, Vector3};
use crate::nurbs::NurbsCurve3;

/// A geometric curve in 3D space.
#[derive(Clone, Debug, PartialEq)]
pub enum Curve3 {
    /// `origin + t·dir`.
    Line { origin: Point3, dir: Vector3 },
    /// `center + radius·(cos t·e1 + sin t·e2)` with `(e1, e2) = plane_frame(axis)`.
    Circle { center: Point3, axis: Vector3, radius: f64 },
    /// `center + cos t·major + sin t·minor`; `major ⟂ minor`.
    Ellipse { center: Point3, major: Vector3, minor: Vector3 },
    Nurbs(NurbsCurve3),
}

impl Curve3 {
    /// Straight segment from `a` (t = 0) to `b` (t = 1).
    pub fn segment(a: Point3, b: Point3) -> Self {
        Curve3::Line { origin: a, dir: b - a }
    }

    pub fn evaluate(&self, t: f64) -> Point3 {
        match self {
            Curve3::Line { origin, dir } => origin + dir * t,
            Curve3::Circle { center, axis, radius } => {
                let (e1, e2) = plane_frame(axis);
                center + (e1 * t.cos() + e2 * t.sin()) * *radius
            }
            Curve3::Ellipse { center, major, minor } => center + major * t.cos() + minor * t.sin(),
            Curve3::Nurbs(n) => n.evaluate(t),
        }
    }

    /// First derivative (not unit length).
    pub fn derivative(&self, t: f64) -> Vector3 {
        match self {
            Curve3::Line { dir, .. } => *dir,
            Curve3::Circle { axis, radius, .. } => {
                let (e1, e2) = plane_frame(axis);
                (-e1 * t.sin() + e2 * t.cos()) * *radius
            }
            Curve3::Ellipse { major, minor, .. } => -major * t.sin() + minor * t.cos(),
            Curve3::Nurbs(n) => n.derivative(t).1,
        }
    }

    pub fn tangent(&self, t: f64) -> Vector3 {
        let d = self.derivative(t);
        let len = d.norm();
        if len > 1e-15 { d / len } else { Vector3::x() }
    }

    /// True for closed angular parameterisations (circles, ellipses).
    pub fn is_periodic(&self) -> bool {
        matches!(self, Curve3::Circle { .. } | Curve3::Ellipse { .. })
    }

    /// Point inversion. Periodic curves return a parameter in `(-π, π]`.
    pub fn closest_parameter(&self, point: &Point3) -> f64 {
        match self {
            Curve3::Line { origin, dir } => (point - origin).dot(dir) / dir.dot(dir),
            Curve3::Circle { center, axis, .. } => {
                let (e1, e2) = plane_frame(axis);
                let d = point - center;
                d.dot(&e2).atan2(d.dot(&e1))
            }
            Curve3::Ellipse { center, major, minor } => {
                let d = point - center;
                (d.dot(minor) / minor.norm_squared()).atan2(d.dot(major) / major.norm_squared())
            }
            Curve3::Nurbs(n) => nurbs_inversion(n, point),
        }
    }

    /// Point inversion that, for periodic curves, picks the branch nearest `hint`.
    pub fn closest_parameter_near(&self, point: &Point3, hint: f64) -> f64 {
        let t = self.closest_parameter(point);
        if self.is_periodic() { wrap_angle_near(t, hint) } else { t }
    }

    /// Distance from `point` to the curve restricted to `[t0, t1]`, with the
    /// parameter of the nearest point.
    pub fn distance_within(&self, point: &Point3, t0: f64, t1: f64) -> (f64, f64) {
        let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        let t = self.closest_parameter_near(point, 0.5 * (lo + hi)).clamp(lo, hi);
        ((self.evaluate(t) - point).norm(), t)
    }

    /// Arc length over `[t0, t1]` by composite Simpson quadrature.
    pub fn length(&self, t0: f64, t1: f64) -> f64 {
        match self {
            Curve3::Line { dir, .. } => dir.norm() * (t1 - t0).abs(),
            Curve3::Circle { radius, .. } => radius * (t1 - t0).abs(),
            _ => {
                let n = 32;
                let h = (t1 - t0) / n as f64;
                let mut s = self.derivative(t0).norm() + self.derivative(t1).norm();
                for i in 1..n {
                    let w = if i % 2 == 1 { 4.0 } else { 2.0 };
                    s += w * self.derivative(t0 + h * i as f64).norm();
                }
                (s * h / 3.0).abs()
            }
        }
    }

    pub fn transformed(&self, iso: &Isometry3) -> Self {
        match self {
            Curve3::Line { origin, dir } => Curve3::Line { origin: iso * origin, dir: iso * dir },
            Curve3::Circle { center, axis, radius } => {
                // The angular frame is derived from the axis, so a rotated
                // circle keeps its point set but not its parameterisation.
                Curve3::Circle { center: iso * center, axis: iso * axis, radius: *radius }
            }
            Curve3::Ellipse { center, major, minor } => Curve3::Ellipse {
                center: iso * center,
                major: iso * major,
                minor: iso * minor,
            },
            Curve3::Nurbs(n) => Curve3::Nurbs(n.transformed(iso)),
        }
    }
}

fn nurbs_inversion(n: &NurbsCurve3, point: &Point3) -> f64 {
    let (lo, hi) = n.domain();
    let samples = 32;
    let mut t = lo;
    let mut best = f64::MAX;
    for i in 0..=samples {
        let ti = lo + (hi - lo) * i as f64 / samples as f64;
        let d = (n.evaluate(ti) - point).norm_squared();
        if d < best {
            best = d;
            t = ti;
        }
    }
    for _ in 0..50 {
        let (c, dc) = n.derivative(t);
        let f = dc.dot(&(c - point));
        let df = dc.norm_squared();
        if df < 1e-30 {
            break;
        }
        let step = f / df;
        t = (t - step).clamp(lo, hi);
        if step.abs() < 1e-13 {
            break;
        }
    }
    t
}
