//! N-sided vertex blend patch.
//!
//! The patch is parametrised by `ρ ∈ [0,1]` (centre to boundary) and
//! `φ ∈ [0,1)` (around the boundary, sector `j` covering
//! `[j/N, (j+1)/N)`). Each radial line is a cubic Hermite segment from the
//! centre to the boundary point. With slope continuity the end tangent
//! follows the supplied cross-boundary tangents of the neighbouring blends,
//! so the patch meets them tangentially.

use crate::curve::Curve3;
use crate::math::{Isometry3, Point3, Vector3};

/// How far the centre is raised, per unit of mean boundary radius, at
/// bulge 1.
const NATURAL_FULLNESS: f64 = 0.4;

/// One side of a vertex blend.
#[derive(Clone, Debug, PartialEq)]
pub struct VblBoundary {
    pub curve: Curve3,
    pub t0: f64,
    pub t1: f64,
    /// Unit tangents pointing into the patch, sampled uniformly in `t`
    /// from `t0` to `t1` inclusive. Empty means position-only.
    pub cross: Vec<Vector3>,
}

impl VblBoundary {
    pub fn point(&self, s: f64) -> Point3 {
        self.curve.evaluate(self.t0 + s * (self.t1 - self.t0))
    }

    pub fn cross_tangent(&self, s: f64) -> Option<Vector3> {
        let n = self.cross.len();
        if n == 0 {
            return None;
        }
        if n == 1 {
            return Some(self.cross[0]);
        }
        let x = s.clamp(0.0, 1.0) * (n - 1) as f64;
        let i = (x.floor() as usize).min(n - 2);
        let f = x - i as f64;
        let d = self.cross[i] * (1.0 - f) + self.cross[i + 1] * f;
        Some(d.normalize())
    }

    fn transformed(&self, iso: &Isometry3) -> Self {
        VblBoundary {
            curve: self.curve.transformed(iso),
            t0: self.t0,
            t1: self.t1,
            cross: self.cross.iter().map(|d| iso * d).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VblSurface {
    pub center: Point3,
    /// Direction the centre is pushed along; also the limiting normal at
    /// the centre.
    pub normal: Vector3,
    pub boundaries: Vec<VblBoundary>,
    pub slope: bool,
}

impl VblSurface {
    /// Build a patch over a closed chain of boundaries (each ending where
    /// the next begins). `bulge` scales how far the centre is pushed out
    /// along `normal`; zero puts it on the boundary centroid.
    pub fn new(boundaries: Vec<VblBoundary>, normal: Vector3, bulge: f64, slope: bool) -> Self {
        let samples: Vec<Point3> = boundaries
            .iter()
            .flat_map(|b| (0..8).map(move |i| b.point(i as f64 / 8.0)))
            .collect();
        let count = samples.len().max(1) as f64;
        let sum = samples.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
        let centroid = Point3::from(sum / count);
        let mean_radius = samples.iter().map(|p| (p - centroid).norm()).sum::<f64>() / count;
        let normal = normal.normalize();
        VblSurface {
            center: centroid + normal * (bulge * NATURAL_FULLNESS * mean_radius),
            normal,
            boundaries,
            slope,
        }
    }

    pub fn sides(&self) -> usize {
        self.boundaries.len()
    }

    /// Boundary point and inward cross tangent at `φ`.
    pub fn boundary(&self, phi: f64) -> (Point3, Option<Vector3>) {
        let n = self.boundaries.len();
        let x = phi.rem_euclid(1.0) * n as f64;
        let j = (x.floor() as usize).min(n.saturating_sub(1));
        let s = x - j as f64;
        let b = &self.boundaries[j];
        (b.point(s), b.cross_tangent(s))
    }

    pub fn evaluate(&self, rho: f64, phi: f64) -> Point3 {
        let (b, cross) = self.boundary(phi);
        let radial = b - self.center;
        let tc = radial - self.normal * radial.dot(&self.normal);
        let tb = match (self.slope, cross) {
            (true, Some(d)) => -d * radial.norm(),
            _ => radial,
        };
        let r2 = rho * rho;
        let r3 = r2 * rho;
        let h00 = 2.0 * r3 - 3.0 * r2 + 1.0;
        let h01 = -2.0 * r3 + 3.0 * r2;
        let h10 = r3 - 2.0 * r2 + rho;
        let h11 = r3 - r2;
        Point3::from(self.center.coords * h00 + b.coords * h01 + tc * h10 + tb * h11)
    }

    pub fn transformed(&self, iso: &Isometry3) -> Self {
        VblSurface {
            center: iso * self.center,
            normal: iso * self.normal,
            boundaries: self.boundaries.iter().map(|b| b.transformed(iso)).collect(),
            slope: self.slope,
        }
    }
}
