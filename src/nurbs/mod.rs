//! Rational B-spline curves and surfaces.
//!
//! Only what the blend engine needs: evaluation with first derivatives,
//! iso-parameter extraction and global interpolation (see [`fit`]).

pub mod basis;
pub mod fit;
pub mod knot;

use crate::math::{Isometry3, Point3, Vector3, Vector4};

/// A rational B-spline curve in 3D.
#[derive(Clone, Debug, PartialEq)]
pub struct NurbsCurve3 {
    pub degree: usize,
    pub knots: Vec<f64>,
    pub control_points: Vec<Point3>,
    pub weights: Vec<f64>,
}

impl NurbsCurve3 {
    pub fn new(
        degree: usize,
        knots: Vec<f64>,
        control_points: Vec<Point3>,
        weights: Vec<f64>,
    ) -> Self {
        assert_eq!(control_points.len(), weights.len());
        assert!(
            knot::validate_knot_vector(&knots, degree, control_points.len()),
            "invalid knot vector: {} knots for degree {} with {} control points",
            knots.len(),
            degree,
            control_points.len()
        );
        Self { degree, knots, control_points, weights }
    }

    /// Build from homogeneous control points `(w·P, w)`.
    pub fn from_homogeneous(degree: usize, knots: Vec<f64>, pw: &[Vector4]) -> Self {
        let (control_points, weights) = pw.iter().map(dehomogenize).unzip();
        Self::new(degree, knots, control_points, weights)
    }

    fn last_index(&self) -> usize {
        self.control_points.len() - 1
    }

    pub fn evaluate(&self, u: f64) -> Point3 {
        self.derivative(u).0
    }

    /// Point and first derivative at `u` (quotient rule on the rational form).
    pub fn derivative(&self, u: f64) -> (Point3, Vector3) {
        let p = self.degree;
        let span = basis::find_span(self.last_index(), p, u, &self.knots);
        let (n, dn) = basis::basis_with_derivatives(span, u, p, &self.knots);
        let mut a = Vector3::zeros();
        let mut da = Vector3::zeros();
        let mut w = 0.0;
        let mut dw = 0.0;
        for k in 0..=p {
            let i = span - p + k;
            let wi = self.weights[i];
            let pi = self.control_points[i].coords;
            a += pi * (n[k] * wi);
            da += pi * (dn[k] * wi);
            w += n[k] * wi;
            dw += dn[k] * wi;
        }
        let c = a / w;
        (Point3::from(c), (da - c * dw) / w)
    }

    pub fn tangent(&self, u: f64) -> Vector3 {
        let d = self.derivative(u).1;
        let len = d.norm();
        if len > 1e-15 { d / len } else { Vector3::x() }
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.knots.len() - self.degree - 1])
    }

    pub fn transformed(&self, iso: &Isometry3) -> Self {
        Self {
            control_points: self.control_points.iter().map(|p| iso * p).collect(),
            ..self.clone()
        }
    }
}

/// A rational B-spline surface with control net indexed `[u][v]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NurbsSurface {
    pub degree_u: usize,
    pub degree_v: usize,
    pub knots_u: Vec<f64>,
    pub knots_v: Vec<f64>,
    pub control_points: Vec<Vec<Point3>>,
    pub weights: Vec<Vec<f64>>,
}

impl NurbsSurface {
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        control_points: Vec<Vec<Point3>>,
        weights: Vec<Vec<f64>>,
    ) -> Self {
        let nu = control_points.len();
        let nv = control_points[0].len();
        assert!(knot::validate_knot_vector(&knots_u, degree_u, nu), "invalid U knot vector");
        assert!(knot::validate_knot_vector(&knots_v, degree_v, nv), "invalid V knot vector");
        assert!(weights.len() == nu && weights.iter().all(|row| row.len() == nv));
        Self { degree_u, degree_v, knots_u, knots_v, control_points, weights }
    }

    /// Build from a homogeneous net `pw[u][v] = (w·P, w)`.
    pub fn from_homogeneous(
        degree_u: usize,
        degree_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        pw: &[Vec<Vector4>],
    ) -> Self {
        let mut pts = Vec::with_capacity(pw.len());
        let mut wts = Vec::with_capacity(pw.len());
        for row in pw {
            let (p, w): (Vec<_>, Vec<_>) = row.iter().map(dehomogenize).unzip();
            pts.push(p);
            wts.push(w);
        }
        Self::new(degree_u, degree_v, knots_u, knots_v, pts, wts)
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3 {
        self.derivatives(u, v).0
    }

    /// Point and both first partials at `(u, v)`.
    pub fn derivatives(&self, u: f64, v: f64) -> (Point3, Vector3, Vector3) {
        let (pu, pv) = (self.degree_u, self.degree_v);
        let su = basis::find_span(self.control_points.len() - 1, pu, u, &self.knots_u);
        let sv = basis::find_span(self.control_points[0].len() - 1, pv, v, &self.knots_v);
        let (nu, dnu) = basis::basis_with_derivatives(su, u, pu, &self.knots_u);
        let (nv, dnv) = basis::basis_with_derivatives(sv, v, pv, &self.knots_v);

        let mut a = Vector3::zeros();
        let mut au = Vector3::zeros();
        let mut av = Vector3::zeros();
        let (mut w, mut wu, mut wv) = (0.0, 0.0, 0.0);
        for i in 0..=pu {
            let ui = su - pu + i;
            for j in 0..=pv {
                let vj = sv - pv + j;
                let wij = self.weights[ui][vj];
                let pij = self.control_points[ui][vj].coords;
                let b = nu[i] * nv[j] * wij;
                let bu = dnu[i] * nv[j] * wij;
                let bv = nu[i] * dnv[j] * wij;
                a += pij * b;
                au += pij * bu;
                av += pij * bv;
                w += b;
                wu += bu;
                wv += bv;
            }
        }
        let c = a / w;
        (Point3::from(c), (au - c * wu) / w, (av - c * wv) / w)
    }

    pub fn normal(&self, u: f64, v: f64) -> Vector3 {
        let (_, du, dv) = self.derivatives(u, v);
        let n = du.cross(&dv);
        let len = n.norm();
        if len > 1e-15 { n / len } else { Vector3::z() }
    }

    pub fn domain_u(&self) -> (f64, f64) {
        (self.knots_u[self.degree_u], self.knots_u[self.knots_u.len() - self.degree_u - 1])
    }

    pub fn domain_v(&self) -> (f64, f64) {
        (self.knots_v[self.degree_v], self.knots_v[self.knots_v.len() - self.degree_v - 1])
    }

    /// The iso-curve at fixed `u`, running in `v`. Exact.
    pub fn iso_u(&self, u: f64) -> NurbsCurve3 {
        let pu = self.degree_u;
        let su = basis::find_span(self.control_points.len() - 1, pu, u, &self.knots_u);
        let n = basis::basis_funs(su, u, pu, &self.knots_u);
        let nv = self.control_points[0].len();
        let pw: Vec<Vector4> = (0..nv)
            .map(|j| {
                (0..=pu).fold(Vector4::zeros(), |acc, k| {
                    let i = su - pu + k;
                    acc + homogenize(&self.control_points[i][j], self.weights[i][j]) * n[k]
                })
            })
            .collect();
        NurbsCurve3::from_homogeneous(self.degree_v, self.knots_v.clone(), &pw)
    }

    /// The iso-curve at fixed `v`, running in `u`. Exact.
    pub fn iso_v(&self, v: f64) -> NurbsCurve3 {
        let pv = self.degree_v;
        let sv = basis::find_span(self.control_points[0].len() - 1, pv, v, &self.knots_v);
        let n = basis::basis_funs(sv, v, pv, &self.knots_v);
        let pw: Vec<Vector4> = self
            .control_points
            .iter()
            .zip(&self.weights)
            .map(|(row, wrow)| {
                (0..=pv).fold(Vector4::zeros(), |acc, k| {
                    let j = sv - pv + k;
                    acc + homogenize(&row[j], wrow[j]) * n[k]
                })
            })
            .collect();
        NurbsCurve3::from_homogeneous(self.degree_u, self.knots_u.clone(), &pw)
    }

    pub fn transformed(&self, iso: &Isometry3) -> Self {
        Self {
            control_points: self
                .control_points
                .iter()
                .map(|row| row.iter().map(|p| iso * p).collect())
                .collect(),
            ..self.clone()
        }
    }
}

pub fn homogenize(p: &Point3, w: f64) -> Vector4 {
    Vector4::new(p.x * w, p.y * w, p.z * w, w)
}

pub fn dehomogenize(pw: &Vector4) -> (Point3, f64) {
    let w = pw.w;
    (Point3::new(pw.x / w, pw.y / w, pw.z / w), w)
}
