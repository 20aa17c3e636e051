//! Global interpolation (The NURBS Book, A9.1) for curves, homogeneous
//! curves and tensor-product point grids.

use super::{basis, knot, NurbsCurve3, NurbsSurface};
use crate::math::{Point3, Vector4};
use nalgebra::DMatrix;

/// Interpolate homogeneous points at the given parameters.
///
/// The degree is reduced to `points.len() - 1` when too few points are
/// given. Returns the knot vector and the homogeneous control points, or
/// `None` when fewer than two points are supplied or the system is singular.
pub fn interpolate_homogeneous(
    params: &[f64],
    points: &[Vector4],
    degree: usize,
) -> Option<(usize, Vec<f64>, Vec<Vector4>)> {
    let n = points.len();
    if n < 2 || params.len() != n {
        return None;
    }
    let p = degree.min(n - 1);
    let knots = knot::averaged_knots(params, p);

    let mut a = DMatrix::<f64>::zeros(n, n);
    for (row, &t) in params.iter().enumerate() {
        let span = basis::find_span(n - 1, p, t, &knots);
        let funs = basis::basis_funs(span, t, p, &knots);
        for (k, f) in funs.iter().enumerate() {
            a[(row, span - p + k)] = *f;
        }
    }
    let mut rhs = DMatrix::<f64>::zeros(n, 4);
    for (row, pt) in points.iter().enumerate() {
        for c in 0..4 {
            rhs[(row, c)] = pt[c];
        }
    }
    let sol = a.lu().solve(&rhs)?;
    let ctrl = (0..n)
        .map(|i| Vector4::new(sol[(i, 0)], sol[(i, 1)], sol[(i, 2)], sol[(i, 3)]))
        .collect();
    Some((p, knots, ctrl))
}

/// Non-rational curve through `points` at `params`.
pub fn interpolate_curve(params: &[f64], points: &[Point3], degree: usize) -> Option<NurbsCurve3> {
    let pw: Vec<Vector4> = points.iter().map(|p| Vector4::new(p.x, p.y, p.z, 1.0)).collect();
    let (p, knots, ctrl) = interpolate_homogeneous(params, &pw, degree)?;
    Some(NurbsCurve3::from_homogeneous(p, knots, &ctrl))
}

/// Skin a surface through rational sections.
///
/// `sections[k]` holds the homogeneous control points of the section curve at
/// `u = params[k]`. All sections share `degree_v` and `knots_v`. Each column
/// of control points is interpolated along `u`, so every section is
/// reproduced exactly as the iso-curve `u = params[k]`.
pub fn skin_sections(
    params: &[f64],
    sections: &[Vec<Vector4>],
    degree_u: usize,
    degree_v: usize,
    knots_v: Vec<f64>,
) -> Option<NurbsSurface> {
    let nv = sections.first()?.len();
    let mut columns = Vec::with_capacity(nv);
    let mut du = degree_u;
    let mut knots_u = Vec::new();
    for j in 0..nv {
        let col: Vec<Vector4> = sections.iter().map(|s| s[j]).collect();
        let (p, k, ctrl) = interpolate_homogeneous(params, &col, degree_u)?;
        du = p;
        knots_u = k;
        columns.push(ctrl);
    }
    let nu = columns[0].len();
    let net: Vec<Vec<Vector4>> = (0..nu).map(|i| columns.iter().map(|c| c[i]).collect()).collect();
    Some(NurbsSurface::from_homogeneous(du, degree_v, knots_u, knots_v, &net))
}

/// Non-rational surface through a point grid `grid[i][j]` at
/// `(params_u[i], params_v[j])`.
pub fn interpolate_grid(
    params_u: &[f64],
    params_v: &[f64],
    grid: &[Vec<Point3>],
    degree_u: usize,
    degree_v: usize,
) -> Option<NurbsSurface> {
    // Interpolate each row in v, then skin the resulting control rows in u.
    let mut rows = Vec::with_capacity(grid.len());
    let mut dv = degree_v;
    let mut knots_v = Vec::new();
    for row in grid {
        let pw: Vec<Vector4> = row.iter().map(|p| Vector4::new(p.x, p.y, p.z, 1.0)).collect();
        let (p, k, ctrl) = interpolate_homogeneous(params_v, &pw, degree_v)?;
        dv = p;
        knots_v = k;
        rows.push(ctrl);
    }
    skin_sections(params_u, &rows, degree_u, dv, knots_v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_1_SQRT_2;

    #[test]
    fn curve_passes_through_points() {
        let pts: Vec<Point3> = (0..7)
            .map(|i| {
                let t = i as f64 * 0.5;
                Point3::new(t, t.sin(), 0.2 * t)
            })
            .collect();
        let params = knot::chord_length_params(&pts, 0.0, 1.0);
        let c = interpolate_curve(&params, &pts, 3).unwrap();
        for (t, p) in params.iter().zip(&pts) {
            assert_relative_eq!(c.evaluate(*t), *p, epsilon = 1e-9);
        }
    }

    #[test]
    fn two_points_give_a_line() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
        let c = interpolate_curve(&[0.0, 1.0], &pts, 3).unwrap();
        assert_eq!(c.degree, 1);
        assert_relative_eq!(c.evaluate(0.25), Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn skinned_sections_are_reproduced() {
        // Quarter-circle sections of radius 1 translated along z.
        let w = FRAC_1_SQRT_2;
        let section = |z: f64| {
            vec![
                Vector4::new(1.0, 0.0, z, 1.0),
                Vector4::new(w, w, z * w, w),
                Vector4::new(0.0, 1.0, z, 1.0),
            ]
        };
        let params = [0.0, 1.0, 2.0, 3.0];
        let sections: Vec<_> = params.iter().map(|&z| section(z)).collect();
        let s = skin_sections(&params, &sections, 3, 2, knot::bezier_knots(2)).unwrap();
        for v in [0.0, 0.3, 0.5, 1.0] {
            let p = s.evaluate(1.5, v);
            assert_relative_eq!((p.x * p.x + p.y * p.y).sqrt(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(p.z, 1.5, epsilon = 1e-9);
        }
    }
}
