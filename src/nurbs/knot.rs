//! Knot vector utilities for NURBS curves and surfaces.

/// A knot vector is valid when it is non-decreasing and has
/// `n_ctrl + degree + 1` entries.
pub fn validate_knot_vector(knots: &[f64], degree: usize, n_ctrl: usize) -> bool {
    knots.len() == n_ctrl + degree + 1 && knots.windows(2).all(|w| w[0] <= w[1])
}

/// Clamped knot vector obtained by averaging interpolation parameters
/// (The NURBS Book, eq. 9.8).
pub fn averaged_knots(params: &[f64], degree: usize) -> Vec<f64> {
    let n = params.len();
    let first = params[0];
    let last = params[n - 1];
    let mut knots = vec![first; degree + 1];
    for j in 1..n - degree {
        let avg = params[j..j + degree].iter().sum::<f64>() / degree as f64;
        knots.push(avg);
    }
    knots.extend(std::iter::repeat(last).take(degree + 1));
    knots
}

/// Cumulative chord-length parameters for `points`, mapped onto `[t0, t1]`.
pub fn chord_length_params(points: &[crate::math::Point3], t0: f64, t1: f64) -> Vec<f64> {
    let mut acc = vec![0.0];
    for w in points.windows(2) {
        let last = acc[acc.len() - 1];
        acc.push(last + (w[1] - w[0]).norm());
    }
    let total = acc[acc.len() - 1];
    let n = points.len();
    acc.iter()
        .enumerate()
        .map(|(i, &a)| {
            let f = if total > 0.0 { a / total } else { i as f64 / (n - 1).max(1) as f64 };
            t0 + f * (t1 - t0)
        })
        .collect()
}

/// Clamped Bezier knot vector `[0; p+1] ++ [1; p+1]`.
pub fn bezier_knots(degree: usize) -> Vec<f64> {
    let mut k = vec![0.0; degree + 1];
    k.extend(std::iter::repeat(1.0).take(degree + 1));
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    #[test]
    fn averaged_knots_are_valid() {
        let params = [0.0, 0.1, 0.4, 0.5, 0.9, 1.0];
        let knots = averaged_knots(&params, 3);
        assert!(validate_knot_vector(&knots, 3, params.len()));
        assert_eq!(knots[4], (0.1 + 0.4 + 0.5) / 3.0);
    }

    #[test]
    fn chord_params_span_range() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ];
        let t = chord_length_params(&pts, 2.0, 5.0);
        for (a, b) in t.iter().zip([2.0, 3.0, 5.0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
