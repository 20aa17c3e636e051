//! B-spline basis functions (The NURBS Book, A2.1 and A2.2).

/// Knot span index `i` with `knots[i] <= u < knots[i + 1]`, clamped to the
/// valid range `[p, n]` where `n` is the last control point index.
pub fn find_span(n: usize, p: usize, u: f64, knots: &[f64]) -> usize {
    if u >= knots[n + 1] {
        return n;
    }
    if u <= knots[p] {
        return p;
    }
    let (mut lo, mut hi) = (p, n + 1);
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if u < knots[mid] {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    lo
}

/// The `p + 1` non-vanishing basis functions `N[span-p..=span]` at `u`.
pub fn basis_funs(span: usize, u: f64, p: usize, knots: &[f64]) -> Vec<f64> {
    let mut n = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    n[0] = 1.0;
    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
    n
}

/// Basis functions and their first derivatives at `u`.
///
/// Uses `N'_{i,p} = p/(u_{i+p}-u_i) N_{i,p-1} - p/(u_{i+p+1}-u_{i+1}) N_{i+1,p-1}`
/// on the degree `p - 1` values of the same span.
pub fn basis_with_derivatives(
    span: usize,
    u: f64,
    p: usize,
    knots: &[f64],
) -> (Vec<f64>, Vec<f64>) {

    let values = basis_funs(span, u, p, knots);
    let mut ders = vec![0.0; p + 1];
    if p == 0 {
        return (values, ders);
    }
    // lower[k] is N_{span-p+1+k, p-1} for k in 0..p
    let lower = basis_funs(span, u, p - 1, knots);
    let pf = p as f64;
    for (k, d) in ders.iter_mut().enumerate() {
        let i = span - p + k;
        let a = if k >= 1 {
            let denom = knots[i + p] - knots[i];
            if denom > 0.0 { pf * lower[k - 1] / denom } else { 0.0 }
        } else {
            0.0
        };
        let b = if k < p {
            let denom = knots[i + p + 1] - knots[i + 1];
            if denom > 0.0 { pf * lower[k] / denom } else { 0.0 }
        } else {
            0.0
        };
        *d = a - b;
    }
    (values, ders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partition_of_unity() {
        let knots = [0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        for i in 0..=20 {
            let u = i as f64 / 20.0;
            let span = find_span(5, 3, u, &knots);
            let sum: f64 = basis_funs(span, u, 3, &knots).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn derivatives_sum_to_zero_and_match_differences() {
        let knots = [0.0, 0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0, 1.0];
        let u = 0.37;
        let span = find_span(4, 3, u, &knots);
        let (_, d) = basis_with_derivatives(span, u, 3, &knots);
        assert_relative_eq!(d.iter().sum::<f64>(), 0.0, epsilon = 1e-12);

        let h = 1e-6;
        let plus = basis_funs(span, u + h, 3, &knots);
        let minus = basis_funs(span, u - h, 3, &knots);
        for k in 0..4 {
            assert_relative_eq!(d[k], (plus[k] - minus[k]) / (2.0 * h), epsilon = 1e-5);
        }
    }

    #[test]
    fn span_at_domain_end_is_last_interval() {
        let knots = [0.0, 0.0, 1.0, 2.0, 2.0];
        assert_eq!(find_span(2, 1, 2.0, &knots), 2);
        assert_eq!(find_span(2, 1, 0.0, &knots), 1);
    }
}
