//! Monotone piecewise-cubic Hermite interpolation of radius control points.

use crate::error::{BlendError, BlendResult};

/// C¹ cubic Hermite interpolant through `(params[k], radii[k])` with
/// Fritsch–Carlson tangents, optionally with pinned end slopes.
#[derive(Clone, Debug, PartialEq)]
pub struct HermiteRadius {
    params: Vec<f64>,
    radii: Vec<f64>,
    slopes: Vec<f64>,
    pinned: Option<(f64, f64)>,
}

impl HermiteRadius {
    pub fn new(params: &[f64], radii: &[f64], pinned: Option<(f64, f64)>) -> BlendResult<Self> {
        if params.len() != radii.len() || params.len() < 2 {
            return Err(BlendError::InvalidRadiusFunction {
                reason: format!("{} parameters for {} radii", params.len(), radii.len()),
            });
        }
        if params.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(BlendError::UnsortedRadiusParameters);
        }
        if let Some(&bad) = radii.iter().find(|r| **r < -crate::math::TOLERANCE || !r.is_finite()) {
            return Err(BlendError::InvalidRadius { value: bad, entities: Vec::new() });
        }
        let slopes = fritsch_carlson(params, radii, pinned);
        Ok(HermiteRadius { params: params.to_vec(), radii: radii.to_vec(), slopes, pinned })
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn pinned(&self) -> Option<(f64, f64)> {
        self.pinned
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let n = self.params.len();
        if t <= self.params[0] {
            return self.radii[0];
        }
        if t >= self.params[n - 1] {
            return self.radii[n - 1];
        }
        let k = self.params.partition_point(|&p| p <= t).saturating_sub(1).min(n - 2);
        let h = self.params[k + 1] - self.params[k];
        let s = (t - self.params[k]) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        h00 * self.radii[k]
            + h10 * h * self.slopes[k]
            + h01 * self.radii[k + 1]
            + h11 * h * self.slopes[k + 1]
    }

    /// The same curve traversed from `t = 1` back to `t = 0`.
    pub fn reversed(&self) -> Self {
        let params: Vec<f64> = self.params.iter().rev().map(|p| 1.0 - p).collect();
        let radii: Vec<f64> = self.radii.iter().rev().copied().collect();
        let slopes: Vec<f64> = self.slopes.iter().rev().map(|s| -s).collect();
        HermiteRadius { params, radii, slopes, pinned: self.pinned.map(|(a, b)| (-b, -a)) }
    }
}

fn fritsch_carlson(x: &[f64], y: &[f64], pinned: Option<(f64, f64)>) -> Vec<f64> {
    let n = x.len();
    let d: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / (x[k + 1] - x[k])).collect();
    let mut m = vec![0.0; n];
    m[0] = d[0];
    m[n - 1] = d[n - 2];
    for k in 1..n - 1 {
        m[k] = if d[k - 1] * d[k] > 0.0 { 0.5 * (d[k - 1] + d[k]) } else { 0.0 };
    }
    for k in 0..n - 1 {
        if d[k] == 0.0 {
            m[k] = 0.0;
            m[k + 1] = 0.0;
            continue;
        }
        let a = m[k] / d[k];
        let b = m[k + 1] / d[k];
        let r = a * a + b * b;
        if r > 9.0 {
            let tau = 3.0 / r.sqrt();
            m[k] = tau * a * d[k];
            m[k + 1] = tau * b * d[k];
        }
    }
    if let Some((s0, s1)) = pinned {
        m[0] = s0;
        m[n - 1] = s1;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolates_control_points() {
        let params = [0.0, 0.25, 0.5, 0.75, 1.0];
        let h = HermiteRadius::new(&params, &[2.0, 8.0, 2.0, 8.0, 2.0], None).unwrap();

        for (p, r) in [(0.0, 2.0), (0.25, 8.0), (0.5, 2.0), (0.75, 8.0), (1.0, 2.0)] {
            assert_relative_eq!(h.evaluate(p), r, epsilon = 1e-12);
        }
    }

    #[test]
    fn monotone_data_stays_monotone() {
        let h = HermiteRadius::new(&[0.0, 0.1, 0.9, 1.0], &[1.0, 1.1, 9.0, 10.0], None).unwrap();
        let mut prev = h.evaluate(0.0);
        for i in 1..=200 {
            let v = h.evaluate(i as f64 / 200.0);
            assert!(v >= prev - 1e-12);
            prev = v;
        }
    }

    #[test]
    fn pinned_slopes_are_respected() {
        let h = HermiteRadius::new(&[0.0, 1.0], &[20.0, 36.0], Some((0.0, 0.0))).unwrap();
        let eps = 1e-6;
        assert!((h.evaluate(eps) - 20.0).abs() < 1e-9);
        assert!((h.evaluate(1.0 - eps) - 36.0).abs() < 1e-9);
        assert_relative_eq!(h.evaluate(0.5), 28.0, epsilon = 1e-12);
    }

    #[test]
    fn unsorted_params_rejected() {
        assert_eq!(
            HermiteRadius::new(&[0.0, 0.5, 0.5, 1.0], &[1.0; 4], None),
            Err(BlendError::UnsortedRadiusParameters)
        );
    }

    #[test]
    fn reversal_mirrors_values() {
        let h = HermiteRadius::new(&[0.0, 0.3, 1.0], &[1.0, 4.0, 2.0], Some((1.0, -2.0))).unwrap();
        let r = h.reversed();
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert_relative_eq!(r.evaluate(t), h.evaluate(1.0 - t), epsilon = 1e-12);
        }
    }
}
