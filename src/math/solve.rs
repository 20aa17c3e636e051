//! Scalar root finding and tiny dense solves used by the section and
//! radius solvers.

/// Failure modes of [`brent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootError {
    /// `f(a)` and `f(b)` have the same sign.
    NotBracketed,
    /// Iteration budget exhausted before reaching the tolerance.
    NoConvergence,
}

/// Brent's method on the bracket `[a, b]`.
///
/// Combines bisection, secant and inverse quadratic interpolation; converges
/// whenever `f` is continuous and changes sign over the bracket.
pub fn brent<F>(mut f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> Result<f64, RootError>
where
    F: FnMut(f64) -> f64,
{
    let (mut a, mut b) = (a, b);
    let mut fa = f(a);
    let mut fb = f(b);
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return Err(RootError::NotBracketed);
    }
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut bisected = true;

    for _ in 0..max_iter {
        if fb.abs() < f64::EPSILON || (b - a).abs() < tol {
            return Ok(b);
        }
        let mut s = if fa != fc && fb != fc {
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            b - fb * (b - a) / (fb - fa)
        };

        let lo = (3.0 * a + b) / 4.0;
        let outside = !((s > lo.min(b)) && (s < lo.max(b)));
        let slow = if bisected {
            (s - b).abs() >= (b - c).abs() / 2.0 || (b - c).abs() < tol
        } else {
            (s - b).abs() >= (c - d).abs() / 2.0 || (c - d).abs() < tol
        };
        if outside || slow {
            s = (a + b) / 2.0;
            bisected = true;
        } else {
            bisected = false;
        }

        let fs = f(s);
        d = c;
        c = b;
        fc = fb;
        if fa.signum() != fs.signum() {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }
        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
    }
    Err(RootError::NoConvergence)
}

/// Expand `[a, b]` outward until `f` changes sign, at most `max_steps` times.
pub fn expand_bracket<F>(mut f: F, a: f64, b: f64, max_steps: usize) -> Option<(f64, f64)>
where
    F: FnMut(f64) -> f64,
{
    let (mut lo, mut hi) = (a, b);
    let mut flo = f(lo);
    let mut fhi = f(hi);
    for _ in 0..max_steps {
        if flo.signum() != fhi.signum() {
            return Some((lo, hi));
        }
        let w = hi - lo;
        if flo.abs() < fhi.abs() {
            lo -= w;
            flo = f(lo);
        } else {
            hi += w;
            fhi = f(hi);
        }
    }
    (flo.signum() != fhi.signum()).then_some((lo, hi))
}

/// Solve the 2×2 system `[[a11, a12], [a21, a22]] x = b`.
pub fn solve2(a11: f64, a12: f64, a21: f64, a22: f64, b1: f64, b2: f64) -> Option<(f64, f64)> {
    let det = a11 * a22 - a12 * a21;
    let scale = (a11.abs() + a12.abs()).max(1e-300) * (a21.abs() + a22.abs()).max(1e-300);
    if det.abs() < 1e-14 * scale {
        return None;
    }
    Some(((a22 * b1 - a12 * b2) / det, (a11 * b2 - a21 * b1) / det))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn brent_finds_cube_root() {
        let r = brent(|x| x * x * x - 2.0, 0.0, 2.0, 1e-13, 100).unwrap();
        assert_relative_eq!(r, 2.0_f64.cbrt(), epsilon = 1e-10);
    }

    #[test]
    fn brent_rejects_unbracketed() {
        assert_eq!(
            brent(|x| x * x + 1.0, -1.0, 1.0, 1e-12, 50),
            Err(RootError::NotBracketed)
        );
    }

    #[test]
    fn bracket_expands_to_root() {
        let (lo, hi) = expand_bracket(|x| x - 10.0, 0.0, 1.0, 10).unwrap();
        assert!(lo <= 10.0 && hi >= 10.0);
    }

    #[test]
    fn solve2_identity() {
        let (x, y) = solve2(2.0, 0.0, 0.0, 4.0, 2.0, 8.0).unwrap();
        assert_relative_eq!(x, 1.0);
        assert_relative_eq!(y, 2.0);
        assert!(solve2(1.0, 2.0, 2.0, 4.0, 1.0, 1.0).is_none());
    }
}
