//! Closed-form roots of `p3·y³ + p1·y + p0 = 0` and the root choice used by
//! the semi-implicit step.

use num_complex::Complex;

/// Imaginary parts below this (relative to the real part) count as real.
const REAL_TOLERANCE: f64 = 1e-7;

/// The three complex roots of the depressed cubic `p3·y³ + p1·y + p0`.
/// `p3` must be non-zero.
pub fn depressed_cubic_roots(p3: f64, p1: f64, p0: f64) -> [Complex<f64>; 3] {
    let p = p1 / p3;
    let q = p0 / p3;
    let disc = Complex::new(q * q / 4.0 + p * p * p / 27.0, 0.0).sqrt();
    let half_q = Complex::new(-q / 2.0, 0.0);
    // Larger of the two candidates avoids cancellation.
    let w = if (half_q + disc).norm() >= (half_q - disc).norm() {
        half_q + disc
    } else {
        half_q - disc
    };
    if w.norm() == 0.0 {
        return [Complex::new(0.0, 0.0); 3];
    }

    let c = w.cbrt();
    let omega = Complex::new(-0.5, 3f64.sqrt() / 2.0);
    let mut roots = [Complex::new(0.0, 0.0); 3];
    let mut rot = Complex::new(1.0, 0.0);
    for root in roots.iter_mut() {
        let ck = rot * c;
        *root = ck - p / (3.0 * ck);
        rot *= omega;
    }
    roots
}

/// Real solution of `p3·y³ + p1·y + p0 = 0` nearest to `previous`.
///
/// With a single real root that root is returned. With several, the one
/// closest to `previous` wins. If floating error leaves no root within
/// tolerance of the real axis, the real part of the least imaginary root is
/// used and a warning is logged.
pub fn solve_step(p3: f64, p1: f64, p0: f64, previous: f64) -> f64 {
    if p3 == 0.0 {
        if p1 == 0.0 {
            log::warn!("Degenerate implicit step (all coefficients zero); keeping state.");
            return previous;
        }
        return -p0 / p1;
    }

    let roots = depressed_cubic_roots(p3, p1, p0);
    let nearest_real = roots
        .iter()
        .filter(|r| r.im.abs() <= REAL_TOLERANCE * r.re.abs().max(1.0))
        .map(|r| r.re)
        .min_by(|a, b| (a - previous).abs().total_cmp(&(b - previous).abs()));

    let y = match nearest_real {
        Some(y) => y,
        None => {
            let least_imaginary = roots
                .iter()
                .min_by(|a, b| a.im.abs().total_cmp(&b.im.abs()))
                .map_or(previous, |r| r.re);
            log::warn!("Implicit cubic step has no real root; using {least_imaginary}.");
            least_imaginary
        }
    };
    polish(p3, p1, p0, y)
}

/// A few Newton iterations on the real polynomial.
fn polish(p3: f64, p1: f64, p0: f64, mut y: f64) -> f64 {
    for _ in 0..3 {
        let slope = 3.0 * p3 * y * y + p1;
        if slope == 0.0 {
            break;
        }
        let next = y - (p3 * y * y * y + p1 * y + p0) / slope;
        if !next.is_finite() {
            break;
        }
        y = next;
    }
    y
}
