use faer::MatRef;
use itertools::izip;
use rayon::prelude::*;
use std::f64::consts::PI;

/// ln(sqrt(2 pi)), the per-dimension normalizing constant of a Gaussian.
pub(crate) const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Relative-difference convergence criterion between two coefficient vectors,
/// `max_j |a_j - b_j| / (|b_j| + 0.01)`.
///
/// The 0.01 offset keeps the ratio finite near zero, similar to the criterion
/// R's glm routine applies on the deviance scale. The reduction uses `max`,
/// which is exact on f64, so the result does not depend on how rayon splits
/// the slice across threads.
pub(crate) fn criterion(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());

    a.par_iter()
        .zip(b.par_iter())
        .map(|(&a, &b)| (a - b).abs() / (b.abs() + 0.01))
        .reduce(|| 0.0, f64::max)
}

pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());

    let mut result = 0.0;
    for (val1, val2) in a.iter().zip(b) {
        result += *val1 * *val2;
    }
    result
}

/// out = L' x for a lower-triangular factor L.
pub(crate) fn tri_lower_transpose_matvec(l: MatRef<'_, f64>, x: &[f64], out: &mut [f64]) {
    let n = l.nrows();
    assert!(l.ncols() == n);
    assert!(x.len() == n);
    assert!(out.len() == n);

    for i in 0..n {
        let mut acc = 0.0;
        for j in i..n {
            acc += l[(j, i)] * x[j];
        }
        out[i] = acc;
    }
}

/// Solve L' v = x in place by back substitution, L lower-triangular.
pub(crate) fn tri_lower_transpose_solve(l: MatRef<'_, f64>, x: &mut [f64]) {
    let n = l.nrows();
    assert!(l.ncols() == n);
    assert!(x.len() == n);

    for i in (0..n).rev() {
        let mut acc = x[i];
        for j in (i + 1)..n {
            acc -= l[(j, i)] * x[j];
        }
        x[i] = acc / l[(i, i)];
    }
}

/// Log-gamma via Lanczos approximation (g=7, n=9 coefficients).
#[allow(clippy::excessive_precision)]
pub(crate) fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection formula
        let lnpi_sin = (PI * x).sin().abs().ln();
        PI.ln() - lnpi_sin - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut ag = COEFFS[0];
        for (i, &c) in COEFFS[1..].iter().enumerate() {
            ag += c / (x + (i as f64) + 1.0);
        }
        let t = x + 7.5;
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + ag.ln()
    }
}

/// Elementwise `y[i] += x[i]`.
pub(crate) fn add_assign(y: &mut [f64], x: &[f64]) {
    assert!(y.len() == x.len());

    izip!(y, x).for_each(|(y, x)| {
        *y += x;
    });
}
