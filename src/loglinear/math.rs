//! Numeric helpers for log-domain arithmetic and dense vectors

/// `ln(Σ exp(xᵢ))` without overflow or underflow.
///
/// Returns `-inf` for an empty input or when every term is `-inf`.
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max.is_infinite() {
        return max;
    }

    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Squared l2 norm
pub fn quadrance(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

pub fn l2_norm(v: &[f64]) -> f64 {
    quadrance(v).sqrt()
}

/// `acc += scale * v`, elementwise
pub fn add_scaled(acc: &mut [f64], scale: f64, v: &[f64]) {
    debug_assert_eq!(acc.len(), v.len());
    for (a, x) in acc.iter_mut().zip(v) {
        *a += scale * x;
    }
}

/// Elementwise sum of two equal-length vectors
pub fn vsum(mut a: Vec<f64>, b: Vec<f64>) -> Vec<f64> {
    add_scaled(&mut a, 1.0, &b);
    a
}
