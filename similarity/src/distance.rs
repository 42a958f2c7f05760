/// COSINE SIMILARITY
///
/// Cosine of the angle between two vectors: dot product divided by the
/// product of the magnitudes. Range is [-1, 1]; 1 means aligned, -1
/// opposite, 0 orthogonal. Both-zero or either-zero vectors yield 0.0
/// rather than NaN so degenerate nodes never poison a scan.
#[tracing::instrument(skip_all)]
pub fn cosine_similarity(first: &[f64], second: &[f64]) -> f64 {
    assert_eq!(
        first.len(),
        second.len(),
        "Vectors must have the same length!"
    );

    let dot = dot_product(first, second);
    let mag_first = first.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_second = second.iter().map(|x| x * x).sum::<f64>().sqrt();

    if mag_first == 0.0 || mag_second == 0.0 {
        return 0.0;
    }
    dot / (mag_first * mag_second)
}

/// DOT PRODUCT
///
/// Sum of elementwise products of two equal-length vectors.
#[tracing::instrument(skip_all)]
pub fn dot_product(first: &[f64], second: &[f64]) -> f64 {
    assert_eq!(
        first.len(),
        second.len(),
        "Vectors must have the same length!"
    );

    first.iter().zip(second).map(|(&x, &y)| x * y).sum()
}

/// EUCLIDEAN DISTANCE
///
/// Square root of the sum of squared elementwise differences. Only
/// meaningful when both vectors live on the same scale, which holds here
/// since every stored vector is unit-norm.
#[tracing::instrument(skip_all)]
pub fn euclidean_distance(first: &[f64], second: &[f64]) -> f64 {
    assert_eq!(
        first.len(),
        second.len(),
        "Vectors must have the same length!"
    );

    first
        .iter()
        .zip(second)
        .map(|(&x, &y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

/// Scales a vector to unit norm. The small bias in the divisor keeps the
/// zero vector at zero instead of overflowing to infinities.
pub fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    for component in vector.iter_mut() {
        *component /= norm + 1e-8;
    }
}

/// `dst += weight * src`, elementwise.
pub fn add_weighted(dst: &mut [f64], src: &[f64], weight: f64) {
    assert_eq!(dst.len(), src.len(), "Vectors must have the same length!");

    for (d, &s) in dst.iter_mut().zip(src) {
        *d += weight * s;
    }
}
