/// Normalizes a vector to unit L2 length in-place.
///
/// A zero vector is left unchanged, so its inner product against
/// anything stays 0.
pub fn l2_normalize(v: &mut [f32]) {
    let mut sum: f64 = 0.0;
    for &x in v.iter() {
        sum += (x as f64) * (x as f64);
    }
    let norm = sum.sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= scale;
        }
    }
}

/// Normalizes a batch of vectors in-place.
/// Semantics are identical to calling [`l2_normalize`] on each row.
pub fn l2_normalize_batch(vectors: &mut [Vec<f32>]) {
    for v in vectors.iter_mut() {
        l2_normalize(v);
    }
}

/// Inner product of two vectors.
/// For unit-norm inputs this is exactly their cosine similarity.
/// Uses f64 intermediate precision.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum: f64 = 0.0;
    for i in 0..a.len().min(b.len()) {
        sum += (a[i] as f64) * (b[i] as f64);
    }
    sum as f32
}
