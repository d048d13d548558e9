//! Matryoshka-style truncation and L2 normalization of embedding vectors.

/// Target sizes an MRL-trained model keeps usable after truncation.
pub const MRL_DIMENSIONS: [usize; 5] = [64, 128, 256, 512, 768];

/// Snap a requested size onto [`MRL_DIMENSIONS`].
///
/// Values outside the table clamp to its ends; values in between round to the
/// nearest entry, with ties going to the larger size.
#[must_use]
pub fn mrl_target(requested: usize) -> usize {
    let (min, max) = (MRL_DIMENSIONS[0], MRL_DIMENSIONS[MRL_DIMENSIONS.len() - 1]);
    if requested <= min {
        return min;
    }
    if requested >= max {
        return max;
    }
    let mut best = min;
    for candidate in MRL_DIMENSIONS {
        if requested.abs_diff(candidate) <= requested.abs_diff(best) {
            best = candidate;
        }
    }
    best
}

/// Truncate `vector` to the MRL size closest to `requested`.
#[must_use]
pub fn apply_mrl(mut vector: Vec<f32>, requested: usize) -> Vec<f32> {
    let dim = mrl_target(requested).min(vector.len());
    vector.truncate(dim);
    vector
}

/// Scale `vector` to unit length in place. A zero vector is left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_clamps_and_rounds() {
        assert_eq!(mrl_target(1), 64);
        assert_eq!(mrl_target(64), 64);
        assert_eq!(mrl_target(100), 128);
        assert_eq!(mrl_target(96), 128);
        assert_eq!(mrl_target(300), 256);
        assert_eq!(mrl_target(400), 512);
        assert_eq!(mrl_target(768), 768);
        assert_eq!(mrl_target(4096), 768);
    }

    #[test]
    fn apply_mrl_never_exceeds_input() {
        let v = vec![1.0; 100];
        assert_eq!(apply_mrl(v, 256).len(), 100);
        let v = vec![1.0; 768];
        assert_eq!(apply_mrl(v, 256).len(), 256);
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_noop() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
