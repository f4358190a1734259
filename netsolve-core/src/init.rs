use crate::blob::Blob;
use crate::error::NetsolveError;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

/// Fills the blob's values with `value`.
pub fn constant(blob: &mut Blob, value: f32) {
    blob.data_mut().fill(value);
}

/// Glorot/Xavier uniform init: `U(-a, a)` with `a = sqrt(6 / (fan_in + fan_out))`.
///
/// # Errors
/// `ConfigurationError` if both fans are zero.
pub fn xavier_uniform<R: Rng + ?Sized>(
    blob: &mut Blob,
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Result<(), NetsolveError> {
    if fan_in + fan_out == 0 {
        return Err(NetsolveError::ConfigurationError(
            "xavier_uniform: fan_in + fan_out must be positive".to_string(),
        ));
    }
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let dist = Uniform::new_inclusive(-bound, bound);
    for v in blob.data_mut() {
        *v = dist.sample(rng);
    }
    Ok(())
}

/// Zero-mean gaussian init with the given standard deviation.
pub fn gaussian<R: Rng + ?Sized>(blob: &mut Blob, std: f32, rng: &mut R) -> Result<(), NetsolveError> {
    if !(std >= 0.0 && std.is_finite()) {
        return Err(NetsolveError::ConfigurationError(format!(
            "gaussian init: std must be finite and >= 0, got {}",
            std
        )));
    }
    let dist = Normal::new(0.0f32, std)
        .map_err(|e| NetsolveError::ConfigurationError(format!("gaussian init: {}", e)))?;
    for v in blob.data_mut() {
        *v = dist.sample(rng);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_constant() {
        let mut blob = Blob::new(vec![3]);
        constant(&mut blob, 0.2);
        assert_eq!(blob.data(), &[0.2, 0.2, 0.2]);
    }

    #[test]
    fn test_xavier_uniform_bounds_and_seed() {
        let mut a = Blob::new(vec![10, 20]);
        let mut b = Blob::new(vec![10, 20]);
        xavier_uniform(&mut a, 20, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        xavier_uniform(&mut b, 20, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        let bound = (6.0f32 / 30.0).sqrt();
        assert!(a.data().iter().all(|v| v.abs() <= bound));
        assert!(a.data().iter().any(|&v| v != 0.0));
        assert_eq!(a, b, "same seed must give the same weights");
    }

    #[test]
    fn test_xavier_uniform_zero_fans() {
        let mut blob = Blob::new(vec![1]);
        let result = xavier_uniform(&mut blob, 0, 0, &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(NetsolveError::ConfigurationError(_))));
    }

    #[test]
    fn test_gaussian_rejects_negative_std() {
        let mut blob = Blob::new(vec![4]);
        assert!(matches!(
            gaussian(&mut blob, -1.0, &mut StdRng::seed_from_u64(0)),
            Err(NetsolveError::ConfigurationError(_))
        ));
        assert!(gaussian(&mut blob, f32::NAN, &mut StdRng::seed_from_u64(0)).is_err());
        gaussian(&mut blob, 0.01, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(blob.data().iter().all(|v| v.abs() < 0.1));
    }
}
