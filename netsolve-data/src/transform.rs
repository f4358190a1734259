use crate::datum::Datum;
use netsolve_core::NetsolveError;

/// Mean offset subtracted from every value before scaling.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MeanSubtraction {
    #[default]
    None,
    /// The same offset for every channel (a constant pixel mean).
    Constant(f32),
    /// One offset per channel.
    PerChannel(Vec<f32>),
}

impl MeanSubtraction {
    /// Empty list means no subtraction, a single value a constant offset,
    /// and anything longer one offset per channel.
    pub fn from_values(values: &[f32]) -> Self {
        match values {
            [] => MeanSubtraction::None,
            [v] => MeanSubtraction::Constant(*v),
            vs => MeanSubtraction::PerChannel(vs.to_vec()),
        }
    }
}

/// Turns a decoded [`Datum`] into network input: `(x - mean) * scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct DatumTransform {
    pub mean: MeanSubtraction,
    pub scale: f32,
}

impl Default for DatumTransform {
    fn default() -> Self {
        DatumTransform {
            mean: MeanSubtraction::None,
            scale: 1.0,
        }
    }
}

impl DatumTransform {
    pub fn new(mean: MeanSubtraction, scale: f32) -> Self {
        DatumTransform { mean, scale }
    }

    pub fn apply(&self, datum: &Datum) -> Result<Vec<f32>, NetsolveError> {
        let shape = datum.shape()?;
        let mut values = datum.values()?;
        self.apply_in_place(&mut values, shape)?;
        Ok(values)
    }

    /// Transforms values laid out `[c, h, w]`.
    pub fn apply_in_place(&self, values: &mut [f32], shape: [usize; 3]) -> Result<(), NetsolveError> {
        let [channels, height, width] = shape;
        let plane = height * width;
        match &self.mean {
            MeanSubtraction::None => {
                for v in values.iter_mut() {
                    *v *= self.scale;
                }
            }
            MeanSubtraction::Constant(mean) => {
                for v in values.iter_mut() {
                    *v = (*v - mean) * self.scale;
                }
            }
            MeanSubtraction::PerChannel(means) => {
                if means.len() != channels {
                    return Err(NetsolveError::shape(
                        &[channels],
                        &[means.len()],
                        "DatumTransform (per-channel mean)",
                    ));
                }
                if plane == 0 {
                    return Ok(());
                }
                for (c, chunk) in values.chunks_mut(plane).enumerate() {
                    let mean = means[c];
                    for v in chunk {
                        *v = (*v - mean) * self.scale;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_values() {
        assert_eq!(MeanSubtraction::from_values(&[]), MeanSubtraction::None);
        assert_eq!(MeanSubtraction::from_values(&[128.0]), MeanSubtraction::Constant(128.0));
        assert_eq!(
            MeanSubtraction::from_values(&[104.0, 117.0, 123.0]),
            MeanSubtraction::PerChannel(vec![104.0, 117.0, 123.0])
        );
    }

    #[test]
    fn test_constant_mean_and_scale() {
        let datum = Datum::from_pixels(1, 1, 3, vec![0, 128, 255], 0);
        let transform = DatumTransform::new(MeanSubtraction::Constant(128.0), 1.0 / 128.0);
        let values = transform.apply(&datum).unwrap();
        assert_relative_eq!(values[0], -1.0);
        assert_relative_eq!(values[1], 0.0);
        assert_relative_eq!(values[2], 127.0 / 128.0);
    }

    #[test]
    fn test_scale_only() {
        let datum = Datum::from_pixels(1, 1, 2, vec![0, 255], 0);
        let transform = DatumTransform::new(MeanSubtraction::None, 0.00390625);
        let values = transform.apply(&datum).unwrap();
        assert_relative_eq!(values[1], 255.0 / 256.0);
    }

    #[test]
    fn test_per_channel_mean() {
        let datum = Datum::from_pixels(2, 1, 2, vec![10, 20, 30, 40], 0);
        let transform = DatumTransform::new(MeanSubtraction::PerChannel(vec![10.0, 30.0]), 1.0);
        assert_eq!(transform.apply(&datum).unwrap(), vec![0.0, 10.0, 0.0, 10.0]);

        let wrong = DatumTransform::new(MeanSubtraction::PerChannel(vec![1.0, 2.0, 3.0]), 1.0);
        assert!(matches!(wrong.apply(&datum), Err(NetsolveError::ShapeMismatch { .. })));
    }
}
