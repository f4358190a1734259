use super::{Net, NetOutputs, ACCURACY, LOSS};
use crate::batch::{Batch, Phase};
use crate::blob::Blob;
use crate::error::NetsolveError;
use crate::init;
use log::debug;
use rand::Rng;

/// A fully connected layer: `y = x W^T + b`, `W` stored `[out, in]`.
#[derive(Debug, Clone)]
struct InnerProduct {
    weight: Blob,
    bias: Blob,
}

impl InnerProduct {
    fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Result<Self, NetsolveError> {
        let mut weight = Blob::new(vec![out_features, in_features]);
        init::xavier_uniform(&mut weight, in_features, out_features, rng)?;
        let bias = Blob::new(vec![out_features]);
        Ok(InnerProduct { weight, bias })
    }

    fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    fn forward(&self, x: &[f32], n: usize) -> Vec<f32> {
        let (d_in, d_out) = (self.in_features(), self.out_features());
        let w = self.weight.data();
        let b = self.bias.data();
        let mut y = vec![0.0f32; n * d_out];
        for i in 0..n {
            let row = &x[i * d_in..(i + 1) * d_in];
            for o in 0..d_out {
                let w_row = &w[o * d_in..(o + 1) * d_in];
                let dot: f32 = row.iter().zip(w_row).map(|(a, b)| a * b).sum();
                y[i * d_out + o] = dot + b[o];
            }
        }
        y
    }

    /// Writes parameter gradients and returns the gradient w.r.t. the input.
    fn backward(&mut self, x: &[f32], delta: &[f32], n: usize, need_input_grad: bool) -> Option<Vec<f32>> {
        let (d_in, d_out) = (self.in_features(), self.out_features());

        let dw = self.weight.diff_mut();
        dw.fill(0.0);
        for i in 0..n {
            let row = &x[i * d_in..(i + 1) * d_in];
            for o in 0..d_out {
                let g = delta[i * d_out + o];
                if g == 0.0 {
                    continue;
                }
                for (dw_v, x_v) in dw[o * d_in..(o + 1) * d_in].iter_mut().zip(row) {
                    *dw_v += g * x_v;
                }
            }
        }

        let db = self.bias.diff_mut();
        db.fill(0.0);
        for i in 0..n {
            for o in 0..d_out {
                db[o] += delta[i * d_out + o];
            }
        }

        if !need_input_grad {
            return None;
        }
        let w = self.weight.data();
        let mut dx = vec![0.0f32; n * d_in];
        for i in 0..n {
            for o in 0..d_out {
                let g = delta[i * d_out + o];
                if g == 0.0 {
                    continue;
                }
                for (dx_v, w_v) in dx[i * d_in..(i + 1) * d_in].iter_mut().zip(&w[o * d_in..(o + 1) * d_in]) {
                    *dx_v += g * w_v;
                }
            }
        }
        Some(dx)
    }
}

/// Everything backward needs from the last train-phase forward.
#[derive(Debug, Clone)]
struct ForwardCache {
    num: usize,
    /// Input of every layer; `activations[0]` is the flattened batch.
    activations: Vec<Vec<f32>>,
    probs: Vec<f32>,
    labels: Vec<usize>,
}

/// Reference network runtime: flatten, `(InnerProduct, ReLU)*`,
/// InnerProduct, SoftmaxWithLoss, plus a top-1 Accuracy output.
///
/// Gradients are closed form. This is the stand-in for an external runtime,
/// not a general graph engine.
#[derive(Debug, Clone)]
pub struct DenseNet {
    input_shape: Vec<usize>,
    layers: Vec<InnerProduct>,
    loss_weight: f32,
    loss_diff: f32,
    cache: Option<ForwardCache>,
    last_phase: Option<Phase>,
}

impl DenseNet {
    /// Builds the net. `hidden` lists the widths of the hidden layers, which
    /// may be empty for plain softmax regression.
    ///
    /// # Errors
    /// `ConfigurationError` for a zero-sized input, hidden layer, or class count.
    pub fn new<R: Rng + ?Sized>(
        input_shape: &[usize],
        hidden: &[usize],
        num_classes: usize,
        rng: &mut R,
    ) -> Result<Self, NetsolveError> {
        if input_shape.len() != 3 {
            return Err(NetsolveError::DimensionMismatch {
                expected: 3,
                actual: input_shape.len(),
            });
        }
        let input_dim: usize = input_shape.iter().product();
        if input_dim == 0 || num_classes == 0 || hidden.contains(&0) {
            return Err(NetsolveError::ConfigurationError(format!(
                "DenseNet: sizes must be positive (input {:?}, hidden {:?}, classes {})",
                input_shape, hidden, num_classes
            )));
        }

        let mut widths = Vec::with_capacity(hidden.len() + 2);
        widths.push(input_dim);
        widths.extend_from_slice(hidden);
        widths.push(num_classes);

        let layers = widths
            .windows(2)
            .map(|w| InnerProduct::new(w[0], w[1], rng))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("DenseNet: layer widths {:?}", widths);

        Ok(DenseNet {
            input_shape: input_shape.to_vec(),
            layers,
            loss_weight: 1.0,
            loss_diff: 1.0,
            cache: None,
            last_phase: None,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map(|l| l.out_features()).unwrap_or(0)
    }

    /// Overrides the weight of the `loss` output (defaults to 1).
    pub fn set_loss_weight(&mut self, weight: f32) {
        self.loss_weight = weight;
    }

    fn check_labels(&self, labels: &[f32]) -> Result<Vec<usize>, NetsolveError> {
        let k = self.num_classes();
        labels
            .iter()
            .enumerate()
            .map(|(i, &l)| {
                if l.is_finite() && l.fract() == 0.0 && l >= 0.0 && (l as usize) < k {
                    Ok(l as usize)
                } else {
                    Err(NetsolveError::IndexOutOfBounds {
                        index: i,
                        len: k,
                        context: format!("label {} is not a class index", l),
                    })
                }
            })
            .collect()
    }
}

fn relu_inplace(values: &mut [f32]) {
    for v in values {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

fn softmax_rows(logits: &mut [f32], k: usize) {
    for row in logits.chunks_mut(k) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

impl Net for DenseNet {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn forward(&mut self, batch: &Batch, phase: Phase) -> Result<NetOutputs, NetsolveError> {
        if batch.sample_shape() != self.input_shape.as_slice() {
            return Err(NetsolveError::shape(
                &self.input_shape,
                batch.sample_shape(),
                "DenseNet::forward",
            ));
        }
        let n = batch.num();
        if n == 0 {
            return Err(NetsolveError::shape(&[1], &[0], "DenseNet::forward (empty batch)"));
        }
        let labels = self.check_labels(&batch.labels)?;

        let last = self.layers.len() - 1;
        let mut activations = Vec::with_capacity(self.layers.len());
        let mut x = batch.data.data().to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            let mut y = layer.forward(&x, n);
            if i != last {
                relu_inplace(&mut y);
            }
            activations.push(std::mem::replace(&mut x, y));
        }

        let k = self.num_classes();
        let mut probs = x;
        softmax_rows(&mut probs, k);

        let mut loss = 0.0f32;
        let mut correct = 0usize;
        for (i, &label) in labels.iter().enumerate() {
            let row = &probs[i * k..(i + 1) * k];
            loss -= row[label].max(f32::MIN_POSITIVE).ln();
            if argmax(row) == label {
                correct += 1;
            }
        }
        let loss = loss / n as f32;
        let accuracy = correct as f32 / n as f32;

        self.last_phase = Some(phase);
        self.loss_diff = self.loss_weight;
        self.cache = match phase {
            Phase::Train => Some(ForwardCache {
                num: n,
                activations,
                probs,
                labels,
            }),
            Phase::Test => None,
        };

        let mut outputs = NetOutputs::new();
        outputs.insert(LOSS, loss);
        outputs.insert(ACCURACY, accuracy);
        Ok(outputs)
    }

    fn loss_weights(&self) -> Vec<(String, f32)> {
        vec![(LOSS.to_string(), self.loss_weight)]
    }

    fn set_output_diff(&mut self, name: &str, value: f32) -> Result<(), NetsolveError> {
        if name != LOSS {
            return Err(NetsolveError::UnknownOutput(format!(
                "{} (not a differentiable output)",
                name
            )));
        }
        self.loss_diff = value;
        Ok(())
    }

    fn backward(&mut self) -> Result<(), NetsolveError> {
        if self.last_phase == Some(Phase::Test) {
            return Err(NetsolveError::PhaseError {
                operation: "backward".to_string(),
                phase: Phase::Test.to_string(),
            });
        }
        let cache = self.cache.take().ok_or(NetsolveError::BackwardBeforeForward)?;
        let n = cache.num;
        let k = self.num_classes();

        // d(mean CE)/d(logits) = (p - onehot) / n, scaled by the seeded diff.
        let scale = self.loss_diff / n as f32;
        let mut delta = cache.probs;
        for (i, &label) in cache.labels.iter().enumerate() {
            delta[i * k + label] -= 1.0;
        }
        for d in delta.iter_mut() {
            *d *= scale;
        }

        for i in (0..self.layers.len()).rev() {
            let input = &cache.activations[i];
            let dx = self.layers[i].backward(input, &delta, n, i > 0);
            if let Some(mut dx) = dx {
                // The input of layer i is the ReLU output of layer i - 1.
                for (g, &a) in dx.iter_mut().zip(input) {
                    if a <= 0.0 {
                        *g = 0.0;
                    }
                }
                delta = dx;
            }
        }
        Ok(())
    }

    fn learnable_params(&self) -> Vec<(String, &Blob)> {
        let mut params = Vec::with_capacity(self.layers.len() * 2);
        for (i, layer) in self.layers.iter().enumerate() {
            params.push((format!("ip{}.weight", i + 1), &layer.weight));
            params.push((format!("ip{}.bias", i + 1), &layer.bias));
        }
        params
    }

    fn learnable_params_mut(&mut self) -> Vec<&mut Blob> {
        self.layers
            .iter_mut()
            .flat_map(|l| [&mut l.weight, &mut l.bias])
            .collect()
    }
}

#[cfg(test)]
#[path = "dense_test.rs"]
mod tests;
