use crate::error::NetsolveError;
use crate::net::Net;
use log::debug;

/// Hand-written stochastic gradient descent over a net's learnable blobs.
///
/// For every parameter:
///
/// ```text
/// g = diff + weight_decay * data
/// v = momentum * v + lr * g
/// data -= v
/// ```
///
/// With `momentum = 0` and `weight_decay = 0` this is exactly
/// `param -= lr * grad`, and no history is kept.
#[derive(Debug, Clone, Default)]
pub struct SgdUpdate {
    momentum: f32,
    weight_decay: f32,
    // One buffer per learnable blob, in `learnable_params_mut` order.
    history: Vec<Vec<f32>>,
}

impl SgdUpdate {
    /// Creates the plain `param -= lr * grad` rule.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_momentum(momentum: f32, weight_decay: f32) -> Result<Self, NetsolveError> {
        if !(0.0..1.0).contains(&momentum) {
            return Err(NetsolveError::ConfigurationError(format!(
                "momentum must be in [0, 1), got {}",
                momentum
            )));
        }
        if weight_decay < 0.0 || !weight_decay.is_finite() {
            return Err(NetsolveError::ConfigurationError(format!(
                "weight_decay must be >= 0, got {}",
                weight_decay
            )));
        }
        Ok(SgdUpdate {
            momentum,
            weight_decay,
            history: Vec::new(),
        })
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }

    /// Applies one update with learning rate `lr` using the diffs left by the
    /// last backward pass.
    ///
    /// # Errors
    /// `ShapeMismatch` if the net's parameter layout changed since the
    /// momentum history was created.
    pub fn apply<N: Net + ?Sized>(&mut self, net: &mut N, lr: f32) -> Result<(), NetsolveError> {
        let params = net.learnable_params_mut();

        if self.momentum == 0.0 {
            for param in params {
                let (data, diff) = param.data_and_diff_mut();
                if self.weight_decay == 0.0 {
                    for (w, g) in data.iter_mut().zip(diff) {
                        *w -= lr * g;
                    }
                } else {
                    for (w, g) in data.iter_mut().zip(diff) {
                        *w -= lr * (g + self.weight_decay * *w);
                    }
                }
            }
            debug!("SgdUpdate: applied plain step with lr = {}", lr);
            return Ok(());
        }

        if self.history.is_empty() {
            self.history = params.iter().map(|p| vec![0.0; p.count()]).collect();
        }
        let counts: Vec<usize> = params.iter().map(|p| p.count()).collect();
        let history_counts: Vec<usize> = self.history.iter().map(Vec::len).collect();
        if counts != history_counts {
            return Err(NetsolveError::shape(&history_counts, &counts, "SgdUpdate::apply (momentum history)"));
        }

        for (param, v) in params.into_iter().zip(self.history.iter_mut()) {
            let (data, diff) = param.data_and_diff_mut();
            for ((w, g), h) in data.iter_mut().zip(diff).zip(v.iter_mut()) {
                let grad = g + self.weight_decay * *w;
                *h = self.momentum * *h + lr * grad;
                *w -= *h;
            }
        }
        debug!("SgdUpdate: applied momentum step with lr = {}", lr);
        Ok(())
    }

    /// Drops the momentum history.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

/// Clears the gradient buffer of every learnable blob.
pub fn zero_diffs<N: Net + ?Sized>(net: &mut N) {
    for param in net.learnable_params_mut() {
        param.zero_diff();
    }
}

#[cfg(test)]
#[path = "sgd_test.rs"]
mod tests;
