//! Test-phase evaluation over a batch loader.

use log::warn;
use netsolve_core::net::{ACCURACY, LOSS};
use netsolve_core::{Net, NetsolveError, Phase};
use netsolve_data::{BatchLoader, RecordSource};
use serde::{Deserialize, Serialize};

/// Means of the test outputs over the batches that were actually run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Training iteration the evaluation was taken at.
    pub iter: usize,
    pub batches: usize,
    pub mean_accuracy: f32,
    pub mean_loss: f32,
}

/// Runs up to `max_batches` test-phase forward passes from the start of the
/// loader's source.
///
/// The means divide by the number of batches consumed, which is smaller than
/// `max_batches` when the source ends early. `iter` is left at 0 for the
/// caller to fill in.
///
/// # Errors
/// `EmptyEvaluation` if no batch could be run; any forward or loader error.
pub fn evaluate<N, S>(
    net: &mut N,
    loader: &mut BatchLoader<S>,
    max_batches: usize,
) -> Result<EvalReport, NetsolveError>
where
    N: Net + ?Sized,
    S: RecordSource,
{
    loader.reset()?;
    let mut batches = 0usize;
    let mut accuracy_sum = 0.0f64;
    let mut loss_sum = 0.0f64;

    while batches < max_batches {
        let batch = match loader.next_batch()? {
            Some(batch) => batch,
            None => break,
        };
        let outputs = net.forward(&batch, Phase::Test)?;
        accuracy_sum += outputs.require(ACCURACY)? as f64;
        loss_sum += outputs.require(LOSS)? as f64;
        batches += 1;
    }

    if batches == 0 {
        return Err(NetsolveError::EmptyEvaluation);
    }
    if batches < max_batches {
        warn!(
            "Test source ended after {} of {} requested batches",
            batches, max_batches
        );
    }
    Ok(EvalReport {
        iter: 0,
        batches,
        mean_accuracy: (accuracy_sum / batches as f64) as f32,
        mean_loss: (loss_sum / batches as f64) as f32,
    })
}
