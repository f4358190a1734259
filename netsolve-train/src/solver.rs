//! # Solver
//!
//! The hand-written training loop: forward, seed the loss gradients,
//! backward, then apply `param -= lr * grad` with a learning rate taken from
//! the configured policy. The iteration counter lives in the [`LrSchedule`]
//! and is shared across epochs, so the decay continues where the previous
//! epoch stopped.

use crate::config::SolverConfig;
use crate::eval::{evaluate, EvalReport};
use crate::snapshot;
use log::{debug, info, warn};
use netsolve_core::optim::{LrSchedule, SgdUpdate};
use netsolve_core::{Batch, Net, NetOutputs, NetsolveError, Phase};
use netsolve_data::{BatchLoader, ExhaustionPolicy, RecordSource};
use std::path::{Path, PathBuf};

/// Result of a single update.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Iteration number of this update, starting at 1.
    pub iter: usize,
    pub lr: f32,
    /// Weighted sum of the loss outputs.
    pub loss: f32,
    pub outputs: NetOutputs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub steps: usize,
    pub mean_loss: f32,
    pub last_iter: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveSummary {
    pub iter: usize,
    pub epochs: usize,
    pub last_loss: Option<f32>,
    pub evaluations: Vec<EvalReport>,
}

pub struct Solver<N: Net, S: RecordSource, T: RecordSource = S> {
    net: N,
    train: BatchLoader<S>,
    test: Option<BatchLoader<T>>,
    config: SolverConfig,
    schedule: LrSchedule,
    sgd: SgdUpdate,
    evaluations: Vec<EvalReport>,
    last_loss: Option<f32>,
    last_snapshot: Option<usize>,
}

impl<N: Net, S: RecordSource, T: RecordSource> Solver<N, S, T> {
    /// # Errors
    /// `ConfigurationError` for an invalid config or a rewinding train loader
    /// without `max_iter`; `ShapeMismatch` if a loader's samples do not fit
    /// the net's input.
    pub fn new(
        net: N,
        train: BatchLoader<S>,
        test: Option<BatchLoader<T>>,
        config: SolverConfig,
    ) -> Result<Self, NetsolveError> {
        config.validate()?;
        if train.policy() == ExhaustionPolicy::Rewind && config.max_iter == 0 {
            return Err(NetsolveError::ConfigurationError(
                "a rewinding train loader never ends; set max_iter".to_string(),
            ));
        }
        check_input(&net, &train.sample_shape(), "Solver (train loader)")?;
        if let Some(test) = &test {
            check_input(&net, &test.sample_shape(), "Solver (test loader)")?;
        }
        let schedule = config.schedule()?;
        let sgd = config.sgd()?;
        Ok(Solver {
            net,
            train,
            test,
            config,
            schedule,
            sgd,
            evaluations: Vec::new(),
            last_loss: None,
            last_snapshot: None,
        })
    }

    pub fn net(&self) -> &N {
        &self.net
    }

    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn into_net(self) -> N {
        self.net
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Updates performed so far.
    pub fn iter(&self) -> usize {
        self.schedule.iter()
    }

    pub fn evaluations(&self) -> &[EvalReport] {
        &self.evaluations
    }

    fn reached_max_iter(&self) -> bool {
        self.config.max_iter > 0 && self.schedule.iter() >= self.config.max_iter
    }

    /// One training step on `batch`.
    pub fn step(&mut self, batch: &Batch) -> Result<StepReport, NetsolveError> {
        let outputs = self.net.forward(batch, Phase::Train)?;

        let mut loss = 0.0f32;
        for (name, weight) in self.net.loss_weights() {
            loss += weight * outputs.require(&name)?;
            self.net.set_output_diff(&name, weight)?;
        }
        self.net.backward()?;

        // The counter only moves once the update went through.
        let lr = self.schedule.next_rate();
        self.sgd.apply(&mut self.net, lr)?;
        self.schedule.step();
        let iter = self.schedule.iter();
        self.last_loss = Some(loss);
        debug!("Iteration {}: lr = {:e}, loss = {}", iter, lr, loss);

        if self.config.display > 0 && iter % self.config.display == 0 {
            info!("Iteration {}, lr = {:e}, loss = {:.6}", iter, lr, loss);
            for (name, value) in outputs.iter() {
                info!("    Train net output: {} = {:.6}", name, value);
            }
        }
        Ok(StepReport { iter, lr, loss, outputs })
    }

    /// Evaluates on the test loader, if there is one, and records the result.
    pub fn test(&mut self) -> Result<Option<EvalReport>, NetsolveError> {
        let loader = match self.test.as_mut() {
            Some(loader) => loader,
            None => return Ok(None),
        };
        let mut report = match evaluate(&mut self.net, loader, self.config.test_iter) {
            Ok(report) => report,
            Err(NetsolveError::EmptyEvaluation) => {
                warn!("Iteration {}: test source produced no batch", self.schedule.iter());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        report.iter = self.schedule.iter();
        info!(
            "Iteration {}, Testing net ({} batches): accuracy = {:.4}, loss = {:.6}",
            report.iter, report.batches, report.mean_accuracy, report.mean_loss
        );
        self.evaluations.push(report.clone());
        Ok(Some(report))
    }

    pub fn snapshot(&mut self) -> Result<PathBuf, NetsolveError> {
        let iter = self.schedule.iter();
        let path = snapshot::save(&self.net, iter, &self.config.snapshot_prefix)?;
        self.last_snapshot = Some(iter);
        Ok(path)
    }

    /// Loads parameters from a snapshot and resumes the iteration counter.
    ///
    /// Momentum history is cleared.
    pub fn restore(&mut self, path: impl AsRef<Path>) -> Result<usize, NetsolveError> {
        let iter = snapshot::restore(&mut self.net, path)?;
        self.schedule.set_iter(iter);
        self.sgd.reset();
        self.last_snapshot = Some(iter);
        Ok(iter)
    }

    /// One pass over the train loader, stopping early at `max_iter`.
    pub fn train_epoch(&mut self) -> Result<EpochReport, NetsolveError> {
        self.train.reset()?;
        let mut steps = 0usize;
        let mut loss_sum = 0.0f64;

        while !self.reached_max_iter() {
            let batch = match self.train.next_batch()? {
                Some(batch) => batch,
                None => break,
            };
            let report = self.step(&batch)?;
            steps += 1;
            loss_sum += report.loss as f64;

            if self.config.test_interval > 0 && report.iter % self.config.test_interval == 0 {
                self.test()?;
            }
            if self.config.snapshot > 0 && report.iter % self.config.snapshot == 0 {
                self.snapshot()?;
            }
        }

        Ok(EpochReport {
            steps,
            mean_loss: if steps > 0 { (loss_sum / steps as f64) as f32 } else { 0.0 },
            last_iter: self.schedule.iter(),
        })
    }

    /// Runs `epochs` epochs or until `max_iter`, whichever comes first.
    pub fn solve(&mut self) -> Result<SolveSummary, NetsolveError> {
        info!(
            "Solving: {} learnable parameters, base_lr = {}, {:?}",
            self.net.num_params(),
            self.config.base_lr,
            self.config.lr_policy
        );
        let mut epochs = 0usize;
        for epoch in 1..=self.config.epochs {
            if self.reached_max_iter() {
                break;
            }
            let report = self.train_epoch()?;
            if report.steps == 0 {
                warn!("Epoch {}: train source produced no full batch", epoch);
                break;
            }
            epochs += 1;
            info!(
                "Epoch {} done: {} iterations, mean loss = {:.6}",
                epoch, report.steps, report.mean_loss
            );

            let tested_now = self
                .evaluations
                .last()
                .map_or(false, |e| e.iter == report.last_iter);
            if self.config.test_on_epoch_end && !tested_now {
                self.test()?;
            }
        }

        let iter = self.schedule.iter();
        if self.config.snapshot > 0 && iter > 0 && self.last_snapshot != Some(iter) {
            self.snapshot()?;
        }
        info!("Optimization done after {} iterations", iter);
        Ok(SolveSummary {
            iter,
            epochs,
            last_loss: self.last_loss,
            evaluations: self.evaluations.clone(),
        })
    }
}

fn check_input<N: Net + ?Sized>(net: &N, sample_shape: &[usize; 3], operation: &str) -> Result<(), NetsolveError> {
    if net.input_shape() != sample_shape.as_slice() {
        return Err(NetsolveError::shape(net.input_shape(), sample_shape, operation));
    }
    Ok(())
}

#[cfg(test)]
#[path = "solver_test.rs"]
mod tests;
