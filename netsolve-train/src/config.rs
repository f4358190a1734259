use netsolve_core::optim::{LrPolicy, LrSchedule, SgdUpdate};
use netsolve_core::{DenseNet, NetsolveError};
use netsolve_data::{BatchLoader, DatumTransform, ExhaustionPolicy, MeanSubtraction, RecordSource};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Solver settings, read from a TOML file.
///
/// Missing keys take their [`Default`] values, which describe the classic
/// MNIST setup: `base_lr = 0.01` with inverse-time decay
/// (`gamma = 1e-4`, `power = 0.75`), batches of 64, pixels scaled by 1/256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub base_lr: f32,
    pub lr_policy: LrPolicy,
    pub momentum: f32,
    pub weight_decay: f32,
    /// Stop after this many updates; 0 means no limit.
    pub max_iter: usize,
    pub epochs: usize,
    /// Log training outputs every `display` updates; 0 disables.
    pub display: usize,
    /// Evaluate every `test_interval` updates; 0 disables.
    pub test_interval: usize,
    /// Batches per evaluation.
    pub test_iter: usize,
    pub test_on_epoch_end: bool,
    /// Write a snapshot every `snapshot` updates; 0 disables.
    pub snapshot: usize,
    pub snapshot_prefix: String,
    pub random_seed: u64,
    pub batch_size: usize,
    pub test_batch_size: usize,
    /// Wrap the training source around instead of ending the epoch.
    /// Requires `max_iter`.
    pub rewind_train_source: bool,
    pub train_source: Option<PathBuf>,
    pub test_source: Option<PathBuf>,
    /// Empty: no mean; one value: constant pixel mean; otherwise per channel.
    pub mean_value: Vec<f32>,
    pub scale: f32,
    pub input_shape: [usize; 3],
    pub hidden_layers: Vec<usize>,
    pub num_classes: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            base_lr: 0.01,
            lr_policy: LrPolicy::default(),
            momentum: 0.0,
            weight_decay: 0.0,
            max_iter: 0,
            epochs: 1,
            display: 100,
            test_interval: 500,
            test_iter: 100,
            test_on_epoch_end: true,
            snapshot: 0,
            snapshot_prefix: "snapshots/net".to_string(),
            random_seed: 1701,
            batch_size: 64,
            test_batch_size: 100,
            rewind_train_source: false,
            train_source: None,
            test_source: None,
            mean_value: Vec::new(),
            scale: 0.00390625,
            input_shape: [1, 28, 28],
            hidden_layers: vec![100],
            num_classes: 10,
        }
    }
}

impl SolverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, NetsolveError> {
        let config: SolverConfig =
            toml::from_str(text).map_err(|e| NetsolveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NetsolveError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NetsolveError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, NetsolveError> {
        toml::to_string(self).map_err(|e| NetsolveError::Serialization(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NetsolveError> {
        let bad = |msg: String| Err(NetsolveError::ConfigurationError(msg));
        if !(self.base_lr > 0.0 && self.base_lr.is_finite()) {
            return bad(format!("base_lr must be positive, got {}", self.base_lr));
        }
        self.lr_policy.validate()?;
        if !(0.0..1.0).contains(&self.momentum) {
            return bad(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        if self.weight_decay < 0.0 {
            return bad(format!("weight_decay must be >= 0, got {}", self.weight_decay));
        }
        if self.batch_size == 0 || self.test_batch_size == 0 {
            return bad("batch_size and test_batch_size must be positive".to_string());
        }
        if self.epochs == 0 {
            return bad("epochs must be at least 1".to_string());
        }
        if self.test_interval > 0 && self.test_iter == 0 {
            return bad("test_interval is set but test_iter is 0".to_string());
        }
        if self.rewind_train_source && self.max_iter == 0 {
            return bad("rewind_train_source needs max_iter to terminate".to_string());
        }
        if !self.scale.is_finite() {
            return bad(format!("scale must be finite, got {}", self.scale));
        }
        if self.num_classes == 0 || self.input_shape.contains(&0) {
            return bad("input_shape and num_classes must be non-empty".to_string());
        }
        if self.mean_value.len() > 1 && self.mean_value.len() != self.input_shape[0] {
            return bad(format!(
                "{} mean values for {} channels",
                self.mean_value.len(),
                self.input_shape[0]
            ));
        }
        Ok(())
    }

    pub fn transform(&self) -> DatumTransform {
        DatumTransform::new(MeanSubtraction::from_values(&self.mean_value), self.scale)
    }

    pub fn schedule(&self) -> Result<LrSchedule, NetsolveError> {
        LrSchedule::new(self.base_lr, self.lr_policy.clone())
    }

    pub fn sgd(&self) -> Result<SgdUpdate, NetsolveError> {
        SgdUpdate::with_momentum(self.momentum, self.weight_decay)
    }

    /// The reference dense classifier, initialized from `random_seed`.
    pub fn build_net(&self) -> Result<DenseNet, NetsolveError> {
        let mut rng = StdRng::seed_from_u64(self.random_seed);
        DenseNet::new(&self.input_shape, &self.hidden_layers, self.num_classes, &mut rng)
    }

    pub fn train_loader<S: RecordSource>(&self, source: S) -> Result<BatchLoader<S>, NetsolveError> {
        let policy = if self.rewind_train_source {
            ExhaustionPolicy::Rewind
        } else {
            ExhaustionPolicy::Stop
        };
        BatchLoader::new(source, self.batch_size, self.input_shape, self.transform(), policy)
    }

    pub fn test_loader<S: RecordSource>(&self, source: S) -> Result<BatchLoader<S>, NetsolveError> {
        BatchLoader::new(
            source,
            self.test_batch_size,
            self.input_shape,
            self.transform(),
            ExhaustionPolicy::Stop,
        )
    }
}
