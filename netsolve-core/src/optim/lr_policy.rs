use crate::error::NetsolveError;
use serde::{Deserialize, Serialize};

/// Learning-rate policies, as a function of the global iteration counter.
///
/// `iter` is 1-based: the first update of a run uses `iter = 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LrPolicy {
    /// `base_lr`
    Fixed,
    /// Inverse-time decay: `base_lr * (1 + gamma * iter)^(-power)`
    Inv { gamma: f32, power: f32 },
    /// `base_lr * gamma^(floor(iter / stepsize))`
    Step { gamma: f32, stepsize: usize },
    /// `base_lr * gamma^iter`
    Exp { gamma: f32 },
    /// Like `Step`, but decays once each listed iteration is reached.
    #[serde(rename = "multistep")]
    MultiStep { gamma: f32, stepvalue: Vec<usize> },
    /// `base_lr * (1 - iter / max_iter)^power`, zero past `max_iter`
    Poly { power: f32, max_iter: usize },
    /// `base_lr / (1 + exp(-gamma * (iter - stepsize)))`
    Sigmoid { gamma: f32, stepsize: usize },
}

impl Default for LrPolicy {
    fn default() -> Self {
        LrPolicy::Inv {
            gamma: 1e-4,
            power: 0.75,
        }
    }
}

impl LrPolicy {
    /// Learning rate to use for update number `iter`.
    pub fn rate(&self, base_lr: f32, iter: usize) -> f32 {
        let base = base_lr as f64;
        let it = iter as f64;
        let lr = match self {
            LrPolicy::Fixed => base,
            LrPolicy::Inv { gamma, power } => {
                base * (1.0 + *gamma as f64 * it).powf(-(*power as f64))
            }
            LrPolicy::Step { gamma, stepsize } => {
                let steps = (iter / (*stepsize).max(1)) as i32;
                base * (*gamma as f64).powi(steps)
            }
            LrPolicy::Exp { gamma } => base * (*gamma as f64).powf(it),
            LrPolicy::MultiStep { gamma, stepvalue } => {
                let passed = stepvalue.iter().filter(|&&s| iter >= s).count() as i32;
                base * (*gamma as f64).powi(passed)
            }
            LrPolicy::Poly { power, max_iter } => {
                if *max_iter == 0 || iter >= *max_iter {
                    0.0
                } else {
                    base * (1.0 - it / *max_iter as f64).powf(*power as f64)
                }
            }
            LrPolicy::Sigmoid { gamma, stepsize } => {
                base / (1.0 + (-(*gamma as f64) * (it - *stepsize as f64)).exp())
            }
        };
        lr as f32
    }

    /// Rejects parameter combinations that cannot produce a sensible schedule.
    pub fn validate(&self) -> Result<(), NetsolveError> {
        let bad = |msg: String| Err(NetsolveError::ConfigurationError(msg));
        match self {
            LrPolicy::Fixed => Ok(()),
            LrPolicy::Inv { gamma, power } => {
                if !(*gamma >= 0.0 && gamma.is_finite() && *power >= 0.0 && power.is_finite()) {
                    return bad(format!(
                        "inv policy: gamma ({}) and power ({}) must be finite and >= 0",
                        gamma, power
                    ));
                }
                Ok(())
            }
            LrPolicy::Step { gamma, stepsize } | LrPolicy::Sigmoid { gamma, stepsize } => {
                if *stepsize == 0 {
                    return bad("stepsize must be positive".to_string());
                }
                if !gamma.is_finite() {
                    return bad(format!("gamma must be finite, got {}", gamma));
                }
                Ok(())
            }
            LrPolicy::Exp { gamma } => {
                if *gamma <= 0.0 {
                    return bad(format!("exp policy: gamma must be positive, got {}", gamma));
                }
                Ok(())
            }
            LrPolicy::MultiStep { stepvalue, .. } => {
                if stepvalue.is_empty() {
                    return bad("multistep policy: stepvalue must not be empty".to_string());
                }
                if stepvalue.windows(2).any(|w| w[0] >= w[1]) {
                    return bad(format!(
                        "multistep policy: stepvalue must be strictly increasing, got {:?}",
                        stepvalue
                    ));
                }
                Ok(())
            }
            LrPolicy::Poly { max_iter, .. } => {
                if *max_iter == 0 {
                    return bad("poly policy: max_iter must be positive".to_string());
                }
                Ok(())
            }
        }
    }
}

/// A policy bound to a base rate and the global iteration counter.
///
/// The counter is shared by everything that calls [`step`](Self::step), so
/// a schedule driven across several epochs keeps decaying where it left off.
#[derive(Debug, Clone)]
pub struct LrSchedule {
    base_lr: f32,
    policy: LrPolicy,
    last_iter: usize,
    last_lr: f32,
}

impl LrSchedule {
    pub fn new(base_lr: f32, policy: LrPolicy) -> Result<Self, NetsolveError> {
        if !(base_lr > 0.0 && base_lr.is_finite()) {
            return Err(NetsolveError::ConfigurationError(format!(
                "base_lr must be positive and finite, got {}",
                base_lr
            )));
        }
        policy.validate()?;
        Ok(LrSchedule {
            base_lr,
            policy,
            last_iter: 0,
            last_lr: base_lr,
        })
    }

    /// Advances the counter and returns the rate for the new iteration.
    pub fn step(&mut self) -> f32 {
        self.last_iter += 1;
        self.last_lr = self.policy.rate(self.base_lr, self.last_iter);
        self.last_lr
    }

    /// The rate [`step`](Self::step) would return, without advancing.
    pub fn next_rate(&self) -> f32 {
        self.policy.rate(self.base_lr, self.last_iter + 1)
    }

    /// Number of updates performed so far.
    pub fn iter(&self) -> usize {
        self.last_iter
    }

    /// Resumes from a snapshot taken after `iter` updates.
    pub fn set_iter(&mut self, iter: usize) {
        self.last_iter = iter;
        self.last_lr = if iter == 0 {
            self.base_lr
        } else {
            self.policy.rate(self.base_lr, iter)
        };
    }

    pub fn get_last_lr(&self) -> f32 {
        self.last_lr
    }

    pub fn base_lr(&self) -> f32 {
        self.base_lr
    }

    pub fn policy(&self) -> &LrPolicy {
        &self.policy
    }
}

#[cfg(test)]
#[path = "lr_policy_test.rs"]
mod tests;
