use super::*;
use crate::batch::{Batch, Phase};
use crate::blob::Blob;
use crate::net::NetOutputs;
use approx::assert_abs_diff_eq;

/// Net stand-in whose gradients are set by hand.
#[derive(Debug)]
pub(super) struct MockNet {
    pub(super) params: Vec<Blob>,
}

impl MockNet {
    pub(super) fn new(values: Vec<Vec<f32>>, grads: Vec<Vec<f32>>) -> Self {
        let params = values
            .into_iter()
            .zip(grads)
            .map(|(v, g)| {
                let len = v.len();
                let mut blob = Blob::from_data(v, vec![len]).expect("mock blob");
                blob.diff_mut().copy_from_slice(&g);
                blob
            })
            .collect();
        MockNet { params }
    }
}

impl Net for MockNet {
    fn input_shape(&self) -> &[usize] {
        &[1, 1, 1]
    }
    fn forward(&mut self, _batch: &Batch, _phase: Phase) -> Result<NetOutputs, NetsolveError> {
        Ok(NetOutputs::new())
    }
    fn loss_weights(&self) -> Vec<(String, f32)> {
        Vec::new()
    }
    fn set_output_diff(&mut self, name: &str, _value: f32) -> Result<(), NetsolveError> {
        Err(NetsolveError::UnknownOutput(name.to_string()))
    }
    fn backward(&mut self) -> Result<(), NetsolveError> {
        Ok(())
    }
    fn learnable_params(&self) -> Vec<(String, &Blob)> {
        self.params.iter().enumerate().map(|(i, b)| (format!("p{}", i), b)).collect()
    }
    fn learnable_params_mut(&mut self) -> Vec<&mut Blob> {
        self.params.iter_mut().collect()
    }
}

#[test]
fn test_plain_update_is_param_minus_lr_grad() {
    let mut net = MockNet::new(
        vec![vec![1.0, 2.0, 3.0], vec![-1.0]],
        vec![vec![0.5, -0.5, 1.0], vec![2.0]],
    );
    let mut sgd = SgdUpdate::new();
    sgd.apply(&mut net, 0.1).unwrap();
    let expected = [0.95, 2.05, 2.9];
    for (a, e) in net.params[0].data().iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-6);
    }
    assert_abs_diff_eq!(net.params[1].data()[0], -1.2, epsilon = 1e-6);
    // Diffs are left untouched by the update.
    assert_eq!(net.params[1].diff(), &[2.0]);
}

#[test]
fn test_weight_decay_without_momentum() {
    let mut net = MockNet::new(vec![vec![2.0]], vec![vec![1.0]]);
    let mut sgd = SgdUpdate::with_momentum(0.0, 0.5).unwrap();
    sgd.apply(&mut net, 0.1).unwrap();
    // 2 - 0.1 * (1 + 0.5 * 2)
    assert_abs_diff_eq!(net.params[0].data()[0], 1.8, epsilon = 1e-6);
}

#[test]
fn test_momentum_accumulates_velocity() {
    let mut net = MockNet::new(vec![vec![0.0]], vec![vec![1.0]]);
    let mut sgd = SgdUpdate::with_momentum(0.9, 0.0).unwrap();
    sgd.apply(&mut net, 0.1).unwrap();
    assert_abs_diff_eq!(net.params[0].data()[0], -0.1, epsilon = 1e-6);
    sgd.apply(&mut net, 0.1).unwrap();
    // v = 0.9 * 0.1 + 0.1 = 0.19
    assert_abs_diff_eq!(net.params[0].data()[0], -0.29, epsilon = 1e-6);

    sgd.reset();
    sgd.apply(&mut net, 0.1).unwrap();
    assert_abs_diff_eq!(net.params[0].data()[0], -0.39, epsilon = 1e-6);
}

#[test]
fn test_momentum_history_layout_change() {
    let mut net = MockNet::new(vec![vec![0.0]], vec![vec![1.0]]);
    let mut sgd = SgdUpdate::with_momentum(0.5, 0.0).unwrap();
    sgd.apply(&mut net, 0.1).unwrap();
    net.params.push(Blob::new(vec![3]));
    assert!(matches!(
        sgd.apply(&mut net, 0.1),
        Err(NetsolveError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_with_momentum_validation() {
    assert!(SgdUpdate::with_momentum(1.0, 0.0).is_err());
    assert!(SgdUpdate::with_momentum(-0.1, 0.0).is_err());
    assert!(SgdUpdate::with_momentum(0.9, -1.0).is_err());
    let sgd = SgdUpdate::with_momentum(0.9, 5e-4).unwrap();
    assert_eq!(sgd.momentum(), 0.9);
    assert_eq!(sgd.weight_decay(), 5e-4);
}

#[test]
fn test_zero_diffs() {
    let mut net = MockNet::new(vec![vec![1.0, 1.0]], vec![vec![3.0, 4.0]]);
    zero_diffs(&mut net);
    assert_eq!(net.params[0].diff(), &[0.0, 0.0]);
}
