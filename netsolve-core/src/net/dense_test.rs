use super::*;
use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn toy_batch() -> Batch {
    let values = vec![
        0.5, -1.0, 0.25, 0.0, //
        1.5, 0.5, -0.5, 1.0, //
        -0.75, 0.25, 1.25, -1.5, //
        0.0, 2.0, -0.25, 0.75,
    ];
    Batch::new(values, &[1, 2, 2], vec![0.0, 1.0, 2.0, 1.0]).unwrap()
}

fn loss_of(net: &mut DenseNet, batch: &Batch) -> f32 {
    net.forward(batch, Phase::Test).unwrap().loss().unwrap()
}

/// Central-difference check of `param`'s analytic gradient.
fn check_param_grad(net: &mut DenseNet, batch: &Batch, param: usize) {
    net.forward(batch, Phase::Train).unwrap();
    net.backward().unwrap();
    let analytic = net.learnable_params()[param].1.diff().to_vec();

    let eps = 1e-3f32;
    for j in 0..analytic.len() {
        net.learnable_params_mut()[param].data_mut()[j] += eps;
        let plus = loss_of(net, batch);
        net.learnable_params_mut()[param].data_mut()[j] -= 2.0 * eps;
        let minus = loss_of(net, batch);
        net.learnable_params_mut()[param].data_mut()[j] += eps;
        let numeric = (plus - minus) / (2.0 * eps);
        assert_abs_diff_eq!(analytic[j], numeric, epsilon = 5e-3);
    }
}

#[test]
fn test_dense_net_param_names_and_shapes() {
    let net = DenseNet::new(&[1, 2, 2], &[5], 3, &mut StdRng::seed_from_u64(1)).unwrap();
    let params = net.learnable_params();
    let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["ip1.weight", "ip1.bias", "ip2.weight", "ip2.bias"]);
    assert_eq!(params[0].1.shape(), &[5, 4]);
    assert_eq!(params[3].1.shape(), &[3]);
    assert_eq!(net.num_params(), 5 * 4 + 5 + 3 * 5 + 3);
    assert!(net.param_by_name("ip2.weight").is_some());
    assert!(net.param_by_name("conv1.weight").is_none());
}

#[test]
fn test_dense_net_rejects_bad_sizes() {
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        DenseNet::new(&[1, 2, 2], &[0], 3, &mut rng),
        Err(NetsolveError::ConfigurationError(_))
    ));
    assert!(matches!(
        DenseNet::new(&[4], &[], 3, &mut rng),
        Err(NetsolveError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_forward_outputs_uniform_logits() {
    let mut net = DenseNet::new(&[1, 2, 2], &[], 3, &mut StdRng::seed_from_u64(2)).unwrap();
    for p in net.learnable_params_mut() {
        init::constant(p, 0.0);
    }
    let outputs = net.forward(&toy_batch(), Phase::Test).unwrap();
    // All-zero weights give a uniform softmax.
    assert_abs_diff_eq!(outputs.loss().unwrap(), (3.0f32).ln(), epsilon = 1e-6);
    // argmax ties resolve to class 0, and one label in four is 0.
    assert_abs_diff_eq!(outputs.accuracy().unwrap(), 0.25, epsilon = 1e-6);
}

#[test]
fn test_forward_rejects_wrong_sample_shape() {
    let mut net = DenseNet::new(&[1, 4, 1], &[], 3, &mut StdRng::seed_from_u64(3)).unwrap();
    let result = net.forward(&toy_batch(), Phase::Train);
    assert!(matches!(result, Err(NetsolveError::ShapeMismatch { .. })));
}

#[test]
fn test_forward_rejects_bad_labels() {
    let mut net = DenseNet::new(&[1, 2, 2], &[], 3, &mut StdRng::seed_from_u64(3)).unwrap();
    let mut batch = toy_batch();
    batch.labels[2] = 3.0;
    assert!(matches!(
        net.forward(&batch, Phase::Train),
        Err(NetsolveError::IndexOutOfBounds { index: 2, len: 3, .. })
    ));
    batch.labels[2] = 0.5;
    assert!(net.forward(&batch, Phase::Train).is_err());
}

#[test]
fn test_backward_requires_train_forward() {
    let mut net = DenseNet::new(&[1, 2, 2], &[], 3, &mut StdRng::seed_from_u64(4)).unwrap();
    assert_eq!(net.backward(), Err(NetsolveError::BackwardBeforeForward));

    net.forward(&toy_batch(), Phase::Test).unwrap();
    assert!(matches!(net.backward(), Err(NetsolveError::PhaseError { .. })));

    net.forward(&toy_batch(), Phase::Train).unwrap();
    net.backward().unwrap();
    // The cache is consumed by the first backward.
    assert_eq!(net.backward(), Err(NetsolveError::BackwardBeforeForward));
}

#[test]
fn test_set_output_diff_only_accepts_loss() {
    let mut net = DenseNet::new(&[1, 2, 2], &[], 3, &mut StdRng::seed_from_u64(5)).unwrap();
    assert!(net.set_output_diff(LOSS, 2.0).is_ok());
    assert!(matches!(
        net.set_output_diff(ACCURACY, 1.0),
        Err(NetsolveError::UnknownOutput(_))
    ));
}

#[test]
fn test_softmax_regression_gradients_match_finite_differences() {
    let mut net = DenseNet::new(&[1, 2, 2], &[], 3, &mut StdRng::seed_from_u64(6)).unwrap();
    let batch = toy_batch();
    check_param_grad(&mut net, &batch, 0);
    check_param_grad(&mut net, &batch, 1);
}

#[test]
fn test_hidden_net_top_layer_gradients_match_finite_differences() {
    let mut net = DenseNet::new(&[1, 2, 2], &[6], 3, &mut StdRng::seed_from_u64(7)).unwrap();
    let batch = toy_batch();
    // Perturbing the top layer never moves a ReLU across its kink.
    check_param_grad(&mut net, &batch, 2);
    check_param_grad(&mut net, &batch, 3);
}

#[test]
fn test_output_diff_scales_gradients() {
    let mut net = DenseNet::new(&[1, 2, 2], &[4], 3, &mut StdRng::seed_from_u64(8)).unwrap();
    let batch = toy_batch();

    net.forward(&batch, Phase::Train).unwrap();
    net.backward().unwrap();
    let unit: Vec<f32> = net.learnable_params()[0].1.diff().to_vec();

    net.forward(&batch, Phase::Train).unwrap();
    net.set_output_diff(LOSS, 0.5).unwrap();
    net.backward().unwrap();
    let half = net.learnable_params()[0].1.diff();

    for (u, h) in unit.iter().zip(half) {
        assert_abs_diff_eq!(u * 0.5, *h, epsilon = 1e-6);
    }
}

#[test]
fn test_small_step_along_gradient_reduces_loss() {
    let mut net = DenseNet::new(&[1, 2, 2], &[6], 3, &mut StdRng::seed_from_u64(9)).unwrap();
    let batch = toy_batch();
    let before = net.forward(&batch, Phase::Train).unwrap().loss().unwrap();
    net.backward().unwrap();
    for p in net.learnable_params_mut() {
        let (data, diff) = p.data_and_diff_mut();
        for (w, g) in data.iter_mut().zip(diff) {
            *w -= 0.05 * g;
        }
    }
    let after = loss_of(&mut net, &batch);
    assert!(after < before, "loss should drop: {} -> {}", before, after);
}
