#![cfg(test)]

use ndarray::{Array2, array};

use crate::{
    DataShape, DeepLearningParams, ModelInfo, Network, ResponseNormalization, Row,
    params::Activation,
    storage::Matrix,
};

fn sgd(hidden: Vec<usize>, activation: Activation) -> DeepLearningParams {
    DeepLearningParams {
        seed: 1234,
        activation,
        hidden,
        adaptive_rate: false,
        rate: 0.1,
        rate_annealing: 0.,
        rate_decay: 1.,
        momentum_start: 0.,
        momentum_stable: 0.,
        ..Default::default()
    }
}

#[test]
fn tiny_tanh_network_single_sgd_step() {
    let mut model = ModelInfo::new("tiny", sgd(vec![3], Activation::Tanh), DataShape::numeric(2), 1)
        .unwrap();

    let w1 = array![[0.1, 0.2], [-0.1, 0.3], [0.2, -0.2]];
    let w2 = array![[0.3, -0.2, 0.1]];
    model.set_initial_weights(0, w1.view(), &[0.; 3]).unwrap();
    model.set_initial_weights(1, w2.view(), &[0.]).unwrap();

    let x = [1f32, -1.];
    let target = 0.5f32;
    let row = Row::dense(x.to_vec(), target);

    // Hand computed forward pass.
    let h: Vec<f64> = (0..3)
        .map(|j| (w1[[j, 0]] as f64 * x[0] as f64 + w1[[j, 1]] as f64 * x[1] as f64).tanh())
        .collect();
    let y: f64 = (0..3).map(|j| w2[[0, j]] as f64 * h[j]).sum();

    let mut net = Network::new(&model, true);
    net.fprop(0, &row, true);
    for (got, want) in net.layers()[0].activations().iter().zip(&h) {
        assert!((*got as f64 - want).abs() < 1e-5);
    }
    assert!((net.output()[0] as f64 - y).abs() < 1e-5);

    net.set_output_gradient(&row);
    net.bprop();

    let rate = 0.1;
    let g = target as f64 - y;
    for j in 0..3 {
        let expected = w2[[0, j]] as f64 + rate * g * h[j];
        assert!((model.weights(1).get(0, j) as f64 - expected).abs() < 1e-6);
    }
    assert!((model.biases(1).get(0) as f64 - rate * g).abs() < 1e-6);

    for j in 0..3 {
        let gh = g * w2[[0, j]] as f64 * (1. - h[j] * h[j]);
        for (k, xk) in x.iter().enumerate() {
            let expected = w1[[j, k]] as f64 + rate * gh * *xk as f64;
            assert!((model.weights(0).get(j, k) as f64 - expected).abs() < 1e-6);
        }
    }
}

#[test]
fn forward_pass_is_bit_identical() {
    let mut model =
        ModelInfo::new("fwd", sgd(vec![8, 4], Activation::Rectifier), DataShape::numeric(5), 1)
            .unwrap();
    model.initialize().unwrap();

    let row = Row::dense(vec![0.1, -0.7, 3., f32::NAN, 1.5], 0.);
    let mut net = Network::new(&model, false);

    net.fprop(0, &row, true);
    let first: Vec<Vec<f32>> = net
        .layers()
        .iter()
        .map(|l| l.activations().to_vec())
        .collect();

    for _ in 0..5 {
        net.fprop(0, &row, true);
        for (layer, expected) in net.layers().iter().zip(&first) {
            assert_eq!(layer.activations(), expected.as_slice());
        }
    }
}

#[test]
fn softmax_outputs_sum_to_one() {
    let params = DeepLearningParams {
        initial_weight_distribution: crate::InitialWeightDistribution::Normal,
        initial_weight_scale: 5.,
        ..sgd(vec![16], Activation::Tanh)
    };
    let mut model = ModelInfo::new("softmax", params, DataShape::numeric(4), 5).unwrap();
    model.initialize().unwrap();

    let mut net = Network::new(&model, false);
    for i in 0..20 {
        let v = i as f32 - 10.;
        let p = net.predict(&Row::dense(vec![v, -v, v * v, 1.], f32::NAN)).unwrap();
        assert!(p.iter().all(|p| !p.is_nan()));
        assert!((p.iter().sum::<f32>() - 1.).abs() < 1e-5);
    }
}

#[test]
fn backprop_clips_incoming_weights() {
    let max_w2 = 0.1;
    let params = DeepLearningParams {
        max_w2: Some(max_w2),
        fast_mode: false,
        initial_weight_distribution: crate::InitialWeightDistribution::Uniform,
        initial_weight_scale: 1.,
        rate: 0.5,
        ..sgd(vec![6], Activation::Tanh)
    };
    let mut model = ModelInfo::new("clip", params, DataShape::numeric(4), 1).unwrap();
    model.initialize().unwrap();

    let mut net = Network::new(&model, true);
    assert!(net.train_row(0, &Row::dense(vec![1., -2., 0.5, 3.], 10.), true));

    for layer in 0..model.layers() {
        let w: &Matrix = model.weights(layer);
        for row in 0..w.rows() {
            let r2: f32 = (0..w.cols()).map(|col| w.get(row, col).powi(2)).sum();
            assert!(r2 <= max_w2 + 1e-5, "layer {layer} row {row}: {r2}");
        }
    }
}

#[test]
fn averaging_identical_models_is_idempotent() {
    let mut model =
        ModelInfo::new("avg", sgd(vec![2], Activation::Tanh), DataShape::numeric(2), 1).unwrap();
    let w1 = Array2::from_shape_fn((2, 2), |(r, c)| (r as f32 * 2. - c as f32) * 0.375);
    model.set_initial_weights(0, w1.view(), &[0.125, -2.5]).unwrap();
    model.set_initial_weights(1, array![[1.5, -0.25]].view(), &[4.]).unwrap();

    for n in 2..=4 {
        let mut sum = model.clone();
        for _ in 1..n {
            sum.add(&model);
        }
        sum.div(n as f32);

        for layer in 0..model.layers() {
            assert_eq!(sum.weights(layer).raw(), model.weights(layer).raw());
            assert_eq!(sum.biases(layer).raw(), model.biases(layer).raw());
        }
    }
}

#[test]
fn adaptive_rate_learns_a_linear_target() {
    let params = DeepLearningParams {
        seed: 99,
        activation: Activation::Tanh,
        hidden: vec![8],
        adaptive_rate: true,
        ..Default::default()
    };
    let mut model = ModelInfo::new("ada", params, DataShape::numeric(1), 1).unwrap();
    model.initialize().unwrap();

    let rows: Vec<Row> = (0..20)
        .map(|i| {
            let x = i as f32 / 10. - 1.;
            Row::dense(vec![x], 0.5 * x)
        })
        .collect();

    let mse = |model: &ModelInfo| {
        let mut net = Network::new(model, false);
        rows.iter()
            .map(|r| (net.predict(r).unwrap()[0] - r.response).powi(2))
            .sum::<f32>()
            / rows.len() as f32
    };

    let before = mse(&model);
    let mut net = Network::new(&model, true);
    for epoch in 0..50 {
        for (i, row) in rows.iter().enumerate() {
            net.train_row((epoch * rows.len() + i) as u64, row, true);
        }
    }
    drop(net);

    assert!(mse(&model) < before);
    assert!(!model.compute_stats().unstable);
}

#[test]
fn column_major_first_layer_trains_like_row_major() {
    let params = |col_major| DeepLearningParams {
        sparse: true,
        col_major,
        ..sgd(vec![3], Activation::Tanh)
    };
    let w1 = array![[0.1, -0.2, 0.3, 0.05], [0.2, 0.1, -0.3, 0.4], [-0.1, 0.25, 0.15, -0.2]];
    let w2 = array![[0.4, -0.3, 0.2]];

    let models: Vec<ModelInfo> = [false, true]
        .into_iter()
        .map(|col_major| {
            let mut model = ModelInfo::new("cm", params(col_major), DataShape::numeric(4), 1).unwrap();
            model.set_initial_weights(0, w1.view(), &[0.; 3]).unwrap();
            model.set_initial_weights(1, w2.view(), &[0.]).unwrap();
            model
        })
        .collect();
    let (row_major, col_major) = (&models[0], &models[1]);
    assert_ne!(row_major.weights(0).index(0, 1), col_major.weights(0).index(0, 1));

    let rows = [
        Row::sparse(vec![(0, 1.), (3, -0.5)], 0.3),
        Row::sparse(vec![(1, 2.)], -0.4),
        Row::sparse(vec![(0, -1.), (2, 0.5), (3, 1.)], 0.8),
    ];
    for model in &models {
        let mut net = Network::new(model, true);
        for epoch in 0..5 {
            for (i, row) in rows.iter().enumerate() {
                assert!(net.train_row((epoch * 3 + i) as u64, row, true));
            }
        }
    }

    for layer in 0..2 {
        let (a, b) = (row_major.weights(layer), col_major.weights(layer));
        for r in 0..a.rows() {
            for c in 0..a.cols() {
                assert!((a.get(r, c) - b.get(r, c)).abs() < 1e-6, "layer {layer} ({r}, {c})");
            }
        }
        for (x, y) in row_major.biases(layer).raw().iter().zip(col_major.biases(layer).raw()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
    assert_ne!(col_major.weights(0).get(0, 0), 0.1);
}

#[test]
fn autoencoder_learns_to_reconstruct() {
    let params = DeepLearningParams {
        autoencoder: true,
        sparsity_beta: 0.1,
        average_activation: 0.,
        ..sgd(vec![2], Activation::Tanh)
    };
    let mut model = ModelInfo::new("ae", params, DataShape::numeric(3), 1).unwrap();
    model.initialize().unwrap();
    assert_eq!(model.units(), [3, 2, 3]);

    let rows: Vec<Row> = (0..16)
        .map(|i| {
            let t = i as f32 / 8. - 1.;
            Row::dense(vec![0.5 * t, -0.5 * t, 0.25 * t], f32::NAN)
        })
        .collect();

    let error = |model: &ModelInfo| {
        let mut net = Network::new(model, false);
        rows.iter().map(|r| net.reconstruction_error(r).unwrap()).sum::<f64>() / rows.len() as f64
    };

    let mut net = Network::new(&model, false);
    let reconstruction = net.predict(&rows[0]).unwrap();
    assert_eq!(reconstruction.len(), 3);
    let x = [-0.5f32, 0.5, -0.25];
    let mse: f64 = x
        .iter()
        .zip(&reconstruction)
        .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
        .sum::<f64>()
        / 3.;
    assert!((net.reconstruction_error(&rows[0]).unwrap() - mse).abs() < 1e-9);
    drop(net);

    let before = error(&model);
    let mut net = Network::new(&model, true);
    for epoch in 0..200 {
        for (i, row) in rows.iter().enumerate() {
            assert!(net.train_row((epoch * rows.len() + i) as u64, row, true));
        }
    }
    drop(net);

    assert!(error(&model) < before);
    let avg_a = model.avg_activations(0).unwrap();
    assert!(avg_a.raw().iter().any(|a| *a != 0.));
}

#[test]
fn predict_denormalizes_the_response() {
    let mut model =
        ModelInfo::new("norm", sgd(vec![1], Activation::Tanh), DataShape::numeric(1), 1).unwrap();
    model.set_initial_weights(0, array![[0.]].view(), &[0.]).unwrap();
    model.set_initial_weights(1, array![[0.]].view(), &[2.]).unwrap();
    model.set_normalization(Some(ResponseNormalization { sub: 10., mul: 0.5 }));

    let mut net = Network::new(&model, false);
    assert_eq!(net.predict(&Row::dense(vec![3.], f32::NAN)).unwrap(), [14.]);
    let shifted = Row {
        offset: 1.,
        ..Row::dense(vec![3.], f32::NAN)
    };
    assert_eq!(net.predict(&shifted).unwrap(), [16.]);
    drop(net);

    // 14 normalizes to the current output, so there is nothing to learn.
    let mut net = Network::new(&model, true);
    assert!(net.train_row(0, &Row::dense(vec![3.], 14.), true));
    assert_eq!(model.biases(1).raw(), [2.]);

    assert!(net.train_row(1, &Row::dense(vec![3.], 16.), true));
    assert!(model.biases(1).get(0) > 2.);
}

#[test]
fn momentum_steps_follow_the_update_rule() {
    // Only the output bias sees a gradient: hidden activations and outgoing weights are 0.
    let bias_after_three_steps = |nesterov| {
        let params = DeepLearningParams {
            momentum_start: 0.5,
            momentum_stable: 0.5,
            nesterov_accelerated_gradient: nesterov,
            ..sgd(vec![1], Activation::Tanh)
        };
        let mut model = ModelInfo::new("mom", params, DataShape::numeric(1), 1).unwrap();
        model.set_initial_weights(0, array![[0.]].view(), &[0.]).unwrap();
        model.set_initial_weights(1, array![[0.]].view(), &[0.]).unwrap();
        assert!(model.optimizer().has_momenta());

        let mut net = Network::new(&model, true);
        let row = Row::dense(vec![1.], 1.);
        for seed in 0..3 {
            assert!(net.train_row(seed, &row, true));
        }
        assert_eq!(model.weights(0).get(0, 0), 0.);
        assert_eq!(model.weights(1).get(0, 0), 0.);
        model.biases(1).get(0) as f64
    };

    // rate 0.1 scaled by 1 - momentum.
    let rate = 0.05;
    let (mut b, mut prev) = (0f64, 0f64);
    for _ in 0..3 {
        let delta = rate * (1. - b);
        b += delta + 0.5 * prev;
        prev = delta;
    }
    let classic = bias_after_three_steps(false);
    assert!((classic - b).abs() < 1e-5, "{classic} vs {b}");

    let (mut b, mut m) = (0f64, 0f64);
    for _ in 0..3 {
        m = 0.5 * m + (1. - b);
        b += rate * m;
    }
    let nesterov = bias_after_three_steps(true);
    assert!((nesterov - b).abs() < 1e-5, "{nesterov} vs {b}");
    assert!(nesterov > classic);
}
