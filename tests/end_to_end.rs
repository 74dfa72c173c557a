use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reservoir_mlp::{
    Activation, HiddenLayerConfig, MlpEngine, NetworkModelBuilder, NetworkModelConfig, Optimizer,
    SampleDataset, TaskType,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn sgd_learns_a_sum() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(17);
    let xs: Vec<Vec<f64>> = (0..100)
        .map(|_| vec![rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0)])
        .collect();
    let ys: Vec<Vec<f64>> = xs.iter().map(|x| vec![x[0] + x[1]]).collect();
    let train = SampleDataset::from_rows(&xs, &ys).unwrap();

    let cfg = NetworkModelConfig {
        hidden_layers: vec![HiddenLayerConfig::new(4, Activation::ReLU)],
        optimizer: Optimizer::sgd(0.02),
        max_attempts: 1,
        max_attempt_epochs: 50,
        ..NetworkModelConfig::default()
    };
    let template = MlpEngine::new(TaskType::Regression, 2, vec!["sum".to_owned()], &cfg).unwrap();
    let builder = NetworkModelBuilder::new(cfg, 42);

    let mut epoch_rmse = Vec::new();
    let model = builder
        .build(&template, &train, None, |p| {
            assert_eq!(p.attempt, 1);
            epoch_rmse.push(p.current.train_stat.rmse());
        })
        .unwrap();

    assert_eq!(epoch_rmse.len(), 50);
    for (epoch, w) in epoch_rmse.windows(2).enumerate() {
        // Per-sample SGD jitters a little around its trend.
        assert!(
            w[1] <= w[0] * 1.1 + 2e-3,
            "rmse rose at epoch {}: {} -> {}",
            epoch + 2,
            w[0],
            w[1]
        );
    }
    assert!(epoch_rmse[49] < epoch_rmse[0]);
    assert!(
        model.train_stat.rmse() < 0.05,
        "rmse {}",
        model.train_stat.rmse()
    );

    let y = model.compute(&[0.25, 0.5]).unwrap();
    assert!((y[0] - 0.75).abs() < 0.2);
}

#[test]
fn adam_fits_xor() {
    init_logger();
    let xs = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let ys = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
    let train = SampleDataset::from_rows(&xs, &ys).unwrap();

    let cfg = NetworkModelConfig {
        hidden_layers: vec![
            HiddenLayerConfig::new(4, Activation::ReLU),
            HiddenLayerConfig::new(4, Activation::ReLU),
        ],
        optimizer: Optimizer::adam(0.03),
        max_attempts: 5,
        max_attempt_epochs: 500,
        ..NetworkModelConfig::default()
    };
    let template = MlpEngine::new(TaskType::Binary, 2, vec!["xor".to_owned()], &cfg).unwrap();
    let model = NetworkModelBuilder::new(cfg, 7)
        .build(&template, &train, None, |_| {})
        .unwrap();

    assert_eq!(model.train_stat.accuracy(), Some(1.0));
    for (x, y) in xs.iter().zip(&ys) {
        let out = model.compute(x).unwrap();
        assert_eq!(out[0] >= 0.5, y[0] >= 0.5, "input {x:?} -> {out:?}");
    }
}

#[test]
fn softmax_classifier_with_regularization_and_dropout() {
    init_logger();
    // Three well separated blobs.
    let mut rng = StdRng::seed_from_u64(3);
    let centers = [(-1.0, -1.0), (1.0, -1.0), (0.0, 1.0)];
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for _ in 0..40 {
        for (class, &(cx, cy)) in centers.iter().enumerate() {
            xs.push(vec![
                cx + rng.gen_range(-0.2..0.2),
                cy + rng.gen_range(-0.2..0.2),
            ]);
            let mut one_hot = vec![0.0; 3];
            one_hot[class] = 1.0;
            ys.push(one_hot);
        }
    }
    let train = SampleDataset::from_rows(&xs, &ys).unwrap();

    let mut hidden = HiddenLayerConfig::new(8, Activation::TanH);
    hidden.dropout = 0.1;
    hidden.regularization.ridge = 1e-3;
    hidden.norm.max_norm = 3.0;
    let cfg = NetworkModelConfig {
        hidden_layers: vec![hidden],
        optimizer: Optimizer::rmsprop(0.01),
        class_balanced_loss: true,
        clip_norm: 5.0,
        max_attempt_epochs: 60,
        ..NetworkModelConfig::default()
    };
    let names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
    let template = MlpEngine::new(TaskType::Categorical, 2, names, &cfg).unwrap();
    let model = NetworkModelBuilder::new(cfg, 1)
        .build(&template, &train, Some(&train), |_| {})
        .unwrap();

    let acc = model.validation_stat.unwrap().accuracy().unwrap();
    assert!(acc >= 0.95, "accuracy {acc}");

    let layer = &model.engine.layers()[0];
    for n in 0..layer.num_neurons {
        let row = layer.weight_idx(n, 0);
        let norm: f64 = model.engine.weights()[row..row + layer.num_inputs]
            .iter()
            .map(|w| w * w)
            .sum::<f64>()
            .sqrt();
        assert!(norm <= 3.0 + 1e-9);
    }
}

#[test]
fn rprop_full_batch_training_reduces_loss() {
    init_logger();
    let xs: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64 / 10.0 - 1.0]).collect();
    let ys: Vec<Vec<f64>> = xs.iter().map(|x| vec![x[0] * x[0]]).collect();
    let train = SampleDataset::from_rows(&xs, &ys).unwrap();

    let cfg = NetworkModelConfig {
        hidden_layers: vec![HiddenLayerConfig::new(6, Activation::TanH)],
        optimizer: Optimizer::rprop(),
        max_attempt_epochs: 100,
        ..NetworkModelConfig::default()
    };
    let template = MlpEngine::new(TaskType::Regression, 1, vec!["sq".to_owned()], &cfg).unwrap();

    let mut first = None;
    let model = NetworkModelBuilder::new(cfg, 0)
        .build(&template, &train, None, |p| {
            first.get_or_insert(p.current.train_stat.rmse());
        })
        .unwrap();

    assert!(model.train_stat.rmse() < first.unwrap());
}
