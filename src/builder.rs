//! Attempt/epoch loop with best-model selection and stop heuristics.

use crate::{
    Error, ErrorStat, MlpEngine, NetworkModelConfig, Result, SampleDataset, TaskType, Trainer,
};

/// Best RMSE at which a regression build is considered done.
const REGRESSION_STOP_RMSE: f64 = 1e-6;

/// Engine weights captured after one epoch, with their statistics.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub engine: MlpEngine,
    pub attempt: usize,
    pub epoch: usize,
    pub train_stat: ErrorStat,
    pub validation_stat: Option<ErrorStat>,
}

impl ModelSnapshot {
    /// Accuracy for classification tasks (train and validation averaged).
    fn accuracy(&self) -> f64 {
        combine(
            self.train_stat.accuracy().unwrap_or(0.0),
            self.validation_stat
                .as_ref()
                .map(|v| v.accuracy().unwrap_or(0.0)),
        )
    }

    fn mean_loss(&self) -> f64 {
        combine(
            self.train_stat.mean_loss(),
            self.validation_stat.as_ref().map(ErrorStat::mean_loss),
        )
    }

    fn rmse(&self) -> f64 {
        combine(
            self.train_stat.rmse(),
            self.validation_stat.as_ref().map(ErrorStat::rmse),
        )
    }

    /// True when every training (and validation) decision is correct.
    pub fn is_perfect(&self) -> bool {
        self.train_stat.is_perfect()
            && self
                .validation_stat
                .as_ref()
                .is_none_or(ErrorStat::is_perfect)
    }

    /// Whether `self` is a better model than `other`.
    pub fn is_better_than(&self, other: &ModelSnapshot) -> bool {
        match self.train_stat.task {
            TaskType::Regression => self.rmse() < other.rmse(),
            TaskType::Binary | TaskType::Categorical => {
                let (a, b) = (self.accuracy(), other.accuracy());
                a > b || (a == b && self.mean_loss() < other.mean_loss())
            }
        }
    }
}

#[inline]
fn combine(train: f64, validation: Option<f64>) -> f64 {
    match validation {
        Some(v) => (train + v) / 2.0,
        None => train,
    }
}

/// Progress reported to the build callback after every epoch.
#[derive(Debug)]
pub struct BuildProgress<'a> {
    pub attempt: usize,
    pub max_attempts: usize,
    pub attempt_epoch: usize,
    pub max_attempt_epochs: usize,
    pub current: &'a ModelSnapshot,
    pub best: &'a ModelSnapshot,
    /// The current attempt ends after this epoch.
    pub stop_attempt: bool,
    /// The whole build ends after this epoch.
    pub stop_build: bool,
}

/// Result of a build: the best engine found and how it scored.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    pub engine: MlpEngine,
    pub train_stat: ErrorStat,
    pub validation_stat: Option<ErrorStat>,
    pub attempt: usize,
    pub epoch: usize,
}

impl NetworkModel {
    pub fn compute(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.engine.compute(input)
    }
}

impl From<ModelSnapshot> for NetworkModel {
    fn from(s: ModelSnapshot) -> Self {
        Self {
            engine: s.engine,
            train_stat: s.train_stat,
            validation_stat: s.validation_stat,
            attempt: s.attempt,
            epoch: s.epoch,
        }
    }
}

#[derive(Debug)]
pub struct NetworkModelBuilder {
    cfg: NetworkModelConfig,
    seed: u64,
}

/// Per-attempt bookkeeping of the stop heuristics.
#[derive(Debug, Default)]
struct AttemptState {
    best: Option<ModelSnapshot>,
    best_epoch: usize,
    /// Mean loss to beat while in the fine-tune phase.
    fine_tune_loss: Option<f64>,
}

impl NetworkModelBuilder {
    pub fn new(cfg: NetworkModelConfig, seed: u64) -> Self {
        Self { cfg, seed }
    }

    #[inline]
    pub fn config(&self) -> &NetworkModelConfig {
        &self.cfg
    }

    /// Train `template` on `train` and return the best model seen.
    ///
    /// `progress` is invoked after every epoch.
    pub fn build<F>(
        &self,
        template: &MlpEngine,
        train: &SampleDataset,
        validation: Option<&SampleDataset>,
        mut progress: F,
    ) -> Result<NetworkModel>
    where
        F: FnMut(&BuildProgress<'_>),
    {
        let mut trainer = Trainer::new(template, train, &self.cfg, self.seed)?;
        let task = template.task();
        let patience =
            (self.cfg.stop_patience_ratio * self.cfg.max_attempt_epochs as f64).ceil() as usize;

        log::info!(
            "build started: {:?}, {} samples, {} attempts x {} epochs, batch size {}",
            task,
            train.len(),
            self.cfg.max_attempts,
            self.cfg.max_attempt_epochs,
            trainer.batch_size()
        );

        let mut best: Option<ModelSnapshot> = None;
        let mut state = AttemptState::default();
        let mut attempt = trainer.attempt();

        while trainer.epoch()? {
            if trainer.attempt() != attempt {
                attempt = trainer.attempt();
                state = AttemptState::default();
            }

            let current = ModelSnapshot {
                engine: trainer.engine().clone(),
                attempt,
                epoch: trainer.attempt_epoch(),
                train_stat: *trainer.error_stat(),
                validation_stat: validation
                    .map(|v| trainer.engine().compute_dataset(v))
                    .transpose()?,
            };

            let attempt_improved = state
                .best
                .as_ref()
                .is_none_or(|b| current.is_better_than(b));
            if attempt_improved {
                state.best = Some(current.clone());
                state.best_epoch = current.epoch;
            }
            if best.as_ref().is_none_or(|b| current.is_better_than(b)) {
                log::info!(
                    "new best model: attempt {} epoch {}, loss {:.6}, rmse {:.6}, accuracy {:?}",
                    current.attempt,
                    current.epoch,
                    current.train_stat.mean_loss(),
                    current.train_stat.rmse(),
                    current.train_stat.accuracy()
                );
                best = Some(current.clone());
            }
            let best_ref = best.as_ref().expect("best is set after the first epoch");

            let mut stop_attempt = current.epoch - state.best_epoch > patience;
            let mut stop_build = false;
            match task {
                TaskType::Regression => {
                    stop_build = best_ref.rmse() <= REGRESSION_STOP_RMSE;
                }
                TaskType::Binary | TaskType::Categorical => {
                    let perfect = current.is_perfect();
                    match state.fine_tune_loss {
                        Some(to_beat) => {
                            let loss = current.mean_loss();
                            if perfect && loss < to_beat {
                                state.fine_tune_loss = Some(loss);
                            } else {
                                stop_attempt = true;
                                stop_build = best_ref.is_perfect();
                            }
                        }
                        None if perfect => {
                            log::debug!(
                                "attempt {} entered fine-tune phase at epoch {}",
                                current.attempt,
                                current.epoch
                            );
                            state.fine_tune_loss = Some(current.mean_loss());
                        }
                        None => {}
                    }
                }
            }
            if stop_build {
                stop_attempt = true;
            }

            progress(&BuildProgress {
                attempt,
                max_attempts: trainer.max_attempts(),
                attempt_epoch: current.epoch,
                max_attempt_epochs: trainer.max_attempt_epochs(),
                current: &current,
                best: best_ref,
                stop_attempt,
                stop_build,
            });

            if stop_build {
                break;
            }
            if stop_attempt {
                log::info!(
                    "attempt {} stopped at epoch {} (best epoch {})",
                    attempt,
                    current.epoch,
                    state.best_epoch
                );
                if trainer.attempt() >= trainer.max_attempts() {
                    break;
                }
                trainer.next_attempt()?;
                attempt = trainer.attempt();
                state = AttemptState::default();
            }
        }

        let best = best.ok_or_else(|| {
            Error::InvalidOperation("build finished without a single epoch".to_owned())
        })?;
        log::info!(
            "build finished: best model from attempt {} epoch {}",
            best.attempt,
            best.epoch
        );
        Ok(best.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Activation, HiddenLayerConfig, Optimizer};

    fn snapshot(task: TaskType, hits: usize, loss: f64, sse: f64) -> ModelSnapshot {
        let cfg = NetworkModelConfig::default();
        let names = vec!["a".to_owned(), "b".to_owned()];
        ModelSnapshot {
            engine: MlpEngine::new(TaskType::Binary, 1, names, &cfg).unwrap(),
            attempt: 1,
            epoch: 1,
            train_stat: ErrorStat {
                task,
                num_samples: 4,
                num_outputs: 4,
                sum_squared_error: sse,
                sum_loss: loss,
                num_hits: hits,
            },
            validation_stat: None,
        }
    }

    #[test]
    fn classification_prefers_accuracy_then_loss() {
        let a = snapshot(TaskType::Categorical, 3, 2.0, 0.0);
        let b = snapshot(TaskType::Categorical, 2, 0.1, 0.0);
        assert!(a.is_better_than(&b));
        assert!(!b.is_better_than(&a));

        let c = snapshot(TaskType::Categorical, 3, 1.0, 0.0);
        assert!(c.is_better_than(&a));
        assert!(!a.is_better_than(&a));
    }

    #[test]
    fn regression_prefers_lower_rmse() {
        let a = snapshot(TaskType::Regression, 0, 9.0, 0.4);
        let b = snapshot(TaskType::Regression, 0, 0.1, 0.8);
        assert!(a.is_better_than(&b));
    }

    #[test]
    fn validation_is_averaged_with_training() {
        let mut a = snapshot(TaskType::Regression, 0, 0.0, 0.0);
        let b = snapshot(TaskType::Regression, 0, 0.0, 0.4);
        a.validation_stat = Some(snapshot(TaskType::Regression, 0, 0.0, 4.0).train_stat);
        assert!(b.is_better_than(&a));
    }

    #[test]
    fn build_reports_progress_and_returns_best() {
        let train = SampleDataset::from_rows(
            &[vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
            &[vec![0.5], vec![0.5], vec![0.5], vec![0.5]],
        )
        .unwrap();
        let cfg = NetworkModelConfig {
            hidden_layers: vec![HiddenLayerConfig::new(2, Activation::TanH)],
            optimizer: Optimizer::adam(0.05),
            max_attempts: 2,
            max_attempt_epochs: 40,
            stop_patience_ratio: 0.1,
            ..NetworkModelConfig::default()
        };
        let template = MlpEngine::new(TaskType::Regression, 1, vec!["y".to_owned()], &cfg).unwrap();
        let builder = NetworkModelBuilder::new(cfg, 5);

        let mut calls = 0;
        let mut last_attempt = 0;
        let model = builder
            .build(&template, &train, Some(&train), |p| {
                calls += 1;
                last_attempt = p.attempt;
                assert!(p.attempt_epoch <= p.max_attempt_epochs);
                assert!(p.best.train_stat.rmse() <= p.current.train_stat.rmse());
            })
            .unwrap();

        assert!(calls > 0 && calls <= 80);
        assert!(last_attempt >= 1);
        assert!(model.validation_stat.is_some());
        assert_eq!(model.compute(&[1.0]).unwrap().len(), 1);
    }
}
