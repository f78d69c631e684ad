use serde::{Deserialize, Serialize};

use rq_engine::RunKernel;
use rq_types::Timeframe;

use crate::orchestrator::OptimizerConfig;
use crate::search::SearchSpace;

/// Typed, serde-derived configuration for one optimizer sweep (C11, C15):
/// the search space plus the concurrency/batch/train-validate parameters
/// that govern how it's run, kept separate from [`OptimizerConfig`] (which
/// additionally carries the live, non-serializable [`RunKernel`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub search_space: SearchSpace,
    pub concurrency: usize,
    pub batch_size: usize,
    pub train: Timeframe,
    pub validate: Timeframe,
}

impl OptimizationConfig {
    pub fn new(search_space: SearchSpace, train: Timeframe, validate: Timeframe) -> Self {
        Self { search_space, concurrency: 1, batch_size: 1, train, validate }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pairs this data with a live `RunKernel` to produce the
    /// [`OptimizerConfig`] `Optimizer::optimize` actually runs against.
    pub fn into_optimizer_config(self, kernel: RunKernel) -> OptimizerConfig {
        OptimizerConfig {
            kernel,
            concurrency: self.concurrency,
            batch_size: self.batch_size,
            train: self.train,
            validate: self.validate,
        }
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self::new(SearchSpace::default(), Timeframe::infinite(), Timeframe::infinite())
    }
}
