pub mod config;
pub mod orchestrator;
pub mod scoring;
pub mod search;

pub use config::OptimizationConfig;
pub use orchestrator::{Optimizer, OptimizerConfig, Orchestrator, RunPlan, RunResult};
pub use scoring::{cagr, Reduction, Score};
pub use search::{
    BayesianSearch, EmptySpace, GridSearch, ParameterDef, ParameterKind, ParameterValue, Params,
    RandomSearch, SearchSpace, SearchStrategy,
};
