use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single parameter dimension in a search space (C12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub kind: ParameterKind,
}

/// How a parameter's values are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    FloatRange { low: f64, high: f64 },
    IntRange { low: i64, high: i64 },
    LogUniform { low: f64, high: f64 },
    Choice { values: Vec<serde_json::Value> },
}

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

pub type Params = HashMap<String, ParameterValue>;

/// An ordered list of parameter dimensions to sweep (C12).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef { name: name.into(), kind: ParameterKind::FloatRange { low, high } });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef { name: name.into(), kind: ParameterKind::IntRange { low, high } });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef { name: name.into(), kind: ParameterKind::LogUniform { low, high } });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef { name: name.into(), kind: ParameterKind::Choice { values } });
        self
    }
}

/// Common trait for every search strategy (C12). `suggest` yields the next
/// batch to evaluate; an exhausted strategy returns fewer than `count` (or
/// zero) entries.
pub trait SearchStrategy: Send {
    fn suggest(&mut self, count: usize) -> Vec<Params>;

    /// Reports a completed trial's objective so adaptive strategies can
    /// learn. A no-op for strategies that don't adapt.
    fn report(&mut self, _params: &Params, _objective: f64) {}

    fn name(&self) -> &str;
}

/// Single iteration, empty parameters: the degenerate search space used by a
/// plain, non-swept backtest (C11 singleRun).
#[derive(Debug, Clone, Default)]
pub struct EmptySpace {
    exhausted: bool,
}

impl EmptySpace {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchStrategy for EmptySpace {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        if self.exhausted || count == 0 {
            return Vec::new();
        }
        self.exhausted = true;
        vec![Params::new()]
    }

    fn name(&self) -> &str {
        "empty"
    }
}

/// Exhaustive cartesian-product enumeration over discrete dimensions.
/// Continuous dimensions (`FloatRange`/`LogUniform`) are discretized into
/// `float_steps` evenly (log-)spaced points before the product is built.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    combos: Vec<Params>,
}

impl GridSearch {
    pub fn new(space: &SearchSpace, float_steps: usize) -> Self {
        Self { cursor: 0, combos: Self::build_grid(space, float_steps) }
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Vec<Params> {
        let mut axes: Vec<Vec<(&str, ParameterValue)>> = Vec::new();

        for param in &space.parameters {
            let values: Vec<ParameterValue> = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    let steps = float_steps.max(2);
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParameterValue::Float(low + t * (high - low))
                        })
                        .collect()
                }
                ParameterKind::IntRange { low, high } => (*low..=*high).map(ParameterValue::Int).collect(),
                ParameterKind::LogUniform { low, high } => {
                    let steps = float_steps.max(2);
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
                        })
                        .collect()
                }
                ParameterKind::Choice { values } => values.iter().map(|v| ParameterValue::Json(v.clone())).collect(),
            };
            axes.push(values.into_iter().map(|v| (param.name.as_str(), v)).collect());
        }

        let mut result: Vec<Params> = vec![HashMap::new()];
        for axis in &axes {
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for (name, value) in axis {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        result
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        let end = (self.cursor + count).min(self.combos.len());
        let batch = self.combos[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

/// Independent random sampling over the search space, `size` draws total.
/// Seeded with an explicit `u64` so a run is exactly reproducible.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    size: usize,
    drawn: usize,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, size: usize, seed: u64) -> Self {
        Self { space, size, drawn: 0, rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    fn sample_one(space: &SearchSpace, rng: &mut ChaCha8Rng) -> Params {
        let mut params = HashMap::new();
        for param in &space.parameters {
            let value = match &param.kind {
                ParameterKind::FloatRange { low, high } => ParameterValue::Float(rng.gen_range(*low..=*high)),
                ParameterKind::IntRange { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
                ParameterKind::LogUniform { low, high } => {
                    let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
                    ParameterValue::Float(log_val.exp())
                }
                ParameterKind::Choice { values } => {
                    let idx = rng.gen_range(0..values.len());
                    ParameterValue::Json(values[idx].clone())
                }
            };
            params.insert(param.name.clone(), value);
        }
        params
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        let remaining = self.size.saturating_sub(self.drawn);
        let n = count.min(remaining);
        let batch: Vec<Params> = (0..n).map(|_| Self::sample_one(&self.space, &mut self.rng)).collect();
        self.drawn += n;
        batch
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Explore/exploit heuristic search kept as an enrichment beyond the named
/// strategies: pure-random exploration early, then perturbs the best
/// observation so far. Not a full Gaussian-process surrogate, seeded like
/// every other strategy for reproducibility.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: SearchSpace,
    observations: Vec<(Params, f64)>,
    exploration_weight: f64,
    rng: ChaCha8Rng,
}

impl BayesianSearch {
    pub fn new(space: SearchSpace, exploration_weight: f64, seed: u64) -> Self {
        Self { space, observations: Vec::new(), exploration_weight, rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    fn exploit(&mut self) -> Params {
        let best = self
            .observations
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let Some((base, _)) = best.cloned() else {
            return RandomSearch::sample_one(&self.space, &mut self.rng);
        };

        let mut perturbed = HashMap::new();
        for param in &self.space.parameters {
            let value = match (&param.kind, base.get(&param.name)) {
                (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                    let noise = self.rng.gen_range(-0.1..0.1) * (high - low);
                    ParameterValue::Float((v + noise).clamp(*low, *high))
                }
                (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) => {
                    let delta: i64 = self.rng.gen_range(-2..=2);
                    ParameterValue::Int((v + delta).clamp(*low, *high))
                }
                (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v))) => {
                    let log_range = high.ln() - low.ln();
                    let noise = self.rng.gen_range(-0.1..0.1) * log_range;
                    ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                }
                _ => RandomSearch::sample_one(
                    &SearchSpace { parameters: vec![param.clone()] },
                    &mut self.rng,
                )
                .remove(&param.name)
                .unwrap_or(ParameterValue::Int(0)),
            };
            perturbed.insert(param.name.clone(), value);
        }
        perturbed
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<Params> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight {
                    RandomSearch::sample_one(&self.space, &mut self.rng)
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn report(&mut self, params: &Params, objective: f64) {
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new().add_int("short", 5, 15).add_int("long", 20, 50).add_float("size", 0.5, 1.0)
    }

    #[test]
    fn empty_space_yields_exactly_one_empty_params_then_nothing() {
        let mut space = EmptySpace::new();
        let first = space.suggest(10);
        assert_eq!(first, vec![Params::new()]);
        assert!(space.suggest(10).is_empty());
    }

    #[test]
    fn grid_search_enumerates_full_product_in_batches() {
        let space = SearchSpace::new().add_int("a", 1, 3).add_int("b", 10, 11);
        let mut grid = GridSearch::new(&space, 4);
        assert_eq!(grid.len(), 6);
        let first_batch = grid.suggest(4);
        assert_eq!(first_batch.len(), 4);
        let second_batch = grid.suggest(4);
        assert_eq!(second_batch.len(), 2);
        assert!(grid.suggest(4).is_empty());
    }

    #[test]
    fn random_search_is_reproducible_given_same_seed() {
        let mut a = RandomSearch::new(sample_space(), 5, 42);
        let mut b = RandomSearch::new(sample_space(), 5, 42);
        assert_eq!(a.suggest(5), b.suggest(5));
    }

    #[test]
    fn random_search_stops_at_its_configured_size() {
        let mut rs = RandomSearch::new(sample_space(), 3, 7);
        assert_eq!(rs.suggest(2).len(), 2);
        assert_eq!(rs.suggest(2).len(), 1);
        assert_eq!(rs.suggest(2).len(), 0);
    }

    #[test]
    fn bayesian_search_is_reproducible_given_same_seed() {
        let mut a = BayesianSearch::new(sample_space(), 0.3, 9);
        let mut b = BayesianSearch::new(sample_space(), 0.3, 9);
        let batch_a = a.suggest(4);
        let batch_b = b.suggest(4);
        assert_eq!(batch_a, batch_b);
        a.report(&batch_a[0], 1.5);
        b.report(&batch_b[0], 1.5);
        assert_eq!(a.suggest(4), b.suggest(4));
    }
}
