use std::collections::HashMap;

use chrono::{DateTime, Utc};

use rq_types::{Account, Asset, Event, Instruction, Journal, Position};

/// One tracked kernel step (C16), kept for post-run inspection alongside
/// the per-metric time series.
#[derive(Debug, Clone)]
pub struct TrackedStep {
    pub time: DateTime<Utc>,
    pub equity: rust_decimal::Decimal,
    pub cash: rust_decimal::Decimal,
    pub open_position_count: usize,
    pub instruction_count: usize,
}

/// Records every kernel step in memory and derives a handful of metric
/// time-series from it (C16): `equity`, `cash`, `open_positions`,
/// `instructions`. A custom metric can be added via [`InMemoryJournal::record_metric`]
/// for a strategy-defined series.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJournal {
    steps: Vec<TrackedStep>,
    custom: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[TrackedStep] {
        &self.steps
    }

    /// Appends a point to a strategy-defined metric series, independent of
    /// the per-step bookkeeping `track` already performs.
    pub fn record_metric(&mut self, name: impl Into<String>, time: DateTime<Utc>, value: f64) {
        self.custom.entry(name.into()).or_default().push((time, value));
    }
}

impl Journal for InMemoryJournal {
    fn track(&mut self, event: &Event, account: &Account, instructions: &[Instruction]) {
        let cash = account.cash.balance(&account.base_currency);
        let equity = cash + account.positions.values().map(|p| p.market_value()).sum::<rust_decimal::Decimal>();
        self.steps.push(TrackedStep {
            time: event.time,
            equity,
            cash,
            open_position_count: account.positions.len(),
            instruction_count: instructions.len(),
        });
    }

    fn metric_names(&self) -> Vec<String> {
        let mut names = vec!["equity".to_string(), "cash".to_string(), "open_positions".to_string(), "instructions".to_string()];
        names.extend(self.custom.keys().cloned());
        names
    }

    fn get_metric(&self, name: &str) -> Vec<(DateTime<Utc>, f64)> {
        match name {
            "equity" => self.steps.iter().map(|s| (s.time, decimal_to_f64(s.equity))).collect(),
            "cash" => self.steps.iter().map(|s| (s.time, decimal_to_f64(s.cash))).collect(),
            "open_positions" => self.steps.iter().map(|s| (s.time, s.open_position_count as f64)).collect(),
            "instructions" => self.steps.iter().map(|s| (s.time, s.instruction_count as f64)).collect(),
            other => self.custom.get(other).cloned().unwrap_or_default(),
        }
    }

    fn flush(&mut self) {}
}

fn decimal_to_f64(value: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
