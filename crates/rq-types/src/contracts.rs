use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::account::Account;
use crate::errors::RqResult;
use crate::market::Event;
use crate::orders::Instruction;
use crate::timeframe::Timeframe;

/// The channel-shaped half of the event channel (C2) that a [`Feed`] drains
/// into. Kept as a trait here rather than a concrete type so this crate
/// never has to depend on the kernel's channel implementation.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: Event) -> RqResult<()>;
}

/// Produces an ordered stream of events (§6). Implementations must emit
/// events in non-decreasing time order and close the sink on completion.
#[async_trait]
pub trait Feed: Send + Sync {
    async fn play(&self, sink: &dyn EventSink) -> RqResult<()>;
    fn timeframe(&self) -> Timeframe;
}

/// Broker contract (§6). Operations are synchronous within a kernel step;
/// only the channel itself suspends (§5).
pub trait Broker: Send {
    fn place(&mut self, instructions: Vec<Instruction>, event: &Event) -> RqResult<Account>;
    fn sync(&self) -> Account;
    fn reset(&mut self);
}

/// Journal contract (§6): records every step and exposes named metric
/// time-series for scoring (C12).
pub trait Journal: Send {
    fn track(&mut self, event: &Event, account: &Account, instructions: &[Instruction]);
    fn metric_names(&self) -> Vec<String>;
    fn get_metric(&self, name: &str) -> Vec<(DateTime<Utc>, f64)>;
    fn flush(&mut self);
}

/// Strategy contract (§6, C9): pure in terms of observable account state.
pub trait Strategy: Send {
    fn create(&mut self, event: &Event, account: &Account) -> Vec<Instruction>;
    fn reset(&mut self);
}

/// Wraps a [`Strategy`] and suppresses its output once it has emitted more
/// than `max_instructions` instructions within a rolling `window` of steps —
/// a safety net against a runaway strategy flooding the broker.
pub struct CircuitBreaker<S: Strategy> {
    inner: S,
    max_instructions: usize,
    window: usize,
    recent_counts: VecDeque<usize>,
    tripped: bool,
}

impl<S: Strategy> CircuitBreaker<S> {
    pub fn new(inner: S, max_instructions: usize, window: usize) -> Self {
        Self {
            inner,
            max_instructions,
            window: window.max(1),
            recent_counts: VecDeque::new(),
            tripped: false,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

impl<S: Strategy> Strategy for CircuitBreaker<S> {
    fn create(&mut self, event: &Event, account: &Account) -> Vec<Instruction> {
        let instructions = self.inner.create(event, account);

        self.recent_counts.push_back(instructions.len());
        while self.recent_counts.len() > self.window {
            self.recent_counts.pop_front();
        }
        let total: usize = self.recent_counts.iter().sum();
        self.tripped = total > self.max_instructions;

        if self.tripped {
            Vec::new()
        } else {
            instructions
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.recent_counts.clear();
        self.tripped = false;
    }
}
