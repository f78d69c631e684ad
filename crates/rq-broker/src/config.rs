use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rq_types::Currency;

use crate::account_model::{AccountModel, CashAccount, MarginAccount, RegT};
use crate::cost::{CommissionBased, CostModel, NoFee, PercentageFee};
use crate::pricing::{NoSlippage, PricingEngine, SpreadSlippage};

/// Matches [`rq_engine::channel::DEFAULT_CAPACITY`]; duplicated here rather
/// than pulled in as a dependency since this crate has no other reason to
/// depend on `rq-engine`.
const DEFAULT_CHANNEL_CAPACITY: usize = 10;
const DEFAULT_HEARTBEAT_MS: u64 = 1_000;

/// Which [`AccountModel`] to build (C7, C15).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AccountModelKind {
    Cash,
    Margin { leverage: Decimal, min_equity: Decimal },
    RegT,
}

impl Default for AccountModelKind {
    fn default() -> Self {
        AccountModelKind::Cash
    }
}

impl AccountModelKind {
    pub fn build(&self) -> Box<dyn AccountModel> {
        match self {
            AccountModelKind::Cash => Box::new(CashAccount),
            AccountModelKind::Margin { leverage, min_equity } => Box::new(MarginAccount::new(*leverage, *min_equity)),
            AccountModelKind::RegT => Box::new(RegT),
        }
    }
}

/// Which [`PricingEngine`] to build (C4, C15).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PricingKind {
    NoSlippage,
    Spread { bps: Decimal },
}

impl Default for PricingKind {
    fn default() -> Self {
        PricingKind::NoSlippage
    }
}

impl PricingKind {
    pub fn build(&self) -> Box<dyn PricingEngine> {
        match self {
            PricingKind::NoSlippage => Box::new(NoSlippage),
            PricingKind::Spread { bps } => Box::new(SpreadSlippage::new(*bps)),
        }
    }
}

/// Which [`CostModel`] to build (C4, C15).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CostKind {
    NoFee,
    Percentage { pct: Decimal },
    Commission { per_share: Decimal, min: Decimal, max: Decimal },
}

impl Default for CostKind {
    fn default() -> Self {
        CostKind::NoFee
    }
}

impl CostKind {
    pub fn build(&self) -> Box<dyn CostModel> {
        match self {
            CostKind::NoFee => Box::new(NoFee),
            CostKind::Percentage { pct } => Box::new(PercentageFee::new(*pct)),
            CostKind::Commission { per_share, min, max } => Box::new(CommissionBased::new(*per_share, *min, *max)),
        }
    }
}

/// Typed, serde-derived configuration for one backtest's broker and event
/// channel (C15): channel capacity, heartbeat timeout, and the three
/// pluggable model selections, in place of a stringly-typed options map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub base_currency: Currency,
    pub initial_deposit: Decimal,
    pub channel_capacity: usize,
    pub heartbeat_timeout_ms: u64,
    pub account_model: AccountModelKind,
    pub pricing: PricingKind,
    pub cost: CostKind,
}

impl BacktestConfig {
    pub fn new(base_currency: Currency, initial_deposit: Decimal) -> Self {
        Self {
            base_currency,
            initial_deposit,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_MS,
            account_model: AccountModelKind::default(),
            pricing: PricingKind::default(),
            cost: CostKind::default(),
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_account_model(mut self, account_model: AccountModelKind) -> Self {
        self.account_model = account_model;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingKind) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_cost(mut self, cost: CostKind) -> Self {
        self.cost = cost;
        self
    }

    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self::new(Currency::usd(), Decimal::from(100_000))
    }
}
