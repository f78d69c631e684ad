pub mod account_model;
pub mod broker;
pub mod config;
pub mod cost;
pub mod executor;
pub mod ledger;
pub mod pricing;

pub use account_model::{AccountContext, AccountModel, CashAccount, MarginAccount, RegT};
pub use broker::SimulatedBroker;
pub use config::{AccountModelKind, BacktestConfig, CostKind, PricingKind};
pub use cost::{CommissionBased, CostModel, NoFee, PercentageFee};
pub use executor::Executor;
pub use ledger::Ledger;
pub use pricing::{NoSlippage, PricingEngine, SpreadSlippage};
