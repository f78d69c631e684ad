use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OrderError;
use crate::market::Asset;

/// Unique order identifier.
pub type OrderId = Uuid;

/// Signed, fixed-point order/position quantity. Positive is buy/long,
/// negative is sell/short; zero is never a valid order size.
pub type Size = Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn of(size: Size) -> Side {
        if size.is_sign_positive() {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }
}

/// Single-order type (C3). Each variant carries only the parameters that
/// distinguish its matching rule (§4.3); size/tif/tag live on [`SingleOrder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit { limit: Decimal },
    Stop { stop: Decimal },
    StopLimit { stop: Decimal, limit: Decimal },
    Trail { trail_pct: Decimal },
    TrailLimit { trail_pct: Decimal, limit_offset: Decimal },
}

/// Time-in-force policy governing when an open order expires (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    Gtc { max_days: i64 },
    Gtd { date: DateTime<Utc> },
    Ioc,
    Fok,
}

impl TimeInForce {
    /// `GTC` with a 90 calendar day default.
    pub fn gtc_default() -> Self {
        TimeInForce::Gtc { max_days: 90 }
    }
}

/// Order lifecycle state (§3). `open = {Initial, Accepted}`; everything else
/// is terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Initial,
    Accepted,
    Completed,
    Cancelled,
    Expired,
    Rejected,
}

impl OrderStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Initial | OrderStatus::Accepted)
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }
}

/// A single (non-composite) order, its own FSM state and executor-relevant
/// bookkeeping (acceptance time, for TIF expiry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleOrder {
    pub id: OrderId,
    pub asset: Asset,
    pub size: Size,
    pub kind: OrderKind,
    pub tif: TimeInForce,
    pub tag: String,
    pub status: OrderStatus,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl SingleOrder {
    pub fn new(asset: Asset, size: Size, kind: OrderKind, tif: TimeInForce, tag: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset,
            size,
            kind,
            tif,
            tag: tag.to_string(),
            status: OrderStatus::Initial,
            accepted_at: None,
        }
    }

    pub fn market(asset: Asset, size: Size) -> Self {
        Self::new(asset, size, OrderKind::Market, TimeInForce::Day, "")
    }

    pub fn limit(asset: Asset, size: Size, limit: Decimal) -> Self {
        Self::new(asset, size, OrderKind::Limit { limit }, TimeInForce::Day, "")
    }

    pub fn side(&self) -> Side {
        Side::of(self.size)
    }

    pub fn accept(&mut self, time: DateTime<Utc>) {
        if self.status == OrderStatus::Initial {
            self.status = OrderStatus::Accepted;
            self.accepted_at = Some(time);
        }
    }

    /// Transition to a terminal state. No-op if already closed (terminal
    /// transitions are absorbing).
    pub fn close(&mut self, to: OrderStatus) {
        debug_assert!(to.is_closed());
        if self.status.is_open() {
            self.status = to;
        }
    }
}

/// Structural shape of a composite order (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompositeKind {
    Oco(SingleOrder, SingleOrder),
    Oto { primary: SingleOrder, secondary: SingleOrder },
    Bracket { entry: SingleOrder, take_profit: SingleOrder, stop_loss: SingleOrder },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeOrder {
    pub id: OrderId,
    pub status: OrderStatus,
    pub kind: CompositeKind,
}

impl CompositeOrder {
    pub fn oco(first: SingleOrder, second: SingleOrder) -> Result<Self, OrderError> {
        if first.asset != second.asset {
            return Err(OrderError::AssetMismatch { context: "OCO legs".into() });
        }
        if first.size.abs() != second.size.abs() {
            return Err(OrderError::SizeMismatch { context: "OCO legs".into() });
        }
        Ok(Self { id: Uuid::new_v4(), status: OrderStatus::Initial, kind: CompositeKind::Oco(first, second) })
    }

    pub fn oto(primary: SingleOrder, secondary: SingleOrder) -> Result<Self, OrderError> {
        if primary.asset != secondary.asset {
            return Err(OrderError::AssetMismatch { context: "OTO legs".into() });
        }
        Ok(Self { id: Uuid::new_v4(), status: OrderStatus::Initial, kind: CompositeKind::Oto { primary, secondary } })
    }

    pub fn bracket(entry: SingleOrder, take_profit: SingleOrder, stop_loss: SingleOrder) -> Result<Self, OrderError> {
        if entry.asset != take_profit.asset || entry.asset != stop_loss.asset {
            return Err(OrderError::AssetMismatch { context: "bracket legs".into() });
        }
        if entry.size != -take_profit.size || entry.size != -stop_loss.size {
            return Err(OrderError::BracketSizeMismatch { context: "bracket legs".into() });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Initial,
            kind: CompositeKind::Bracket { entry, take_profit, stop_loss },
        })
    }

    pub fn asset(&self) -> &Asset {
        match &self.kind {
            CompositeKind::Oco(first, _) => &first.asset,
            CompositeKind::Oto { primary, .. } => &primary.asset,
            CompositeKind::Bracket { entry, .. } => &entry.asset,
        }
    }
}

/// Either a single or a composite order (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Order {
    Single(SingleOrder),
    Composite(CompositeOrder),
}

impl Order {
    pub fn id(&self) -> OrderId {
        match self {
            Order::Single(o) => o.id,
            Order::Composite(o) => o.id,
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            Order::Single(o) => o.status,
            Order::Composite(o) => o.status,
        }
    }

    pub fn asset(&self) -> &Asset {
        match self {
            Order::Single(o) => &o.asset,
            Order::Composite(o) => o.asset(),
        }
    }
}

/// A create/modify instruction emitted by a strategy (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Create(Order),
    Update { target: OrderId, replacement: Order },
    Cancel { target: OrderId },
}

/// One fill produced by an executor (§4.2): a signed size and a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub size: Size,
    pub price: Decimal,
}

/// An append-only record of a completed fill (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub time: DateTime<Utc>,
    pub asset: Asset,
    pub size: Size,
    pub price: Decimal,
    pub fee: Decimal,
    pub pnl: Decimal,
    pub order_id: OrderId,
}
