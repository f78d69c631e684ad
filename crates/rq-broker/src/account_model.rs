use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use rq_types::{Amount, Currency, ExchangeRates, OrderKind, RqResult, Side, SingleOrder};

use crate::ledger::Ledger;

/// Everything an [`AccountModel`] needs to compute buying power or validate
/// an incoming order (C7).
pub struct AccountContext<'a> {
    pub ledger: &'a Ledger,
    pub base_currency: &'a Currency,
    pub rates: &'a dyn ExchangeRates,
    pub time: DateTime<Utc>,
    /// Every currently open order leg, single or composite, across the
    /// broker. Used to reserve buying power against resting buy orders that
    /// haven't filled yet.
    pub open_orders: &'a [SingleOrder],
}

/// An order's reference price for sizing a not-yet-filled commitment: its
/// limit/stop price if the order kind carries one, otherwise the asset's
/// last marked price, otherwise zero.
pub(crate) fn reference_price(order: &SingleOrder, ledger: &Ledger) -> Decimal {
    let from_kind = match &order.kind {
        OrderKind::Limit { limit } => Some(*limit),
        OrderKind::Stop { stop } => Some(*stop),
        OrderKind::StopLimit { limit, .. } => Some(*limit),
        _ => None,
    };
    from_kind
        .or_else(|| ledger.position(&order.asset).map(|p| p.mkt_price))
        .unwrap_or(Decimal::ZERO)
}

/// Function from `(cash, positions, open orders)` to buying power in base
/// currency (C7, glossary). Also the authority on whether shorting is
/// permitted at all.
pub trait AccountModel: Send + Sync {
    fn buying_power(&self, ctx: &AccountContext) -> RqResult<Amount>;

    /// Whether an order that would drive a position negative is permitted.
    fn allows_short(&self) -> bool;
}

/// No shorting; buying power is cash minus the notional of open buy-order
/// commitments (§4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct CashAccount;

impl AccountModel for CashAccount {
    fn buying_power(&self, ctx: &AccountContext) -> RqResult<Amount> {
        let cash = ctx.ledger.cash.balance(ctx.base_currency);
        let base_cash = ctx.rates.convert(&Amount::new(ctx.base_currency.clone(), cash), ctx.base_currency, ctx.time)?;

        let mut committed = Decimal::ZERO;
        for order in ctx.open_orders {
            if order.status.is_closed() || order.side() != Side::Buy {
                continue;
            }
            let price = reference_price(order, ctx.ledger);
            let notional = order.size.abs() * price * order.asset.multiplier;
            let notional_base = ctx.rates.convert(&Amount::new(order.asset.currency.clone(), notional), ctx.base_currency, ctx.time)?;
            committed += notional_base.value;
        }

        Ok(Amount::new(ctx.base_currency.clone(), base_cash.value - committed))
    }

    fn allows_short(&self) -> bool {
        false
    }
}

/// Leveraged margin account: `bp = max(0, leverage * equity - Σ|exposure|)`.
/// Permits shorting; short credit increases cash but long exposure consumes
/// buying power 1:1 against leverage (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct MarginAccount {
    pub leverage: Decimal,
    pub min_equity: Decimal,
}

impl MarginAccount {
    pub fn new(leverage: Decimal, min_equity: Decimal) -> Self {
        Self { leverage, min_equity }
    }
}

impl Default for MarginAccount {
    fn default() -> Self {
        Self { leverage: Decimal::TWO, min_equity: Decimal::ZERO }
    }
}

impl AccountModel for MarginAccount {
    fn buying_power(&self, ctx: &AccountContext) -> RqResult<Amount> {
        compute_margin_buying_power(ctx, self.leverage)
    }

    fn allows_short(&self) -> bool {
        true
    }
}

/// Regulation-T margin: fixed 2x overnight leverage, 4x on positions closed
/// the same trading day (§4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct RegT;

impl AccountModel for RegT {
    fn buying_power(&self, ctx: &AccountContext) -> RqResult<Amount> {
        let day_trading = ctx.ledger.positions().any(|p| ctx.ledger.is_day_trade(&p.asset, ctx.time));
        let leverage = if day_trading { Decimal::from(4) } else { Decimal::TWO };
        compute_margin_buying_power(ctx, leverage)
    }

    fn allows_short(&self) -> bool {
        true
    }
}

fn compute_margin_buying_power(ctx: &AccountContext, leverage: Decimal) -> RqResult<Amount> {
    let equity = ctx.ledger.equity(ctx.base_currency, ctx.rates, ctx.time)?;
    let mut exposure = Decimal::ZERO;
    for pos in ctx.ledger.positions() {
        exposure += ctx
            .rates
            .convert(&Amount::new(pos.asset.currency.clone(), pos.exposure()), ctx.base_currency, ctx.time)?
            .value;
    }
    let bp = (leverage * equity - exposure).max(Decimal::ZERO);
    Ok(Amount::new(ctx.base_currency.clone(), bp))
}
