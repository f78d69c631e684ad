use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use rq_types::{Amount, Asset, Currency, Execution, ExchangeRates, OrderId, Position, RqResult, Trade, Wallet};

/// Multi-currency cash plus open positions plus the append-only trade list
/// (C5). This is the broker's mutable internal state; [`rq_types::Account`]
/// is the immutable snapshot derived from it on every `place`/`sync`.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub cash: Wallet,
    positions: HashMap<String, Position>,
    pub trades: Vec<Trade>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, amount: Amount) {
        self.cash.deposit(&amount);
    }

    pub fn position(&self, asset: &Asset) -> Option<&Position> {
        self.positions.get(&asset.to_string())
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Applies one execution (§4.2 step 4): updates or prunes the position,
    /// debits cash (execution notional plus fee, in the asset's currency),
    /// and appends a `Trade` carrying the realised P&L of the closed
    /// portion.
    pub fn apply_execution(
        &mut self,
        asset: &Asset,
        exec: Execution,
        fee: Decimal,
        order_id: OrderId,
        time: DateTime<Utc>,
    ) {
        let key = asset.to_string();
        let entry = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::new(asset.clone(), Decimal::ZERO, exec.price));
        let pnl = entry.apply_fill(exec.size, exec.price);
        if entry.size.is_zero() {
            self.positions.remove(&key);
        }

        let cash_delta = -(exec.size * exec.price * asset.multiplier) - fee;
        self.cash.deposit(&Amount::new(asset.currency.clone(), cash_delta));

        self.trades.push(Trade {
            time,
            asset: asset.clone(),
            size: exec.size,
            price: exec.price,
            fee,
            pnl,
            order_id,
        });
    }

    pub fn mark_to_market(&mut self, asset: &Asset, price: Decimal) {
        if let Some(pos) = self.positions.get_mut(&asset.to_string()) {
            pos.mark_to_market(price);
        }
    }

    /// `cash + Σ positions.marketValue`, converted into `base` (§4.6).
    pub fn equity(&self, base: &Currency, rates: &dyn ExchangeRates, time: DateTime<Utc>) -> RqResult<Decimal> {
        let mut total = Decimal::ZERO;
        for (code, value) in self.cash.balances() {
            let from = Currency::new(code, base.decimals);
            total += rates.convert(&Amount::new(from, value), base, time)?.value;
        }
        for pos in self.positions.values() {
            total += rates
                .convert(&Amount::new(pos.asset.currency.clone(), pos.market_value()), base, time)?
                .value;
        }
        Ok(total)
    }

    /// True if any two trades for `asset` today are on opposite sides of
    /// the same round trip — used by the RegT account model's day-trade
    /// leverage rule.
    pub fn is_day_trade(&self, asset: &Asset, today: DateTime<Utc>) -> bool {
        let mut saw_buy = false;
        let mut saw_sell = false;
        for trade in self.trades.iter().filter(|t| t.asset == *asset && t.time.date_naive() == today.date_naive()) {
            if trade.size.is_sign_positive() {
                saw_buy = true;
            } else {
                saw_sell = true;
            }
        }
        saw_buy && saw_sell
    }
}
