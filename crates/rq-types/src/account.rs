use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{BrokerError, RqResult};
use crate::market::{Amount, Asset, Currency, Wallet};
use crate::orders::{Order, OrderId, Size, Trade};

/// An open position in a single asset (§3). Pruned from the portfolio the
/// instant its size returns to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub asset: Asset,
    pub size: Size,
    pub avg_price: Decimal,
    pub mkt_price: Decimal,
}

impl Position {
    pub fn new(asset: Asset, size: Size, avg_price: Decimal) -> Self {
        Self { asset, mkt_price: avg_price, size, avg_price }
    }

    pub fn market_value(&self) -> Decimal {
        self.size * self.mkt_price * self.asset.multiplier
    }

    pub fn exposure(&self) -> Decimal {
        self.market_value().abs()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.mkt_price - self.avg_price) * self.size * self.asset.multiplier
    }

    pub fn mark_to_market(&mut self, price: Decimal) {
        self.mkt_price = price;
    }

    /// Applies one execution to this position (§4.2 step 4), returning the
    /// realised P&L of the closed portion. Handles the three cases in the
    /// spec's `avgPrice` invariant: same-direction add (size-weighted
    /// average), reduction (average unchanged), and direction flip
    /// (average rebased to the execution price).
    pub fn apply_fill(&mut self, exec_size: Size, exec_price: Decimal) -> Decimal {
        let same_direction = (self.size.is_sign_positive() == exec_size.is_sign_positive())
            || self.size.is_zero();

        if same_direction {
            let new_size = self.size + exec_size;
            let total_cost = self.avg_price * self.size.abs() + exec_price * exec_size.abs();
            self.avg_price = if new_size.is_zero() { self.avg_price } else { total_cost / new_size.abs() };
            self.size = new_size;
            self.mkt_price = exec_price;
            return Decimal::ZERO;
        }

        // Opposite direction: this is a reduction, a full close, or a flip.
        let closing_size = exec_size.abs().min(self.size.abs());
        let realized = (exec_price - self.avg_price) * closing_size * self.size.signum() * self.asset.multiplier;

        let new_size = self.size + exec_size;
        if new_size.is_zero() {
            self.size = Decimal::ZERO;
        } else if new_size.signum() == self.size.signum() {
            // Pure reduction: average cost basis is unchanged.
            self.size = new_size;
        } else {
            // Direction flip: residual beyond the close re-bases at the execution price.
            self.size = new_size;
            self.avg_price = exec_price;
        }
        self.mkt_price = exec_price;
        realized
    }
}

/// Immutable projection of broker state handed to strategies (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub base_currency: Currency,
    pub cash: Wallet,
    pub positions: HashMap<String, Position>,
    pub open_orders: Vec<Order>,
    pub closed_orders: Vec<Order>,
    pub trades: Vec<Trade>,
    pub buying_power: Amount,
    pub last_update: DateTime<Utc>,
}

impl Account {
    pub fn new(base_currency: Currency, time: DateTime<Utc>) -> Self {
        let buying_power = Amount::zero(base_currency.clone());
        Self {
            base_currency,
            cash: Wallet::new(),
            positions: HashMap::new(),
            open_orders: Vec::new(),
            closed_orders: Vec::new(),
            trades: Vec::new(),
            buying_power,
            last_update: time,
        }
    }

    pub fn open_order(&self, id: OrderId) -> Option<&Order> {
        self.open_orders.iter().find(|o| o.id() == id)
    }
}

/// Converts amounts between currencies for a point in time (§6).
pub trait ExchangeRates: Send + Sync {
    fn get_rate(&self, from: &Currency, to: &Currency, time: DateTime<Utc>) -> RqResult<Decimal>;

    fn convert(&self, amount: &Amount, to: &Currency, time: DateTime<Utc>) -> RqResult<Amount> {
        let rate = self.get_rate(&amount.currency, to, time)?;
        Ok(Amount::new(to.clone(), amount.value * rate))
    }
}

/// Reference `ExchangeRates` implementation: a static table of rates to a
/// base currency (§6). `getRate` within the same currency always returns 1.
#[derive(Debug, Clone)]
pub struct FixedRates {
    base: Currency,
    rates: HashMap<String, Decimal>,
}

impl FixedRates {
    pub fn new(base: Currency) -> Self {
        Self { base, rates: HashMap::new() }
    }

    pub fn with_rate(mut self, currency: &str, rate_to_base: Decimal) -> Self {
        self.rates.insert(currency.to_uppercase(), rate_to_base);
        self
    }
}

impl ExchangeRates for FixedRates {
    fn get_rate(&self, from: &Currency, to: &Currency, _time: DateTime<Utc>) -> RqResult<Decimal> {
        if from.code == to.code {
            return Ok(Decimal::ONE);
        }
        let from_to_base = if from.code == self.base.code {
            Decimal::ONE
        } else {
            *self.rates.get(&from.code).ok_or_else(|| BrokerError::UnknownRate {
                from: from.code.clone(),
                to: self.base.code.clone(),
            })?
        };
        let to_from_base = if to.code == self.base.code {
            Decimal::ONE
        } else {
            *self.rates.get(&to.code).ok_or_else(|| BrokerError::UnknownRate {
                from: self.base.code.clone(),
                to: to.code.clone(),
            })?
        };
        Ok(from_to_base / to_from_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Asset {
        Asset::stock("ABC", Currency::usd())
    }

    #[test]
    fn apply_fill_same_direction_recomputes_weighted_average() {
        let mut pos = Position::new(abc(), Decimal::from(10), Decimal::from(100));
        let pnl = pos.apply_fill(Decimal::from(10), Decimal::from(120));
        assert_eq!(pnl, Decimal::ZERO);
        assert_eq!(pos.size, Decimal::from(20));
        assert_eq!(pos.avg_price, Decimal::from(110));
    }

    #[test]
    fn apply_fill_reduction_keeps_avg_price() {
        let mut pos = Position::new(abc(), Decimal::from(40), Decimal::from(100));
        let pnl = pos.apply_fill(Decimal::from(-40), Decimal::from(75));
        assert_eq!(pos.size, Decimal::ZERO);
        assert_eq!(pos.avg_price, Decimal::from(100));
        assert_eq!(pnl, (Decimal::from(75) - Decimal::from(100)) * Decimal::from(40));
    }

    #[test]
    fn apply_fill_direction_flip_rebases_avg_price() {
        let mut pos = Position::new(abc(), Decimal::from(10), Decimal::from(100));
        pos.apply_fill(Decimal::from(-30), Decimal::from(90));
        assert_eq!(pos.size, Decimal::from(-20));
        assert_eq!(pos.avg_price, Decimal::from(90));
    }

    #[test]
    fn fixed_rates_same_currency_is_one() {
        let rates = FixedRates::new(Currency::usd());
        let rate = rates.get_rate(&Currency::usd(), &Currency::usd(), Utc::now()).unwrap();
        assert_eq!(rate, Decimal::ONE);
    }

    #[test]
    fn fixed_rates_missing_rate_errors() {
        let rates = FixedRates::new(Currency::usd());
        let err = rates.get_rate(&Currency::eur(), &Currency::usd(), Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn fixed_rates_round_trip_within_tolerance() {
        let rates = FixedRates::new(Currency::usd()).with_rate("EUR", Decimal::new(108, 2));
        let amount = Amount::new(Currency::usd(), Decimal::from(1000));
        let to_eur = rates.convert(&amount, &Currency::eur(), Utc::now()).unwrap();
        let back = rates.convert(&to_eur, &Currency::usd(), Utc::now()).unwrap();
        assert!((back.value - amount.value).abs() < Decimal::new(1, 6));
    }
}
