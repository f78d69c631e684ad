use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Asset classification (C1). Combined with exchange and currency this is
/// the full identity of an [`Asset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Stock,
    Forex,
    Crypto,
    Futures,
    Cfd,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetClass::Stock => "Stock",
            AssetClass::Forex => "Forex",
            AssetClass::Crypto => "Crypto",
            AssetClass::Futures => "Futures",
            AssetClass::Cfd => "Cfd",
        };
        write!(f, "{}", s)
    }
}

/// Three-letter currency code with a decimal-digit count used for rounding.
/// Equality and hashing are by code only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub decimals: u32,
}

impl Currency {
    pub fn new(code: &str, decimals: u32) -> Self {
        Self {
            code: code.to_uppercase(),
            decimals,
        }
    }

    pub fn usd() -> Self {
        Self::new("USD", 2)
    }

    pub fn eur() -> Self {
        Self::new("EUR", 2)
    }

    pub fn jpy() -> Self {
        Self::new("JPY", 0)
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}
impl Eq for Currency {}

impl std::hash::Hash for Currency {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// A monetary value denominated in a single currency. Arithmetic between two
/// `Amount`s of different currencies is a compile-time type error to catch by
/// construction: callers must go through [`crate::account::ExchangeRates`]
/// first, there is no `Add`/`Sub` impl across currencies here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    pub currency: Currency,
    pub value: Decimal,
}

impl Amount {
    pub fn new(currency: Currency, value: Decimal) -> Self {
        Self { currency, value }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(currency, Decimal::ZERO)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency.code)
    }
}

/// Financial instrument identity. Immutable and value-equal by its
/// `(symbol, exchange)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub currency: Currency,
    pub exchange: String,
    /// Contract/point multiplier applied to realised and unrealised P&L.
    pub multiplier: Decimal,
}

impl Asset {
    pub fn new(symbol: &str, asset_class: AssetClass, currency: Currency, exchange: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            asset_class,
            currency,
            exchange: exchange.to_string(),
            multiplier: Decimal::ONE,
        }
    }

    pub fn stock(symbol: &str, currency: Currency) -> Self {
        Self::new(symbol, AssetClass::Stock, currency, "SMART")
    }

    pub fn with_multiplier(mut self, multiplier: Decimal) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.exchange == other.exchange
    }
}
impl Eq for Asset {}

impl std::hash::Hash for Asset {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
        self.exchange.hash(state);
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// A multi-currency cash balance. No implicit conversion is ever performed;
/// callers convert explicitly via `ExchangeRates` before combining balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wallet {
    balances: HashMap<String, Decimal>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, amount: &Amount) {
        *self.balances.entry(amount.currency.code.clone()).or_insert(Decimal::ZERO) += amount.value;
    }

    pub fn withdraw(&mut self, amount: &Amount) {
        *self.balances.entry(amount.currency.code.clone()).or_insert(Decimal::ZERO) -= amount.value;
    }

    pub fn balance(&self, currency: &Currency) -> Decimal {
        self.balances.get(&currency.code).copied().unwrap_or(Decimal::ZERO)
    }

    /// Drops currencies whose balance is exactly zero.
    pub fn prune(&mut self) {
        self.balances.retain(|_, v| !v.is_zero());
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.balances.keys().map(|s| s.as_str())
    }

    pub fn balances(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.balances.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.balances.values().all(|v| v.is_zero())
    }
}

impl std::ops::Add for Wallet {
    type Output = Wallet;
    fn add(mut self, rhs: Wallet) -> Wallet {
        for (code, value) in rhs.balances {
            *self.balances.entry(code).or_insert(Decimal::ZERO) += value;
        }
        self
    }
}

impl std::ops::Neg for Wallet {
    type Output = Wallet;
    fn neg(mut self) -> Wallet {
        for v in self.balances.values_mut() {
            *v = -*v;
        }
        self
    }
}

/// Which scalar a [`PriceItem`] is asked to yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceKind {
    Open,
    High,
    Low,
    Close,
    Default,
}

/// A single price level `(size, limit)` used in [`PriceItem::OrderBook`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub size: Decimal,
    pub limit: Decimal,
}

/// One sample of price information for an asset at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriceItem {
    PriceBar {
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        span: chrono::Duration,
    },
    TradePrice {
        price: Decimal,
        volume: Decimal,
    },
    PriceQuote {
        ask: Decimal,
        ask_size: Decimal,
        bid: Decimal,
        bid_size: Decimal,
    },
    OrderBook {
        asks: Vec<BookLevel>,
        bids: Vec<BookLevel>,
    },
}

impl PriceItem {
    /// Resolves the requested price kind. `PriceKind::Default` is the
    /// natural representative price of the variant: close for a bar, last
    /// trade price for a trade, the level-1 volume-weighted mid for a quote
    /// or an order book (the level-1 volume-weighted mid, not a plain
    /// midpoint, so a lopsided book isn't priced as if it were balanced).
    pub fn price_of(&self, kind: PriceKind) -> Decimal {
        match self {
            PriceItem::PriceBar { open, high, low, close, .. } => match kind {
                PriceKind::Open => *open,
                PriceKind::High => *high,
                PriceKind::Low => *low,
                PriceKind::Close | PriceKind::Default => *close,
            },
            PriceItem::TradePrice { price, .. } => *price,
            PriceItem::PriceQuote { ask, bid, ask_size, bid_size, .. } => match kind {
                PriceKind::High => *ask,
                PriceKind::Low => *bid,
                _ => volume_weighted_mid(*bid, *bid_size, *ask, *ask_size),
            },
            PriceItem::OrderBook { asks, bids } => {
                let best_ask = asks.first();
                let best_bid = bids.first();
                match (best_bid, best_ask) {
                    (Some(b), Some(a)) => match kind {
                        PriceKind::High => a.limit,
                        PriceKind::Low => b.limit,
                        _ => volume_weighted_mid(b.limit, b.size, a.limit, a.size),
                    },
                    (Some(b), None) => b.limit,
                    (None, Some(a)) => a.limit,
                    (None, None) => Decimal::ZERO,
                }
            }
        }
    }

    /// High/low used by order-type execution rules (§4.3): for a bar these
    /// are the bar's own high/low, for anything else they collapse to the
    /// default price.
    pub fn high(&self) -> Decimal {
        match self {
            PriceItem::PriceBar { high, .. } => *high,
            other => other.price_of(PriceKind::Default),
        }
    }

    pub fn low(&self) -> Decimal {
        match self {
            PriceItem::PriceBar { low, .. } => *low,
            other => other.price_of(PriceKind::Default),
        }
    }
}

fn volume_weighted_mid(bid: Decimal, bid_size: Decimal, ask: Decimal, ask_size: Decimal) -> Decimal {
    let total = bid_size + ask_size;
    if total.is_zero() {
        (bid + ask) / Decimal::TWO
    } else {
        (bid * ask_size + ask * bid_size) / total
    }
}

/// A timestamped batch of price samples, one per asset at most (last wins
/// if duplicated). An empty `items` vector is a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    pub items: Vec<(Asset, PriceItem)>,
}

impl Event {
    pub fn new(time: DateTime<Utc>, items: Vec<(Asset, PriceItem)>) -> Self {
        Self { time, items }
    }

    pub fn heartbeat(time: DateTime<Utc>) -> Self {
        Self { time, items: Vec::new() }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.items.is_empty()
    }

    /// Last-wins mapping from asset to its price sample in this event.
    pub fn prices(&self) -> HashMap<&Asset, &PriceItem> {
        let mut map = HashMap::new();
        for (asset, item) in &self.items {
            map.insert(asset, item);
        }
        map
    }

    pub fn price_of(&self, asset: &Asset) -> Option<&PriceItem> {
        self.items.iter().rev().find(|(a, _)| a == asset).map(|(_, p)| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_add_neg_is_empty() {
        let mut w = Wallet::new();
        w.deposit(&Amount::new(Currency::usd(), Decimal::from(100)));
        let total = w.clone() + (-w);
        assert!(total.is_empty());
    }

    #[test]
    fn wallet_prune_drops_zero_balances() {
        let mut w = Wallet::new();
        w.deposit(&Amount::new(Currency::usd(), Decimal::from(100)));
        w.withdraw(&Amount::new(Currency::usd(), Decimal::from(100)));
        w.prune();
        assert_eq!(w.currencies().count(), 0);
    }

    #[test]
    fn event_prices_last_wins_on_duplicate_asset() {
        let asset = Asset::stock("ABC", Currency::usd());
        let time = Utc::now();
        let first = PriceItem::TradePrice { price: Decimal::from(10), volume: Decimal::ONE };
        let second = PriceItem::TradePrice { price: Decimal::from(20), volume: Decimal::ONE };
        let event = Event::new(time, vec![(asset.clone(), first), (asset.clone(), second)]);
        assert_eq!(event.price_of(&asset).unwrap().price_of(PriceKind::Default), Decimal::from(20));
    }

    #[test]
    fn empty_event_is_heartbeat() {
        let event = Event::heartbeat(Utc::now());
        assert!(event.is_heartbeat());
    }

    #[test]
    fn bar_priceof_open_high_low_close() {
        let bar = PriceItem::PriceBar {
            open: Decimal::from(10),
            high: Decimal::from(12),
            low: Decimal::from(9),
            close: Decimal::from(11),
            volume: Decimal::from(1000),
            span: chrono::Duration::days(1),
        };
        assert_eq!(bar.price_of(PriceKind::Open), Decimal::from(10));
        assert_eq!(bar.price_of(PriceKind::High), Decimal::from(12));
        assert_eq!(bar.price_of(PriceKind::Low), Decimal::from(9));
        assert_eq!(bar.price_of(PriceKind::Close), Decimal::from(11));
        assert_eq!(bar.price_of(PriceKind::Default), Decimal::from(11));
    }
}
