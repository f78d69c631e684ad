use rust_decimal::Decimal;
use rq_types::{PriceItem, PriceKind, Side};

/// Maps an event's price sample to the scalar prices an executor needs
/// (C4): a side-dependent market price plus the high/low needed by stop and
/// limit rules. Deterministic for a given `(item, side)` pair.
pub trait PricingEngine: Send + Sync {
    fn market_price(&self, item: &PriceItem, side: Side) -> Decimal;

    fn high_price(&self, item: &PriceItem) -> Decimal {
        item.high()
    }

    fn low_price(&self, item: &PriceItem) -> Decimal {
        item.low()
    }
}

/// Degenerate pricing engine: every price is the item's `DEFAULT` price.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlippage;

impl PricingEngine for NoSlippage {
    fn market_price(&self, item: &PriceItem, _side: Side) -> Decimal {
        item.price_of(PriceKind::Default)
    }
}

/// Inflates the market price for buys and deflates it for sells by a fixed
/// spread, expressed in basis points.
#[derive(Debug, Clone, Copy)]
pub struct SpreadSlippage {
    pub bps: Decimal,
}

impl SpreadSlippage {
    pub fn new(bps: Decimal) -> Self {
        Self { bps }
    }
}

impl PricingEngine for SpreadSlippage {
    fn market_price(&self, item: &PriceItem, side: Side) -> Decimal {
        let p = item.price_of(PriceKind::Default);
        let adj = self.bps / Decimal::from(10_000);
        match side {
            Side::Buy => p * (Decimal::ONE + adj),
            Side::Sell => p * (Decimal::ONE - adj),
        }
    }
}
