use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use rq_types::{Execution, OrderKind, OrderStatus, PriceItem, Side, SingleOrder, TimeInForce};

use crate::pricing::PricingEngine;

/// Drives one [`SingleOrder`] through its matching rule (§4.3), holding the
/// internal state (trail anchor, arm/trigger flags) a tagged-variant
/// executor needs across events.
#[derive(Debug, Clone)]
pub struct Executor {
    order: SingleOrder,
    armed: bool,
    anchor: Option<Decimal>,
    trigger_price: Option<Decimal>,
}

impl Executor {
    pub fn new(order: SingleOrder) -> Self {
        Self { order, armed: false, anchor: None, trigger_price: None }
    }

    pub fn order(&self) -> &SingleOrder {
        &self.order
    }

    pub fn order_mut(&mut self) -> &mut SingleOrder {
        &mut self.order
    }

    /// Runs one round of matching against `item` (§4.3). Returns zero or
    /// one execution; closes the order to `Completed` on a fill, to
    /// `Expired`/`Cancelled` per the TIF rule otherwise.
    pub fn execute(&mut self, pricing: &dyn PricingEngine, item: &PriceItem, time: DateTime<Utc>) -> Vec<Execution> {
        if !self.order.status.is_open() {
            return Vec::new();
        }

        if self.tif_expired(time) {
            self.order.close(OrderStatus::Expired);
            return Vec::new();
        }

        let side = self.order.side();
        let p = pricing.market_price(item, side);
        let h = pricing.high_price(item);
        let l = pricing.low_price(item);

        let fill_price = self.try_fill(side, p, h, l);

        match fill_price {
            Some(price) => {
                self.order.close(OrderStatus::Completed);
                vec![Execution { size: self.order.size, price }]
            }
            None => {
                // Neither Market nor Limit/Stop partially fill in this
                // engine (no depth model), so IOC and FOK collapse to the
                // same behaviour: cancel an unfilled attempt outright.
                if matches!(self.order.tif, TimeInForce::Ioc | TimeInForce::Fok) {
                    self.order.close(OrderStatus::Cancelled);
                }
                Vec::new()
            }
        }
    }

    fn try_fill(&mut self, side: Side, p: Decimal, h: Decimal, l: Decimal) -> Option<Decimal> {
        match self.order.kind.clone() {
            OrderKind::Market => Some(p),

            OrderKind::Limit { limit } => limit_fill(side, p, h, l, limit),

            OrderKind::Stop { stop } => {
                self.arm_on_stop(side, stop, h, l);
                self.armed.then_some(p)
            }

            OrderKind::StopLimit { stop, limit } => {
                self.arm_on_stop(side, stop, h, l);
                if self.armed {
                    limit_fill(side, p, h, l, limit)
                } else {
                    None
                }
            }

            OrderKind::Trail { trail_pct } => {
                self.update_trail_anchor(side, p);
                self.arm_on_trail(side, p, trail_pct);
                self.armed.then_some(p)
            }

            OrderKind::TrailLimit { trail_pct, limit_offset } => {
                self.update_trail_anchor(side, p);
                if !self.armed && self.arm_on_trail(side, p, trail_pct) {
                    self.trigger_price = Some(p);
                }
                match self.trigger_price {
                    Some(trigger) => limit_fill(side, p, h, l, trigger + limit_offset),
                    None => None,
                }
            }
        }
    }

    fn arm_on_stop(&mut self, side: Side, stop: Decimal, h: Decimal, l: Decimal) {
        if self.armed {
            return;
        }
        let arm = match side {
            Side::Buy => h >= stop,
            Side::Sell => l <= stop,
        };
        if arm {
            self.armed = true;
        }
    }

    /// Updates the trailing anchor and, if not yet armed, checks whether
    /// the trigger condition now holds. Returns whether it just armed.
    fn arm_on_trail(&mut self, side: Side, p: Decimal, trail_pct: Decimal) -> bool {
        if self.armed {
            return false;
        }
        let anchor = self.anchor.expect("anchor set by update_trail_anchor");
        let trigger = match side {
            Side::Sell => p <= anchor * (Decimal::ONE - trail_pct),
            Side::Buy => p >= anchor * (Decimal::ONE + trail_pct),
        };
        if trigger {
            self.armed = true;
        }
        trigger
    }

    fn update_trail_anchor(&mut self, side: Side, p: Decimal) {
        self.anchor = Some(match (self.anchor, side) {
            (None, _) => p,
            (Some(a), Side::Sell) => a.max(p),
            (Some(a), Side::Buy) => a.min(p),
        });
    }

    fn tif_expired(&self, time: DateTime<Utc>) -> bool {
        let accepted = match self.order.accepted_at {
            Some(t) => t,
            None => return false,
        };
        match self.order.tif {
            TimeInForce::Day => {
                let day_end = accepted.date_naive().and_hms_opt(23, 59, 59).unwrap().and_utc();
                time > day_end
            }
            TimeInForce::Gtc { max_days } => (time - accepted).num_days() > max_days,
            TimeInForce::Gtd { date } => time > date,
            TimeInForce::Ioc | TimeInForce::Fok => false,
        }
    }
}

fn limit_fill(side: Side, p: Decimal, h: Decimal, l: Decimal, limit: Decimal) -> Option<Decimal> {
    match side {
        Side::Buy if l <= limit => Some(p.min(limit)),
        Side::Sell if h >= limit => Some(p.max(limit)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::NoSlippage;
    use rust_decimal_macros::dec;
    use rq_types::{Asset, Currency};

    fn abc() -> Asset {
        Asset::stock("ABC", Currency::usd())
    }

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> PriceItem {
        PriceItem::PriceBar { open, high, low, close, volume: dec!(1000), span: chrono::Duration::days(1) }
    }

    fn accepted_order(size: Decimal, kind: OrderKind) -> SingleOrder {
        let mut o = SingleOrder::new(abc(), size, kind, TimeInForce::Day, "");
        o.accept(Utc::now());
        o
    }

    #[test]
    fn market_order_fills_immediately_full_size() {
        let mut exec = Executor::new(accepted_order(dec!(50), OrderKind::Market));
        let execs = exec.execute(&NoSlippage, &bar(dec!(100), dec!(101), dec!(99), dec!(100)), Utc::now());
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].size, dec!(50));
        assert_eq!(exec.order().status, OrderStatus::Completed);
    }

    #[test]
    fn limit_buy_fills_when_low_crosses_limit() {
        let mut exec = Executor::new(accepted_order(dec!(100), OrderKind::Limit { limit: dec!(90) }));
        let no_fill = exec.execute(&NoSlippage, &bar(dec!(100), dec!(101), dec!(95), dec!(100)), Utc::now());
        assert!(no_fill.is_empty());

        let fill = exec.execute(&NoSlippage, &bar(dec!(95), dec!(96), dec!(88), dec!(92)), Utc::now());
        assert_eq!(fill.len(), 1);
        assert_eq!(fill[0].price, dec!(90));
    }

    #[test]
    fn bracket_fill_path_from_spec() {
        // entry Market buy 50 at 100, tp Limit sell -50 @ 110, sl Stop sell -50 @ 95.
        let mut entry = Executor::new(accepted_order(dec!(50), OrderKind::Market));
        let execs = entry.execute(&NoSlippage, &bar(dec!(100), dec!(100), dec!(100), dec!(100)), Utc::now());
        assert_eq!(execs[0].price, dec!(100));

        let mut tp = Executor::new(accepted_order(dec!(-50), OrderKind::Limit { limit: dec!(110) }));
        let no_fill = tp.execute(&NoSlippage, &bar(dec!(102), dec!(102), dec!(102), dec!(102)), Utc::now());
        assert!(no_fill.is_empty());

        let fill = tp.execute(&NoSlippage, &bar(dec!(111), dec!(111), dec!(111), dec!(111)), Utc::now());
        assert_eq!(fill.len(), 1);
        assert_eq!(tp.order().status, OrderStatus::Completed);
    }

    #[test]
    fn trail_sell_triggers_on_pullback_from_anchor() {
        let mut exec = Executor::new(accepted_order(dec!(-10), OrderKind::Trail { trail_pct: dec!(0.05) }));
        exec.execute(&NoSlippage, &bar(dec!(100), dec!(100), dec!(100), dec!(100)), Utc::now());
        assert!(!exec.armed);

        exec.execute(&NoSlippage, &bar(dec!(110), dec!(110), dec!(110), dec!(110)), Utc::now());
        assert!(!exec.armed); // anchor now 110, no trigger yet

        let fills = exec.execute(&NoSlippage, &bar(dec!(104), dec!(104), dec!(104), dec!(104)), Utc::now());
        // 104 <= 110 * 0.95 = 104.5
        assert_eq!(fills.len(), 1);
    }

    #[test]
    fn ioc_cancels_unfilled_remainder() {
        let mut order = accepted_order(dec!(100), OrderKind::Limit { limit: dec!(50) });
        order.tif = TimeInForce::Ioc;
        let mut exec = Executor::new(order);
        let fills = exec.execute(&NoSlippage, &bar(dec!(100), dec!(100), dec!(90), dec!(100)), Utc::now());
        assert!(fills.is_empty());
        assert_eq!(exec.order().status, OrderStatus::Cancelled);
    }

    #[test]
    fn day_tif_expires_after_close_of_day() {
        let mut order = accepted_order(dec!(10), OrderKind::Limit { limit: dec!(50) });
        order.accepted_at = Some(Utc::now() - chrono::Duration::days(2));
        let mut exec = Executor::new(order);
        let fills = exec.execute(&NoSlippage, &bar(dec!(100), dec!(100), dec!(90), dec!(100)), Utc::now());
        assert!(fills.is_empty());
        assert_eq!(exec.order().status, OrderStatus::Expired);
    }
}
