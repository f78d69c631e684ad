use rust_decimal::Decimal;
use rq_types::Execution;

/// Computes the fee owed on one execution, in the asset's currency (C4).
/// Fees are always debited from cash in that currency — no implicit
/// conversion happens here or at the call site.
pub trait CostModel: Send + Sync {
    fn fee(&self, execution: &Execution) -> Decimal;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFee;

impl CostModel for NoFee {
    fn fee(&self, _execution: &Execution) -> Decimal {
        Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PercentageFee {
    pub pct: Decimal,
}

impl PercentageFee {
    pub fn new(pct: Decimal) -> Self {
        Self { pct }
    }
}

impl CostModel for PercentageFee {
    fn fee(&self, execution: &Execution) -> Decimal {
        execution.size.abs() * execution.price * self.pct
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommissionBased {
    pub per_share: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

impl CommissionBased {
    pub fn new(per_share: Decimal, min: Decimal, max: Decimal) -> Self {
        Self { per_share, min, max }
    }
}

impl CostModel for CommissionBased {
    fn fee(&self, execution: &Execution) -> Decimal {
        let raw = execution.size.abs() * self.per_share;
        raw.clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exec(size: Decimal, price: Decimal) -> Execution {
        Execution { size, price }
    }

    #[test]
    fn no_fee_is_zero() {
        assert_eq!(NoFee.fee(&exec(dec!(100), dec!(50))), Decimal::ZERO);
    }

    #[test]
    fn percentage_fee_scales_with_notional() {
        let model = PercentageFee::new(dec!(0.001));
        assert_eq!(model.fee(&exec(dec!(100), dec!(50))), dec!(5.000));
    }

    #[test]
    fn commission_based_clamps_to_min_and_max() {
        let model = CommissionBased::new(dec!(0.01), dec!(1), dec!(10));
        assert_eq!(model.fee(&exec(dec!(10), dec!(1))), dec!(1)); // below min
        assert_eq!(model.fee(&exec(dec!(5000), dec!(1))), dec!(10)); // above max
        assert_eq!(model.fee(&exec(dec!(500), dec!(1))), dec!(5)); // in range
    }
}
