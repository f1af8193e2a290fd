//! Six-step rebalance pipeline.
//!
//! Each step takes the strategy state by value, recomputes the ideal setup
//! from what it was handed, and returns the updated state. Steps run in a
//! fixed order; earlier steps free the funds later steps consume.

use crate::strategy::{Inconsistency, StrategyError, StrategyState};
use crate::utils::decimal::relative_diff;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

/// Largest total-value increase a rebalance may produce (rounding noise).
pub const VALUE_EPSILON: Decimal = dec!(0.00001);

/// Allowed relative gap between the price implied by added liquidity and the
/// oracle price.
pub const IMPLIED_PRICE_TOLERANCE: Decimal = dec!(0.001);

/// Market parameters shared by every step of one rebalance.
#[derive(Debug, Clone, Copy)]
pub struct RebalanceContext {
    pub price: Decimal,
    pub ideal_ratio: Decimal,
    pub swap_fee: Decimal,
    /// Relative shortfall of AMM reserve Y that triggers adding liquidity
    pub liquidity_add_threshold: Decimal,
}

pub type RebalanceStep =
    fn(StrategyState, &RebalanceContext) -> Result<StrategyState, StrategyError>;

/// The pipeline, in execution order.
pub const REBALANCE_STEPS: [(&str, RebalanceStep); 6] = [
    ("withdraw_excess_liquidity", withdraw_excess_liquidity),
    ("withdraw_excess_collateral", withdraw_excess_collateral),
    ("cover_outstanding_borrow", cover_outstanding_borrow),
    ("cover_outstanding_collateral", cover_outstanding_collateral),
    ("borrow_until_ideal", borrow_until_ideal),
    ("add_outstanding_liquidity", add_outstanding_liquidity),
];

/// Run all six steps and verify no value was created.
pub fn rebalance(
    state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let value_before = state.total_value(ctx.price);

    let state = REBALANCE_STEPS
        .iter()
        .try_fold(state, |state, (name, step)| {
            let next = step(state, ctx)?;
            debug!(
                step = *name,
                amm_reserve_y = %next.amm_reserve_y(ctx.price),
                collateral = %next.lending.collateral,
                debt = %next.lending.debt,
                unused_ton = %next.funds.ton,
                unused_usdt = %next.funds.usdt,
                "Rebalance step complete"
            );
            Ok::<_, StrategyError>(next)
        })?;

    verify_value_conserved(value_before, state.total_value(ctx.price))?;
    Ok(state)
}

/// Step 1: shrink the AMM to its ideal reserve Y, scaling both reserves by
/// the same factor, and park the freed assets as unused funds.
pub fn withdraw_excess_liquidity(
    mut state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
    let (reserve_x, reserve_y) = state.amm.reserves_at(ctx.price);

    if reserve_y <= ideal.amm_reserve_y || reserve_y == Decimal::ZERO {
        return Ok(state);
    }

    let factor = (ideal.amm_reserve_y / reserve_y).max(Decimal::ZERO);
    let new_x = reserve_x * factor;
    let new_y = reserve_y * factor;

    state.amm.set_reserves(new_x, new_y);
    state.funds.ton += reserve_x - new_x;
    state.funds.usdt += reserve_y - new_y;

    Ok(state)
}

/// Step 2: move collateral above the ideal into unused USDT.
pub fn withdraw_excess_collateral(
    mut state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
    let excess = state.lending.collateral - ideal.lending_collateral;

    if excess > Decimal::ZERO {
        state.lending.collateral -= excess;
        state.funds.usdt += excess;
    }

    Ok(state)
}

/// Step 3: repay debt above the ideal borrow amount, swapping USDT for TON
/// when unused TON runs short.
pub fn cover_outstanding_borrow(
    mut state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
    let excess_debt = state.lending.debt - ideal.borrow_amount;

    if excess_debt <= Decimal::ZERO {
        return Ok(state);
    }

    let repaid = state.funds.cover_with_ton(excess_debt, ctx.price, ctx.swap_fee);
    state.lending.debt -= repaid;

    if repaid < excess_debt {
        warn!(
            requested = %excess_debt,
            %repaid,
            "Unused funds exhausted while repaying debt"
        );
    }

    Ok(state)
}

/// Step 4: top collateral up to the ideal, swapping TON for USDT when unused
/// USDT runs short.
pub fn cover_outstanding_collateral(
    mut state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
    let shortfall = ideal.lending_collateral - state.lending.collateral;

    if shortfall <= Decimal::ZERO {
        return Ok(state);
    }

    let supplied = state.funds.cover_with_usdt(shortfall, ctx.price, ctx.swap_fee);
    state.lending.collateral += supplied;

    if supplied < shortfall {
        warn!(
            requested = %shortfall,
            %supplied,
            "Unused funds exhausted while topping up collateral"
        );
    }

    Ok(state)
}

/// Step 5: borrow the shortfall to the ideal borrow amount into unused TON.
pub fn borrow_until_ideal(
    mut state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
    let shortfall = ideal.borrow_amount - state.lending.debt;

    if shortfall > Decimal::ZERO {
        state.lending.debt += shortfall;
        state.funds.ton += shortfall;
    }

    Ok(state)
}

/// Step 6: grow the AMM towards its ideal reserve Y when it sits more than
/// `liquidity_add_threshold` below it.
///
/// The amounts are capped by the unused value net of the swap fee, so both
/// sides can be sourced even when one of them needs a swap.
pub fn add_outstanding_liquidity(
    mut state: StrategyState,
    ctx: &RebalanceContext,
) -> Result<StrategyState, StrategyError> {
    let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
    let (reserve_x, reserve_y) = state.amm.reserves_at(ctx.price);
    let missing_y = ideal.amm_reserve_y - reserve_y;

    if missing_y <= ideal.amm_reserve_y * ctx.liquidity_add_threshold {
        return Ok(state);
    }

    let budget = state.funds.value(ctx.price) * (Decimal::ONE - ctx.swap_fee);
    if budget <= Decimal::ZERO {
        warn!(%missing_y, "No unused funds available to add liquidity");
        return Ok(state);
    }

    let mut add_y = missing_y;
    let mut add_x = missing_y / ctx.price;
    let required = add_x * ctx.price + add_y;
    if required > budget {
        let scale = budget / required;
        add_x *= scale;
        add_y *= scale;
    }

    let obtained_x = state.funds.cover_with_ton(add_x, ctx.price, ctx.swap_fee);
    let obtained_y = state.funds.cover_with_usdt(add_y, ctx.price, ctx.swap_fee);

    if obtained_x == Decimal::ZERO && obtained_y == Decimal::ZERO {
        return Ok(state);
    }
    verify_implied_price(obtained_x, obtained_y, ctx.price)?;

    state
        .amm
        .set_reserves(reserve_x + obtained_x, reserve_y + obtained_y);

    Ok(state)
}

/// Liquidity must be added at the oracle price.
pub fn verify_implied_price(
    amount_x: Decimal,
    amount_y: Decimal,
    price: Decimal,
) -> Result<(), StrategyError> {
    // No TON side means no finite implied price
    if amount_x == Decimal::ZERO {
        return Err(Inconsistency::ImpliedPriceMismatch {
            implied: Decimal::MAX,
            oracle: price,
        }
        .into());
    }

    let implied = amount_y / amount_x;
    if relative_diff(implied, price) > IMPLIED_PRICE_TOLERANCE {
        return Err(Inconsistency::ImpliedPriceMismatch {
            implied,
            oracle: price,
        }
        .into());
    }
    Ok(())
}

/// Rebalancing may lose value to fees but never create it.
pub fn verify_value_conserved(before: Decimal, after: Decimal) -> Result<(), StrategyError> {
    if after > before + VALUE_EPSILON {
        return Err(Inconsistency::ValueCreated { before, after }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{AmmPosition, LendingPosition, UnusedFunds};

    fn seed_state() -> StrategyState {
        StrategyState {
            amm: AmmPosition::new(dec!(165000), dec!(330000), dec!(0.1)),
            lending: LendingPosition::new(
                dec!(670000),
                dec!(165000),
                dec!(1.5),
                dec!(0.05),
                dec!(0.03),
            ),
            funds: UnusedFunds::default(),
        }
    }

    fn ctx(price: Decimal, swap_fee: Decimal) -> RebalanceContext {
        RebalanceContext {
            price,
            ideal_ratio: dec!(0.33),
            swap_fee,
            liquidity_add_threshold: dec!(0.05),
        }
    }

    #[test]
    fn test_withdraw_excess_liquidity_preserves_price_ratio() {
        let ctx = ctx(dec!(2.5), dec!(0.003));
        let before = seed_state();
        let (x0, y0) = before.amm.reserves_at(ctx.price);

        let after = withdraw_excess_liquidity(before.clone(), &ctx).unwrap();
        let (x1, y1) = after.amm.reserves_at(ctx.price);
        let ideal = before.ideal_setup(ctx.price, ctx.ideal_ratio);

        assert!((y1 - ideal.amm_reserve_y).abs() < dec!(0.0001));
        assert!(((y1 / x1) - ctx.price).abs() < dec!(0.000001));
        assert!((after.funds.ton - (x0 - x1)).abs() < dec!(0.0001));
        assert!((after.funds.usdt - (y0 - y1)).abs() < dec!(0.0001));
        assert!(after.total_value(ctx.price) <= before.total_value(ctx.price) + VALUE_EPSILON);
    }

    #[test]
    fn test_withdraw_excess_liquidity_skips_when_below_ideal() {
        let ctx = ctx(dec!(1.6), dec!(0.003));
        let before = seed_state();
        let after = withdraw_excess_liquidity(before.clone(), &ctx).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn test_withdraw_excess_collateral() {
        let ctx = ctx(dec!(2.5), dec!(0));
        let before = seed_state();
        let ideal = before.ideal_setup(ctx.price, ctx.ideal_ratio);

        let after = withdraw_excess_collateral(before.clone(), &ctx).unwrap();
        assert_eq!(after.lending.collateral, ideal.lending_collateral);
        assert_eq!(
            after.funds.usdt,
            before.lending.collateral - ideal.lending_collateral
        );
    }

    #[test]
    fn test_cover_outstanding_borrow_swaps_when_ton_short() {
        let ctx = ctx(dec!(2), dec!(0));
        let mut state = seed_state();
        // 1000 TON of excess debt, half covered directly
        state.lending.debt += dec!(1000);
        state.funds = UnusedFunds::new(dec!(500), dec!(2000));

        let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
        let after = cover_outstanding_borrow(state, &ctx).unwrap();

        assert_eq!(after.funds.ton, dec!(0));
        assert!(after.funds.usdt < dec!(2000));
        assert!((after.lending.debt - ideal.borrow_amount).abs() < dec!(0.000001));
    }

    #[test]
    fn test_cover_outstanding_borrow_tolerates_exhausted_funds() {
        let ctx = ctx(dec!(2), dec!(0.003));
        let mut state = seed_state();
        state.lending.debt += dec!(1000);
        state.funds = UnusedFunds::new(dec!(100), dec!(0));

        let after = cover_outstanding_borrow(state.clone(), &ctx).unwrap();
        assert_eq!(after.lending.debt, state.lending.debt - dec!(100));
        assert_eq!(after.funds.ton, dec!(0));
    }

    #[test]
    fn test_cover_outstanding_collateral() {
        let ctx = ctx(dec!(2), dec!(0.003));
        let mut state = seed_state();
        state.lending.collateral -= dec!(300);
        state.funds = UnusedFunds::new(dec!(0), dec!(300));

        let ideal = state.ideal_setup(ctx.price, ctx.ideal_ratio);
        let after = cover_outstanding_collateral(state, &ctx).unwrap();

        assert!(after.funds.usdt < dec!(0.000001));
        assert!(after.lending.collateral <= ideal.lending_collateral);
        assert!(ideal.lending_collateral - after.lending.collateral < dec!(0.000001));
    }

    #[test]
    fn test_borrow_until_ideal() {
        let ctx = ctx(dec!(1.6), dec!(0.003));
        let before = seed_state();
        let ideal = before.ideal_setup(ctx.price, ctx.ideal_ratio);

        let after = borrow_until_ideal(before.clone(), &ctx).unwrap();
        let borrowed = after.lending.debt - before.lending.debt;

        assert_eq!(after.lending.debt, ideal.borrow_amount);
        assert_eq!(after.funds.ton, borrowed);
        assert!((after.total_value(ctx.price) - before.total_value(ctx.price)).abs() < VALUE_EPSILON);
    }

    #[test]
    fn test_add_outstanding_liquidity() {
        let ctx = ctx(dec!(1.6), dec!(0.003));
        let state = borrow_until_ideal(
            withdraw_excess_collateral(seed_state(), &ctx).unwrap(),
            &ctx,
        )
        .unwrap();
        let y_before = state.amm_reserve_y(ctx.price);

        let after = add_outstanding_liquidity(state.clone(), &ctx).unwrap();
        let ideal = after.ideal_setup(ctx.price, ctx.ideal_ratio);

        assert!(after.amm_reserve_y(ctx.price) > y_before);
        assert!(after.amm_deviation_ratio(ctx.price, &ideal) < dec!(0.01));
        assert!(after.total_value(ctx.price) <= state.total_value(ctx.price) + VALUE_EPSILON);
    }

    #[test]
    fn test_add_outstanding_liquidity_skips_small_gap() {
        let ctx = ctx(dec!(2), dec!(0.003));
        let mut state = seed_state();
        // 1% below ideal is within the 5% band
        state.funds = UnusedFunds::new(dec!(0), dec!(10000));
        let after = add_outstanding_liquidity(state.clone(), &ctx).unwrap();
        assert_eq!(after, state);
    }

    #[test]
    fn test_rebalance_after_price_rise() {
        let ctx = ctx(dec!(2.5), dec!(0.003));
        let before = seed_state();
        let value_before = before.total_value(ctx.price);
        let ideal_before = before.ideal_setup(ctx.price, ctx.ideal_ratio);
        assert!(before.amm_deviation_ratio(ctx.price, &ideal_before) > dec!(0.1));

        let after = rebalance(before.clone(), &ctx).unwrap();
        let ideal_after = after.ideal_setup(ctx.price, ctx.ideal_ratio);

        assert!(after.total_value(ctx.price) <= value_before + VALUE_EPSILON);
        assert!(after.amm_deviation_ratio(ctx.price, &ideal_after) <= dec!(0.1));

        let collateral_gap_before = (before.deviations(ctx.price, &ideal_before).lending_collateral
            / ideal_before.lending_collateral)
            .abs();
        let collateral_gap_after = (after.deviations(ctx.price, &ideal_after).lending_collateral
            / ideal_after.lending_collateral)
            .abs();
        assert!(collateral_gap_after < collateral_gap_before);
    }

    #[test]
    fn test_rebalance_after_price_drop() {
        let ctx = ctx(dec!(1.6), dec!(0.003));
        let before = seed_state();
        let value_before = before.total_value(ctx.price);

        let after = rebalance(before, &ctx).unwrap();
        let ideal = after.ideal_setup(ctx.price, ctx.ideal_ratio);

        assert!(after.total_value(ctx.price) <= value_before + VALUE_EPSILON);
        // Fees are the only loss: 0.3% on the swapped leg
        assert!(value_before - after.total_value(ctx.price) < dec!(200));
        assert!(after.amm_deviation_ratio(ctx.price, &ideal) <= dec!(0.1));
        assert!(after.lending.debt > dec!(165000));
    }

    #[test]
    fn test_rebalance_without_fee_is_value_neutral() {
        let ctx = ctx(dec!(1.6), dec!(0));
        let before = seed_state();
        let value_before = before.total_value(ctx.price);

        let after = rebalance(before, &ctx).unwrap();
        assert!((after.total_value(ctx.price) - value_before).abs() < dec!(0.0001));
    }

    #[test]
    fn test_verify_implied_price() {
        assert!(verify_implied_price(dec!(100), dec!(200), dec!(2)).is_ok());
        assert!(verify_implied_price(dec!(100), dec!(200.1), dec!(2)).is_ok());

        let err = verify_implied_price(dec!(100), dec!(210), dec!(2)).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::InternalInconsistency(Inconsistency::ImpliedPriceMismatch { .. })
        ));
        assert!(verify_implied_price(dec!(0), dec!(5), dec!(2)).is_err());
    }

    #[test]
    fn test_verify_implied_price_without_ton_below_one() {
        let err = verify_implied_price(dec!(0), dec!(5), dec!(0.5)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            StrategyError::InternalInconsistency(Inconsistency::ImpliedPriceMismatch {
                oracle,
                ..
            }) if oracle == dec!(0.5)
        ));
    }

    #[test]
    fn test_verify_value_conserved() {
        assert!(verify_value_conserved(dec!(100), dec!(99)).is_ok());
        assert!(verify_value_conserved(dec!(100), dec!(100.000005)).is_ok());
        assert_eq!(
            verify_value_conserved(dec!(100), dec!(100.1)),
            Err(StrategyError::InternalInconsistency(
                Inconsistency::ValueCreated {
                    before: dec!(100),
                    after: dec!(100.1),
                }
            ))
        );
    }
}
