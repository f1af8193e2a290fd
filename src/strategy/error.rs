//! Fatal conditions raised by the strategy core.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by the strategy engine.
///
/// `Insolvency` and `InternalInconsistency` end the simulation run; the
/// remaining variants are precondition violations rejected before any state
/// is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),

    #[error("invalid strategy configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "lending position insolvent: debt value {debt_value} exceeds liquidation boundary {liquidation_boundary}"
    )]
    Insolvency {
        debt_value: Decimal,
        liquidation_boundary: Decimal,
    },

    #[error("internal inconsistency: {0}")]
    InternalInconsistency(Inconsistency),
}

/// Modeling defects detected while rebalancing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Inconsistency {
    #[error("rebalance increased total value from {before} to {after}")]
    ValueCreated { before: Decimal, after: Decimal },

    #[error("liquidity added at implied price {implied}, oracle price is {oracle}")]
    ImpliedPriceMismatch { implied: Decimal, oracle: Decimal },
}

impl StrategyError {
    /// Whether this error terminates a simulation run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StrategyError::Insolvency { .. } | StrategyError::InternalInconsistency(_)
        )
    }
}

impl From<Inconsistency> for StrategyError {
    fn from(inner: Inconsistency) -> Self {
        StrategyError::InternalInconsistency(inner)
    }
}
