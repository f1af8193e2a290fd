//! Leveraged LP strategy core.
//!
//! Contains:
//! - Price oracle and the two position models (AMM and lending)
//! - Unused funds with swap-aware cover functions
//! - Ideal-allocation and deviation math
//! - The six-step rebalance pipeline and the per-tick engine

mod amm;
mod engine;
mod error;
mod funds;
mod lending;
mod oracle;
pub mod rebalancer;
mod state;
mod status;

pub use amm::AmmPosition;
pub use engine::Strategy;
pub use error::{Inconsistency, StrategyError};
pub use funds::UnusedFunds;
pub use lending::LendingPosition;
pub use oracle::PriceOracle;
pub use rebalancer::RebalanceContext;
pub use state::{Deviations, IdealSetup, StrategyState};
pub use status::StrategyStatus;
