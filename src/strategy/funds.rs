//! Unused balances held outside both positions, and the swap-aware cover
//! functions that draw on them.

use crate::utils::decimal::{floor_asset, floor_value, safe_div};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// TON and USDT not deployed in the AMM or the lending market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnusedFunds {
    pub ton: Decimal,
    pub usdt: Decimal,
    /// Cumulative value (USDT) lost to swap fees
    pub swap_fees_paid: Decimal,
}

impl UnusedFunds {
    pub fn new(ton: Decimal, usdt: Decimal) -> Self {
        Self {
            ton,
            usdt,
            swap_fees_paid: Decimal::ZERO,
        }
    }

    /// Value of both balances in USDT.
    pub fn value(&self, price: Decimal) -> Decimal {
        self.ton * price + self.usdt
    }

    /// Supply up to `amount` USDT: unused USDT first, then TON swapped at
    /// `price` with `swap_fee` charged on the USDT received.
    ///
    /// Returns the USDT actually supplied, which is less than `amount` when
    /// both balances run dry.
    pub fn cover_with_usdt(&mut self, amount: Decimal, price: Decimal, swap_fee: Decimal) -> Decimal {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let direct = amount.min(self.usdt);
        self.usdt -= direct;

        let shortfall = amount - direct;
        if shortfall == Decimal::ZERO || self.ton <= Decimal::ZERO || price <= Decimal::ZERO {
            return direct;
        }

        let net_rate = price * (Decimal::ONE - swap_fee);
        let ton_spent = safe_div(shortfall, net_rate).min(self.ton);
        let received = floor_value(ton_spent * net_rate).min(shortfall);

        self.ton -= ton_spent;
        self.swap_fees_paid += ton_spent * price - received;

        debug!(
            %ton_spent,
            usdt_received = %received,
            %shortfall,
            "Swapped TON for USDT"
        );

        direct + received
    }

    /// Supply up to `amount` TON: unused TON first, then USDT swapped at
    /// `price` with `swap_fee` charged on the TON received.
    ///
    /// Returns the TON actually supplied, which is less than `amount` when
    /// both balances run dry.
    pub fn cover_with_ton(&mut self, amount: Decimal, price: Decimal, swap_fee: Decimal) -> Decimal {
        if amount <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let direct = amount.min(self.ton);
        self.ton -= direct;

        let shortfall = amount - direct;
        if shortfall == Decimal::ZERO || self.usdt <= Decimal::ZERO || price <= Decimal::ZERO {
            return direct;
        }

        let net_rate = safe_div(Decimal::ONE - swap_fee, price);
        let usdt_spent = safe_div(shortfall, net_rate).min(self.usdt);
        let received = floor_asset(usdt_spent * net_rate).min(shortfall);

        self.usdt -= usdt_spent;
        self.swap_fees_paid += usdt_spent - received * price;

        debug!(
            %usdt_spent,
            ton_received = %received,
            %shortfall,
            "Swapped USDT for TON"
        );

        direct + received
    }
}
