//! Constant-product swap math (x * y = k) with configurable fee.
//!
//! All arithmetic is exact 256-bit unsigned; intermediate products never
//! truncate. No floating point anywhere in this module — ranking happens
//! elsewhere, quotes happen here.

use crate::types::FEE_DENOM;
use alloy::primitives::U256;

/// Calculate output amount for a given input.
///
/// amountOut = (amountIn * feeNum * reserveOut) / (reserveIn * 10000 + amountIn * feeNum)
///
/// `fee_num = 9975` is the 0.25% fee used by most BSC V2 forks; pass the
/// venue's own numerator when it differs. Returns zero when any input is
/// zero. Integer division rounds down, matching the on-chain router.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_num: u32) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }

    let amount_in_with_fee = amount_in * U256::from(fee_num);
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(FEE_DENOM) + amount_in_with_fee;

    numerator / denominator
}

/// Calculate the input required for a specific output. Inverse of
/// [`get_amount_out`]; rounds up so the quoted input always suffices.
/// Returns `U256::MAX` when the pool cannot produce `amount_out`.
pub fn get_amount_in(amount_out: U256, reserve_in: U256, reserve_out: U256, fee_num: u32) -> U256 {
    if amount_out.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }

    if amount_out >= reserve_out {
        return U256::MAX;
    }

    let numerator = reserve_in * amount_out * U256::from(FEE_DENOM);
    let denominator = (reserve_out - amount_out) * U256::from(fee_num);

    numerator / denominator + U256::from(1)
}
