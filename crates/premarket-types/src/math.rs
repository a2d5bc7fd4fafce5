//! Fixed-point arithmetic for amounts, rates, and asset precision.
//!
//! Internal amounts carry [`AMOUNT_DECIMALS`] fractional digits. Assets
//! carry whatever precision the custodian reports. Every conversion names
//! its rounding direction: collecting from a user rounds **up**, paying out
//! rounds **down**, so escrow can never go negative.
//!
//! Amounts are `u128`. Products are formed in 256 bits, so only a quotient
//! that does not fit back into `u128` surfaces as
//! [`PremarketError::ArithmeticOverflow`].

use ruint::aliases::U256;
use rust_decimal::Decimal;

use crate::constants::{AMOUNT_DECIMALS, RATE_SCALE};
use crate::{PremarketError, Result};

/// Rounding direction for divisions that may leave a remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Floor,
    Ceil,
}

/// `10^exp`, checked.
pub fn pow10(exp: u32) -> Result<u128> {
    10u128
        .checked_pow(exp)
        .ok_or(PremarketError::ArithmeticOverflow { context: "pow10" })
}

/// `a * b / denom` with the requested rounding, full-width intermediate.
pub fn mul_div(a: u128, b: u128, denom: u128, rounding: Rounding) -> Result<u128> {
    if denom == 0 {
        return Err(PremarketError::InvalidAmount {
            reason: "division by zero".into(),
        });
    }
    let product = U256::from(a) * U256::from(b);
    let denom = U256::from(denom);
    let mut quotient = product / denom;
    if rounding == Rounding::Ceil && product % denom != U256::ZERO {
        quotient += U256::from(1u8);
    }
    u128::try_from(quotient)
        .map_err(|_| PremarketError::ArithmeticOverflow { context: "mul_div" })
}

/// Apply a parts-per-million rate, rounding down.
pub fn apply_rate(amount: u128, rate_ppm: u32) -> Result<u128> {
    mul_div(
        amount,
        u128::from(rate_ppm),
        u128::from(RATE_SCALE),
        Rounding::Floor,
    )
}

/// Pro-rata share `total * part / whole`, rounding down.
pub fn share(total: u128, part: u128, whole: u128) -> Result<u128> {
    mul_div(total, part, whole, Rounding::Floor)
}

/// Rescale an internal 18-digit amount to an asset's native precision.
pub fn to_asset_units(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    match decimals.cmp(&AMOUNT_DECIMALS) {
        std::cmp::Ordering::Equal => Ok(amount),
        std::cmp::Ordering::Less => {
            let factor = pow10(u32::from(AMOUNT_DECIMALS - decimals))?;
            Ok(match rounding {
                Rounding::Floor => amount / factor,
                Rounding::Ceil => amount.div_ceil(factor),
            })
        }
        std::cmp::Ordering::Greater => {
            let factor = pow10(u32::from(decimals - AMOUNT_DECIMALS))?;
            amount
                .checked_mul(factor)
                .ok_or(PremarketError::ArithmeticOverflow {
                    context: "to_asset_units",
                })
        }
    }
}

/// Rescale native asset units back to the internal 18-digit unit.
///
/// Upscaling is exact; downscaling (assets finer than 18 digits) floors.
pub fn from_asset_units(units: u128, decimals: u8) -> Result<u128> {
    match decimals.cmp(&AMOUNT_DECIMALS) {
        std::cmp::Ordering::Equal => Ok(units),
        std::cmp::Ordering::Less => {
            let factor = pow10(u32::from(AMOUNT_DECIMALS - decimals))?;
            units
                .checked_mul(factor)
                .ok_or(PremarketError::ArithmeticOverflow {
                    context: "from_asset_units",
                })
        }
        std::cmp::Ordering::Greater => {
            let factor = pow10(u32::from(decimals - AMOUNT_DECIMALS))?;
            Ok(units / factor)
        }
    }
}

/// Human-readable view of a fixed-point amount (for logs and queries).
pub fn to_display_decimal(amount: u128, decimals: u8) -> Result<Decimal> {
    let signed = i128::try_from(amount).map_err(|_| PremarketError::ArithmeticOverflow {
        context: "to_display_decimal",
    })?;
    Decimal::try_from_i128_with_scale(signed, u32::from(decimals)).map_err(|_| {
        PremarketError::ArithmeticOverflow {
            context: "to_display_decimal",
        }
    })
}

/// A parts-per-million rate as a percentage (`25_000` → `2.5`).
#[must_use]
pub fn rate_percent(rate_ppm: u32) -> Decimal {
    Decimal::new(i64::from(rate_ppm), 4).normalize()
}
