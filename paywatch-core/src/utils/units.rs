//! Conversion from chain base units to display amounts.

use crate::config::MAX_TOKEN_DECIMALS;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount {0} does not fit in a 96-bit decimal mantissa")]
    TooLarge(u128),
    #[error("unsupported decimals {0}")]
    UnsupportedDecimals(u32),
}

/// `raw / 10^decimals`, normalized (no trailing zeros).
///
/// `Decimal` holds a 96-bit mantissa, so raw values above `2^96 - 1` are
/// rejected instead of rounded.
pub fn to_display_amount(raw: u128, decimals: u32) -> Result<Decimal, AmountError> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    let mantissa = i128::try_from(raw).map_err(|_| AmountError::TooLarge(raw))?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map(|amount| amount.normalize())
        .map_err(|_| AmountError::TooLarge(raw))
}
