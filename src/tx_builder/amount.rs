//! Decimal amount parsing
//!
//! Amounts arrive as user-typed decimal strings and are converted to smallest
//! token units with exact digit arithmetic: `floor(amount * 10^decimals)`.
//! Floating point never touches a transfer amount.

use crate::errors::TransferError;

/// Parse a positive decimal string into smallest units
///
/// Extra fractional digits beyond `decimals` are floored away. An amount that
/// floors to zero units is rejected since it would be a no-op transfer.
pub fn parse_amount(input: &str, decimals: u8) -> Result<u64, TransferError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TransferError::validation("amount is required"));
    }
    if trimmed.starts_with('-') {
        return Err(TransferError::validation("amount must be positive"));
    }
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(TransferError::validation(format!(
            "amount '{trimmed}' is not a decimal number"
        )));
    }

    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| TransferError::configuration(format!("unsupported decimals {decimals}")))?;

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .ok()
            .and_then(|w| w.checked_mul(scale))
            .ok_or_else(|| TransferError::validation("amount is too large"))?
    };

    // Keep only the digits that fit the token precision, right-padded
    let kept: String = fraction
        .chars()
        .chain(std::iter::repeat('0'))
        .take(usize::from(decimals))
        .collect();
    let fraction_units = if kept.is_empty() {
        0
    } else {
        kept.parse::<u64>()
            .map_err(|_| TransferError::validation("amount is not a decimal number"))?
    };

    let units = whole_units
        .checked_add(fraction_units)
        .ok_or_else(|| TransferError::validation("amount is too large"))?;

    if units == 0 {
        return Err(TransferError::validation(format!(
            "amount '{trimmed}' is below the smallest transferable unit"
        )));
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_and_fractional_amounts() {
        assert_eq!(parse_amount("1.00", 6).unwrap(), 1_000_000);
        assert_eq!(parse_amount("2.50", 6).unwrap(), 2_500_000);
        assert_eq!(parse_amount("  3 ", 6).unwrap(), 3_000_000);
        assert_eq!(parse_amount(".5", 6).unwrap(), 500_000);
        assert_eq!(parse_amount("7.", 6).unwrap(), 7_000_000);
        assert_eq!(parse_amount("0.000001", 6).unwrap(), 1);
    }

    #[test]
    fn test_excess_precision_is_floored() {
        assert_eq!(parse_amount("1.2345678", 6).unwrap(), 1_234_567);
        assert_eq!(parse_amount("0.0000019", 6).unwrap(), 1);
    }

    #[test]
    fn test_rejections() {
        for bad in ["0.0000001", "0", "0.000", "-1", "abc", "", "1.2.3", "1e6", "NaN", "inf", "."] {
            assert!(
                matches!(parse_amount(bad, 6), Err(TransferError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(parse_amount("18446744073709551615", 6).is_err());
    }
}
