//! Exact decimal parsing of ckBTC amounts
//!
//! Amounts are read digit by digit into satoshis so that boundaries such as
//! `1000.00000001` compare exactly.

use crate::backend::SATS_PER_BTC;

/// Maximum fractional digits representable in satoshis
pub const SATS_DECIMALS: usize = 8;

/// A syntactically valid, non-negative decimal amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAmount {
    /// Value truncated to whole satoshis (saturates on overflow)
    pub sats: u64,
    /// Nonzero digits were present beyond the eighth decimal place
    pub sub_sat_remainder: bool,
    /// Significant fractional digits (trailing zeros ignored)
    pub decimals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSyntax {
    NotANumber,
    Negative,
}

/// Parse `123`, `0.5`, `.5` or `1.` style decimals
pub fn parse_amount(input: &str) -> Result<ParsedAmount, AmountSyntax> {
    let text = input.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (int_part, frac_part) = match body.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (body, ""),
    };

    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !digits_only(int_part)
        || !digits_only(frac_part)
    {
        return Err(AmountSyntax::NotANumber);
    }

    let frac_significant = frac_part.trim_end_matches('0');
    let is_zero = int_part.bytes().all(|b| b == b'0') && frac_significant.is_empty();
    if negative && !is_zero {
        return Err(AmountSyntax::Negative);
    }

    let whole = int_part.trim_start_matches('0');
    let whole_sats = if whole.is_empty() {
        Some(0u64)
    } else if whole.len() > 20 {
        None
    } else {
        whole
            .parse::<u64>()
            .ok()
            .and_then(|w| w.checked_mul(SATS_PER_BTC))
    };

    let (kept, dropped) = if frac_significant.len() > SATS_DECIMALS {
        frac_significant.split_at(SATS_DECIMALS)
    } else {
        (frac_significant, "")
    };
    let mut frac_sats: u64 = 0;
    for (i, b) in kept.bytes().enumerate() {
        let digit = (b - b'0') as u64;
        frac_sats += digit * 10u64.pow((SATS_DECIMALS - 1 - i) as u32);
    }

    let sats = whole_sats
        .and_then(|w| w.checked_add(frac_sats))
        .unwrap_or(u64::MAX);

    Ok(ParsedAmount {
        sats,
        sub_sat_remainder: dropped.bytes().any(|b| b != b'0'),
        decimals: frac_significant.len(),
    })
}

/// Render satoshis as the shortest exact decimal (`0.001`, `1000`)
pub fn format_btc(sats: u64) -> String {
    let whole = sats / SATS_PER_BTC;
    let frac = sats % SATS_PER_BTC;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:08}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_exact_sats() {
        assert_eq!(parse_amount("0.5").unwrap().sats, 50_000_000);
        assert_eq!(parse_amount(" 1000 ").unwrap().sats, 100_000_000_000);
        assert_eq!(parse_amount("1000.00000001").unwrap().sats, 100_000_000_001);
        assert_eq!(parse_amount(".001").unwrap().sats, 100_000);
        assert_eq!(parse_amount("2.").unwrap().sats, 200_000_000);
    }

    #[test]
    fn test_decimal_counting_ignores_trailing_zeros() {
        assert_eq!(parse_amount("1.123456789").unwrap().decimals, 9);
        assert!(parse_amount("1.123456789").unwrap().sub_sat_remainder);
        assert_eq!(parse_amount("1.100000000").unwrap().decimals, 1);
    }

    #[test]
    fn test_rejects_non_numbers() {
        for bad in ["", "abc", "1e3", "1.2.3", ".", "--1", "0x10"] {
            assert_eq!(parse_amount(bad), Err(AmountSyntax::NotANumber), "{}", bad);
        }
        assert_eq!(parse_amount("-1"), Err(AmountSyntax::Negative));
        assert_eq!(parse_amount("-0").unwrap().sats, 0);
    }

    #[test]
    fn test_huge_amount_saturates() {
        let parsed = parse_amount("99999999999999999999999").unwrap();
        assert_eq!(parsed.sats, u64::MAX);
    }

    #[test]
    fn test_format_btc() {
        assert_eq!(format_btc(100_000), "0.001");
        assert_eq!(format_btc(100_000_000_000), "1000");
        assert_eq!(format_btc(150_000_000), "1.5");
    }
}
