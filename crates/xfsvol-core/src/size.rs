//! Human-readable sizes.
//!
//! Parsing accepts a decimal magnitude followed by an optional binary unit:
//! `512`, `512B`, `10K`, `512M`, `512MB`, `512MiB`, `1.5g`, `2 T`. Every unit
//! is a power of 1024. Integral magnitudes convert exactly; fractional ones
//! are truncated to whole bytes.
//!
//! Formatting is for display only and is lossy: it picks the largest unit
//! that divides the value exactly and otherwise falls back to two decimals.

use thiserror::Error;

use crate::error::ErrorKind;

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

/// Units from largest to smallest.
const UNITS: [(&str, u64); 4] = [("T", TIB), ("G", GIB), ("M", MIB), ("K", KIB)];

/// Smallest two-decimal value that rounds up to a whole next unit.
const ROUNDS_TO_NEXT_UNIT: f64 = 1023.995;

/// Fraction digits past this are dropped; they cannot change a whole byte
/// count below 2^64 after truncation by more than one.
const MAX_FRACTION_DIGITS: usize = 18;

/// A size string that could not be converted to bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid size {input:?}: {reason}")]
pub struct ParseSizeError {
    input: String,
    reason: &'static str,
}

impl ParseSizeError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }

    /// The rejected input, verbatim.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Parse
    }
}

/// Parse a human size such as `512M` into a byte count.
pub fn parse_human_size(input: &str) -> Result<u64, ParseSizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseSizeError::new(input, "empty size"));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let multiplier = unit_multiplier(suffix.trim_start())
        .ok_or_else(|| ParseSizeError::new(input, "unrecognized unit suffix"))?;

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(ParseSizeError::new(input, "missing numeric magnitude"));
    }
    if fraction.contains('.') {
        return Err(ParseSizeError::new(input, "malformed numeric magnitude"));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| ParseSizeError::new(input, "magnitude out of range"))?
    };

    let bytes = whole
        .checked_mul(multiplier)
        .ok_or_else(|| ParseSizeError::new(input, "size overflows 64 bits"))?;

    let fraction_bytes = fraction_bytes(fraction, multiplier);
    bytes
        .checked_add(fraction_bytes)
        .ok_or_else(|| ParseSizeError::new(input, "size overflows 64 bits"))
}

/// Format a byte count for display, e.g. `10485760` as `10M`.
pub fn format_human_size(bytes: u64) -> String {
    for (suffix, unit) in UNITS {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }

    for (i, (suffix, unit)) in UNITS.iter().enumerate() {
        if bytes >= *unit {
            let value = bytes as f64 / *unit as f64;
            // would print as 1024.00 of this unit
            if value >= ROUNDS_TO_NEXT_UNIT && i > 0 {
                let (suffix, unit) = UNITS[i - 1];
                return format!("{:.2}{}", bytes as f64 / unit as f64, suffix);
            }
            return format!("{value:.2}{suffix}");
        }
    }

    bytes.to_string()
}

fn unit_multiplier(suffix: &str) -> Option<u64> {
    let upper = suffix.to_ascii_uppercase();
    let unit = upper
        .strip_suffix("IB")
        .or_else(|| upper.strip_suffix('B'))
        .unwrap_or(&upper);

    if unit.is_empty() {
        // `iB` alone is not a unit
        return (!upper.ends_with("IB")).then_some(1);
    }

    UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, multiplier)| *multiplier)
}

/// `0.<fraction> * multiplier`, truncated to whole bytes.
fn fraction_bytes(fraction: &str, multiplier: u64) -> u64 {
    let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if digits.is_empty() {
        return 0;
    }

    // at most 18 digits, so both fit comfortably in u128
    let numerator: u128 = digits.parse().unwrap_or(0);
    let denominator = 10u128.pow(digits.len() as u32);
    (numerator * multiplier as u128 / denominator) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_human_size("512M").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_human_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_human_size("10K").unwrap(), 10 * 1024);
        assert_eq!(parse_human_size("2T").unwrap(), 2 * TIB);
        assert_eq!(parse_human_size("4096").unwrap(), 4096);
        assert_eq!(parse_human_size("4096B").unwrap(), 4096);
    }

    #[test]
    fn test_parse_suffix_variants() {
        assert_eq!(parse_human_size("512m").unwrap(), 512 * MIB);
        assert_eq!(parse_human_size("512MB").unwrap(), 512 * MIB);
        assert_eq!(parse_human_size("512MiB").unwrap(), 512 * MIB);
        assert_eq!(parse_human_size(" 20 G ").unwrap(), 20 * GIB);
    }

    #[test]
    fn test_parse_fraction_truncates() {
        assert_eq!(parse_human_size("1.5K").unwrap(), 1536);
        assert_eq!(parse_human_size("0.5M").unwrap(), 512 * KIB);
        assert_eq!(parse_human_size(".25G").unwrap(), 256 * MIB);
        // 0.3 * 1024 = 307.2
        assert_eq!(parse_human_size("0.3K").unwrap(), 307);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "   ", "abc", "M", "1X", "1.2.3M", ".", "10 iB", "-1M", "1MM"] {
            let err = parse_human_size(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "input {input:?}");
            assert_eq!(err.input(), input);
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_human_size("18446744073709551616").is_err());
        assert!(parse_human_size("16777216T").is_err());
        assert_eq!(parse_human_size("16777215T").unwrap(), 16777215 * TIB);
    }

    #[test]
    fn test_format_exact_units() {
        assert_eq!(format_human_size(0), "0");
        assert_eq!(format_human_size(512), "512");
        assert_eq!(format_human_size(10 * MIB), "10M");
        assert_eq!(format_human_size(512 * MIB), "512M");
        assert_eq!(format_human_size(GIB), "1G");
        assert_eq!(format_human_size(1536 * MIB), "1536M");
        assert_eq!(format_human_size(3 * TIB), "3T");
    }

    #[test]
    fn test_format_falls_back_to_decimal() {
        assert_eq!(format_human_size(1536), "1.50K");
        assert_eq!(format_human_size(MIB + 1), "1.00M");
        assert_eq!(format_human_size(1025), "1.00K");
    }

    #[test]
    fn test_format_never_prints_1024_of_a_unit() {
        assert_eq!(format_human_size(MIB - 1), "1.00M");
        assert_eq!(format_human_size(GIB - 1), "1.00G");
        assert_eq!(format_human_size(TIB - 1), "1.00T");
        // 1023.98K stays in K
        assert_eq!(format_human_size(1_048_552), "1023.98K");
    }

    #[test]
    fn test_exact_formats_parse_back() {
        for bytes in [4096, 10 * MIB, 512 * MIB, 7 * GIB, TIB] {
            assert_eq!(parse_human_size(&format_human_size(bytes)).unwrap(), bytes);
        }
    }
}
