use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Minor units (cents). 1.00 = 100 cents.
pub type Cents = i64;

/// Exact monetary amount with a fixed scale of two fraction digits.
///
/// Money is represented as integer cents to avoid floating-point precision issues.
/// Inputs with more than two fraction digits are rounded half away from zero,
/// which matches how a `NUMERIC(_, 2)` column stores them. Balances are kept
/// in cents end to end, so nothing is rounded again on the way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Cents);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: Cents) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> Cents {
        self.0
    }

    /// Parse a decimal string such as "25.50", "100" or ".5".
    pub fn parse(input: &str) -> Result<Self, ParseMoneyError> {
        parse_cents(input).map(Self)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_cents(self.0))
    }
}

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Money::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Format cents as a canonical decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000, "0.005" -> 1
///
/// An optional leading `+` or `-` is accepted. Surrounding whitespace is not;
/// callers reading human input trim it first.
pub fn parse_cents(input: &str) -> Result<Cents, ParseMoneyError> {
    if input.is_empty() {
        return Err(ParseMoneyError::Empty);
    }

    let (negative, unsigned) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let (units_str, fraction_str) = match unsigned.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (unsigned, ""),
    };

    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseMoneyError::InvalidFormat(input.to_string()));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(units_str) || !all_digits(fraction_str) {
        return Err(ParseMoneyError::InvalidFormat(input.to_string()));
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseMoneyError::Overflow(input.to_string()))?
    };

    let digit = |i: usize| -> i64 {
        fraction_str
            .as_bytes()
            .get(i)
            .map(|b| i64::from(b - b'0'))
            .unwrap_or(0)
    };
    let mut fraction = digit(0) * 10 + digit(1);
    // Half away from zero: only the third digit decides.
    if digit(2) >= 5 {
        fraction += 1;
    }

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(|| ParseMoneyError::Overflow(input.to_string()))?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseMoneyError {
    #[error("amount is empty")]
    Empty,

    #[error("invalid money format: {0:?}")]
    InvalidFormat(String),

    #[error("amount out of range: {0:?}")]
    Overflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(100), "1.00");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-5000), "-50.00");
        assert_eq!(format_cents(-1), "-0.01");
        assert_eq!(format_cents(i64::MIN), "-92233720368547758.08");
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("50.00"), Ok(5000));
        assert_eq!(parse_cents("50"), Ok(5000));
        assert_eq!(parse_cents("12.34"), Ok(1234));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents("0.01"), Ok(1));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("7."), Ok(700));
        assert_eq!(parse_cents("+3.10"), Ok(310));
        assert_eq!(parse_cents("-50.00"), Ok(-5000));
    }

    #[test]
    fn test_parse_rounds_half_away_from_zero() {
        assert_eq!(parse_cents("0.005"), Ok(1));
        assert_eq!(parse_cents("0.0049999"), Ok(0));
        assert_eq!(parse_cents("100.999"), Ok(10100));
        assert_eq!(parse_cents("2.345"), Ok(235));
        assert_eq!(parse_cents("-2.345"), Ok(-235));
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert_eq!(parse_cents(""), Err(ParseMoneyError::Empty));
        assert!(matches!(
            parse_cents("abc"),
            Err(ParseMoneyError::InvalidFormat(_))
        ));
        assert!(parse_cents("12.34.56").is_err());
        assert!(parse_cents(".").is_err());
        assert!(parse_cents("-").is_err());
        assert!(parse_cents("1e3").is_err());
        assert!(parse_cents("1,000.00").is_err());
        assert!(parse_cents("NaN").is_err());
        assert!(parse_cents("--5").is_err());
        assert!(parse_cents(" 25.50").is_err());
        assert!(parse_cents("25.50\n").is_err());
        assert!(parse_cents("- 5").is_err());
    }

    #[test]
    fn test_parse_cents_overflow() {
        assert!(matches!(
            parse_cents("99999999999999999999"),
            Err(ParseMoneyError::Overflow(_))
        ));
        assert!(matches!(
            parse_cents("92233720368547758.08"),
            Err(ParseMoneyError::Overflow(_))
        ));
    }

    #[test]
    fn test_arithmetic_is_exact() {
        // 0.10 added a thousand times stays exact
        let dime = Money::parse("0.10").unwrap();
        let total = (0..1000).fold(Money::ZERO, |acc, _| acc.checked_add(dime).unwrap());
        assert_eq!(total.to_string(), "100.00");

        let balance = Money::parse("125.50").unwrap();
        let debit = Money::parse("500.00").unwrap();
        let candidate = balance.checked_sub(debit).unwrap();
        assert!(candidate.is_negative());
        assert_eq!(candidate.to_string(), "-374.50");

        assert!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)).is_none());
    }

    #[test]
    fn test_sign_helpers() {
        assert!(Money::from_cents(1).is_positive());
        assert!(Money::ZERO.is_zero());
        assert!(!Money::ZERO.is_positive());
        assert!(Money::from_cents(-1).is_negative());
        assert!(Money::parse("10.00").unwrap() > Money::parse("9.99").unwrap());
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let money = Money::parse("125.5").unwrap();
        assert_eq!(serde_json::to_string(&money).unwrap(), "\"125.50\"");

        let parsed: Money = serde_json::from_str("\"0.07\"").unwrap();
        assert_eq!(parsed.cents(), 7);
        assert!(serde_json::from_str::<Money>("\"seven\"").is_err());
    }
}
