//! Listing prices in Brazilian reais.
//!
//! Prices are stored as `numeric` in the remote store and handled here as a
//! [`Decimal`] so that form input like `"R$ 185.000,00"` round-trips without
//! float error.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Price`] from form input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is empty after stripping the currency symbol.
    #[error("price cannot be empty")]
    Empty,
    /// The input is not a number.
    #[error("price is not a valid number: {0}")]
    Invalid(String),
    /// The amount is zero or negative.
    #[error("price must be greater than zero")]
    NotPositive,
}

/// A price in BRL, always rounded to centavos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price from a decimal amount, rounded to two places.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(2))
    }

    /// The underlying amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Parse user input in either Brazilian (`1.234,56`) or plain
    /// (`1234.56`) notation, with or without the `R$` prefix.
    ///
    /// When a comma is present it is the decimal separator and dots are
    /// thousands separators. Without a comma, repeated dots and a single dot
    /// followed by exactly three digits (`185.000`) are thousands separators;
    /// any other single dot is the decimal separator.
    ///
    /// # Errors
    ///
    /// Returns an error for empty, non-numeric or non-positive input.
    pub fn parse_input(input: &str) -> Result<Self, PriceError> {
        let cleaned: String = input
            .trim()
            .trim_start_matches("R$")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return Err(PriceError::Empty);
        }

        let canonical = if cleaned.contains(',') {
            cleaned.replace('.', "").replace(',', ".")
        } else if cleaned.matches('.').count() > 1 || groups_thousands(&cleaned) {
            cleaned.replace('.', "")
        } else {
            cleaned.clone()
        };

        let amount =
            Decimal::from_str(&canonical).map_err(|_| PriceError::Invalid(input.to_string()))?;
        let price = Self::new(amount);
        if price.0 <= Decimal::ZERO {
            return Err(PriceError::NotPositive);
        }
        Ok(price)
    }

    /// Format as Brazilian currency, e.g. `R$ 1.234,56`.
    #[must_use]
    pub fn display(&self) -> String {
        let raw = format!("{:.2}", self.0.abs());
        let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw.as_str(), "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, digit) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(digit);
        }

        let sign = if self.0.is_sign_negative() && !self.0.is_zero() {
            "-"
        } else {
            ""
        };
        format!("{sign}R$ {grouped},{frac_part}")
    }
}

/// A single dot splitting a leading group of one to three digits from
/// exactly three more, as in `150.000`. `0.005` stays a decimal.
fn groups_thousands(cleaned: &str) -> bool {
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    cleaned.split_once('.').is_some_and(|(head, tail)| {
        (1..=3).contains(&head.len())
            && !head.starts_with('0')
            && all_digits(head)
            && tail.len() == 3
            && all_digits(tail)
    })
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_brazilian_notation() {
        let price = Price::parse_input("R$ 185.000,50").unwrap();
        assert_eq!(price.amount(), Decimal::new(18_500_050, 2));
    }

    #[test]
    fn test_parse_plain_notation() {
        assert_eq!(
            Price::parse_input("1234.5").unwrap().amount(),
            Decimal::new(123_450, 2)
        );
        assert_eq!(
            Price::parse_input("1.250.000").unwrap().amount(),
            Decimal::new(1_250_000, 0)
        );
    }

    #[test]
    fn test_lone_dot_before_three_digits_groups_thousands() {
        assert_eq!(
            Price::parse_input("185.000").unwrap().amount(),
            Decimal::new(185_000, 0)
        );
        assert_eq!(
            Price::parse_input("R$ 150.000").unwrap().amount(),
            Decimal::new(150_000, 0)
        );
        assert_eq!(Price::parse_input("1.5").unwrap().amount(), Decimal::new(15, 1));
        assert_eq!(Price::parse_input("99.90").unwrap().amount(), Decimal::new(9990, 2));
        assert_eq!(
            Price::parse_input("1234.567").unwrap().amount(),
            Decimal::new(123_457, 2)
        );
    }

    #[test]
    fn test_amount_rounding_to_zero_is_rejected() {
        assert_eq!(Price::parse_input("0,001"), Err(PriceError::NotPositive));
        assert_eq!(Price::parse_input("0.004"), Err(PriceError::NotPositive));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(Price::parse_input("R$ "), Err(PriceError::Empty));
        assert!(matches!(
            Price::parse_input("doze mil"),
            Err(PriceError::Invalid(_))
        ));
        assert_eq!(Price::parse_input("0,00"), Err(PriceError::NotPositive));
    }

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::new(Decimal::new(123_456_789, 2)).display(), "R$ 1.234.567,89");
        assert_eq!(Price::new(Decimal::new(950, 0)).display(), "R$ 950,00");
        assert_eq!(Price::new(Decimal::new(1000, 0)).display(), "R$ 1.000,00");
    }

    #[test]
    fn test_deserializes_from_json_number() {
        let price: Price = serde_json::from_str("250000.5").unwrap();
        assert_eq!(price.display(), "R$ 250.000,50");
    }
}
