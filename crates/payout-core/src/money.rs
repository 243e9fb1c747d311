//! Currency and amount validation shared by the gateway and the worker.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Inr,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Inr];
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Inr => "INR",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "INR" => Ok(Currency::Inr),
            other => Err(Error::Validation(format!("unsupported currency: {other}"))),
        }
    }
}

/// Validates a payout amount per spec §3/§8: positive, exactly two
/// fractional digits, and bounded by `[min, max]`.
pub fn validate_amount(amount: Decimal, min: Decimal, max: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::Validation("amount must be positive".into()));
    }
    if amount.scale() > 2 {
        return Err(Error::Validation(
            "amount must have at most two fractional digits".into(),
        ));
    }
    if amount < min {
        return Err(Error::Validation(format!("amount below minimum of {min}")));
    }
    if amount > max {
        return Err(Error::Validation(format!("amount exceeds maximum of {max}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bounds() -> (Decimal, Decimal) {
        (dec!(0.01), dec!(10000.00))
    }

    #[test]
    fn accepts_boundary_amounts() {
        let (min, max) = bounds();
        assert!(validate_amount(dec!(0.01), min, max).is_ok());
        assert!(validate_amount(dec!(10000.00), min, max).is_ok());
    }

    #[test]
    fn rejects_zero_and_negative() {
        let (min, max) = bounds();
        assert!(validate_amount(dec!(0), min, max).is_err());
        assert!(validate_amount(dec!(-5.00), min, max).is_err());
    }

    #[test]
    fn rejects_over_max_and_over_precision() {
        let (min, max) = bounds();
        assert!(validate_amount(dec!(10000.01), min, max).is_err());
        assert!(validate_amount(dec!(1.005), min, max).is_err());
    }

    #[test]
    fn currency_parses_case_insensitively() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("XYZ".parse::<Currency>().is_err());
    }
}
