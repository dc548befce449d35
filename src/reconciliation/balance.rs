//! The balance formula and tolerance comparison

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::*;

/// Signed balance of an account from its line totals.
///
/// `debit - credit` for ASSET and EXPENSE accounts,
/// `credit - debit` for LIABILITY, EQUITY and REVENUE accounts.
pub fn signed_balance(account_type: AccountType, totals: &LineTotals) -> BigDecimal {
    match account_type.normal_balance() {
        EntryType::Debit => &totals.debit - &totals.credit,
        EntryType::Credit => &totals.credit - &totals.debit,
    }
}

/// Largest difference still treated as a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerance(BigDecimal);

impl Tolerance {
    pub fn new(amount: BigDecimal) -> LedgerResult<Self> {
        if amount < BigDecimal::from(0) {
            return Err(LedgerError::Config(format!(
                "tolerance must not be negative, got {}",
                amount
            )));
        }
        Ok(Self(amount))
    }

    /// Zero tolerance
    pub fn exact() -> Self {
        Self(BigDecimal::from(0))
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.0
    }

    /// True when `|difference|` is strictly greater than the tolerance
    pub fn exceeds(&self, difference: &BigDecimal) -> bool {
        difference.abs() > self.0
    }
}

impl Default for Tolerance {
    /// One cent, the smallest unit of a `DECIMAL(20,2)` balance
    fn default() -> Self {
        Self(BigDecimal::from(1) / BigDecimal::from(100))
    }
}

impl FromStr for Tolerance {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = BigDecimal::from_str(s.trim())
            .map_err(|e| LedgerError::Config(format!("invalid tolerance '{}': {}", s, e)))?;
        Self::new(amount)
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of comparing a stored balance with its expected value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Matched,
    Mismatch {
        expected: BigDecimal,
        actual: BigDecimal,
        /// `actual - expected`
        difference: BigDecimal,
    },
}

impl ReconcileOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, ReconcileOutcome::Matched)
    }
}

/// Compare a stored balance against the expected one
pub fn compare(
    expected: &BigDecimal,
    actual: &BigDecimal,
    tolerance: &Tolerance,
) -> ReconcileOutcome {
    let difference = actual - expected;
    if tolerance.exceeds(&difference) {
        ReconcileOutcome::Mismatch {
            expected: expected.clone(),
            actual: actual.clone(),
            difference,
        }
    } else {
        ReconcileOutcome::Matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_sign_convention_by_type() {
        let totals = LineTotals::new(dec("500.00"), dec("200.00"), 3);

        assert_eq!(signed_balance(AccountType::Asset, &totals), dec("300"));
        assert_eq!(signed_balance(AccountType::Expense, &totals), dec("300"));
        assert_eq!(signed_balance(AccountType::Liability, &totals), dec("-300"));
        assert_eq!(signed_balance(AccountType::Equity, &totals), dec("-300"));
        assert_eq!(signed_balance(AccountType::Revenue, &totals), dec("-300"));
    }

    #[test]
    fn test_default_tolerance_is_one_cent() {
        let tolerance = Tolerance::default();
        assert_eq!(tolerance.amount(), &dec("0.01"));
        assert!(!tolerance.exceeds(&dec("0.01")));
        assert!(!tolerance.exceeds(&dec("-0.01")));
        assert!(tolerance.exceeds(&dec("0.02")));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        assert!("-1".parse::<Tolerance>().is_err());
        assert!("abc".parse::<Tolerance>().is_err());
        assert_eq!("1.0".parse::<Tolerance>().unwrap().amount(), &dec("1"));
    }

    #[test]
    fn test_kas_mismatch_before_sync() {
        let outcome = compare(&dec("5837500"), &dec("7225000"), &Tolerance::default());
        assert_eq!(
            outcome,
            ReconcileOutcome::Mismatch {
                expected: dec("5837500"),
                actual: dec("7225000"),
                difference: dec("1387500"),
            }
        );
    }

    #[test]
    fn test_within_tolerance_is_matched() {
        let outcome = compare(&dec("100.00"), &dec("100.01"), &Tolerance::default());
        assert!(outcome.is_matched());

        let outcome = compare(&dec("100.00"), &dec("100.01"), &Tolerance::exact());
        assert!(!outcome.is_matched());
    }
}
