//! Structured integrity findings

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How urgently a finding needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify a monetary difference: above one million is critical,
    /// below one thousand is low, anything between is high.
    pub fn for_difference(difference: &BigDecimal) -> Self {
        let magnitude = difference.abs();
        if magnitude > BigDecimal::from(1_000_000) {
            Severity::Critical
        } else if magnitude < BigDecimal::from(1_000) {
            Severity::Low
        } else {
            Severity::High
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// What kind of invariant a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    BalanceMismatch,
    UnbalancedJournal,
    HeaderLineMismatch,
    FlaggedUnbalanced,
    EmptyJournal,
    DuplicateSource,
    HeaderBalance,
    HeaderPosting,
    OrphanAccount,
    CircularParent,
    CashBankMismatch,
    BalanceTrigger,
}

/// A single violation reported by a read-only check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// Account code, entry number or trigger name the finding is about
    pub subject: String,
    pub expected: Option<BigDecimal>,
    pub actual: Option<BigDecimal>,
    pub difference: Option<BigDecimal>,
    pub severity: Severity,
    pub description: String,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        subject: String,
        severity: Severity,
        description: String,
    ) -> Self {
        Self {
            kind,
            subject,
            expected: None,
            actual: None,
            difference: None,
            severity,
            description,
        }
    }

    /// Attach the amounts behind the finding
    pub fn with_amounts(
        mut self,
        expected: BigDecimal,
        actual: BigDecimal,
        difference: BigDecimal,
    ) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self.difference = Some(difference);
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.subject, self.description)?;
        if let (Some(expected), Some(actual), Some(difference)) =
            (&self.expected, &self.actual, &self.difference)
        {
            write!(
                f,
                " (expected {}, actual {}, difference {})",
                expected, actual, difference
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::for_difference(&BigDecimal::from(999)), Severity::Low);
        assert_eq!(Severity::for_difference(&BigDecimal::from(-999)), Severity::Low);
        assert_eq!(Severity::for_difference(&BigDecimal::from(1_000)), Severity::High);
        assert_eq!(Severity::for_difference(&BigDecimal::from(1_000_000)), Severity::High);
        assert_eq!(
            Severity::for_difference(&BigDecimal::from(1_387_500)),
            Severity::Critical
        );
    }

    #[test]
    fn test_finding_display_includes_amounts() {
        let finding = Finding::new(
            FindingKind::BalanceMismatch,
            "1101".to_string(),
            Severity::Critical,
            "stored balance differs from journal lines".to_string(),
        )
        .with_amounts(
            BigDecimal::from(5_837_500),
            BigDecimal::from(7_225_000),
            BigDecimal::from(1_387_500),
        );

        let text = finding.to_string();
        assert!(text.starts_with("[CRITICAL] 1101"));
        assert!(text.contains("difference 1387500"));
    }
}
