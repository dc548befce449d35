//! Cash and bank register consistency.
//!
//! A register's stored balance must equal the sum of its transactions, and
//! the GL account it is linked to must carry the same balance as the
//! register.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::balance::{compare, ReconcileOutcome, Tolerance};
use super::findings::{Finding, FindingKind, Severity};
use crate::types::*;

/// Which pair of balances disagrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashBankCheck {
    /// Register balance against the sum of its transactions
    Transactions,
    /// Linked GL account balance against the register balance
    LinkedAccount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBankMismatch {
    pub cash_bank_id: i64,
    pub code: String,
    pub name: String,
    pub check: CashBankCheck,
    pub account_code: Option<String>,
    pub expected: BigDecimal,
    pub actual: BigDecimal,
    /// `actual - expected`
    pub difference: BigDecimal,
}

impl CashBankMismatch {
    pub fn finding(&self) -> Finding {
        let (severity, description) = match self.check {
            CashBankCheck::Transactions => (
                Severity::for_difference(&self.difference),
                format!("{} balance does not match its transaction sum", self.name),
            ),
            // Register and GL disagreeing is reported at MEDIUM or above
            CashBankCheck::LinkedAccount => (
                Severity::for_difference(&self.difference).max(Severity::Medium),
                format!(
                    "{} balance does not match GL account {}",
                    self.name,
                    self.account_code.as_deref().unwrap_or("?")
                ),
            ),
        };
        Finding::new(FindingKind::CashBankMismatch, self.code.clone(), severity, description)
            .with_amounts(
                self.expected.clone(),
                self.actual.clone(),
                self.difference.clone(),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashBankReport {
    pub registers_checked: usize,
    /// Registers without a resolvable GL account
    pub unlinked: Vec<String>,
    pub mismatches: Vec<CashBankMismatch>,
}

impl CashBankReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.mismatches.iter().map(CashBankMismatch::finding).collect()
    }
}

/// Compare every register with its transactions and its linked GL account
pub fn check_cash_banks(registers: &[CashBankBalance], tolerance: &Tolerance) -> CashBankReport {
    let mut report = CashBankReport {
        registers_checked: registers.len(),
        ..CashBankReport::default()
    };

    for register in registers {
        let outcome = compare(&register.transaction_total, &register.balance, tolerance);
        report
            .mismatches
            .extend(mismatch(register, CashBankCheck::Transactions, outcome));

        // The register is the reference for its GL account
        match &register.account_balance {
            Some(account_balance) => {
                let outcome = compare(&register.balance, account_balance, tolerance);
                report
                    .mismatches
                    .extend(mismatch(register, CashBankCheck::LinkedAccount, outcome));
            }
            None => report.unlinked.push(register.code.clone()),
        }
    }

    report
}

fn mismatch(
    register: &CashBankBalance,
    check: CashBankCheck,
    outcome: ReconcileOutcome,
) -> Option<CashBankMismatch> {
    match outcome {
        ReconcileOutcome::Matched => None,
        ReconcileOutcome::Mismatch {
            expected,
            actual,
            difference,
        } => Some(CashBankMismatch {
            cash_bank_id: register.id,
            code: register.code.clone(),
            name: register.name.clone(),
            check,
            account_code: match check {
                CashBankCheck::Transactions => None,
                CashBankCheck::LinkedAccount => register.account_code.clone(),
            },
            expected,
            actual,
            difference,
        }),
    }
}
