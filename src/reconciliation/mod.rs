//! Balance reconciliation and ledger integrity checks
//!
//! [`ReconciliationEngine`] compares each account's stored balance with the
//! balance derived from its POSTED journal lines and writes corrections.
//! The read-only checks in [`journal_check`], [`hierarchy`] and [`cash_bank`]
//! report violations as [`Finding`]s without changing anything.

pub mod balance;
pub mod cash_bank;
pub mod engine;
pub mod findings;
pub mod hierarchy;
pub mod journal_check;

pub use balance::{compare, signed_balance, ReconcileOutcome, Tolerance};
pub use cash_bank::{check_cash_banks, CashBankCheck, CashBankMismatch, CashBankReport};
pub use engine::{
    trigger_findings, AccountReconciliation, ReconciliationEngine, ReconciliationReport,
    SyncFailure, SyncReport,
};
pub use findings::{Finding, FindingKind, Severity};
pub use hierarchy::{check_hierarchy, rollup, HierarchyReport, RolledUpBalance};
pub use journal_check::{check_journals, JournalCheckReport};
