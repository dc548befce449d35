//! # Ledger Reconciler
//!
//! Keeps stored account balances consistent with the double-entry journal
//! that is their source of truth.
//!
//! ## Features
//!
//! - **Balance reconciliation**: journal-derived balances compared with stored balances
//! - **Balance sync**: atomic, retrying correction of drifted balances
//! - **Journal checks**: unbalanced, empty and duplicated journal entries
//! - **Hierarchy checks**: header accounts, orphans, parent cycles and roll-up
//! - **Journal posting**: append-only posting, approval and reversal
//! - **Storage abstraction**: in-memory and PostgreSQL backends behind one trait
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_reconciler::{Account, AccountType, Ledger, MemoryStorage};
//! use ledger_reconciler::journal::patterns;
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! # tokio_test_block(async {
//! let mut ledger = Ledger::new(MemoryStorage::new());
//! ledger
//!     .create_account(Account::new(1, "1101".into(), "Kas".into(), AccountType::Asset, None))
//!     .await?;
//! ledger
//!     .create_account(Account::new(
//!         2,
//!         "4101".into(),
//!         "Pendapatan".into(),
//!         AccountType::Revenue,
//!         None,
//!     ))
//!     .await?;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let sale = patterns::cash_sale(
//!     "JE-1".into(),
//!     date,
//!     "Cash sale".into(),
//!     1,
//!     2,
//!     BigDecimal::from(500),
//! )?;
//! ledger.record_journal(sale).await?;
//!
//! let report = ledger.engine().reconcile(1).await?;
//! assert!(report.is_matched());
//! # Ok::<(), ledger_reconciler::LedgerError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod journal;
pub mod ledger;
pub mod reconciliation;
pub mod retry;
pub mod storage;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::ReconcilerConfig;
pub use journal::{JournalBuilder, JournalPoster};
pub use ledger::{HealthReport, Ledger, PostedJournal};
pub use reconciliation::{
    Finding, FindingKind, ReconcileOutcome, ReconciliationEngine, Severity, Tolerance,
};
pub use retry::RetryPolicy;
pub use storage::{MemoryStorage, PgStorage};
pub use traits::*;
pub use types::*;
