//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// Storage abstraction for the reconciliation engine
///
/// This trait allows the engine to work with any storage backend
/// (PostgreSQL, in-memory, etc.). Implementations must make
/// `sync_account_balance` atomic with respect to concurrent journal writes.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Insert or replace an account
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()>;

    /// Get an account by ID
    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>>;

    /// Get an account by its chart-of-accounts code
    async fn get_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>>;

    /// List accounts ordered by code
    async fn list_accounts(&self, filter: &AccountFilter) -> LedgerResult<Vec<Account>>;

    /// Write a journal entry and its lines in one unit.
    ///
    /// When `reversed_from` is set the original entry is marked as reversed
    /// in the same unit; an original that is not POSTED or already reversed
    /// is rejected.
    async fn insert_journal(&mut self, entry: &NewJournalEntry) -> LedgerResult<JournalEntry>;

    /// Get a journal entry with its lines
    async fn get_journal(&self, journal_id: JournalId) -> LedgerResult<Option<JournalEntry>>;

    /// Get a journal entry by its entry number
    async fn get_journal_by_number(&self, entry_number: &str)
        -> LedgerResult<Option<JournalEntry>>;

    /// Change the status of a journal entry
    async fn set_journal_status(
        &mut self,
        journal_id: JournalId,
        status: JournalStatus,
    ) -> LedgerResult<()>;

    /// Header totals and line sums for every entry matching the filter
    async fn journal_summaries(&self, filter: &JournalFilter) -> LedgerResult<Vec<JournalSummary>>;

    /// Distinct accounts touched by a journal entry
    async fn journal_accounts(&self, journal_id: JournalId) -> LedgerResult<Vec<AccountId>>;

    /// Sum of debits and credits posted to an account
    async fn account_line_totals(
        &self,
        account_id: AccountId,
        scope: PostingScope,
    ) -> LedgerResult<LineTotals>;

    /// POSTED line totals for every header account that has direct postings
    async fn header_postings(&self) -> LedgerResult<Vec<(AccountId, LineTotals)>>;

    /// Recompute an account's balance from its POSTED lines and store it,
    /// holding a lock on the account for the whole read-compute-write.
    /// Header accounts are rejected.
    async fn sync_account_balance(&mut self, account_id: AccountId) -> LedgerResult<BalanceSync>;

    /// Cash and bank registers with their transaction sums and the stored
    /// balance of the GL account each one is linked to
    async fn cash_bank_balances(&self) -> LedgerResult<Vec<CashBankBalance>>;

    /// Database triggers that maintain balances behind the engine's back
    async fn balance_triggers(&self) -> LedgerResult<Vec<BalanceTrigger>>;

    /// Remove a balance trigger
    async fn drop_trigger(&mut self, trigger: &BalanceTrigger) -> LedgerResult<()>;
}

/// Trait for implementing custom journal validation rules
pub trait JournalValidator: Send + Sync {
    /// Validate a journal entry before it is written
    fn validate_journal(&self, entry: &NewJournalEntry) -> LedgerResult<()>;
}

/// Default journal validator with the basic double-entry rules
pub struct DefaultJournalValidator;

impl JournalValidator for DefaultJournalValidator {
    fn validate_journal(&self, entry: &NewJournalEntry) -> LedgerResult<()> {
        entry.validate()
    }
}

/// Selects accounts for listing and bulk reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountFilter {
    pub include_inactive: bool,
    pub account_type: Option<AccountType>,
}

impl AccountFilter {
    /// Every account, active or not
    pub fn all() -> Self {
        Self {
            include_inactive: true,
            account_type: None,
        }
    }

    pub fn matches(&self, account: &Account) -> bool {
        (self.include_inactive || account.is_active)
            && self
                .account_type
                .is_none_or(|t| account.account_type == t)
    }
}

/// Date range and status selection for journal scans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalFilter {
    /// Inclusive lower bound on the entry date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date
    pub to: Option<NaiveDate>,
    /// `None` selects every status
    pub status: Option<JournalStatus>,
}

impl Default for JournalFilter {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            status: Some(JournalStatus::Posted),
        }
    }
}

impl JournalFilter {
    pub fn between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from,
            to,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<JournalStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, date: NaiveDate, status: JournalStatus) -> bool {
        self.from.is_none_or(|from| date >= from)
            && self.to.is_none_or(|to| date <= to)
            && self.status.is_none_or(|s| s == status)
    }
}

/// Header totals of a journal entry next to the sums of its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalSummary {
    pub id: JournalId,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub status: JournalStatus,
    pub source: Option<SourceRef>,
    pub header_debit: bigdecimal::BigDecimal,
    pub header_credit: bigdecimal::BigDecimal,
    pub is_balanced: bool,
    pub reversed_from: Option<JournalId>,
    pub reversed_by: Option<JournalId>,
    pub lines: LineTotals,
}

impl JournalSummary {
    pub fn from_entry(entry: &JournalEntry) -> Self {
        Self {
            id: entry.id,
            entry_number: entry.entry_number.clone(),
            entry_date: entry.entry_date,
            status: entry.status,
            source: entry.source.clone(),
            header_debit: entry.total_debit.clone(),
            header_credit: entry.total_credit.clone(),
            is_balanced: entry.is_balanced,
            reversed_from: entry.reversed_from,
            reversed_by: entry.reversed_by,
            lines: entry.line_totals(),
        }
    }
}
