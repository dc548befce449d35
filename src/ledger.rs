//! Ledger facade tying journal posting to balance synchronisation

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::journal::JournalPoster;
use crate::reconciliation::{
    trigger_findings, CashBankReport, Finding, HierarchyReport, JournalCheckReport,
    ReconciliationEngine, ReconciliationReport, Tolerance,
};
use crate::retry::RetryPolicy;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_account;

/// A journal entry together with the balances it moved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedJournal {
    pub entry: JournalEntry,
    pub synced: Vec<BalanceSync>,
}

/// Result of running every read-only check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub journals: JournalCheckReport,
    pub hierarchy: HierarchyReport,
    pub balances: ReconciliationReport,
    pub cash_banks: CashBankReport,
    pub triggers: Vec<BalanceTrigger>,
}

impl HealthReport {
    /// All findings, most severe first
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = self.journals.findings();
        findings.extend(self.hierarchy.findings());
        // Header balances are already covered by the hierarchy check
        findings.extend(
            self.balances
                .mismatches()
                .filter(|r| !r.is_header)
                .filter_map(|r| r.finding()),
        );
        findings.extend(self.cash_banks.findings());
        findings.extend(trigger_findings(&self.triggers));
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        findings
    }

    pub fn is_healthy(&self) -> bool {
        self.journals.is_clean()
            && self.hierarchy.is_clean()
            && self.balances.mismatches().all(|r| r.is_header)
            && self.cash_banks.is_clean()
            && self.triggers.is_empty()
    }
}

/// Main ledger system: posts journal entries and keeps stored balances in
/// step with them
pub struct Ledger<S: LedgerStorage> {
    storage: S,
    engine: ReconciliationEngine<S>,
    poster: JournalPoster<S>,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend
    pub fn new(storage: S) -> Self {
        Self {
            engine: ReconciliationEngine::new(storage.clone()),
            poster: JournalPoster::new(storage.clone()),
            storage,
        }
    }

    /// Create a new ledger with a custom journal validator
    pub fn with_validator(storage: S, validator: Box<dyn JournalValidator>) -> Self {
        Self {
            engine: ReconciliationEngine::new(storage.clone()),
            poster: JournalPoster::with_validator(storage.clone(), validator),
            storage,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.engine = self.engine.with_tolerance(tolerance);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.engine = self.engine.with_retry_policy(retry);
        self
    }

    pub fn engine(&self) -> &ReconciliationEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReconciliationEngine<S> {
        &mut self.engine
    }

    /// Add an account to the chart of accounts
    pub async fn create_account(&mut self, account: Account) -> LedgerResult<Account> {
        validate_account(&account)?;

        // Check if account already exists
        if self.storage.get_account(account.id).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Account with ID '{}' already exists",
                account.id
            )));
        }
        if self.storage.get_account_by_code(&account.code).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Account with code '{}' already exists",
                account.code
            )));
        }

        // Validate parent account exists if specified
        if let Some(parent_id) = account.parent_id {
            if self.storage.get_account(parent_id).await?.is_none() {
                return Err(LedgerError::Validation(format!(
                    "Parent account '{}' does not exist",
                    parent_id
                )));
            }
        }

        self.storage.save_account(&account).await?;
        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get a journal entry by ID
    pub async fn get_journal(&self, journal_id: JournalId) -> LedgerResult<Option<JournalEntry>> {
        self.poster.get_journal(journal_id).await
    }

    /// Record a journal entry; POSTED entries sync the accounts they touch
    pub async fn record_journal(&mut self, entry: NewJournalEntry) -> LedgerResult<PostedJournal> {
        let entry = self.poster.post(entry).await?;
        let synced = if entry.is_posted() {
            self.engine.sync_after_post(entry.id).await?
        } else {
            Vec::new()
        };
        Ok(PostedJournal { entry, synced })
    }

    /// Approve a DRAFT entry and sync the accounts it touches
    pub async fn approve_journal(&mut self, journal_id: JournalId) -> LedgerResult<PostedJournal> {
        let entry = self.poster.approve(journal_id).await?;
        let synced = self.engine.sync_after_post(entry.id).await?;
        Ok(PostedJournal { entry, synced })
    }

    /// Reverse a POSTED entry and sync the accounts it touches
    pub async fn reverse_journal(
        &mut self,
        journal_id: JournalId,
        reason: &str,
        date: NaiveDate,
    ) -> LedgerResult<PostedJournal> {
        let entry = self.poster.reverse(journal_id, reason, date).await?;
        let synced = self.engine.sync_after_post(entry.id).await?;
        Ok(PostedJournal { entry, synced })
    }

    /// Run every read-only check without changing anything
    pub async fn health_check(&self, filter: &JournalFilter) -> LedgerResult<HealthReport> {
        let journals = self.engine.check_journals(filter).await?;
        let hierarchy = self.engine.check_hierarchy().await?;
        let balances = self.engine.reconcile_all(&AccountFilter::all()).await?;
        let cash_banks = self.engine.check_cash_banks().await?;
        let triggers = self.engine.balance_triggers().await?;

        let report = HealthReport {
            journals,
            hierarchy,
            balances,
            cash_banks,
            triggers,
        };
        info!(
            healthy = report.is_healthy(),
            findings = report.findings().len(),
            "ledger health check finished"
        );
        Ok(report)
    }
}
