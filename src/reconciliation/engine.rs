//! Balance reconciliation engine

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::balance::{compare, signed_balance, ReconcileOutcome, Tolerance};
use super::cash_bank::{self, CashBankReport};
use super::findings::{Finding, FindingKind, Severity};
use super::hierarchy::{self, HierarchyReport, RolledUpBalance};
use super::journal_check::{self, JournalCheckReport};
use crate::retry::{retry, RetryPolicy};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_account_code;

/// Reconciliation result for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountReconciliation {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub is_header: bool,
    /// Journal-derived balance; zero for header accounts
    pub expected: BigDecimal,
    pub actual: BigDecimal,
    pub outcome: ReconcileOutcome,
}

impl AccountReconciliation {
    pub fn is_matched(&self) -> bool {
        self.outcome.is_matched()
    }

    /// The mismatch as a finding, if there is one
    pub fn finding(&self) -> Option<Finding> {
        match &self.outcome {
            ReconcileOutcome::Matched => None,
            ReconcileOutcome::Mismatch {
                expected,
                actual,
                difference,
            } => {
                let (kind, description) = if self.is_header {
                    (
                        FindingKind::HeaderBalance,
                        "header account carries a stored balance".to_string(),
                    )
                } else {
                    (
                        FindingKind::BalanceMismatch,
                        format!(
                            "stored balance of {} differs from posted journal lines",
                            self.name
                        ),
                    )
                };
                let severity = Severity::for_difference(difference);
                Some(
                    Finding::new(kind, self.code.clone(), severity, description).with_amounts(
                        expected.clone(),
                        actual.clone(),
                        difference.clone(),
                    ),
                )
            }
        }
    }
}

/// Reconciliation results for a set of accounts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub matched: usize,
    pub results: Vec<AccountReconciliation>,
}

impl ReconciliationReport {
    pub fn mismatches(&self) -> impl Iterator<Item = &AccountReconciliation> {
        self.results.iter().filter(|r| !r.is_matched())
    }

    pub fn is_clean(&self) -> bool {
        self.matched == self.checked
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.results.iter().filter_map(|r| r.finding()).collect()
    }
}

/// An account that could not be synced during a bulk run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub account_id: AccountId,
    pub code: String,
    pub error: String,
    pub class: ErrorClass,
}

/// Outcome of a bulk balance sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub checked: usize,
    pub already_matched: usize,
    pub skipped_headers: usize,
    /// Mismatched leaf accounts found before writing
    pub planned: Vec<AccountReconciliation>,
    pub synced: Vec<BalanceSync>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.synced.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Computes journal-derived balances, compares them to stored balances and
/// writes corrections. The engine is the only writer of account balances.
pub struct ReconciliationEngine<S: LedgerStorage> {
    storage: S,
    tolerance: Tolerance,
    retry: RetryPolicy,
}

impl<S: LedgerStorage> ReconciliationEngine<S> {
    /// Create an engine with the default one-cent tolerance
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            tolerance: Tolerance::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Look up an account by code, returning an error if not found
    pub async fn resolve_account(&self, code: &str) -> LedgerResult<Account> {
        validate_account_code(code)?;
        let storage = &self.storage;
        retry(&self.retry, "get_account_by_code", move || {
            storage.get_account_by_code(code)
        })
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(code.to_string()))
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: AccountId) -> LedgerResult<Account> {
        let storage = &self.storage;
        retry(&self.retry, "get_account", move || storage.get_account(account_id))
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn accounts(&self, filter: &AccountFilter) -> LedgerResult<Vec<Account>> {
        let storage = &self.storage;
        retry(&self.retry, "list_accounts", move || storage.list_accounts(filter)).await
    }

    /// Journal-derived balance of an account.
    ///
    /// With `posted_only` only POSTED entries contribute; otherwise every
    /// entry that has not been deleted does.
    pub async fn compute_expected_balance(
        &self,
        account_id: AccountId,
        posted_only: bool,
    ) -> LedgerResult<BigDecimal> {
        let account = self.get_account_required(account_id).await?;
        self.expected_for(&account, PostingScope::from_posted_only(posted_only))
            .await
    }

    async fn expected_for(
        &self,
        account: &Account,
        scope: PostingScope,
    ) -> LedgerResult<BigDecimal> {
        let storage = &self.storage;
        let account_id = account.id;
        let totals = retry(&self.retry, "account_line_totals", move || {
            storage.account_line_totals(account_id, scope)
        })
        .await?;
        debug!(
            account = %account.code,
            debit = %totals.debit,
            credit = %totals.credit,
            lines = totals.line_count,
            "summed journal lines"
        );
        Ok(signed_balance(account.account_type, &totals))
    }

    /// Compare an account's stored balance with its POSTED journal lines.
    ///
    /// Header accounts are expected to hold zero.
    pub async fn reconcile(&self, account_id: AccountId) -> LedgerResult<AccountReconciliation> {
        let account = self.get_account_required(account_id).await?;
        self.reconcile_account(&account).await
    }

    async fn reconcile_account(&self, account: &Account) -> LedgerResult<AccountReconciliation> {
        let expected = if account.is_header {
            BigDecimal::from(0)
        } else {
            self.expected_for(account, PostingScope::PostedOnly).await?
        };
        let outcome = compare(&expected, &account.balance, &self.tolerance);

        Ok(AccountReconciliation {
            account_id: account.id,
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            is_header: account.is_header,
            expected,
            actual: account.balance.clone(),
            outcome,
        })
    }

    /// Reconcile every account selected by the filter
    pub async fn reconcile_all(
        &self,
        filter: &AccountFilter,
    ) -> LedgerResult<ReconciliationReport> {
        let accounts = self.accounts(filter).await?;

        let mut report = ReconciliationReport::default();
        for account in &accounts {
            let result = self.reconcile_account(account).await?;
            report.checked += 1;
            if result.is_matched() {
                report.matched += 1;
            }
            report.results.push(result);
        }

        info!(
            checked = report.checked,
            matched = report.matched,
            "reconciled account balances"
        );
        Ok(report)
    }

    /// Write the POSTED-only computed balance to a leaf account.
    ///
    /// Serialization conflicts are retried with the configured backoff.
    pub async fn sync(&mut self, account_id: AccountId) -> LedgerResult<BalanceSync> {
        let mut attempt = 0;
        loop {
            match self.storage.sync_account_balance(account_id).await {
                Err(err) if self.retry.should_retry(&err, attempt) => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(account_id, attempt, error = %err, "balance sync conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                Ok(sync) => {
                    if sync.changed {
                        info!(
                            account = %sync.code,
                            previous = %sync.previous,
                            new = %sync.new,
                            "account balance synced"
                        );
                    }
                    return Ok(sync);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Sync every mismatched leaf account.
    ///
    /// Transient and integrity failures are collected per account; fatal
    /// errors abort the run.
    pub async fn sync_all(&mut self, dry_run: bool) -> LedgerResult<SyncReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_all", %run_id, dry_run);
        self.sync_all_inner(run_id, dry_run).instrument(span).await
    }

    async fn sync_all_inner(&mut self, run_id: Uuid, dry_run: bool) -> LedgerResult<SyncReport> {
        let accounts = self.accounts(&AccountFilter::all()).await?;

        let mut report = SyncReport {
            run_id,
            dry_run,
            checked: 0,
            already_matched: 0,
            skipped_headers: 0,
            planned: Vec::new(),
            synced: Vec::new(),
            failures: Vec::new(),
        };

        for account in &accounts {
            if account.is_header {
                report.skipped_headers += 1;
                continue;
            }
            report.checked += 1;

            let reconciliation = match self.reconcile_account(account).await {
                Ok(reconciliation) => reconciliation,
                Err(err) if err.class() == ErrorClass::Fatal => return Err(err),
                Err(err) => {
                    report.failures.push(sync_failure(account, err));
                    continue;
                }
            };
            if reconciliation.is_matched() {
                report.already_matched += 1;
                continue;
            }
            report.planned.push(reconciliation);

            if dry_run {
                continue;
            }

            match self.sync(account.id).await {
                Ok(sync) => report.synced.push(sync),
                Err(err) if err.class() == ErrorClass::Fatal => return Err(err),
                Err(err) => report.failures.push(sync_failure(account, err)),
            }
        }

        info!(
            checked = report.checked,
            planned = report.planned.len(),
            synced = report.succeeded(),
            failed = report.failed(),
            "balance sync finished"
        );
        Ok(report)
    }

    /// Sync the leaf accounts touched by one journal entry
    pub async fn sync_after_post(
        &mut self,
        journal_id: JournalId,
    ) -> LedgerResult<Vec<BalanceSync>> {
        let storage = &self.storage;
        let account_ids = retry(&self.retry, "journal_accounts", move || {
            storage.journal_accounts(journal_id)
        })
        .await?;

        let mut synced = Vec::with_capacity(account_ids.len());
        for account_id in account_ids {
            let account = self.get_account_required(account_id).await?;
            if account.is_header {
                warn!(
                    account = %account.code,
                    journal_id,
                    "journal posts to a header account; skipping sync"
                );
                continue;
            }
            synced.push(self.sync(account_id).await?);
        }
        Ok(synced)
    }

    /// Scan journal entries for double-entry violations
    pub async fn check_journals(&self, filter: &JournalFilter) -> LedgerResult<JournalCheckReport> {
        let storage = &self.storage;
        let summaries = retry(&self.retry, "journal_summaries", move || {
            storage.journal_summaries(filter)
        })
        .await?;
        let report = journal_check::check_journals(&summaries, &self.tolerance);
        info!(
            checked = report.entries_checked,
            unbalanced = report.unbalanced.len(),
            "journal balance check finished"
        );
        Ok(report)
    }

    /// Check the chart of accounts for header and parent problems
    pub async fn check_hierarchy(&self) -> LedgerResult<HierarchyReport> {
        let accounts = self.accounts(&AccountFilter::all()).await?;
        let storage = &self.storage;
        let postings =
            retry(&self.retry, "header_postings", move || storage.header_postings()).await?;
        Ok(hierarchy::check_hierarchy(&accounts, &postings, &self.tolerance))
    }

    /// Compare cash and bank registers with their transactions and GL accounts
    pub async fn check_cash_banks(&self) -> LedgerResult<CashBankReport> {
        let storage = &self.storage;
        let registers =
            retry(&self.retry, "cash_bank_balances", move || storage.cash_bank_balances()).await?;
        let report = cash_bank::check_cash_banks(&registers, &self.tolerance);
        info!(
            checked = report.registers_checked,
            mismatched = report.mismatches.len(),
            "cash bank check finished"
        );
        Ok(report)
    }

    /// Aggregated balances up the account tree
    pub async fn rollup(&self) -> LedgerResult<Vec<RolledUpBalance>> {
        let accounts = self.accounts(&AccountFilter::all()).await?;
        hierarchy::rollup(&accounts)
    }

    /// Database triggers competing with the engine for balance writes
    pub async fn balance_triggers(&self) -> LedgerResult<Vec<BalanceTrigger>> {
        let storage = &self.storage;
        retry(&self.retry, "balance_triggers", move || storage.balance_triggers()).await
    }

    /// Drop every competing balance trigger, returning what was removed
    pub async fn remove_balance_triggers(&mut self) -> LedgerResult<Vec<BalanceTrigger>> {
        let triggers = self.balance_triggers().await?;
        for trigger in &triggers {
            self.storage.drop_trigger(trigger).await?;
            info!(trigger = %trigger.name, table = %trigger.table, "dropped balance trigger");
        }
        Ok(triggers)
    }
}

fn sync_failure(account: &Account, err: LedgerError) -> SyncFailure {
    warn!(account = %account.code, error = %err, "failed to sync account balance");
    SyncFailure {
        account_id: account.id,
        code: account.code.clone(),
        error: err.to_string(),
        class: err.class(),
    }
}

/// Findings for competing balance triggers
pub fn trigger_findings(triggers: &[BalanceTrigger]) -> Vec<Finding> {
    triggers
        .iter()
        .map(|t| {
            Finding::new(
                FindingKind::BalanceTrigger,
                t.name.clone(),
                Severity::High,
                format!(
                    "trigger on {} runs {}() and writes balances outside the engine",
                    t.table, t.function
                ),
            )
        })
        .collect()
}
