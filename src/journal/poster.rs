//! Writing, approving and reversing journal entries.
//!
//! Entries are append-only: a posted entry is corrected by a reversal,
//! never edited or deleted.

use chrono::NaiveDate;
use tracing::info;

use crate::traits::*;
use crate::types::*;

/// Suffix appended to the entry number of a reversal
pub const REVERSAL_SUFFIX: &str = "-REV";

/// Journal poster for writing entries through a storage backend
pub struct JournalPoster<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn JournalValidator>,
}

impl<S: LedgerStorage> JournalPoster<S> {
    /// Create a new journal poster
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultJournalValidator),
        }
    }

    /// Create a new journal poster with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn JournalValidator>) -> Self {
        Self { storage, validator }
    }

    /// Validate and write a journal entry
    pub async fn post(&mut self, entry: NewJournalEntry) -> LedgerResult<JournalEntry> {
        self.validator.validate_journal(&entry)?;

        // Verify all referenced accounts can take postings
        for line in &entry.lines {
            let account = self
                .storage
                .get_account(line.account_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(line.account_id.to_string()))?;

            if account.is_header {
                return Err(LedgerError::Integrity(format!(
                    "Header account {} cannot take direct postings",
                    account.code
                )));
            }
            if !account.is_active {
                return Err(LedgerError::Validation(format!(
                    "Account {} is inactive",
                    account.code
                )));
            }
        }

        let stored = self.storage.insert_journal(&entry).await?;
        info!(
            journal_id = stored.id,
            entry_number = %stored.entry_number,
            status = %stored.status,
            "journal entry recorded"
        );
        Ok(stored)
    }

    /// Get a journal entry by ID
    pub async fn get_journal(&self, journal_id: JournalId) -> LedgerResult<Option<JournalEntry>> {
        self.storage.get_journal(journal_id).await
    }

    /// Get a journal entry by ID, returning an error if not found
    pub async fn get_journal_required(&self, journal_id: JournalId) -> LedgerResult<JournalEntry> {
        self.storage
            .get_journal(journal_id)
            .await?
            .ok_or_else(|| LedgerError::JournalNotFound(journal_id.to_string()))
    }

    /// Move a DRAFT entry to POSTED once its lines balance
    pub async fn approve(&mut self, journal_id: JournalId) -> LedgerResult<JournalEntry> {
        let mut entry = self.get_journal_required(journal_id).await?;
        if entry.status != JournalStatus::Draft {
            return Err(LedgerError::Validation(format!(
                "Only DRAFT entries can be approved; {} is {}",
                entry.entry_number, entry.status
            )));
        }

        let totals = entry.line_totals();
        if totals.line_count < 2 || totals.debit != totals.credit {
            return Err(LedgerError::InvalidJournal(format!(
                "Journal entry {} is not balanced: debits = {}, credits = {}",
                entry.entry_number, totals.debit, totals.credit
            )));
        }

        self.storage
            .set_journal_status(journal_id, JournalStatus::Posted)
            .await?;
        entry.status = JournalStatus::Posted;
        info!(journal_id, entry_number = %entry.entry_number, "journal entry posted");
        Ok(entry)
    }

    /// Write a POSTED mirror entry that cancels a POSTED entry.
    ///
    /// The original stays POSTED and is linked to the reversal, so both
    /// keep contributing and their effects net to zero.
    pub async fn reverse(
        &mut self,
        journal_id: JournalId,
        reason: &str,
        date: NaiveDate,
    ) -> LedgerResult<JournalEntry> {
        let original = self.get_journal_required(journal_id).await?;
        if !original.is_posted() {
            return Err(LedgerError::Integrity(format!(
                "Only POSTED entries can be reversed; {} is {}",
                original.entry_number, original.status
            )));
        }
        if let Some(reversal_id) = original.reversed_by {
            return Err(LedgerError::Integrity(format!(
                "Journal entry {} is already reversed by entry {}",
                original.entry_number, reversal_id
            )));
        }

        let reversal = NewJournalEntry {
            entry_number: format!("{}{}", original.entry_number, REVERSAL_SUFFIX),
            entry_date: date,
            description: format!("Reversal of {}: {}", original.entry_number, reason),
            status: JournalStatus::Posted,
            source: original.source.clone(),
            reversed_from: Some(original.id),
            reversal_reason: Some(reason.to_string()),
            lines: original
                .lines
                .iter()
                .map(|line| NewJournalLine::from(line).reversed())
                .collect(),
        };
        self.validator.validate_journal(&reversal)?;

        let stored = self.storage.insert_journal(&reversal).await?;
        info!(
            journal_id = stored.id,
            reverses = original.id,
            entry_number = %stored.entry_number,
            "journal entry reversed"
        );
        Ok(stored)
    }
}
