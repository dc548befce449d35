//! Journal balance invariant check
//!
//! Every POSTED journal entry must have total debit equal to total credit.
//! The scan is read-only and works on [`JournalSummary`] rows so it can be
//! exercised without any storage.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::balance::Tolerance;
use super::findings::{Finding, FindingKind, Severity};
use crate::traits::JournalSummary;
use crate::types::*;

/// An entry whose lines do not balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnbalancedEntry {
    pub id: JournalId,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub total_debit: BigDecimal,
    pub total_credit: BigDecimal,
    /// `total_debit - total_credit`
    pub difference: BigDecimal,
}

/// An entry whose stored header totals disagree with its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderLineMismatch {
    pub id: JournalId,
    pub entry_number: String,
    pub header_debit: BigDecimal,
    pub header_credit: BigDecimal,
    pub line_debit: BigDecimal,
    pub line_credit: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRef {
    pub id: JournalId,
    pub entry_number: String,
    pub status: JournalStatus,
}

/// More than one live POSTED entry for the same business document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSource {
    pub source: SourceRef,
    pub journal_ids: Vec<JournalId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalCheckReport {
    pub entries_checked: usize,
    pub unbalanced: Vec<UnbalancedEntry>,
    pub header_mismatches: Vec<HeaderLineMismatch>,
    pub flagged_unbalanced: Vec<JournalRef>,
    pub empty_entries: Vec<JournalRef>,
    pub duplicate_sources: Vec<DuplicateSource>,
}

impl JournalCheckReport {
    pub fn is_clean(&self) -> bool {
        self.unbalanced.is_empty()
            && self.header_mismatches.is_empty()
            && self.flagged_unbalanced.is_empty()
            && self.empty_entries.is_empty()
            && self.duplicate_sources.is_empty()
    }

    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        for entry in &self.unbalanced {
            findings.push(
                Finding::new(
                    FindingKind::UnbalancedJournal,
                    entry.entry_number.clone(),
                    Severity::Critical,
                    format!(
                        "journal is not balanced (debit {}, credit {})",
                        entry.total_debit, entry.total_credit
                    ),
                )
                .with_amounts(
                    entry.total_debit.clone(),
                    entry.total_credit.clone(),
                    entry.difference.clone(),
                ),
            );
        }

        for mismatch in &self.header_mismatches {
            findings.push(Finding::new(
                FindingKind::HeaderLineMismatch,
                mismatch.entry_number.clone(),
                Severity::High,
                format!(
                    "header totals {}/{} differ from line totals {}/{}",
                    mismatch.header_debit,
                    mismatch.header_credit,
                    mismatch.line_debit,
                    mismatch.line_credit
                ),
            ));
        }

        for entry in &self.flagged_unbalanced {
            findings.push(Finding::new(
                FindingKind::FlaggedUnbalanced,
                entry.entry_number.clone(),
                Severity::High,
                "entry is stored with is_balanced = false".to_string(),
            ));
        }

        for entry in &self.empty_entries {
            findings.push(Finding::new(
                FindingKind::EmptyJournal,
                entry.entry_number.clone(),
                Severity::Medium,
                format!("{} entry has no lines", entry.status),
            ));
        }

        for duplicate in &self.duplicate_sources {
            findings.push(Finding::new(
                FindingKind::DuplicateSource,
                duplicate.source.to_string(),
                Severity::Critical,
                format!(
                    "{} posted journals for one source document: {:?}",
                    duplicate.journal_ids.len(),
                    duplicate.journal_ids
                ),
            ));
        }

        findings
    }
}

/// Scan journal summaries for violations of the double-entry invariant
pub fn check_journals(summaries: &[JournalSummary], tolerance: &Tolerance) -> JournalCheckReport {
    let mut report = JournalCheckReport {
        entries_checked: summaries.len(),
        ..JournalCheckReport::default()
    };
    let mut by_source: BTreeMap<(String, i64), Vec<JournalId>> = BTreeMap::new();

    for summary in summaries {
        let lines = &summary.lines;

        let difference = lines.difference();
        if tolerance.exceeds(&difference) {
            report.unbalanced.push(UnbalancedEntry {
                id: summary.id,
                entry_number: summary.entry_number.clone(),
                entry_date: summary.entry_date,
                total_debit: lines.debit.clone(),
                total_credit: lines.credit.clone(),
                difference,
            });
        }

        if tolerance.exceeds(&(&summary.header_debit - &lines.debit))
            || tolerance.exceeds(&(&summary.header_credit - &lines.credit))
        {
            report.header_mismatches.push(HeaderLineMismatch {
                id: summary.id,
                entry_number: summary.entry_number.clone(),
                header_debit: summary.header_debit.clone(),
                header_credit: summary.header_credit.clone(),
                line_debit: lines.debit.clone(),
                line_credit: lines.credit.clone(),
            });
        }

        if !summary.is_balanced {
            report.flagged_unbalanced.push(journal_ref(summary));
        }

        if summary.status == JournalStatus::Posted && lines.line_count == 0 {
            report.empty_entries.push(journal_ref(summary));
        }

        // Reversal pairs legitimately share a source document
        let live = summary.reversed_from.is_none() && summary.reversed_by.is_none();
        if summary.status == JournalStatus::Posted && live {
            if let Some(SourceRef {
                source_type,
                source_id: Some(source_id),
            }) = &summary.source
            {
                by_source
                    .entry((source_type.clone(), *source_id))
                    .or_default()
                    .push(summary.id);
            }
        }
    }

    report.duplicate_sources = by_source
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((source_type, source_id), journal_ids)| DuplicateSource {
            source: SourceRef::new(source_type, Some(source_id)),
            journal_ids,
        })
        .collect();

    report
}

fn journal_ref(summary: &JournalSummary) -> JournalRef {
    JournalRef {
        id: summary.id,
        entry_number: summary.entry_number.clone(),
        status: summary.status,
    }
}
