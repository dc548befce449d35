//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;
use std::collections::HashSet;

/// Validate a chart-of-accounts code such as "1101"
pub fn validate_account_code(code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account code cannot be empty".to_string(),
        ));
    }

    if code.len() > 20 {
        return Err(LedgerError::Validation(
            "Account code cannot exceed 20 characters".to_string(),
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
    {
        return Err(LedgerError::Validation(format!(
            "Account code '{}' can only contain letters, digits, dots, dashes, and underscores",
            code
        )));
    }

    Ok(())
}

/// Validate that an account name is valid
pub fn validate_account_name(name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account name cannot be empty".to_string(),
        ));
    }

    if name.len() > 100 {
        return Err(LedgerError::Validation(
            "Account name cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a journal entry number; the column is `VARCHAR(50)`
pub fn validate_entry_number(entry_number: &str) -> LedgerResult<()> {
    if entry_number.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Journal entry number cannot be empty".to_string(),
        ));
    }

    if entry_number.len() > 50 {
        return Err(LedgerError::Validation(
            "Journal entry number cannot exceed 50 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a journal description is valid
pub fn validate_journal_description(description: &str) -> LedgerResult<()> {
    if description.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Journal description cannot be empty".to_string(),
        ));
    }

    if description.len() > 500 {
        return Err(LedgerError::Validation(
            "Journal description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate an account before it is written to the chart of accounts
pub fn validate_account(account: &Account) -> LedgerResult<()> {
    validate_account_code(&account.code)?;
    validate_account_name(&account.name)?;

    if account.parent_id == Some(account.id) {
        return Err(LedgerError::Validation(format!(
            "Account '{}' cannot be its own parent",
            account.code
        )));
    }

    if account.is_header && account.balance != BigDecimal::from(0) {
        return Err(LedgerError::Integrity(format!(
            "Header account '{}' must not carry a stored balance",
            account.code
        )));
    }

    Ok(())
}

/// Journal validator with stricter checks than the double-entry basics
pub struct EnhancedJournalValidator;

impl JournalValidator for EnhancedJournalValidator {
    fn validate_journal(&self, entry: &NewJournalEntry) -> LedgerResult<()> {
        // Basic validation
        entry.validate()?;

        validate_entry_number(&entry.entry_number)?;
        validate_journal_description(&entry.description)?;

        // Same account cannot appear twice on the same side
        let mut seen = HashSet::new();
        for line in &entry.lines {
            if let Some(side) = line.entry_type() {
                if !seen.insert((line.account_id, side)) {
                    return Err(LedgerError::Validation(format!(
                        "Account {} appears multiple times on the same side of the entry",
                        line.account_id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry() -> NewJournalEntry {
        let mut entry = NewJournalEntry::new(
            "JE-2024-0001".to_string(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            "Pembayaran listrik".to_string(),
        );
        entry.lines.push(NewJournalLine::debit(5, BigDecimal::from(300), None));
        entry.lines.push(NewJournalLine::credit(1, BigDecimal::from(300), None));
        entry
    }

    #[test]
    fn test_account_code_rules() {
        assert!(validate_account_code("1101").is_ok());
        assert!(validate_account_code("1-1-01").is_ok());
        assert!(validate_account_code("").is_err());
        assert!(validate_account_code("11 01").is_err());
        assert!(validate_account_code(&"9".repeat(21)).is_err());
    }

    #[test]
    fn test_header_with_balance_rejected() {
        let header = Account::new_header(1, "1000".into(), "Aset".into(), AccountType::Asset, None)
            .with_balance(BigDecimal::from(10));
        let err = validate_account(&header).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Integrity);

        let own_parent = Account::new(2, "1100".into(), "Kas".into(), AccountType::Asset, Some(2));
        assert!(validate_account(&own_parent).is_err());
    }

    #[test]
    fn test_enhanced_validator_rejects_repeated_side() {
        let validator = EnhancedJournalValidator;
        assert!(validator.validate_journal(&entry()).is_ok());

        let mut repeated = entry();
        repeated.lines[1].credit_amount = BigDecimal::from(100);
        repeated.lines.push(NewJournalLine::credit(1, BigDecimal::from(200), None));
        assert!(validator.validate_journal(&repeated).is_err());

        let mut blank = entry();
        blank.description = "  ".to_string();
        assert!(validator.validate_journal(&blank).is_err());
    }
}
