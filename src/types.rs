//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of a row in `accounts`
pub type AccountId = i64;

/// Primary key of a row in the journal ledger
pub type JournalId = i64;

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Assets - what the business owns (Kas, Bank, Receivables, Inventory, etc.)
    Asset,
    /// Liabilities - what the business owes (Payables, Tax Payable, Loans, etc.)
    Liability,
    /// Equity - owner's interest in the business (Capital, Retained Earnings, etc.)
    Equity,
    /// Revenue - money earned by the business
    Revenue,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the normal balance type for this account type
    /// Assets and Expenses normally have debit balances
    /// Liabilities, Equity, and Revenue normally have credit balances
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Expense => EntryType::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                EntryType::Credit
            }
        }
    }

    /// Database representation of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASSET" => Ok(AccountType::Asset),
            "LIABILITY" => Ok(AccountType::Liability),
            "EQUITY" => Ok(AccountType::Equity),
            "REVENUE" | "INCOME" => Ok(AccountType::Revenue),
            "EXPENSE" => Ok(AccountType::Expense),
            _ => Err(LedgerError::Contract(format!("unknown account type '{}'", s))),
        }
    }
}

/// Types of entries in double-entry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit entry - increases Assets and Expenses, decreases Liabilities, Equity, and Revenue
    Debit,
    /// Credit entry - increases Liabilities, Equity, and Revenue, decreases Assets and Expenses
    Credit,
}

/// A chart-of-accounts row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: AccountId,
    /// Hierarchical account code such as "1101" or "4101"
    pub code: String,
    /// Human-readable account name
    pub name: String,
    /// Type of account (Asset, Liability, etc.)
    pub account_type: AccountType,
    /// Header accounts aggregate their children and take no direct postings
    pub is_header: bool,
    pub is_active: bool,
    /// Optional parent account for the hierarchical chart of accounts
    pub parent_id: Option<AccountId>,
    /// Stored balance of the account
    pub balance: BigDecimal,
}

impl Account {
    /// Create a new active leaf account with a zero balance
    pub fn new(
        id: AccountId,
        code: String,
        name: String,
        account_type: AccountType,
        parent_id: Option<AccountId>,
    ) -> Self {
        Self {
            id,
            code,
            name,
            account_type,
            is_header: false,
            is_active: true,
            parent_id,
            balance: BigDecimal::from(0),
        }
    }

    /// Create a new header (aggregation) account
    pub fn new_header(
        id: AccountId,
        code: String,
        name: String,
        account_type: AccountType,
        parent_id: Option<AccountId>,
    ) -> Self {
        Self {
            is_header: true,
            ..Self::new(id, code, name, account_type, parent_id)
        }
    }

    /// Set the stored balance
    pub fn with_balance(mut self, balance: BigDecimal) -> Self {
        self.balance = balance;
        self
    }

    /// Mark the account inactive
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Lifecycle state of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Draft,
    /// The only status that affects account balances
    Posted,
    Reversed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Draft => "DRAFT",
            JournalStatus::Posted => "POSTED",
            JournalStatus::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(JournalStatus::Draft),
            "POSTED" => Ok(JournalStatus::Posted),
            "REVERSED" => Ok(JournalStatus::Reversed),
            _ => Err(LedgerError::Contract(format!(
                "unknown journal status '{}'",
                s
            ))),
        }
    }
}

/// Business document that produced a journal entry, e.g. `SALE`/21
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_type: String,
    pub source_id: Option<i64>,
}

impl SourceRef {
    pub fn new(source_type: String, source_id: Option<i64>) -> Self {
        Self {
            source_type,
            source_id,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_id {
            Some(id) => write!(f, "{}/{}", self.source_type, id),
            None => f.write_str(&self.source_type),
        }
    }
}

/// A stored posting against one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: i64,
    pub journal_id: JournalId,
    pub account_id: AccountId,
    pub line_number: i32,
    pub debit_amount: BigDecimal,
    pub credit_amount: BigDecimal,
    pub description: Option<String>,
}

/// A stored journal entry with its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalId,
    /// Human-readable entry number
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    /// Header total as recorded when the entry was written
    pub total_debit: BigDecimal,
    /// Header total as recorded when the entry was written
    pub total_credit: BigDecimal,
    pub status: JournalStatus,
    pub source: Option<SourceRef>,
    pub is_balanced: bool,
    /// Entry this one reverses
    pub reversed_from: Option<JournalId>,
    /// Entry that reverses this one
    pub reversed_by: Option<JournalId>,
    pub reversal_reason: Option<String>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Totals derived from the lines rather than the header
    pub fn line_totals(&self) -> LineTotals {
        let mut totals = LineTotals::default();
        for line in &self.lines {
            totals.add_line(&line.debit_amount, &line.credit_amount);
        }
        totals
    }

    pub fn is_posted(&self) -> bool {
        self.status == JournalStatus::Posted
    }
}

/// A posting that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournalLine {
    pub account_id: AccountId,
    pub debit_amount: BigDecimal,
    pub credit_amount: BigDecimal,
    pub description: Option<String>,
}

impl NewJournalLine {
    /// Create a debit line
    pub fn debit(account_id: AccountId, amount: BigDecimal, description: Option<String>) -> Self {
        Self {
            account_id,
            debit_amount: amount,
            credit_amount: BigDecimal::from(0),
            description,
        }
    }

    /// Create a credit line
    pub fn credit(account_id: AccountId, amount: BigDecimal, description: Option<String>) -> Self {
        Self {
            account_id,
            debit_amount: BigDecimal::from(0),
            credit_amount: amount,
            description,
        }
    }

    /// The side carrying the amount, if exactly one side is non-zero
    pub fn entry_type(&self) -> Option<EntryType> {
        let zero = BigDecimal::from(0);
        match (self.debit_amount != zero, self.credit_amount != zero) {
            (true, false) => Some(EntryType::Debit),
            (false, true) => Some(EntryType::Credit),
            _ => None,
        }
    }

    /// The same posting on the opposite side
    pub fn reversed(&self) -> Self {
        Self {
            account_id: self.account_id,
            debit_amount: self.credit_amount.clone(),
            credit_amount: self.debit_amount.clone(),
            description: self.description.clone(),
        }
    }
}

impl From<&JournalLine> for NewJournalLine {
    fn from(line: &JournalLine) -> Self {
        Self {
            account_id: line.account_id,
            debit_amount: line.debit_amount.clone(),
            credit_amount: line.credit_amount.clone(),
            description: line.description.clone(),
        }
    }
}

/// A journal entry that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub status: JournalStatus,
    pub source: Option<SourceRef>,
    pub reversed_from: Option<JournalId>,
    /// Why the entry in `reversed_from` is being reversed
    pub reversal_reason: Option<String>,
    pub lines: Vec<NewJournalLine>,
}

impl NewJournalEntry {
    /// Create an empty posted entry
    pub fn new(entry_number: String, entry_date: NaiveDate, description: String) -> Self {
        Self {
            entry_number,
            entry_date,
            description,
            status: JournalStatus::Posted,
            source: None,
            reversed_from: None,
            reversal_reason: None,
            lines: Vec::new(),
        }
    }

    /// Calculate total debits
    pub fn total_debits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.debit_amount).sum()
    }

    /// Calculate total credits
    pub fn total_credits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.credit_amount).sum()
    }

    /// Check if the entry is balanced (debits = credits)
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    /// Validate the double-entry rules for this entry
    pub fn validate(&self) -> LedgerResult<()> {
        if self.entry_number.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Journal entry number cannot be empty".to_string(),
            ));
        }

        if self.lines.len() < 2 {
            return Err(LedgerError::InvalidJournal(
                "Journal entry must have at least two lines for double-entry bookkeeping"
                    .to_string(),
            ));
        }

        let zero = BigDecimal::from(0);
        for line in &self.lines {
            if line.debit_amount < zero || line.credit_amount < zero {
                return Err(LedgerError::InvalidJournal(format!(
                    "Line for account {} carries a negative amount",
                    line.account_id
                )));
            }
            if line.entry_type().is_none() {
                return Err(LedgerError::InvalidJournal(format!(
                    "Line for account {} must have exactly one non-zero side",
                    line.account_id
                )));
            }
        }

        // Drafts may be saved unbalanced; they never reach a balance
        if self.status == JournalStatus::Posted && !self.is_balanced() {
            return Err(LedgerError::InvalidJournal(format!(
                "Journal entry is not balanced: debits = {}, credits = {}",
                self.total_debits(),
                self.total_credits()
            )));
        }

        Ok(())
    }
}

/// Summed debit and credit amounts over a set of journal lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTotals {
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub line_count: u64,
}

impl Default for LineTotals {
    fn default() -> Self {
        Self {
            debit: BigDecimal::from(0),
            credit: BigDecimal::from(0),
            line_count: 0,
        }
    }
}

impl LineTotals {
    pub fn new(debit: BigDecimal, credit: BigDecimal, line_count: u64) -> Self {
        Self {
            debit,
            credit,
            line_count,
        }
    }

    pub fn add_line(&mut self, debit: &BigDecimal, credit: &BigDecimal) {
        self.debit += debit;
        self.credit += credit;
        self.line_count += 1;
    }

    /// Debit minus credit
    pub fn difference(&self) -> BigDecimal {
        &self.debit - &self.credit
    }
}

/// Which journal entries contribute to a computed balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingScope {
    /// Only POSTED entries
    PostedOnly,
    /// Every entry that has not been deleted, whatever its status
    AllStatuses,
}

impl PostingScope {
    pub fn from_posted_only(posted_only: bool) -> Self {
        if posted_only {
            PostingScope::PostedOnly
        } else {
            PostingScope::AllStatuses
        }
    }

    pub fn includes(&self, status: JournalStatus) -> bool {
        match self {
            PostingScope::PostedOnly => status == JournalStatus::Posted,
            PostingScope::AllStatuses => true,
        }
    }
}

/// Result of writing a recomputed balance to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSync {
    pub account_id: AccountId,
    pub code: String,
    pub previous: BigDecimal,
    pub new: BigDecimal,
    /// False when the stored balance already equalled the computed one
    pub changed: bool,
}

/// A cash or bank register next to the GL account it is linked to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBankBalance {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// Stored register balance
    pub balance: BigDecimal,
    /// Sum of the register's transactions
    pub transaction_total: BigDecimal,
    pub account_id: Option<AccountId>,
    pub account_code: Option<String>,
    /// Stored balance of the linked GL account, if the link resolves
    pub account_balance: Option<BigDecimal>,
}

/// A database trigger that writes account balances on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTrigger {
    pub name: String,
    pub table: String,
    pub function: String,
}

/// How an error should be handled by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Connectivity or serialization conflicts; retry with backoff
    Transient,
    /// The data violates a ledger invariant; report, never correct silently
    Integrity,
    /// Programming or contract violation; not recoverable
    Fatal,
}

/// Errors that can occur in the reconciliation system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid journal entry: {0}")]
    InvalidJournal(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Journal entry not found: {0}")]
    JournalNotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Integrity violation: {0}")]
    Integrity(String),
    #[error("Contract violation: {0}")]
    Contract(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::Connection(_) | LedgerError::Conflict(_) => ErrorClass::Transient,
            LedgerError::InvalidJournal(_) | LedgerError::Integrity(_) => ErrorClass::Integrity,
            LedgerError::Storage(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::JournalNotFound(_)
            | LedgerError::Validation(_)
            | LedgerError::Contract(_)
            | LedgerError::Config(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("ASSET".parse::<AccountType>().unwrap(), AccountType::Asset);
        assert_eq!("revenue".parse::<AccountType>().unwrap(), AccountType::Revenue);
        assert_eq!("INCOME".parse::<AccountType>().unwrap(), AccountType::Revenue);

        let err = "CONTRA".parse::<AccountType>().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_normal_balance_sides() {
        assert_eq!(AccountType::Asset.normal_balance(), EntryType::Debit);
        assert_eq!(AccountType::Expense.normal_balance(), EntryType::Debit);
        assert_eq!(AccountType::Liability.normal_balance(), EntryType::Credit);
        assert_eq!(AccountType::Equity.normal_balance(), EntryType::Credit);
        assert_eq!(AccountType::Revenue.normal_balance(), EntryType::Credit);
    }

    #[test]
    fn test_posted_entry_must_balance() {
        let mut entry = NewJournalEntry::new("JE-1".to_string(), date(), "Sale".to_string());
        entry
            .lines
            .push(NewJournalLine::debit(1, BigDecimal::from(100), None));
        entry
            .lines
            .push(NewJournalLine::credit(2, BigDecimal::from(90), None));

        let err = entry.validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidJournal(_)));
        assert_eq!(err.class(), ErrorClass::Integrity);

        // The same lines are acceptable as a draft
        entry.status = JournalStatus::Draft;
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_line_needs_exactly_one_side() {
        let mut entry = NewJournalEntry::new("JE-2".to_string(), date(), "Bad".to_string());
        entry.lines.push(NewJournalLine {
            account_id: 1,
            debit_amount: BigDecimal::from(50),
            credit_amount: BigDecimal::from(50),
            description: None,
        });
        entry
            .lines
            .push(NewJournalLine::credit(2, BigDecimal::from(0), None));

        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_error_classes() {
        assert!(LedgerError::Connection("reset".into()).is_retryable());
        assert!(LedgerError::Conflict("40001".into()).is_retryable());
        assert_eq!(
            LedgerError::Integrity("header".into()).class(),
            ErrorClass::Integrity
        );
        assert!(!LedgerError::Contract("bad type".into()).is_retryable());
    }
}
