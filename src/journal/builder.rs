//! Journal entry builder and common posting patterns

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::types::*;

/// Journal builder for creating multi-line entries
#[derive(Debug)]
pub struct JournalBuilder {
    entry: NewJournalEntry,
}

impl JournalBuilder {
    /// Create a new journal builder; entries are POSTED unless set otherwise
    pub fn new(entry_number: String, date: NaiveDate, description: String) -> Self {
        Self {
            entry: NewJournalEntry::new(entry_number, date, description),
        }
    }

    pub fn status(mut self, status: JournalStatus) -> Self {
        self.entry.status = status;
        self
    }

    pub fn description(mut self, description: String) -> Self {
        self.entry.description = description;
        self
    }

    /// Business document the entry was generated from
    pub fn source(mut self, source_type: String, source_id: Option<i64>) -> Self {
        self.entry.source = Some(SourceRef::new(source_type, source_id));
        self
    }

    /// Add a debit line
    pub fn debit(
        mut self,
        account_id: AccountId,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        self.entry
            .lines
            .push(NewJournalLine::debit(account_id, amount, description));
        self
    }

    /// Add a credit line
    pub fn credit(
        mut self,
        account_id: AccountId,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        self.entry
            .lines
            .push(NewJournalLine::credit(account_id, amount, description));
        self
    }

    /// Add a prepared line
    pub fn line(mut self, line: NewJournalLine) -> Self {
        self.entry.lines.push(line);
        self
    }

    /// Build the entry, checking the double-entry rules
    pub fn build(self) -> LedgerResult<NewJournalEntry> {
        self.entry.validate()?;
        Ok(self.entry)
    }
}

/// Common journal patterns
pub mod patterns {
    use super::*;

    /// Debit expense, credit cash
    pub fn expense_payment(
        entry_number: String,
        date: NaiveDate,
        description: String,
        expense_account_id: AccountId,
        cash_account_id: AccountId,
        amount: BigDecimal,
    ) -> LedgerResult<NewJournalEntry> {
        JournalBuilder::new(entry_number, date, description)
            .debit(expense_account_id, amount.clone(), None)
            .credit(cash_account_id, amount, None)
            .build()
    }

    /// Debit cash, credit revenue
    pub fn cash_sale(
        entry_number: String,
        date: NaiveDate,
        description: String,
        cash_account_id: AccountId,
        revenue_account_id: AccountId,
        amount: BigDecimal,
    ) -> LedgerResult<NewJournalEntry> {
        JournalBuilder::new(entry_number, date, description)
            .source("SALE".to_string(), None)
            .debit(cash_account_id, amount.clone(), None)
            .credit(revenue_account_id, amount, None)
            .build()
    }

    /// Opening balances booked against an equity account.
    ///
    /// Each amount is placed on the normal side of its account; the
    /// offsetting total goes to `equity_account_id`.
    pub fn opening_balance(
        entry_number: String,
        date: NaiveDate,
        equity_account_id: AccountId,
        balances: &[(AccountId, AccountType, BigDecimal)],
    ) -> LedgerResult<NewJournalEntry> {
        let mut builder = JournalBuilder::new(entry_number, date, "Opening balance".to_string())
            .source("OPENING_BALANCE".to_string(), None);
        let mut net_debit = BigDecimal::from(0);

        for (account_id, account_type, amount) in balances {
            match account_type.normal_balance() {
                EntryType::Debit => {
                    net_debit += amount;
                    builder = builder.debit(*account_id, amount.clone(), None);
                }
                EntryType::Credit => {
                    net_debit -= amount;
                    builder = builder.credit(*account_id, amount.clone(), None);
                }
            }
        }

        let zero = BigDecimal::from(0);
        if net_debit > zero {
            builder = builder.credit(equity_account_id, net_debit, None);
        } else if net_debit < zero {
            builder = builder.debit(equity_account_id, -net_debit, None);
        }
        builder.build()
    }

    /// Debit cash, credit receivables
    pub fn payment_received(
        entry_number: String,
        date: NaiveDate,
        description: String,
        cash_account_id: AccountId,
        receivables_account_id: AccountId,
        amount: BigDecimal,
    ) -> LedgerResult<NewJournalEntry> {
        JournalBuilder::new(entry_number, date, description)
            .debit(cash_account_id, amount.clone(), None)
            .credit(receivables_account_id, amount, None)
            .build()
    }

    /// Debit cash, credit owner's capital
    pub fn owner_investment(
        entry_number: String,
        date: NaiveDate,
        description: String,
        cash_account_id: AccountId,
        equity_account_id: AccountId,
        amount: BigDecimal,
    ) -> LedgerResult<NewJournalEntry> {
        JournalBuilder::new(entry_number, date, description)
            .debit(
                cash_account_id,
                amount.clone(),
                Some("Cash invested by owner".to_string()),
            )
            .credit(
                equity_account_id,
                amount,
                Some("Owner's equity contribution".to_string()),
            )
            .build()
    }
}
