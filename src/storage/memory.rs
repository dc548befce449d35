//! In-memory storage implementation for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::reconciliation::balance::signed_balance;
use crate::traits::*;
use crate::types::*;

#[derive(Debug)]
struct CashBankRegister {
    code: String,
    name: String,
    account_id: Option<AccountId>,
    balance: BigDecimal,
    transactions: Vec<BigDecimal>,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    journals: BTreeMap<JournalId, JournalEntry>,
    cash_banks: BTreeMap<i64, CashBankRegister>,
    triggers: Vec<BalanceTrigger>,
    next_journal_id: JournalId,
    next_line_id: i64,
}

impl MemoryState {
    fn line_totals(&self, account_id: AccountId, scope: PostingScope) -> LineTotals {
        let mut totals = LineTotals::default();
        for entry in self.journals.values().filter(|e| scope.includes(e.status)) {
            for line in entry.lines.iter().filter(|l| l.account_id == account_id) {
                totals.add_line(&line.debit_amount, &line.credit_amount);
            }
        }
        totals
    }

    fn journal_mut(&mut self, journal_id: JournalId) -> LedgerResult<&mut JournalEntry> {
        self.journals
            .get_mut(&journal_id)
            .ok_or_else(|| LedgerError::JournalNotFound(journal_id.to_string()))
    }
}

/// In-memory storage implementation for testing and development.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::Storage("memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| LedgerError::Storage("memory storage lock poisoned".to_string()))
    }

    /// Register a trigger as if it had been created in the database
    pub fn install_trigger(&self, trigger: BalanceTrigger) -> LedgerResult<()> {
        self.write()?.triggers.push(trigger);
        Ok(())
    }

    /// Store an entry exactly as given, bypassing every check.
    ///
    /// Used to load rows written by other systems, including broken ones.
    pub fn import_journal(&self, mut entry: JournalEntry) -> LedgerResult<JournalId> {
        let mut state = self.write()?;
        if entry.id == 0 {
            state.next_journal_id += 1;
            entry.id = state.next_journal_id;
        } else {
            state.next_journal_id = state.next_journal_id.max(entry.id);
        }
        for line in &mut entry.lines {
            line.journal_id = entry.id;
        }
        let id = entry.id;
        state.journals.insert(id, entry);
        Ok(id)
    }

    /// Register a cash or bank register with its stored balance
    pub fn save_cash_bank(
        &self,
        id: i64,
        code: &str,
        name: &str,
        account_id: Option<AccountId>,
        balance: BigDecimal,
    ) -> LedgerResult<()> {
        self.write()?.cash_banks.insert(
            id,
            CashBankRegister {
                code: code.to_string(),
                name: name.to_string(),
                account_id,
                balance,
                transactions: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append a signed transaction to a register without touching its balance
    pub fn record_cash_bank_transaction(
        &self,
        cash_bank_id: i64,
        amount: BigDecimal,
    ) -> LedgerResult<()> {
        let mut state = self.write()?;
        let register = state.cash_banks.get_mut(&cash_bank_id).ok_or_else(|| {
            LedgerError::Storage(format!("cash bank {} does not exist", cash_bank_id))
        })?;
        register.transactions.push(amount);
        Ok(())
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        self.write()?.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&account_id).cloned())
    }

    async fn get_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|a| a.code == code)
            .cloned())
    }

    async fn list_accounts(&self, filter: &AccountFilter) -> LedgerResult<Vec<Account>> {
        let state = self.read()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|account| filter.matches(account))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn insert_journal(&mut self, entry: &NewJournalEntry) -> LedgerResult<JournalEntry> {
        let mut state = self.write()?;

        if state
            .journals
            .values()
            .any(|j| j.entry_number == entry.entry_number)
        {
            return Err(LedgerError::Validation(format!(
                "Journal entry number {} already exists",
                entry.entry_number
            )));
        }

        for line in &entry.lines {
            if !state.accounts.contains_key(&line.account_id) {
                return Err(LedgerError::AccountNotFound(line.account_id.to_string()));
            }
        }

        if let Some(original_id) = entry.reversed_from {
            let original = state.journal_mut(original_id)?;
            if original.status != JournalStatus::Posted {
                return Err(LedgerError::Integrity(format!(
                    "Only POSTED entries can be reversed; {} is {}",
                    original.entry_number, original.status
                )));
            }
            if original.reversed_by.is_some() {
                return Err(LedgerError::Integrity(format!(
                    "Journal entry {} is already reversed",
                    original.entry_number
                )));
            }
        }

        state.next_journal_id += 1;
        let id = state.next_journal_id;

        let mut lines = Vec::with_capacity(entry.lines.len());
        for (index, line) in entry.lines.iter().enumerate() {
            state.next_line_id += 1;
            lines.push(JournalLine {
                id: state.next_line_id,
                journal_id: id,
                account_id: line.account_id,
                line_number: index as i32 + 1,
                debit_amount: line.debit_amount.clone(),
                credit_amount: line.credit_amount.clone(),
                description: line.description.clone(),
            });
        }

        let stored = JournalEntry {
            id,
            entry_number: entry.entry_number.clone(),
            entry_date: entry.entry_date,
            description: entry.description.clone(),
            total_debit: entry.total_debits(),
            total_credit: entry.total_credits(),
            status: entry.status,
            source: entry.source.clone(),
            is_balanced: entry.is_balanced(),
            reversed_from: entry.reversed_from,
            reversed_by: None,
            reversal_reason: entry.reversal_reason.clone(),
            lines,
        };

        if let Some(original_id) = entry.reversed_from {
            state.journal_mut(original_id)?.reversed_by = Some(id);
        }
        state.journals.insert(id, stored.clone());

        Ok(stored)
    }

    async fn get_journal(&self, journal_id: JournalId) -> LedgerResult<Option<JournalEntry>> {
        Ok(self.read()?.journals.get(&journal_id).cloned())
    }

    async fn get_journal_by_number(
        &self,
        entry_number: &str,
    ) -> LedgerResult<Option<JournalEntry>> {
        Ok(self
            .read()?
            .journals
            .values()
            .find(|j| j.entry_number == entry_number)
            .cloned())
    }

    async fn set_journal_status(
        &mut self,
        journal_id: JournalId,
        status: JournalStatus,
    ) -> LedgerResult<()> {
        self.write()?.journal_mut(journal_id)?.status = status;
        Ok(())
    }

    async fn journal_summaries(&self, filter: &JournalFilter) -> LedgerResult<Vec<JournalSummary>> {
        let state = self.read()?;
        let mut summaries: Vec<JournalSummary> = state
            .journals
            .values()
            .filter(|j| filter.matches(j.entry_date, j.status))
            .map(JournalSummary::from_entry)
            .collect();
        summaries.sort_by(|a, b| (a.entry_date, a.id).cmp(&(b.entry_date, b.id)));
        Ok(summaries)
    }

    async fn journal_accounts(&self, journal_id: JournalId) -> LedgerResult<Vec<AccountId>> {
        let state = self.read()?;
        let entry = state
            .journals
            .get(&journal_id)
            .ok_or_else(|| LedgerError::JournalNotFound(journal_id.to_string()))?;

        let mut ids = Vec::new();
        for line in &entry.lines {
            if !ids.contains(&line.account_id) {
                ids.push(line.account_id);
            }
        }
        Ok(ids)
    }

    async fn account_line_totals(
        &self,
        account_id: AccountId,
        scope: PostingScope,
    ) -> LedgerResult<LineTotals> {
        Ok(self.read()?.line_totals(account_id, scope))
    }

    async fn header_postings(&self) -> LedgerResult<Vec<(AccountId, LineTotals)>> {
        let state = self.read()?;
        Ok(state
            .accounts
            .values()
            .filter(|a| a.is_header)
            .map(|a| (a.id, state.line_totals(a.id, PostingScope::PostedOnly)))
            .filter(|(_, totals)| totals.line_count > 0)
            .collect())
    }

    async fn sync_account_balance(&mut self, account_id: AccountId) -> LedgerResult<BalanceSync> {
        // The write guard is held across read, compute and store
        let mut state = self.write()?;
        let account = state
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        if account.is_header {
            return Err(LedgerError::Integrity(format!(
                "Header account {} is an aggregate and cannot be synced",
                account.code
            )));
        }

        let totals = state.line_totals(account_id, PostingScope::PostedOnly);
        let new: BigDecimal = signed_balance(account.account_type, &totals);
        let changed = new != account.balance;

        if let Some(stored) = state.accounts.get_mut(&account_id) {
            stored.balance = new.clone();
        }

        Ok(BalanceSync {
            account_id,
            code: account.code,
            previous: account.balance,
            new,
            changed,
        })
    }

    async fn cash_bank_balances(&self) -> LedgerResult<Vec<CashBankBalance>> {
        let state = self.read()?;
        let mut registers: Vec<CashBankBalance> = state
            .cash_banks
            .iter()
            .map(|(id, register)| {
                let account = register.account_id.and_then(|a| state.accounts.get(&a));
                CashBankBalance {
                    id: *id,
                    code: register.code.clone(),
                    name: register.name.clone(),
                    balance: register.balance.clone(),
                    transaction_total: register.transactions.iter().sum(),
                    account_id: register.account_id,
                    account_code: account.map(|a| a.code.clone()),
                    account_balance: account.map(|a| a.balance.clone()),
                }
            })
            .collect();
        registers.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(registers)
    }

    async fn balance_triggers(&self) -> LedgerResult<Vec<BalanceTrigger>> {
        Ok(self.read()?.triggers.clone())
    }

    async fn drop_trigger(&mut self, trigger: &BalanceTrigger) -> LedgerResult<()> {
        let mut state = self.write()?;
        let before = state.triggers.len();
        state.triggers.retain(|t| t.name != trigger.name);
        if state.triggers.len() == before {
            return Err(LedgerError::Storage(format!(
                "trigger {} does not exist",
                trigger.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    async fn storage_with_accounts() -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        storage
            .save_account(&Account::new(1, "1101".into(), "Kas".into(), AccountType::Asset, None))
            .await
            .unwrap();
        storage
            .save_account(&Account::new(
                2,
                "3101".into(),
                "Modal".into(),
                AccountType::Equity,
                None,
            ))
            .await
            .unwrap();
        storage
    }

    fn entry(number: &str, amount: i64) -> NewJournalEntry {
        let mut entry = NewJournalEntry::new(number.to_string(), date(), "Capital".to_string());
        entry.lines.push(NewJournalLine::debit(1, BigDecimal::from(amount), None));
        entry.lines.push(NewJournalLine::credit(2, BigDecimal::from(amount), None));
        entry
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_totals() {
        let mut storage = storage_with_accounts().await;
        let stored = storage.insert_journal(&entry("JE-1", 1_000)).await.unwrap();

        assert_eq!(stored.id, 1);
        assert_eq!(stored.lines.len(), 2);
        assert_eq!(stored.lines[1].line_number, 2);
        assert_eq!(stored.total_debit, BigDecimal::from(1_000));
        assert!(stored.is_balanced);

        let by_number = storage.get_journal_by_number("JE-1").await.unwrap();
        assert_eq!(by_number, Some(stored));
    }

    #[tokio::test]
    async fn test_duplicate_entry_number_rejected() {
        let mut storage = storage_with_accounts().await;
        storage.insert_journal(&entry("JE-1", 10)).await.unwrap();
        assert!(storage.insert_journal(&entry("JE-1", 20)).await.is_err());
    }

    #[tokio::test]
    async fn test_reversal_marks_original_once() {
        let mut storage = storage_with_accounts().await;
        let original = storage.insert_journal(&entry("JE-1", 10)).await.unwrap();

        let mut reversal = entry("JE-1-REV", 10);
        reversal.reversed_from = Some(original.id);
        let reversal = storage.insert_journal(&reversal).await.unwrap();

        let original = storage.get_journal(original.id).await.unwrap().unwrap();
        assert_eq!(original.reversed_by, Some(reversal.id));

        let mut again = entry("JE-1-REV2", 10);
        again.reversed_from = Some(original.id);
        let err = storage.insert_journal(&again).await.unwrap_err();
        assert!(matches!(err, LedgerError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_line_totals_respect_scope() {
        let mut storage = storage_with_accounts().await;
        storage.insert_journal(&entry("JE-1", 100)).await.unwrap();
        let mut draft = entry("JE-2", 40);
        draft.status = JournalStatus::Draft;
        storage.insert_journal(&draft).await.unwrap();

        let posted = storage
            .account_line_totals(1, PostingScope::PostedOnly)
            .await
            .unwrap();
        assert_eq!(posted.debit, BigDecimal::from(100));
        assert_eq!(posted.line_count, 1);

        let all = storage
            .account_line_totals(1, PostingScope::AllStatuses)
            .await
            .unwrap();
        assert_eq!(all.debit, BigDecimal::from(140));
    }

    #[tokio::test]
    async fn test_cash_bank_balances_join_account_and_transactions() {
        let mut storage = storage_with_accounts().await;
        let kas = Account::new(1, "1101".into(), "Kas".into(), AccountType::Asset, None)
            .with_balance(BigDecimal::from(750));
        storage.save_account(&kas).await.unwrap();
        storage
            .save_cash_bank(10, "CSH-001", "Kas Kecil", Some(1), BigDecimal::from(700))
            .unwrap();
        storage
            .save_cash_bank(11, "BNK-001", "Bank Tanpa Akun", None, BigDecimal::from(0))
            .unwrap();
        storage.record_cash_bank_transaction(10, BigDecimal::from(1_000)).unwrap();
        storage.record_cash_bank_transaction(10, BigDecimal::from(-300)).unwrap();
        assert!(storage.record_cash_bank_transaction(99, BigDecimal::from(1)).is_err());

        let registers = storage.cash_bank_balances().await.unwrap();
        assert_eq!(registers.len(), 2);
        assert_eq!(registers[0].code, "BNK-001");
        assert_eq!(registers[0].account_balance, None);

        let kas_kecil = &registers[1];
        assert_eq!(kas_kecil.transaction_total, BigDecimal::from(700));
        assert_eq!(kas_kecil.account_code.as_deref(), Some("1101"));
        assert_eq!(kas_kecil.account_balance, Some(BigDecimal::from(750)));
    }

    #[tokio::test]
    async fn test_drop_trigger() {
        let mut storage = MemoryStorage::new();
        let trigger = BalanceTrigger {
            name: "trg_update_balance".into(),
            table: "unified_journal_lines".into(),
            function: "update_account_balance".into(),
        };
        storage.install_trigger(trigger.clone()).unwrap();
        assert_eq!(storage.balance_triggers().await.unwrap().len(), 1);

        storage.drop_trigger(&trigger).await.unwrap();
        assert!(storage.balance_triggers().await.unwrap().is_empty());
        assert!(storage.drop_trigger(&trigger).await.is_err());
    }
}
