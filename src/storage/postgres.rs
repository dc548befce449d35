//! PostgreSQL storage over the unified journal tables

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use crate::reconciliation::balance::signed_balance;
use crate::traits::*;
use crate::types::*;

/// `source_type` is NOT NULL; entries without a business document use this
const MANUAL_SOURCE: &str = "MANUAL";

const ACCOUNT_COLUMNS: &str = r#"
    id::bigint AS id, code, name, type AS account_type, is_header, is_active,
    parent_id::bigint AS parent_id, COALESCE(balance, 0) AS balance
"#;

const JOURNAL_COLUMNS: &str = r#"
    id::bigint AS id, entry_number, entry_date::date AS entry_date, description,
    total_debit, total_credit, status, source_type, source_id::bigint AS source_id,
    is_balanced, reversed_from::bigint AS reversed_from, reversed_by::bigint AS reversed_by,
    reversal_reason
"#;

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => LedgerError::Connection(err.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => LedgerError::Conflict(err.to_string()),
                Some(code) if code.starts_with("08") => LedgerError::Connection(err.to_string()),
                _ => LedgerError::Storage(err.to_string()),
            },
            _ => LedgerError::Storage(err.to_string()),
        }
    }
}

/// Storage backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
    /// Written to `created_by` on new journal entries
    operator_id: i64,
}

impl PgStorage {
    pub fn new(pool: PgPool, operator_id: i64) -> Self {
        Self { pool, operator_id }
    }

    /// Open a connection pool
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        operator_id: i64,
    ) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        info!(max_connections, "database connection pool created");
        Ok(Self::new(pool, operator_id))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_lines(&self, journal_id: JournalId) -> LedgerResult<Vec<JournalLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id::bigint AS id, journal_id::bigint AS journal_id,
                   account_id::bigint AS account_id, line_number,
                   debit_amount, credit_amount, description
            FROM unified_journal_lines
            WHERE journal_id = $1
            ORDER BY line_number
            "#,
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(line_from_row).collect()
    }

    async fn with_lines(&self, row: Option<PgRow>) -> LedgerResult<Option<JournalEntry>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut entry = journal_from_row(&row)?;
        entry.lines = self.fetch_lines(entry.id).await?;
        Ok(Some(entry))
    }
}

fn account_from_row(row: &PgRow) -> LedgerResult<Account> {
    let account_type: String = row.try_get("account_type")?;
    Ok(Account {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        account_type: account_type.parse()?,
        is_header: row.try_get("is_header")?,
        is_active: row.try_get("is_active")?,
        parent_id: row.try_get("parent_id")?,
        balance: row.try_get("balance")?,
    })
}

fn journal_from_row(row: &PgRow) -> LedgerResult<JournalEntry> {
    let status: String = row.try_get("status")?;
    Ok(JournalEntry {
        id: row.try_get("id")?,
        entry_number: row.try_get("entry_number")?,
        entry_date: row.try_get("entry_date")?,
        description: row.try_get("description")?,
        total_debit: row.try_get("total_debit")?,
        total_credit: row.try_get("total_credit")?,
        status: status.parse()?,
        source: source_from_row(row)?,
        is_balanced: row.try_get("is_balanced")?,
        reversed_from: row.try_get("reversed_from")?,
        reversed_by: row.try_get("reversed_by")?,
        reversal_reason: row.try_get("reversal_reason")?,
        lines: Vec::new(),
    })
}

fn source_from_row(row: &PgRow) -> LedgerResult<Option<SourceRef>> {
    let source_type: String = row.try_get("source_type")?;
    let source_id: Option<i64> = row.try_get("source_id")?;
    if source_type == MANUAL_SOURCE && source_id.is_none() {
        return Ok(None);
    }
    Ok(Some(SourceRef::new(source_type, source_id)))
}

fn line_from_row(row: &PgRow) -> LedgerResult<JournalLine> {
    Ok(JournalLine {
        id: row.try_get("id")?,
        journal_id: row.try_get("journal_id")?,
        account_id: row.try_get("account_id")?,
        line_number: row.try_get("line_number")?,
        debit_amount: row.try_get("debit_amount")?,
        credit_amount: row.try_get("credit_amount")?,
        description: row.try_get("description")?,
    })
}

fn totals_from_row(row: &PgRow) -> LedgerResult<LineTotals> {
    let line_count: i64 = row.try_get("line_count")?;
    Ok(LineTotals::new(
        row.try_get("debit")?,
        row.try_get("credit")?,
        line_count.max(0) as u64,
    ))
}

async fn line_totals_in(
    tx: &mut Transaction<'_, Postgres>,
    account_id: AccountId,
    posted_only: bool,
) -> LedgerResult<LineTotals> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(l.debit_amount), 0) AS debit,
               COALESCE(SUM(l.credit_amount), 0) AS credit,
               COUNT(l.id) AS line_count
        FROM unified_journal_lines l
        JOIN unified_journal_ledger j ON j.id = l.journal_id
        WHERE l.account_id = $1
          AND j.deleted_at IS NULL
          AND (NOT $2 OR j.status = 'POSTED')
        "#,
    )
    .bind(account_id)
    .bind(posted_only)
    .fetch_one(&mut **tx)
    .await?;

    totals_from_row(&row)
}

#[async_trait]
impl LedgerStorage for PgStorage {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, code, name, type, parent_id, is_header, is_active, balance)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                type = EXCLUDED.type,
                parent_id = EXCLUDED.parent_id,
                is_header = EXCLUDED.is_header,
                is_active = EXCLUDED.is_active,
                balance = EXCLUDED.balance,
                updated_at = NOW()
            "#,
        )
        .bind(account.id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.parent_id)
        .bind(account.is_header)
        .bind(account.is_active)
        .bind(&account.balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_account(&self, account_id: AccountId) -> LedgerResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 AND deleted_at IS NULL",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn get_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE code = $1 AND deleted_at IS NULL",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_accounts(&self, filter: &AccountFilter) -> LedgerResult<Vec<Account>> {
        let sql = format!(
            r#"
            SELECT {} FROM accounts
            WHERE deleted_at IS NULL
              AND ($1 OR is_active)
              AND ($2::text IS NULL OR UPPER(type) = $2)
            ORDER BY code
            "#,
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.include_inactive)
            .bind(filter.account_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn insert_journal(&mut self, entry: &NewJournalEntry) -> LedgerResult<JournalEntry> {
        let mut tx = self.pool.begin().await?;

        if let Some(original_id) = entry.reversed_from {
            let row = sqlx::query(
                r#"
                SELECT entry_number, status, reversed_by::bigint AS reversed_by
                FROM unified_journal_ledger
                WHERE id = $1 AND deleted_at IS NULL
                FOR UPDATE
                "#,
            )
            .bind(original_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LedgerError::JournalNotFound(original_id.to_string()))?;

            let number: String = row.try_get("entry_number")?;
            let status: String = row.try_get("status")?;
            let reversed_by: Option<i64> = row.try_get("reversed_by")?;
            if status.parse::<JournalStatus>()? != JournalStatus::Posted {
                return Err(LedgerError::Integrity(format!(
                    "Only POSTED entries can be reversed; {} is {}",
                    number, status
                )));
            }
            if reversed_by.is_some() {
                return Err(LedgerError::Integrity(format!(
                    "Journal entry {} is already reversed",
                    number
                )));
            }
        }

        let (source_type, source_id) = match &entry.source {
            Some(source) => (source.source_type.as_str(), source.source_id),
            None => (MANUAL_SOURCE, None),
        };
        let total_debit = entry.total_debits();
        let total_credit = entry.total_credits();
        let is_balanced = total_debit == total_credit;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO unified_journal_ledger
                (entry_number, source_type, source_id, entry_date, description,
                 total_debit, total_credit, status, is_balanced, reversed_from,
                 reversal_reason, created_by, posted_at)
            VALUES ($1, $2, $3, $4::timestamp, $5, $6, $7, $8, $9, $10, $11, $12,
                    CASE WHEN $8 = 'POSTED' THEN NOW() END)
            RETURNING id::bigint
            "#,
        )
        .bind(&entry.entry_number)
        .bind(source_type)
        .bind(source_id)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(&total_debit)
        .bind(&total_credit)
        .bind(entry.status.as_str())
        .bind(is_balanced)
        .bind(entry.reversed_from)
        .bind(&entry.reversal_reason)
        .bind(self.operator_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut lines = Vec::with_capacity(entry.lines.len());
        for (index, line) in entry.lines.iter().enumerate() {
            let line_number = index as i32 + 1;
            let line_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO unified_journal_lines
                    (journal_id, account_id, line_number, description, debit_amount, credit_amount)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id::bigint
                "#,
            )
            .bind(id)
            .bind(line.account_id)
            .bind(line_number)
            .bind(&line.description)
            .bind(&line.debit_amount)
            .bind(&line.credit_amount)
            .fetch_one(&mut *tx)
            .await?;

            lines.push(JournalLine {
                id: line_id,
                journal_id: id,
                account_id: line.account_id,
                line_number,
                debit_amount: line.debit_amount.clone(),
                credit_amount: line.credit_amount.clone(),
                description: line.description.clone(),
            });
        }

        if let Some(original_id) = entry.reversed_from {
            sqlx::query(
                "UPDATE unified_journal_ledger SET reversed_by = $1, updated_at = NOW() \
                 WHERE id = $2",
            )
            .bind(id)
            .bind(original_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(journal_id = id, entry_number = %entry.entry_number, "journal entry written");

        Ok(JournalEntry {
            id,
            entry_number: entry.entry_number.clone(),
            entry_date: entry.entry_date,
            description: entry.description.clone(),
            total_debit,
            total_credit,
            status: entry.status,
            source: entry.source.clone(),
            is_balanced,
            reversed_from: entry.reversed_from,
            reversed_by: None,
            reversal_reason: entry.reversal_reason.clone(),
            lines,
        })
    }

    async fn get_journal(&self, journal_id: JournalId) -> LedgerResult<Option<JournalEntry>> {
        let sql = format!(
            "SELECT {} FROM unified_journal_ledger WHERE id = $1 AND deleted_at IS NULL",
            JOURNAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(journal_id)
            .fetch_optional(&self.pool)
            .await?;
        self.with_lines(row).await
    }

    async fn get_journal_by_number(
        &self,
        entry_number: &str,
    ) -> LedgerResult<Option<JournalEntry>> {
        let sql = format!(
            "SELECT {} FROM unified_journal_ledger WHERE entry_number = $1 AND deleted_at IS NULL",
            JOURNAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(entry_number)
            .fetch_optional(&self.pool)
            .await?;
        self.with_lines(row).await
    }

    async fn set_journal_status(
        &mut self,
        journal_id: JournalId,
        status: JournalStatus,
    ) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE unified_journal_ledger
            SET status = $1,
                posted_at = CASE WHEN $1 = 'POSTED' THEN NOW() ELSE posted_at END,
                updated_at = NOW()
            WHERE id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(status.as_str())
        .bind(journal_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::JournalNotFound(journal_id.to_string()));
        }
        Ok(())
    }

    async fn journal_summaries(&self, filter: &JournalFilter) -> LedgerResult<Vec<JournalSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT j.id::bigint AS id, j.entry_number, j.entry_date::date AS entry_date, j.status,
                   j.source_type, j.source_id::bigint AS source_id,
                   j.total_debit, j.total_credit, j.is_balanced,
                   j.reversed_from::bigint AS reversed_from, j.reversed_by::bigint AS reversed_by,
                   COALESCE(l.debit, 0) AS debit,
                   COALESCE(l.credit, 0) AS credit,
                   COALESCE(l.line_count, 0) AS line_count
            FROM unified_journal_ledger j
            LEFT JOIN (
                SELECT journal_id,
                       SUM(debit_amount) AS debit,
                       SUM(credit_amount) AS credit,
                       COUNT(*) AS line_count
                FROM unified_journal_lines
                GROUP BY journal_id
            ) l ON l.journal_id = j.id
            WHERE j.deleted_at IS NULL
              AND ($1::date IS NULL OR j.entry_date::date >= $1)
              AND ($2::date IS NULL OR j.entry_date::date <= $2)
              AND ($3::text IS NULL OR j.status = $3)
            ORDER BY j.entry_date, j.id
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> LedgerResult<JournalSummary> {
                let status: String = row.try_get("status")?;
                let entry_date: NaiveDate = row.try_get("entry_date")?;
                Ok(JournalSummary {
                    id: row.try_get("id")?,
                    entry_number: row.try_get("entry_number")?,
                    entry_date,
                    status: status.parse()?,
                    source: source_from_row(row)?,
                    header_debit: row.try_get("total_debit")?,
                    header_credit: row.try_get("total_credit")?,
                    is_balanced: row.try_get("is_balanced")?,
                    reversed_from: row.try_get("reversed_from")?,
                    reversed_by: row.try_get("reversed_by")?,
                    lines: totals_from_row(row)?,
                })
            })
            .collect()
    }

    async fn journal_accounts(&self, journal_id: JournalId) -> LedgerResult<Vec<AccountId>> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM unified_journal_ledger \
             WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(journal_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(LedgerError::JournalNotFound(journal_id.to_string()));
        }

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT account_id::bigint
            FROM unified_journal_lines
            WHERE journal_id = $1
            GROUP BY account_id
            ORDER BY MIN(line_number)
            "#,
        )
        .bind(journal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn account_line_totals(
        &self,
        account_id: AccountId,
        scope: PostingScope,
    ) -> LedgerResult<LineTotals> {
        let mut tx = self.pool.begin().await?;
        let totals = line_totals_in(&mut tx, account_id, scope == PostingScope::PostedOnly).await?;
        tx.commit().await?;
        Ok(totals)
    }

    async fn header_postings(&self) -> LedgerResult<Vec<(AccountId, LineTotals)>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id::bigint AS account_id,
                   SUM(l.debit_amount) AS debit,
                   SUM(l.credit_amount) AS credit,
                   COUNT(l.id) AS line_count
            FROM accounts a
            JOIN unified_journal_lines l ON l.account_id = a.id
            JOIN unified_journal_ledger j ON j.id = l.journal_id
            WHERE a.is_header
              AND a.deleted_at IS NULL
              AND j.deleted_at IS NULL
              AND j.status = 'POSTED'
            GROUP BY a.id
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> LedgerResult<(AccountId, LineTotals)> {
                Ok((row.try_get("account_id")?, totals_from_row(row)?))
            })
            .collect()
    }

    async fn sync_account_balance(&mut self, account_id: AccountId) -> LedgerResult<BalanceSync> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        let account = account_from_row(&row)?;

        if account.is_header {
            return Err(LedgerError::Integrity(format!(
                "Header account {} is an aggregate and cannot be synced",
                account.code
            )));
        }

        let totals = line_totals_in(&mut tx, account_id, true).await?;
        let new: BigDecimal = signed_balance(account.account_type, &totals);
        let changed = new != account.balance;

        if changed {
            sqlx::query("UPDATE accounts SET balance = $1, updated_at = NOW() WHERE id = $2")
                .bind(&new)
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(BalanceSync {
            account_id,
            code: account.code,
            previous: account.balance,
            new,
            changed,
        })
    }

    async fn cash_bank_balances(&self) -> LedgerResult<Vec<CashBankBalance>> {
        let rows = sqlx::query(
            r#"
            SELECT cb.id::bigint AS id, cb.code, cb.name,
                   COALESCE(cb.balance, 0) AS balance,
                   COALESCE(t.total, 0) AS transaction_total,
                   cb.account_id::bigint AS account_id,
                   a.code AS account_code,
                   a.balance AS account_balance
            FROM cash_banks cb
            LEFT JOIN accounts a ON a.id = cb.account_id AND a.deleted_at IS NULL
            LEFT JOIN (
                SELECT cash_bank_id, SUM(amount) AS total
                FROM cash_bank_transactions
                WHERE deleted_at IS NULL
                GROUP BY cash_bank_id
            ) t ON t.cash_bank_id = cb.id
            WHERE cb.deleted_at IS NULL
            ORDER BY cb.code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> LedgerResult<CashBankBalance> {
                Ok(CashBankBalance {
                    id: row.try_get("id")?,
                    code: row.try_get("code")?,
                    name: row.try_get("name")?,
                    balance: row.try_get("balance")?,
                    transaction_total: row.try_get("transaction_total")?,
                    account_id: row.try_get("account_id")?,
                    account_code: row.try_get("account_code")?,
                    account_balance: row.try_get("account_balance")?,
                })
            })
            .collect()
    }

    async fn balance_triggers(&self) -> LedgerResult<Vec<BalanceTrigger>> {
        let rows = sqlx::query(
            r#"
            SELECT t.tgname::text AS name, c.relname::text AS table_name,
                   p.proname::text AS function
            FROM pg_trigger t
            JOIN pg_class c ON c.oid = t.tgrelid
            JOIN pg_proc p ON p.oid = t.tgfoid
            WHERE NOT t.tgisinternal
              AND c.relname IN ('unified_journal_ledger', 'unified_journal_lines')
              AND (t.tgname ILIKE '%balance%' OR p.prosrc ILIKE '%UPDATE accounts%')
            ORDER BY c.relname, t.tgname
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> LedgerResult<BalanceTrigger> {
                Ok(BalanceTrigger {
                    name: row.try_get("name")?,
                    table: row.try_get("table_name")?,
                    function: row.try_get("function")?,
                })
            })
            .collect()
    }

    async fn drop_trigger(&mut self, trigger: &BalanceTrigger) -> LedgerResult<()> {
        let sql = format!(
            "DROP TRIGGER IF EXISTS {} ON {}",
            quote_ident(&trigger.name),
            quote_ident(&trigger.table)
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Quote an SQL identifier, doubling embedded quotes
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("trg_update_balance"), "\"trg_update_balance\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_pool_errors_are_transient() {
        let err: LedgerError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retryable());

        let err: LedgerError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.class(), ErrorClass::Fatal);
    }
}
