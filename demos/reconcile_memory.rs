//! Reconcile and sync an in-memory ledger

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use ledger_reconciler::journal::patterns;
use ledger_reconciler::{
    Account, AccountFilter, AccountType, JournalFilter, Ledger, LedgerStorage, MemoryStorage,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Ledger Reconciler - In-memory Example\n");

    let mut storage = MemoryStorage::new();
    let mut ledger = Ledger::new(storage.clone());

    // 1. Chart of accounts
    println!("Setting up Chart of Accounts...");
    let accounts = [
        Account::new_header(1, "1000".into(), "Aset".into(), AccountType::Asset, None),
        Account::new(2, "1101".into(), "Kas".into(), AccountType::Asset, Some(1)),
        Account::new(3, "3101".into(), "Modal".into(), AccountType::Equity, None),
        Account::new(4, "5101".into(), "Beban Operasional".into(), AccountType::Expense, None),
    ];
    for account in accounts {
        let account = ledger.create_account(account).await?;
        println!("  created {} {} ({})", account.code, account.name, account.account_type);
    }
    println!();

    // 2. Opening balance, posted and synced through the ledger
    let date = |day| NaiveDate::from_ymd_opt(2024, 3, day).ok_or("invalid date");
    let opening = patterns::owner_investment(
        "JE-0001".into(),
        date(1)?,
        "Setoran modal".into(),
        2,
        3,
        BigDecimal::from(7_225_000),
    )?;
    let posted = ledger.record_journal(opening).await?;
    println!("Posted {} and synced {} accounts", posted.entry.entry_number, posted.synced.len());

    // 3. A payment written straight to the journal tables
    let payment = patterns::expense_payment(
        "JE-0002".into(),
        date(2)?,
        "Pembayaran vendor".into(),
        4,
        2,
        BigDecimal::from(1_387_500),
    )?;
    storage.insert_journal(&payment).await?;
    println!("Inserted {} without touching stored balances\n", payment.entry_number);

    // 4. Reconcile
    let report = ledger.engine().reconcile_all(&AccountFilter::default()).await?;
    println!("Reconciled {} accounts, {} matched", report.checked, report.matched);
    for finding in report.findings() {
        println!("  [{}] {}: {}", finding.severity, finding.subject, finding.description);
    }
    println!();

    // 5. Sync and check again
    let sync = ledger.engine_mut().sync_all(false).await?;
    for change in &sync.synced {
        println!("  {}: {} -> {}", change.code, change.previous, change.new);
    }

    let health = ledger.health_check(&JournalFilter::default()).await?;
    println!("\nLedger healthy: {}", health.is_healthy());

    Ok(())
}
