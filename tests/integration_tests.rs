//! Integration tests for ledger-reconciler

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use ledger_reconciler::{
    journal::patterns,
    reconciliation::{rollup, FindingKind, ReconcileOutcome, Severity},
    utils::EnhancedJournalValidator,
    Account, AccountFilter, AccountType, BalanceTrigger, ErrorClass, JournalBuilder, JournalEntry,
    JournalFilter, JournalLine, JournalStatus, Ledger, LedgerStorage, MemoryStorage,
    ReconciliationEngine, SourceRef, Tolerance,
};

const ASET: i64 = 1;
const KAS: i64 = 2;
const BANK: i64 = 3;
const HUTANG: i64 = 4;
const MODAL: i64 = 5;
const PENDAPATAN: i64 = 6;
const BEBAN: i64 = 7;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn amount(value: i64) -> BigDecimal {
    BigDecimal::from(value)
}

/// Chart of accounts with one header over the cash accounts
async fn chart() -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    let accounts = [
        Account::new_header(ASET, "1000".into(), "Aset".into(), AccountType::Asset, None),
        Account::new(KAS, "1101".into(), "Kas".into(), AccountType::Asset, Some(ASET)),
        Account::new(BANK, "1102".into(), "Bank".into(), AccountType::Asset, Some(ASET)),
        Account::new(HUTANG, "2101".into(), "Hutang Usaha".into(), AccountType::Liability, None),
        Account::new(MODAL, "3101".into(), "Modal".into(), AccountType::Equity, None),
        Account::new(PENDAPATAN, "4101".into(), "Pendapatan".into(), AccountType::Revenue, None),
        Account::new(BEBAN, "5101".into(), "Beban Operasional".into(), AccountType::Expense, None),
    ];
    for account in &accounts {
        storage.save_account(account).await.unwrap();
    }
    storage
}

async fn stored_balance(storage: &MemoryStorage, id: i64) -> BigDecimal {
    storage.get_account(id).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn test_kas_payment_mismatch_until_sync() {
    let mut storage = chart().await;

    // Opening balance, already reflected in the stored Kas balance
    let opening = patterns::opening_balance(
        "JE-0001".into(),
        date(1),
        MODAL,
        &[(KAS, AccountType::Asset, amount(7_225_000))],
    )
    .unwrap();
    let mut ledger = Ledger::new(storage.clone());
    ledger.record_journal(opening).await.unwrap();
    assert_eq!(stored_balance(&storage, KAS).await, amount(7_225_000));

    // A payment written straight to the journal tables, bypassing the sync
    let payment = patterns::expense_payment(
        "JE-0002".into(),
        date(2),
        "Pembayaran vendor".into(),
        BEBAN,
        KAS,
        amount(1_387_500),
    )
    .unwrap();
    storage.insert_journal(&payment).await.unwrap();

    let mut engine = ReconciliationEngine::new(storage.clone());
    assert_eq!(
        engine.compute_expected_balance(KAS, true).await.unwrap(),
        amount(5_837_500)
    );

    let before = engine.reconcile(KAS).await.unwrap();
    assert_eq!(
        before.outcome,
        ReconcileOutcome::Mismatch {
            expected: amount(5_837_500),
            actual: amount(7_225_000),
            difference: amount(1_387_500),
        }
    );
    let finding = before.finding().unwrap();
    assert_eq!(finding.severity, Severity::Critical);
    let json = serde_json::to_value(&finding).unwrap();
    assert_eq!(json["kind"], "balance_mismatch");
    assert_eq!(json["subject"], "1101");
    assert_eq!(json["severity"], "CRITICAL");

    let sync = engine.sync(KAS).await.unwrap();
    assert!(sync.changed);
    assert_eq!(sync.previous, amount(7_225_000));
    assert_eq!(sync.new, amount(5_837_500));

    assert!(engine.reconcile(KAS).await.unwrap().is_matched());
}

#[tokio::test]
async fn test_sign_convention_for_every_account_type() {
    let storage = chart().await;
    let mut ledger = Ledger::new(storage.clone());

    let entries = vec![
        patterns::owner_investment(
            "JE-1".into(),
            date(1),
            "Modal".into(),
            KAS,
            MODAL,
            amount(1_000),
        )
        .unwrap(),
        JournalBuilder::new("JE-2".into(), date(2), "Pinjaman".into())
            .debit(BANK, amount(400), None)
            .credit(HUTANG, amount(400), None)
            .build()
            .unwrap(),
        patterns::cash_sale(
            "JE-3".into(),
            date(3),
            "Penjualan".into(),
            KAS,
            PENDAPATAN,
            amount(250),
        )
        .unwrap(),
        patterns::expense_payment(
            "JE-4".into(),
            date(4),
            "Sewa".into(),
            BEBAN,
            KAS,
            amount(100),
        )
        .unwrap(),
    ];
    for entry in entries {
        ledger.record_journal(entry).await.unwrap();
    }

    // debit - credit
    assert_eq!(stored_balance(&storage, KAS).await, amount(1_150));
    assert_eq!(stored_balance(&storage, BANK).await, amount(400));
    assert_eq!(stored_balance(&storage, BEBAN).await, amount(100));
    // credit - debit
    assert_eq!(stored_balance(&storage, HUTANG).await, amount(400));
    assert_eq!(stored_balance(&storage, MODAL).await, amount(1_000));
    assert_eq!(stored_balance(&storage, PENDAPATAN).await, amount(250));

    let report = ledger
        .engine()
        .reconcile_all(&AccountFilter::default())
        .await
        .unwrap();
    assert_eq!(report.checked, 7);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_draft_entries_excluded_from_every_balance() {
    let storage = chart().await;
    let mut ledger = Ledger::new(storage.clone());

    let mut draft = patterns::cash_sale(
        "JE-1".into(),
        date(5),
        "Draft".into(),
        KAS,
        PENDAPATAN,
        amount(900),
    )
    .unwrap();
    draft.status = JournalStatus::Draft;
    ledger.record_journal(draft).await.unwrap();

    let engine = ReconciliationEngine::new(storage.clone());
    assert_eq!(engine.compute_expected_balance(KAS, true).await.unwrap(), amount(0));
    assert!(engine.reconcile(KAS).await.unwrap().is_matched());

    // Only the posted scan sees nothing; scanning drafts finds the entry
    let posted = engine.check_journals(&JournalFilter::default()).await.unwrap();
    assert_eq!(posted.entries_checked, 0);
    let drafts = engine
        .check_journals(&JournalFilter::default().with_status(Some(JournalStatus::Draft)))
        .await
        .unwrap();
    assert_eq!(drafts.entries_checked, 1);
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let mut storage = chart().await;
    let entry = patterns::cash_sale(
        "JE-1".into(),
        date(6),
        "Penjualan".into(),
        KAS,
        PENDAPATAN,
        amount(320),
    )
    .unwrap();
    storage.insert_journal(&entry).await.unwrap();

    let mut engine = ReconciliationEngine::new(storage);
    let first = engine.sync(KAS).await.unwrap();
    assert!(first.changed);

    let second = engine.sync(KAS).await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.previous, second.new);
    assert!(engine.reconcile(KAS).await.unwrap().is_matched());

    let report = engine.sync_all(false).await.unwrap();
    assert_eq!(report.succeeded(), 1);
    let report = engine.sync_all(false).await.unwrap();
    assert_eq!(report.succeeded(), 0);
    assert!(report.planned.is_empty());
}

#[tokio::test]
async fn test_balanced_pair_round_trip() {
    let mut storage = chart().await;
    let before_kas = stored_balance(&storage, KAS).await;
    let before_bank = stored_balance(&storage, BANK).await;

    let transfer = JournalBuilder::new("JE-1".into(), date(7), "Setor ke bank".into())
        .debit(BANK, amount(12_345), None)
        .credit(KAS, amount(12_345), None)
        .build()
        .unwrap();
    storage.insert_journal(&transfer).await.unwrap();

    let mut engine = ReconciliationEngine::new(storage.clone());
    engine.sync_all(false).await.unwrap();

    assert_eq!(stored_balance(&storage, BANK).await - before_bank, amount(12_345));
    assert_eq!(stored_balance(&storage, KAS).await - before_kas, amount(-12_345));
    assert!(engine
        .reconcile_all(&AccountFilter::default())
        .await
        .unwrap()
        .is_clean());
}

#[tokio::test]
async fn test_header_accounts_stay_zero_and_roll_up() {
    let storage = chart().await;
    let mut ledger = Ledger::new(storage.clone());
    ledger
        .record_journal(
            patterns::owner_investment(
                "JE-1".into(),
                date(1),
                "Modal".into(),
                KAS,
                MODAL,
                amount(500),
            )
            .unwrap(),
        )
        .await
        .unwrap();
    ledger
        .record_journal(
            patterns::owner_investment(
                "JE-2".into(),
                date(1),
                "Modal".into(),
                BANK,
                MODAL,
                amount(1_500),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(stored_balance(&storage, ASET).await, amount(0));

    let accounts = storage.list_accounts(&AccountFilter::all()).await.unwrap();
    let rolled = rollup(&accounts).unwrap();
    let aset = rolled.iter().find(|r| r.code == "1000").unwrap();
    assert_eq!(aset.stored_balance, amount(0));
    assert_eq!(aset.aggregated_balance, amount(2_000));

    // Sync never writes a header
    let err = ledger.engine_mut().sync(ASET).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Integrity);
}

#[tokio::test]
async fn test_journal_check_reports_corrupted_entries() {
    let storage = chart().await;
    let line = |id: i64, account_id: i64, debit: i64, credit: i64| JournalLine {
        id,
        journal_id: 0,
        account_id,
        line_number: id as i32,
        debit_amount: amount(debit),
        credit_amount: amount(credit),
        description: None,
    };

    // Imported from a legacy writer: posted but not balanced
    storage
        .import_journal(JournalEntry {
            id: 0,
            entry_number: "LEGACY-1".into(),
            entry_date: date(10),
            description: "Imported".into(),
            total_debit: amount(1_000),
            total_credit: amount(1_000),
            status: JournalStatus::Posted,
            source: Some(SourceRef::new("PURCHASE".into(), Some(8))),
            is_balanced: true,
            reversed_from: None,
            reversed_by: None,
            reversal_reason: None,
            lines: vec![line(1, BEBAN, 1_000, 0), line(2, KAS, 0, 900)],
        })
        .unwrap();

    let engine = ReconciliationEngine::new(storage);
    let report = engine.check_journals(&JournalFilter::default()).await.unwrap();

    assert_eq!(report.unbalanced.len(), 1);
    assert_eq!(report.unbalanced[0].entry_number, "LEGACY-1");
    assert_eq!(report.unbalanced[0].difference, amount(100));
    // Header says 1000/1000 but the lines say 1000/900
    assert_eq!(report.header_mismatches.len(), 1);

    let findings = report.findings();
    assert!(findings
        .iter()
        .any(|f| f.kind == FindingKind::UnbalancedJournal && f.severity == Severity::Critical));
}

#[tokio::test]
async fn test_reversal_nets_to_zero() {
    let storage = chart().await;
    let mut ledger = Ledger::with_validator(storage.clone(), Box::new(EnhancedJournalValidator));

    let posted = ledger
        .record_journal(
            patterns::cash_sale(
                "JE-1".into(),
                date(11),
                "Penjualan".into(),
                KAS,
                PENDAPATAN,
                amount(640),
            )
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stored_balance(&storage, PENDAPATAN).await, amount(640));

    let reversal = ledger
        .reverse_journal(posted.entry.id, "salah input", date(12))
        .await
        .unwrap();
    assert_eq!(reversal.entry.reversed_from, Some(posted.entry.id));
    let stored = storage.get_journal(reversal.entry.id).await.unwrap().unwrap();
    assert_eq!(stored.reversal_reason.as_deref(), Some("salah input"));
    assert_eq!(stored_balance(&storage, KAS).await, amount(0));
    assert_eq!(stored_balance(&storage, PENDAPATAN).await, amount(0));

    // The pair shares a source document without counting as a duplicate
    let report = ledger.health_check(&JournalFilter::default()).await.unwrap();
    assert!(report.journals.duplicate_sources.is_empty());
    assert!(report.is_healthy());

    let err = ledger
        .reverse_journal(posted.entry.id, "lagi", date(13))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Integrity);
}

#[tokio::test]
async fn test_health_check_collects_every_kind_of_problem() {
    let mut storage = chart().await;
    storage
        .install_trigger(BalanceTrigger {
            name: "trg_refresh_account_balances".into(),
            table: "unified_journal_lines".into(),
            function: "refresh_account_balances".into(),
        })
        .unwrap();
    // Header carrying a balance and a drifted leaf
    let aset = storage.get_account(ASET).await.unwrap().unwrap();
    storage.save_account(&aset.with_balance(amount(50))).await.unwrap();
    let kas = storage.get_account(KAS).await.unwrap().unwrap();
    storage.save_account(&kas.with_balance(amount(2_500))).await.unwrap();
    // Bank register holding money its GL account never saw
    storage
        .save_cash_bank(1, "BNK-001", "Bank BCA", Some(BANK), amount(300))
        .unwrap();
    storage.record_cash_bank_transaction(1, amount(300)).unwrap();

    let mut ledger = Ledger::new(storage.clone()).with_tolerance("1".parse::<Tolerance>().unwrap());
    let report = ledger.health_check(&JournalFilter::default()).await.unwrap();

    assert!(!report.is_healthy());
    let findings = report.findings();
    let kinds: Vec<FindingKind> = findings.iter().map(|f| f.kind).collect();
    assert!(kinds.contains(&FindingKind::HeaderBalance));
    assert!(kinds.contains(&FindingKind::BalanceMismatch));
    assert!(kinds.contains(&FindingKind::BalanceTrigger));
    assert!(kinds.contains(&FindingKind::CashBankMismatch));
    assert_eq!(report.cash_banks.mismatches.len(), 1);
    assert_eq!(report.cash_banks.mismatches[0].difference, amount(-300));
    assert_eq!(
        kinds.iter().filter(|k| **k == FindingKind::HeaderBalance).count(),
        1
    );
    // Sorted most severe first
    assert!(findings.windows(2).all(|w| w[0].severity >= w[1].severity));

    let removed = ledger.engine_mut().remove_balance_triggers().await.unwrap();
    assert_eq!(removed.len(), 1);
    assert!(storage.balance_triggers().await.unwrap().is_empty());
}
