//! Chart-of-accounts hierarchy checks and header roll-up

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::balance::Tolerance;
use super::findings::{Finding, FindingKind, Severity};
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderBalanceIssue {
    pub account_id: AccountId,
    pub code: String,
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderPostingIssue {
    pub account_id: AccountId,
    pub code: String,
    pub totals: LineTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanAccount {
    pub account_id: AccountId,
    pub code: String,
    pub missing_parent_id: AccountId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyReport {
    pub accounts_checked: usize,
    /// Header accounts whose stored balance is not zero
    pub nonzero_headers: Vec<HeaderBalanceIssue>,
    /// Header accounts with POSTED lines booked directly against them
    pub header_postings: Vec<HeaderPostingIssue>,
    pub orphans: Vec<OrphanAccount>,
    /// Each cycle as the list of codes walked, first code repeated at the end
    pub cycles: Vec<Vec<String>>,
}

impl HierarchyReport {
    pub fn is_clean(&self) -> bool {
        self.nonzero_headers.is_empty()
            && self.header_postings.is_empty()
            && self.orphans.is_empty()
            && self.cycles.is_empty()
    }

    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        for issue in &self.nonzero_headers {
            findings.push(
                Finding::new(
                    FindingKind::HeaderBalance,
                    issue.code.clone(),
                    Severity::for_difference(&issue.balance),
                    "header account carries a stored balance".to_string(),
                )
                .with_amounts(BigDecimal::from(0), issue.balance.clone(), issue.balance.clone()),
            );
        }

        for issue in &self.header_postings {
            findings.push(Finding::new(
                FindingKind::HeaderPosting,
                issue.code.clone(),
                Severity::Medium,
                format!(
                    "{} posted lines booked directly to a header account (debit {}, credit {})",
                    issue.totals.line_count, issue.totals.debit, issue.totals.credit
                ),
            ));
        }

        for orphan in &self.orphans {
            findings.push(Finding::new(
                FindingKind::OrphanAccount,
                orphan.code.clone(),
                Severity::High,
                format!("parent account {} does not exist", orphan.missing_parent_id),
            ));
        }

        for cycle in &self.cycles {
            findings.push(Finding::new(
                FindingKind::CircularParent,
                cycle.first().cloned().unwrap_or_default(),
                Severity::Critical,
                format!("circular parent chain: {}", cycle.join(" -> ")),
            ));
        }

        findings
    }
}

/// Check header balances, header postings, orphans and parent cycles
pub fn check_hierarchy(
    accounts: &[Account],
    header_postings: &[(AccountId, LineTotals)],
    tolerance: &Tolerance,
) -> HierarchyReport {
    let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
    let mut report = HierarchyReport {
        accounts_checked: accounts.len(),
        ..HierarchyReport::default()
    };

    for account in accounts {
        if account.is_header && tolerance.exceeds(&account.balance) {
            report.nonzero_headers.push(HeaderBalanceIssue {
                account_id: account.id,
                code: account.code.clone(),
                balance: account.balance.clone(),
            });
        }

        if let Some(parent_id) = account.parent_id {
            if !by_id.contains_key(&parent_id) {
                report.orphans.push(OrphanAccount {
                    account_id: account.id,
                    code: account.code.clone(),
                    missing_parent_id: parent_id,
                });
            }
        }
    }

    for (account_id, totals) in header_postings {
        if totals.line_count == 0 {
            continue;
        }
        let code = by_id
            .get(account_id)
            .map(|a| a.code.clone())
            .unwrap_or_else(|| account_id.to_string());
        report.header_postings.push(HeaderPostingIssue {
            account_id: *account_id,
            code,
            totals: totals.clone(),
        });
    }

    report.cycles = find_cycles(accounts, &by_id);
    report
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn find_cycles(accounts: &[Account], by_id: &HashMap<AccountId, &Account>) -> Vec<Vec<String>> {
    let mut state: HashMap<AccountId, Visit> = HashMap::new();
    let mut cycles = Vec::new();

    let mut ids: Vec<AccountId> = accounts.iter().map(|a| a.id).collect();
    ids.sort_unstable();

    for start in ids {
        if state.contains_key(&start) {
            continue;
        }

        let mut path: Vec<AccountId> = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            match state.get(&id) {
                Some(Visit::Done) => break,
                Some(Visit::InProgress) => {
                    if let Some(pos) = path.iter().position(|p| *p == id) {
                        let mut codes: Vec<String> =
                            path[pos..].iter().map(|p| by_id[p].code.clone()).collect();
                        codes.push(by_id[&id].code.clone());
                        cycles.push(codes);
                    }
                    break;
                }
                None => {
                    state.insert(id, Visit::InProgress);
                    path.push(id);
                    current = by_id
                        .get(&id)
                        .and_then(|a| a.parent_id)
                        .filter(|parent| by_id.contains_key(parent));
                }
            }
        }

        for id in path {
            state.insert(id, Visit::Done);
        }
    }

    cycles
}

/// An account's stored balance next to the balance of its whole subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolledUpBalance {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub is_header: bool,
    /// Distance from the root of the tree
    pub depth: usize,
    pub stored_balance: BigDecimal,
    /// Leaf: own balance. Header: sum of children's aggregated balances.
    pub aggregated_balance: BigDecimal,
}

/// Aggregate balances up the chart of accounts.
///
/// Results come back in tree order (roots sorted by code, then depth-first).
/// Nothing is written back; header stored balances stay at zero.
pub fn rollup(accounts: &[Account]) -> LedgerResult<Vec<RolledUpBalance>> {
    let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();

    let cycles = find_cycles(accounts, &by_id);
    if let Some(cycle) = cycles.first() {
        return Err(LedgerError::Integrity(format!(
            "cannot roll up balances through a circular parent chain: {}",
            cycle.join(" -> ")
        )));
    }

    // Children keyed by parent, ordered by code
    let mut children: HashMap<AccountId, BTreeMap<String, AccountId>> = HashMap::new();
    let mut roots: BTreeMap<String, AccountId> = BTreeMap::new();
    for account in accounts {
        match account.parent_id.filter(|p| by_id.contains_key(p)) {
            Some(parent) => {
                children
                    .entry(parent)
                    .or_default()
                    .insert(account.code.clone(), account.id);
            }
            None => {
                roots.insert(account.code.clone(), account.id);
            }
        }
    }

    let mut memo: HashMap<AccountId, BigDecimal> = HashMap::new();
    let mut out = Vec::with_capacity(accounts.len());
    for root in roots.values() {
        walk(*root, 0, &by_id, &children, &mut memo, &mut out);
    }
    Ok(out)
}

fn aggregate(
    id: AccountId,
    by_id: &HashMap<AccountId, &Account>,
    children: &HashMap<AccountId, BTreeMap<String, AccountId>>,
    memo: &mut HashMap<AccountId, BigDecimal>,
) -> BigDecimal {
    if let Some(value) = memo.get(&id) {
        return value.clone();
    }

    let account = by_id[&id];
    let own = if account.is_header {
        BigDecimal::from(0)
    } else {
        account.balance.clone()
    };

    let mut total = own;
    if let Some(kids) = children.get(&id) {
        for child in kids.values() {
            total += aggregate(*child, by_id, children, memo);
        }
    }

    memo.insert(id, total.clone());
    total
}

fn walk(
    id: AccountId,
    depth: usize,
    by_id: &HashMap<AccountId, &Account>,
    children: &HashMap<AccountId, BTreeMap<String, AccountId>>,
    memo: &mut HashMap<AccountId, BigDecimal>,
    out: &mut Vec<RolledUpBalance>,
) {
    let account = by_id[&id];
    let aggregated_balance = aggregate(id, by_id, children, memo);
    out.push(RolledUpBalance {
        account_id: id,
        code: account.code.clone(),
        name: account.name.clone(),
        is_header: account.is_header,
        depth,
        stored_balance: account.balance.clone(),
        aggregated_balance,
    });

    if let Some(kids) = children.get(&id) {
        for child in kids.values() {
            walk(*child, depth + 1, by_id, children, memo, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> Vec<Account> {
        vec![
            Account::new_header(1, "1000".into(), "Aset".into(), AccountType::Asset, None),
            Account::new_header(
                2,
                "1100".into(),
                "Aset Lancar".into(),
                AccountType::Asset,
                Some(1),
            ),
            Account::new(3, "1101".into(), "Kas".into(), AccountType::Asset, Some(2))
                .with_balance(BigDecimal::from(5_837_500)),
            Account::new(4, "1102".into(), "Bank".into(), AccountType::Asset, Some(2))
                .with_balance(BigDecimal::from(2_000_000)),
            Account::new(5, "1500".into(), "Peralatan".into(), AccountType::Asset, Some(1))
                .with_balance(BigDecimal::from(1_000)),
        ]
    }

    #[test]
    fn test_rollup_sums_children_without_touching_headers() {
        let rolled = rollup(&chart()).unwrap();

        let codes: Vec<&str> = rolled.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["1000", "1100", "1101", "1102", "1500"]);

        assert_eq!(rolled[0].aggregated_balance, BigDecimal::from(7_838_500));
        assert_eq!(rolled[0].stored_balance, BigDecimal::from(0));
        assert_eq!(rolled[1].aggregated_balance, BigDecimal::from(7_837_500));
        assert_eq!(rolled[1].depth, 1);
        assert_eq!(rolled[2].aggregated_balance, BigDecimal::from(5_837_500));
        assert_eq!(rolled[2].depth, 2);
    }

    #[test]
    fn test_clean_chart_has_no_findings() {
        let report = check_hierarchy(&chart(), &[], &Tolerance::default());
        assert!(report.is_clean());
        assert_eq!(report.accounts_checked, 5);
    }

    #[test]
    fn test_header_with_balance_and_postings() {
        let mut accounts = chart();
        accounts[1].balance = BigDecimal::from(250);
        let postings = vec![(2, LineTotals::new(BigDecimal::from(250), BigDecimal::from(0), 1))];

        let report = check_hierarchy(&accounts, &postings, &Tolerance::default());
        assert_eq!(report.nonzero_headers.len(), 1);
        assert_eq!(report.nonzero_headers[0].code, "1100");
        assert_eq!(report.header_postings.len(), 1);

        let kinds: Vec<FindingKind> = report.findings().iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&FindingKind::HeaderBalance));
        assert!(kinds.contains(&FindingKind::HeaderPosting));
    }

    #[test]
    fn test_orphan_detected() {
        let mut accounts = chart();
        accounts.push(Account::new(
            9,
            "2101".into(),
            "Hutang".into(),
            AccountType::Liability,
            Some(42),
        ));

        let report = check_hierarchy(&accounts, &[], &Tolerance::default());
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].missing_parent_id, 42);

        // Orphans still roll up as roots
        let rolled = rollup(&accounts).unwrap();
        assert!(rolled.iter().any(|r| r.code == "2101" && r.depth == 0));
    }

    #[test]
    fn test_cycle_detected_and_blocks_rollup() {
        let accounts = vec![
            Account::new_header(1, "3000".into(), "Ekuitas".into(), AccountType::Equity, Some(2)),
            Account::new_header(2, "3100".into(), "Modal".into(), AccountType::Equity, Some(1)),
            Account::new(3, "3101".into(), "Modal Pemilik".into(), AccountType::Equity, Some(2)),
        ];

        let report = check_hierarchy(&accounts, &[], &Tolerance::default());
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0], vec!["3000", "3100", "3000"]);

        let err = rollup(&accounts).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Integrity);
    }
}
