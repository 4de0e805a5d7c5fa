//! Property-based tests for posting validation.

use chrono::NaiveDate;
use closure_shared::types::{ClosureRunId, CompanyId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::error::LedgerError;
use super::types::{JournalLine, JournalPosting};
use super::validation::validate_posting;
use crate::fiscal::PeriodKey;

/// Amounts from 0.01 to 1,000,000.00.
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn amounts(max: usize) -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(positive_amount(), 1..max)
}

fn posting(lines: Vec<JournalLine>) -> JournalPosting {
    let company_id = CompanyId::new();
    JournalPosting {
        company_id,
        period: PeriodKey::annual(company_id, 2025),
        entry_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        source: "closure:props".to_string(),
        description: "props".to_string(),
        closure_run_id: ClosureRunId::new(),
        lines,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Debits split across any number of lines balance one credit of their sum.
    #[test]
    fn prop_split_debits_balance(debits in amounts(8)) {
        let total: Decimal = debits.iter().copied().sum();
        let mut lines: Vec<JournalLine> =
            debits.into_iter().map(|amount| JournalLine::debit("6811", amount)).collect();
        lines.push(JournalLine::credit("2813", total));

        let totals = validate_posting(&posting(lines)).unwrap();
        prop_assert!(totals.is_balanced);
        prop_assert_eq!(totals.credit, total);
    }

    /// Any one-cent imbalance is rejected.
    #[test]
    fn prop_imbalance_rejected(debits in amounts(6)) {
        let total: Decimal = debits.iter().copied().sum();
        let mut lines: Vec<JournalLine> =
            debits.into_iter().map(|amount| JournalLine::debit("665", amount)).collect();
        lines.push(JournalLine::credit("765", total + Decimal::new(1, 2)));

        let is_unbalanced = matches!(
            validate_posting(&posting(lines)),
            Err(LedgerError::UnbalancedPosting { .. })
        );
        prop_assert!(is_unbalanced);
    }

    /// A negative amount is rejected wherever it appears.
    #[test]
    fn prop_negative_rejected(amount in positive_amount(), index in 0usize..3) {
        let mut lines = vec![
            JournalLine::debit("4427", amount),
            JournalLine::credit("4426", amount),
            JournalLine::credit("4423", amount),
        ];
        lines[index].debit = -amount;
        lines[index].credit = Decimal::ZERO;

        let is_negative = matches!(
            validate_posting(&posting(lines)),
            Err(LedgerError::NegativeAmount(_))
        );
        prop_assert!(is_negative);
    }
}
