//! Property-based tests for the quantity ledger
//!
//! Conservation rules must hold for every sequence of approvals, issues, receipts
//! and stock movements, not just the hand-picked cases in the unit tests.

use campus_inventory::ledger::{
    ReceiptProgress, StockLevel, approve_quantity, check_requisition_line, issue_quantity,
    receipt_progress, receive_quantity,
};
use campus_inventory::types::{Amount, TimeStamp};
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

/// Quantities with up to two decimal places, as stationery counts and meters of cable
fn quantity_strategy() -> impl Strategy<Value = Amount> {
    (0i64..=50_000).prop_map(|cents| Amount::from_scaled(cents, 2))
}

/// Signed stock movements
fn movement_strategy() -> impl Strategy<Value = Amount> {
    (-20_000i64..=20_000).prop_map(|cents| Amount::from_scaled(cents, 2))
}

/// An ordered quantity and a sequence of delivery deltas against it
fn deliveries_strategy() -> impl Strategy<Value = (Amount, Vec<Amount>)> {
    (1i64..=500).prop_flat_map(|ordered| {
        (
            Just(Amount::from_int(ordered)),
            prop::collection::vec((0i64..=200).prop_map(Amount::from_int), 0..12),
        )
    })
}

proptest! {
    /// Approved figures stay within requested and never fall below an earlier approval
    #[test]
    fn approval_is_bounded_and_monotonic(
        requested in quantity_strategy(),
        current in prop::option::of(quantity_strategy()),
        proposed in prop::option::of(quantity_strategy()),
    ) {
        match approve_quantity("item", requested, current, proposed) {
            Ok(approved) => {
                prop_assert!(approved <= requested);
                if let Some(current) = current {
                    prop_assert!(approved >= current);
                }
                if proposed.is_none() && current.is_none() {
                    prop_assert_eq!(approved, requested);
                }
            }
            Err(_) => {
                let too_high = proposed.is_some_and(|p| p > requested)
                    || (proposed.is_none() && current.is_some_and(|c| c > requested));
                let dropped = matches!((proposed, current), (Some(p), Some(c)) if p < c);
                prop_assert!(too_high || dropped);
            }
        }
    }

    /// Repeated issues accumulate and never pass the approved quantity
    #[test]
    fn issues_never_exceed_approval(
        requested in 1i64..=1_000,
        approved_share in 0u32..=100,
        deltas in prop::collection::vec(0i64..=300, 0..10),
    ) {
        let requested = Amount::from_int(requested);
        let approved = (requested * Amount::from_scaled(approved_share as i64, 2)).round_money();
        let mut issued = Amount::ZERO;

        for delta in deltas.into_iter().map(Amount::from_int) {
            match issue_quantity("item", Some(approved), issued, delta) {
                Ok(next) => {
                    prop_assert_eq!(next, issued + delta);
                    issued = next;
                }
                Err(_) => prop_assert!(issued + delta > approved),
            }
            prop_assert!(check_requisition_line("item", requested, Some(approved), issued).is_ok());
        }
    }

    /// Received quantities only grow, stay within the order, and drive the progress
    #[test]
    fn receipts_are_monotonic((ordered, deltas) in deliveries_strategy()) {
        let mut received = Amount::ZERO;

        for delta in deltas {
            let before = received;
            if let Ok(next) = receive_quantity("item", ordered, received, delta) {
                received = next;
            }
            prop_assert!(received >= before);
            prop_assert!(received <= ordered);
        }

        let progress = receipt_progress(vec![(ordered, received)]);
        prop_assert_eq!(progress == ReceiptProgress::Complete, received == ordered);
        prop_assert_eq!(progress == ReceiptProgress::Nothing, received.is_zero());
    }

    /// A zero delivery is always accepted and never changes the running total
    #[test]
    fn zero_receipt_is_identity((ordered, _) in deliveries_strategy(), already in 0i64..=500) {
        let received = Amount::from_int(already).min(ordered);
        prop_assert_eq!(receive_quantity("item", ordered, received, Amount::ZERO).unwrap(), received);
    }

    /// Stock never goes negative, and a refused movement leaves the row untouched
    #[test]
    fn stock_never_negative(
        opening in quantity_strategy(),
        movements in prop::collection::vec(movement_strategy(), 0..20),
    ) {
        let now = TimeStamp::new_with(2026, 9, 1, 8, 0, 0);
        let mut level = StockLevel::empty("item", "main-store", now);
        level.apply(opening, now).unwrap();

        for delta in movements {
            let before = level.on_hand;
            match level.apply(delta, now) {
                Ok(()) => prop_assert_eq!(level.on_hand, before + delta),
                Err(_) => {
                    prop_assert!((before + delta).is_negative());
                    prop_assert_eq!(level.on_hand, before);
                }
            }
            prop_assert!(!level.on_hand.is_negative());
        }
    }
}
