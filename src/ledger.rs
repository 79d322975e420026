//! Quantity ledger: conservation rules shared by requisitions, purchase orders and stock.
//!
//! Every function here is pure. Callers apply the returned quantity inside their own
//! transaction so the check and the write land together.
use super::error::{WorkflowError, WorkflowResult};
use super::types::{Amount, TimeStamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per item, per location stock row. The unit of locking for issue and receipt.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct StockLevel {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub location: String,
    #[n(2)]
    pub on_hand: Amount,
    #[n(3)]
    pub updated_at: TimeStamp,
}

impl StockLevel {
    pub fn empty(item_id: &str, location: &str, now: TimeStamp) -> Self {
        Self {
            item_id: item_id.to_string(),
            location: location.to_string(),
            on_hand: Amount::ZERO,
            updated_at: now,
        }
    }

    /// Apply a signed movement. Stock may never go below zero.
    pub fn apply(&mut self, delta: Amount, now: TimeStamp) -> WorkflowResult<()> {
        let next = self.on_hand + delta;
        if next.is_negative() {
            return Err(WorkflowError::quantity(
                &self.item_id,
                format!(
                    "only {} on hand at {}, cannot take {}",
                    self.on_hand,
                    self.location,
                    Amount::ZERO - delta
                ),
            ));
        }
        self.on_hand = next;
        self.updated_at = now;
        Ok(())
    }
}

/// A quantity against one line of a document: an approval figure, an issue or a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub item_id: String,
    pub quantity: Amount,
}

impl LineQuantity {
    pub fn new(item_id: &str, quantity: Amount) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
        }
    }
}

/// Reject negative inputs up front; every ledger quantity is non-negative.
pub fn non_negative(item: &str, field: &str, qty: Amount) -> WorkflowResult<Amount> {
    if qty.is_negative() {
        return Err(WorkflowError::quantity(item, format!("{field} is negative ({qty})")));
    }
    Ok(qty)
}

/// Lines are addressed by item id, so an item may appear on one line only.
pub fn distinct_items<'a, I>(item_ids: I) -> WorkflowResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for item in item_ids {
        if !seen.insert(item) {
            return Err(WorkflowError::quantity(item, "item appears on more than one line"));
        }
    }
    Ok(())
}

/// `0 <= issued <= approved <= requested`, whenever the right hand side is set.
pub fn check_requisition_line(
    item: &str,
    requested: Amount,
    approved: Option<Amount>,
    issued: Amount,
) -> WorkflowResult<()> {
    non_negative(item, "issued", issued)?;
    match approved {
        Some(approved) => {
            non_negative(item, "approved", approved)?;
            if approved > requested {
                return Err(WorkflowError::quantity(
                    item,
                    format!("approved {approved} exceeds requested {requested}"),
                ));
            }
            if issued > approved {
                return Err(WorkflowError::quantity(
                    item,
                    format!("issued {issued} exceeds approved {approved}"),
                ));
            }
        }
        None if !issued.is_zero() => {
            return Err(WorkflowError::quantity(item, "issued before approval"));
        }
        None => {}
    }
    Ok(())
}

/// Quantity to record at an approval step. Approvals never lower an earlier figure.
pub fn approve_quantity(
    item: &str,
    requested: Amount,
    current: Option<Amount>,
    proposed: Option<Amount>,
) -> WorkflowResult<Amount> {
    let approved = match (proposed, current) {
        (Some(p), _) => non_negative(item, "approved", p)?,
        (None, Some(c)) => c,
        (None, None) => requested,
    };
    if approved > requested {
        return Err(WorkflowError::quantity(
            item,
            format!("approved {approved} exceeds requested {requested}"),
        ));
    }
    if let Some(current) = current {
        if approved < current {
            return Err(WorkflowError::quantity(
                item,
                format!("approved quantity cannot drop from {current} to {approved}"),
            ));
        }
    }
    Ok(approved)
}

/// New cumulative issued quantity after handing out `delta` more.
pub fn issue_quantity(
    item: &str,
    approved: Option<Amount>,
    issued: Amount,
    delta: Amount,
) -> WorkflowResult<Amount> {
    non_negative(item, "issue quantity", delta)?;
    let Some(approved) = approved else {
        return Err(WorkflowError::quantity(item, "no approved quantity"));
    };
    let next = issued + delta;
    if next > approved {
        return Err(WorkflowError::quantity(
            item,
            format!("issuing {delta} on top of {issued} exceeds approved {approved}"),
        ));
    }
    Ok(next)
}

/// New cumulative received quantity; receipts only ever accumulate.
pub fn receive_quantity(
    item: &str,
    ordered: Amount,
    received: Amount,
    delta: Amount,
) -> WorkflowResult<Amount> {
    non_negative(item, "receipt quantity", delta)?;
    let next = received + delta;
    if next > ordered {
        return Err(WorkflowError::OverReceipt {
            item: item.to_string(),
            ordered: ordered.to_string(),
            received: received.to_string(),
            delta: delta.to_string(),
        });
    }
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptProgress {
    Nothing,
    Partial,
    Complete,
}

/// Fold `(ordered, received)` lines into overall receipt progress.
pub fn receipt_progress<I>(lines: I) -> ReceiptProgress
where
    I: IntoIterator<Item = (Amount, Amount)>,
{
    let mut total_received = Amount::ZERO;
    let mut all_complete = true;
    for (ordered, received) in lines {
        total_received += received;
        if received < ordered {
            all_complete = false;
        }
    }
    match (all_complete, total_received.is_zero()) {
        (true, _) => ReceiptProgress::Complete,
        (false, true) => ReceiptProgress::Nothing,
        (false, false) => ReceiptProgress::Partial,
    }
}

/// Exact product; only document totals are rounded.
pub fn line_total(unit_price: Amount, quantity: Amount) -> Amount {
    unit_price * quantity
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(v: i64) -> Amount {
        Amount::from_int(v)
    }

    #[test]
    fn stock_cannot_go_negative() {
        let now = TimeStamp::new();
        let mut level = StockLevel::empty("pen", "main-store", now);
        level.apply(q(5), now).unwrap();

        let err = level.apply(q(-6), now).unwrap_err();
        assert!(err.to_string().contains("only 5 on hand"));
        assert_eq!(level.on_hand, q(5));

        level.apply(q(-5), now).unwrap();
        assert!(level.on_hand.is_zero());
    }

    #[test]
    fn approval_defaults_to_requested_and_never_drops() {
        assert_eq!(approve_quantity("pen", q(10), None, None).unwrap(), q(10));
        assert_eq!(approve_quantity("pen", q(10), None, Some(q(4))).unwrap(), q(4));
        assert_eq!(approve_quantity("pen", q(10), Some(q(4)), None).unwrap(), q(4));
        assert_eq!(approve_quantity("pen", q(10), Some(q(4)), Some(q(7))).unwrap(), q(7));
        assert!(approve_quantity("pen", q(10), Some(q(4)), Some(q(3))).is_err());
        assert!(approve_quantity("pen", q(10), None, Some(q(11))).is_err());
        assert!(approve_quantity("pen", q(10), None, Some(q(-1))).is_err());
    }

    #[test]
    fn issue_is_bounded_by_approval() {
        assert_eq!(issue_quantity("pen", Some(q(5)), q(2), q(3)).unwrap(), q(5));
        assert!(issue_quantity("pen", Some(q(5)), q(2), q(4)).is_err());
        assert!(issue_quantity("pen", None, q(0), q(1)).is_err());
    }

    #[test]
    fn over_receipt_is_rejected() {
        assert_eq!(receive_quantity("ink", q(10), q(6), q(4)).unwrap(), q(10));
        let err = receive_quantity("ink", q(10), q(6), q(5)).unwrap_err();
        assert!(matches!(err, WorkflowError::OverReceipt { .. }));
    }

    #[test]
    fn progress_reflects_lines() {
        assert_eq!(receipt_progress(vec![(q(5), q(0)), (q(2), q(0))]), ReceiptProgress::Nothing);
        assert_eq!(receipt_progress(vec![(q(5), q(5)), (q(2), q(0))]), ReceiptProgress::Partial);
        assert_eq!(receipt_progress(vec![(q(5), q(5)), (q(2), q(2))]), ReceiptProgress::Complete);
    }

    #[test]
    fn requisition_line_invariant() {
        assert!(check_requisition_line("pen", q(10), Some(q(8)), q(8)).is_ok());
        assert!(check_requisition_line("pen", q(10), None, q(0)).is_ok());
        assert!(check_requisition_line("pen", q(10), Some(q(8)), q(9)).is_err());
        assert!(check_requisition_line("pen", q(10), None, q(1)).is_err());
    }

    #[test]
    fn line_total_keeps_sub_cent_prices() {
        assert_eq!(
            line_total(Amount::from_scaled(3333, 3), q(3)),
            Amount::from_scaled(9999, 3)
        );
    }

    #[test]
    fn repeated_items_are_refused() {
        assert!(distinct_items(["pen", "ink"]).is_ok());
        let err = distinct_items(["pen", "ink", "pen"]).unwrap_err();
        assert!(err.to_string().contains("pen"));
    }
}
