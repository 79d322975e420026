//! Vendor purchase orders, from draft through partial and full receipt
use super::ledger::{self, ReceiptProgress};
use super::types::{Amount, TimeStamp};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    Approved,
    #[n(3)]
    Ordered,
    #[n(4)]
    PartiallyReceived,
    #[n(5)]
    Received,
    #[n(6)]
    Closed,
    #[n(7)]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoAction {
    Submit,
    Approve,
    MarkOrdered,
    Receive,
    Close,
    Cancel,
}

impl PoStatus {
    /// Whether `action` is legal from this status. Receipt targets are derived from
    /// the lines, so this only answers "may we".
    pub fn allows(self, action: PoAction) -> bool {
        use PoAction as A;
        use PoStatus as S;
        matches!(
            (self, action),
            (S::Draft, A::Submit)
                | (S::Submitted, A::Approve)
                | (S::Approved, A::MarkOrdered)
                | (S::Approved | S::Ordered | S::PartiallyReceived, A::Receive)
                | (S::Received, A::Close)
                | (S::Draft | S::Submitted | S::Approved | S::Ordered, A::Cancel)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoStatus::Draft => "draft",
            PoStatus::Submitted => "submitted",
            PoStatus::Approved => "approved",
            PoStatus::Ordered => "ordered",
            PoStatus::PartiallyReceived => "partially_received",
            PoStatus::Received => "received",
            PoStatus::Closed => "closed",
            PoStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct PoItem {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub quantity_ordered: Amount,
    #[n(2)]
    pub quantity_received: Amount,
    #[n(3)]
    pub unit_price: Amount,
    #[n(4)]
    pub total_price: Amount,
}

impl PoItem {
    pub fn new(item_id: &str, quantity_ordered: Amount, unit_price: Amount) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity_ordered,
            quantity_received: Amount::ZERO,
            unit_price,
            total_price: ledger::line_total(unit_price, quantity_ordered),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct PurchaseOrder {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub po_number: String,
    #[n(2)]
    pub vendor_id: String,
    #[n(3)]
    pub status: PoStatus,
    #[n(4)]
    pub location: String, // destination store for receipts
    #[n(5)]
    pub order_date: Option<TimeStamp>,
    #[n(6)]
    pub expected_delivery: Option<TimeStamp>,
    #[n(7)]
    pub subtotal: Amount,
    #[n(8)]
    pub tax: Amount,
    #[n(9)]
    pub shipping: Amount,
    #[n(10)]
    pub total_amount: Amount,
    #[n(11)]
    pub created_by: String,
    #[n(12)]
    pub created_at: TimeStamp,
    #[n(13)]
    pub approved_by: Option<String>,
    #[n(14)]
    pub approved_at: Option<TimeStamp>,
    #[n(15)]
    pub received_by: Option<String>,
    #[n(16)]
    pub received_at: Option<TimeStamp>,
    #[n(17)]
    pub closed_at: Option<TimeStamp>,
    #[n(18)]
    pub cancel_reason: Option<String>,
    #[n(19)]
    pub items: Vec<PoItem>,
}

impl PurchaseOrder {
    pub fn recompute_totals(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.total_price).sum();
        self.total_amount = (self.subtotal + self.tax + self.shipping).round_money();
    }

    pub fn progress(&self) -> ReceiptProgress {
        ledger::receipt_progress(
            self.items
                .iter()
                .map(|i| (i.quantity_ordered, i.quantity_received)),
        )
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut PoItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PoAction as A;
    use PoStatus as S;

    #[test]
    fn receiving_requires_an_approved_order() {
        assert!(!S::Draft.allows(A::Receive));
        assert!(!S::Submitted.allows(A::Receive));
        assert!(S::Approved.allows(A::Receive));
        assert!(S::Ordered.allows(A::Receive));
        assert!(S::PartiallyReceived.allows(A::Receive));
        assert!(!S::Received.allows(A::Receive));
    }

    #[test]
    fn cancel_only_before_receiving_begins() {
        assert!(S::Submitted.allows(A::Cancel));
        assert!(S::Approved.allows(A::Cancel));
        assert!(!S::PartiallyReceived.allows(A::Cancel));
        assert!(!S::Received.allows(A::Cancel));
        assert!(!S::Cancelled.allows(A::Cancel));
    }

    #[test]
    fn item_total_is_price_times_quantity() {
        let item = PoItem::new("a4-paper", Amount::from_int(12), Amount::from_scaled(450, 2));
        assert_eq!(item.total_price, Amount::from_int(54));
    }
}
