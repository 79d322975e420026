//! Assignment aggregate: a user's loan basket with its borrow and return batches.
//!
//! The outstanding set is never stored. It is always `borrowed - returned`, recomputed
//! from the batches on every read.
use super::types::{Amount, TimeStamp, hex_bytes};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetCategory {
    #[n(0)]
    It,
    #[n(1)]
    Fm,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[n(0)]
    Available,
    #[n(1)]
    Borrowed,
    #[n(2)]
    Maintenance,
    #[n(3)]
    WrittenOff,
}

/// A durable, individually tagged item (laptop, projector, ladder).
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct Asset {
    #[n(0)]
    pub id: String, // asset tag
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub category: AssetCategory,
    #[n(3)]
    pub status: AssetStatus,
    #[n(4)]
    pub borrow_item_id: Option<String>, // set while borrowed
    #[n(5)]
    pub updated_at: TimeStamp,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Closed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCondition {
    #[n(0)]
    Good,
    #[n(1)]
    Fair,
    #[n(2)]
    Damaged,
    #[n(3)]
    Lost,
}

impl ReturnCondition {
    pub fn allows_charge(&self) -> bool {
        matches!(self, ReturnCondition::Damaged | ReturnCondition::Lost)
    }

    /// Where the physical asset goes once checked in
    pub fn disposition(&self) -> AssetStatus {
        match self {
            ReturnCondition::Good | ReturnCondition::Fair => AssetStatus::Available,
            ReturnCondition::Damaged => AssetStatus::Maintenance,
            ReturnCondition::Lost => AssetStatus::WrittenOff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct BorrowItem {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub asset_id: String,
    #[n(2)]
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct BorrowTransaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub assignment_id: String,
    #[n(2)]
    pub transaction_number: String,
    #[n(3)]
    pub borrow_date: TimeStamp,
    #[n(4)]
    pub created_by: String,
    #[n(5)]
    pub is_signed: bool,
    #[n(6)]
    #[serde(with = "hex_bytes")]
    pub signature: Option<Vec<u8>>,
    #[n(7)]
    pub signed_at: Option<TimeStamp>,
    #[n(8)]
    pub cancelled_at: Option<TimeStamp>, // voided batches stay as history only
    #[n(9)]
    pub cancelled_by: Option<String>,
    #[n(10)]
    pub items: Vec<BorrowItem>,
}

impl BorrowTransaction {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
    pub fn asset_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.asset_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct ReturnItem {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub borrow_item_id: String,
    #[n(2)]
    pub asset_id: String,
    #[n(3)]
    pub condition: ReturnCondition,
    #[n(4)]
    pub damage_charge: Amount,
    #[n(5)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct ReturnTransaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub assignment_id: String,
    #[n(2)]
    pub return_date: TimeStamp,
    #[n(3)]
    pub checked_by: String,
    #[n(4)]
    #[serde(with = "hex_bytes")]
    pub checker_signature: Option<Vec<u8>>,
    #[n(5)]
    pub items: Vec<ReturnItem>,
}

impl ReturnTransaction {
    pub fn damage_total(&self) -> Amount {
        self.items.iter().map(|i| i.damage_charge).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct Assignment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub status: AssignmentStatus,
    #[n(3)]
    pub academic_year: String,
    #[n(4)]
    pub term: String,
    #[n(5)]
    pub created_at: TimeStamp,
    #[n(6)]
    pub created_by: String,
    #[n(7)]
    pub closed_at: Option<TimeStamp>,
    #[n(8)]
    pub closed_by: Option<String>,
    #[n(9)]
    pub borrows: Vec<BorrowTransaction>,
    #[n(10)]
    pub returns: Vec<ReturnTransaction>,
}

/// Single-use signing credential; stored under the digest of the raw token.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct SignatureToken {
    #[n(0)]
    pub transaction_id: String,
    #[n(1)]
    pub assignment_id: String,
    #[n(2)]
    pub expires_at: TimeStamp,
    #[n(3)]
    pub issued_by: String,
}

impl Assignment {
    pub fn new(
        id: String,
        user_id: &str,
        academic_year: &str,
        term: &str,
        created_by: &str,
        now: TimeStamp,
    ) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            status: AssignmentStatus::Active,
            academic_year: academic_year.to_string(),
            term: term.to_string(),
            created_at: now,
            created_by: created_by.to_string(),
            closed_at: None,
            closed_by: None,
            borrows: vec![],
            returns: vec![],
        }
    }

    fn live_borrows(&self) -> impl Iterator<Item = &BorrowTransaction> {
        self.borrows.iter().filter(|t| !t.is_cancelled())
    }

    /// Every item handed out on a batch that was not voided
    pub fn all_borrowed(&self) -> Vec<&BorrowItem> {
        self.live_borrows().flat_map(|t| t.items.iter()).collect()
    }

    pub fn returned_ids(&self) -> HashSet<&str> {
        self.returns
            .iter()
            .flat_map(|r| r.items.iter())
            .map(|i| i.borrow_item_id.as_str())
            .collect()
    }

    /// Outstanding items: all borrowed minus those referenced by a return.
    pub fn active_items(&self) -> Vec<&BorrowItem> {
        let returned = self.returned_ids();
        self.all_borrowed()
            .into_iter()
            .filter(|item| !returned.contains(item.id.as_str()))
            .collect()
    }

    pub fn has_history(&self) -> bool {
        self.live_borrows().next().is_some()
    }

    pub fn find_borrow_item(&self, borrow_item_id: &str) -> Option<&BorrowItem> {
        self.all_borrowed()
            .into_iter()
            .find(|item| item.id == borrow_item_id)
    }

    pub fn transaction(&self, transaction_id: &str) -> Option<&BorrowTransaction> {
        self.borrows.iter().find(|t| t.id == transaction_id)
    }

    pub fn transaction_mut(&mut self, transaction_id: &str) -> Option<&mut BorrowTransaction> {
        self.borrows.iter_mut().find(|t| t.id == transaction_id)
    }

    /// Whether any item of the batch has been checked back in
    pub fn transaction_has_returns(&self, transaction_id: &str) -> bool {
        let returned = self.returned_ids();
        self.transaction(transaction_id)
            .map(|t| t.items.iter().any(|i| returned.contains(i.id.as_str())))
            .unwrap_or(false)
    }

    pub fn damage_total(&self) -> Amount {
        self.returns.iter().map(|r| r.damage_total()).sum()
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Closed => "closed",
        })
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetStatus::Available => "available",
            AssetStatus::Borrowed => "borrowed",
            AssetStatus::Maintenance => "maintenance",
            AssetStatus::WrittenOff => "written_off",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn borrow(id: &str, items: &[(&str, &str)]) -> BorrowTransaction {
        BorrowTransaction {
            id: id.into(),
            assignment_id: "asg".into(),
            transaction_number: format!("BRW-{id}"),
            borrow_date: TimeStamp::new(),
            created_by: "clerk".into(),
            is_signed: false,
            signature: None,
            signed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            items: items
                .iter()
                .map(|(bi, asset)| BorrowItem {
                    id: bi.to_string(),
                    asset_id: asset.to_string(),
                    transaction_id: id.into(),
                })
                .collect(),
        }
    }

    fn returned(borrow_item_id: &str, condition: ReturnCondition) -> ReturnTransaction {
        ReturnTransaction {
            id: format!("rtx-{borrow_item_id}"),
            assignment_id: "asg".into(),
            return_date: TimeStamp::new(),
            checked_by: "clerk".into(),
            checker_signature: None,
            items: vec![ReturnItem {
                id: format!("ri-{borrow_item_id}"),
                borrow_item_id: borrow_item_id.into(),
                asset_id: String::new(),
                condition,
                damage_charge: Amount::ZERO,
                notes: None,
            }],
        }
    }

    #[test]
    fn active_set_is_borrowed_minus_returned() {
        let mut asg = Assignment::new("asg".into(), "u1", "2026", "T1", "clerk", TimeStamp::new());
        asg.borrows.push(borrow("t1", &[("b1", "LAP-1"), ("b2", "LAP-2")]));
        asg.borrows.push(borrow("t2", &[("b3", "PRJ-1")]));
        asg.returns.push(returned("b2", ReturnCondition::Good));

        let active: Vec<&str> = asg.active_items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(active, vec!["b1", "b3"]);
        assert!(asg.transaction_has_returns("t1"));
        assert!(!asg.transaction_has_returns("t2"));
    }

    #[test]
    fn cancelled_batches_are_not_history() {
        let mut asg = Assignment::new("asg".into(), "u1", "2026", "T1", "clerk", TimeStamp::new());
        let mut voided = borrow("t1", &[("b1", "LAP-1")]);
        voided.cancelled_at = Some(TimeStamp::new());
        asg.borrows.push(voided);

        assert!(!asg.has_history());
        assert!(asg.active_items().is_empty());
        assert!(asg.find_borrow_item("b1").is_none());
    }

    #[test]
    fn assignment_cbor_roundtrip() {
        let mut asg = Assignment::new("asg".into(), "u1", "2026", "T1", "clerk", TimeStamp::new());
        asg.borrows.push(borrow("t1", &[("b1", "LAP-1")]));

        let encoded = minicbor::to_vec(&asg).unwrap();
        let decoded: Assignment = minicbor::decode(&encoded).unwrap();
        assert_eq!(asg, decoded);
    }

    #[test]
    fn only_damage_and_loss_carry_charges() {
        assert!(!ReturnCondition::Good.allows_charge());
        assert!(!ReturnCondition::Fair.allows_charge());
        assert!(ReturnCondition::Damaged.allows_charge());
        assert_eq!(ReturnCondition::Lost.disposition(), AssetStatus::WrittenOff);
    }
}
