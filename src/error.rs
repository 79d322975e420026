//! Typed failures returned by every workflow engine

use std::fmt;

/// Coarse failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidStatus,
    PermissionDenied,
    NotOwner,
    NotAuthorizedApprover,
    QuantityViolation,
    AssetUnavailable,
    AlreadyReturned,
    AlreadySigned,
    NotBorrowed,
    ItemsStillOutstanding,
    InvalidOrExpiredToken,
    MissingRequiredField,
    NotFound,
    Storage,
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("cannot {action} {entity} {key}: status is {status}")]
    InvalidStatus {
        entity: &'static str,
        key: String,
        status: String,
        action: &'static str,
    },
    #[error("{actor} may not {action} in {module}")]
    PermissionDenied {
        actor: String,
        module: String,
        action: String,
    },
    #[error("{actor} does not own {entity} {key}")]
    NotOwner {
        actor: String,
        entity: &'static str,
        key: String,
    },
    #[error("{approver} cannot approve {key}: {reason}")]
    NotAuthorizedApprover {
        approver: String,
        key: String,
        reason: &'static str,
    },
    #[error("quantity violation on {item}: {detail}")]
    QuantityViolation { item: String, detail: String },
    #[error("over-receipt on {item}: {received} received + {delta} exceeds {ordered} ordered")]
    OverReceipt {
        item: String,
        ordered: String,
        received: String,
        delta: String,
    },
    #[error("asset {0} is not available")]
    AssetUnavailable(String),
    #[error("borrow item {0} has already been returned")]
    AlreadyReturned(String),
    #[error("borrow transaction {0} has already been signed")]
    AlreadySigned(String),
    #[error("borrow item {0} is not on this assignment")]
    NotBorrowed(String),
    #[error("cannot close assignment {assignment}: {outstanding} items still outstanding")]
    ItemsStillOutstanding {
        assignment: String,
        outstanding: usize,
    },
    #[error("cannot close assignment {0}: nothing was ever borrowed")]
    NothingBorrowed(String),
    #[error("signature token is invalid or expired")]
    InvalidOrExpiredToken,
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record encoding failure: {0}")]
    Encoding(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidStatus { .. } => ErrorKind::InvalidStatus,
            WorkflowError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            WorkflowError::NotOwner { .. } => ErrorKind::NotOwner,
            WorkflowError::NotAuthorizedApprover { .. } => ErrorKind::NotAuthorizedApprover,
            WorkflowError::QuantityViolation { .. } | WorkflowError::OverReceipt { .. } => {
                ErrorKind::QuantityViolation
            }
            WorkflowError::AssetUnavailable(_) => ErrorKind::AssetUnavailable,
            WorkflowError::AlreadyReturned(_) => ErrorKind::AlreadyReturned,
            WorkflowError::AlreadySigned(_) => ErrorKind::AlreadySigned,
            WorkflowError::NotBorrowed(_) => ErrorKind::NotBorrowed,
            // an assignment with no history is "not closable" the same way one with loans is
            WorkflowError::ItemsStillOutstanding { .. } | WorkflowError::NothingBorrowed(_) => {
                ErrorKind::ItemsStillOutstanding
            }
            WorkflowError::InvalidOrExpiredToken => ErrorKind::InvalidOrExpiredToken,
            WorkflowError::MissingRequiredField(_) => ErrorKind::MissingRequiredField,
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
            WorkflowError::Storage(_)
            | WorkflowError::Encoding(_)
            | WorkflowError::Config(_)
            | WorkflowError::Internal(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid_status(
        entity: &'static str,
        key: &str,
        status: impl fmt::Display,
        action: &'static str,
    ) -> Self {
        WorkflowError::InvalidStatus {
            entity,
            key: key.to_string(),
            status: status.to_string(),
            action,
        }
    }

    pub(crate) fn not_found(kind: &'static str, key: &str) -> Self {
        WorkflowError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn quantity(item: &str, detail: impl Into<String>) -> Self {
        WorkflowError::QuantityViolation {
            item: item.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outstanding_message_names_the_count() {
        let err = WorkflowError::ItemsStillOutstanding {
            assignment: "asg_1".into(),
            outstanding: 2,
        };
        assert_eq!(
            err.to_string(),
            "cannot close assignment asg_1: 2 items still outstanding"
        );
        assert_eq!(err.kind(), ErrorKind::ItemsStillOutstanding);
    }

    #[test]
    fn over_receipt_is_a_quantity_violation() {
        let err = WorkflowError::OverReceipt {
            item: "pens".into(),
            ordered: "10".into(),
            received: "8".into(),
            delta: "3".into(),
        };
        assert_eq!(err.kind(), ErrorKind::QuantityViolation);
    }
}
