//! Error taxonomy for the approval core
//!
//! Every variant except `Storage` is a recoverable, caller-facing
//! error: the request was invalid under the current state, and no
//! partial mutation took place. `Storage` is the generic
//! infrastructure failure, kept distinct so callers can tell "your
//! request was invalid" from "the system is unavailable".

use crate::{ApproverId, InstanceId};

/// Errors that can occur in approval operations
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Approval instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("Not an approver for the current stage: {0}")]
    NotAnApprover(ApproverId),

    #[error("Approver {0} has already decided for this stage")]
    AlreadyDecided(ApproverId),

    #[error("Action not allowed on this stage: {0}")]
    ActionNotAllowed(String),

    #[error("Stale move: card is in column '{actual}', not '{expected}'")]
    StaleMove { expected: String, actual: String },

    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Instance is not active: {0}")]
    InstanceNotActive(InstanceId),

    #[error("Concurrent update conflict on instance {0}, retries exhausted")]
    ConcurrencyConflict(InstanceId),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl ApprovalError {
    /// Whether this error reflects an invalid request (vs infrastructure)
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

/// Result type alias for approval operations
pub type ApprovalResult<T> = Result<T, ApprovalError>;
