use thiserror::Error;

use crate::workflow::WorkflowError;

/// Operation-boundary error taxonomy. Every engine operation resolves to one
/// of these; the transport layer maps them onto status codes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("approval flow not found")]
    NotFound,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<WorkflowError> for ServiceError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::EmptyApproverList
            | WorkflowError::BlankRequestId
            | WorkflowError::InvalidDecision(_) => Self::Validation(error.to_string()),
            WorkflowError::FlowAlreadyClosed { .. } => Self::Conflict(error.to_string()),
            WorkflowError::NotAPendingApprover { .. } => Self::Forbidden(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::flow::{FlowId, FlowStatus};
    use crate::domain::identity::UserId;
    use crate::errors::ServiceError;
    use crate::workflow::WorkflowError;

    #[test]
    fn construction_failures_map_to_validation() {
        assert!(matches!(
            ServiceError::from(WorkflowError::EmptyApproverList),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            ServiceError::from(WorkflowError::InvalidDecision("maybe".to_string())),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn closed_flow_maps_to_conflict() {
        let error = ServiceError::from(WorkflowError::FlowAlreadyClosed {
            flow: FlowId("AF-1".to_string()),
            status: FlowStatus::Rejected,
        });

        assert!(matches!(error, ServiceError::Conflict(_)));
    }

    #[test]
    fn ineligible_approver_maps_to_forbidden() {
        let error = ServiceError::from(WorkflowError::NotAPendingApprover {
            flow: FlowId("AF-1".to_string()),
            user: UserId("u-1".to_string()),
        });

        assert!(matches!(error, ServiceError::Forbidden(_)));
    }
}
