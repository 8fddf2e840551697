use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::identity::{TenantId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl FlowId {
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("AF-{}", &suffix[..12]))
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of HR request a flow tracks. The flow never dereferences the
/// request itself; `request_id` stays an opaque pointer into whichever
/// system owns the underlying record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Expense,
    Equipment,
    Promotion,
    Transfer,
    Attendance,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Expense => "expense",
            Self::Equipment => "equipment",
            Self::Promotion => "promotion",
            Self::Transfer => "transfer",
            Self::Attendance => "attendance",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown request type `{0}` (expected leave|expense|equipment|promotion|transfer|attendance)")]
pub struct ParseRequestTypeError(pub String);

impl std::str::FromStr for RequestType {
    type Err = ParseRequestTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Ok(Self::Leave),
            "expense" => Ok(Self::Expense),
            "equipment" => Ok(Self::Equipment),
            "promotion" => Ok(Self::Promotion),
            "transfer" => Ok(Self::Transfer),
            "attendance" => Ok(Self::Attendance),
            other => Err(ParseRequestTypeError(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    Approved,
    Rejected,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approver's decision slot at a given level. `decided_at` is written
/// exactly once, at the moment the step leaves `Pending`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub approver: UserId,
    pub level: u32,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// One approval flow: the unit of tracking for a single business request,
/// moving through ranked levels of approvers. All steps sharing a level must
/// approve before the flow advances past it; a single rejection anywhere
/// closes the whole flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    pub id: FlowId,
    pub company: TenantId,
    pub request_type: RequestType,
    pub request_id: String,
    pub requester: UserId,
    pub steps: Vec<ApprovalStep>,
    pub current_level: u32,
    pub status: FlowStatus,
    /// Optimistic concurrency token; bumped by the store on every
    /// successful conditional update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalFlow {
    pub fn is_closed(&self) -> bool {
        self.status != FlowStatus::Pending
    }

    /// Index of the first step still pending for `user`, in submitted order.
    pub fn pending_step_for(&self, user: &UserId) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.status == StepStatus::Pending && step.approver == *user)
    }

    /// True when every step sharing `level` has approved.
    pub fn cohort_approved(&self, level: u32) -> bool {
        self.steps
            .iter()
            .filter(|step| step.level == level)
            .all(|step| step.status == StepStatus::Approved)
    }

    pub fn has_pending_at(&self, level: u32) -> bool {
        self.steps
            .iter()
            .any(|step| step.level == level && step.status == StepStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::{FlowId, ParseRequestTypeError, RequestType};

    #[test]
    fn request_type_parses_all_known_kinds() {
        for kind in [
            RequestType::Leave,
            RequestType::Expense,
            RequestType::Equipment,
            RequestType::Promotion,
            RequestType::Transfer,
            RequestType::Attendance,
        ] {
            assert_eq!(kind.as_str().parse::<RequestType>(), Ok(kind));
        }
    }

    #[test]
    fn request_type_rejects_unknown_kinds() {
        assert_eq!(
            "vacation".parse::<RequestType>(),
            Err(ParseRequestTypeError("vacation".to_string()))
        );
    }

    #[test]
    fn generated_flow_ids_are_prefixed_and_unique() {
        let first = FlowId::generate();
        let second = FlowId::generate();

        assert!(first.0.starts_with("AF-"));
        assert_eq!(first.0.len(), "AF-".len() + 12);
        assert_ne!(first, second);
    }
}
