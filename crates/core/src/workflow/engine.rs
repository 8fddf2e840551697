use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::flow::{
    ApprovalFlow, ApprovalStep, FlowId, FlowStatus, RequestType, StepStatus,
};
use crate::domain::identity::{TenantId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(WorkflowError::InvalidDecision(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("approver list must not be empty")]
    EmptyApproverList,
    #[error("request id must not be blank")]
    BlankRequestId,
    #[error("invalid decision `{0}` (expected approved|rejected)")]
    InvalidDecision(String),
    #[error("flow `{flow}` is already closed as `{status}`")]
    FlowAlreadyClosed { flow: FlowId, status: FlowStatus },
    #[error("user `{user}` has no pending approval step on flow `{flow}`")]
    NotAPendingApprover { flow: FlowId, user: UserId },
}

/// The step a decision landed on, reported back so the persistence layer can
/// write exactly the row that changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecidedStep {
    pub index: usize,
    pub level: u32,
    pub decision: Decision,
}

/// Build a fresh flow from a submitted approver list. Each approver gets one
/// step whose level is its 1-based position in the list, so as constructed
/// every level holds exactly one approver; the decision logic below still
/// aggregates per level and tolerates wider cohorts.
pub fn open_flow(
    company: TenantId,
    request_type: RequestType,
    request_id: impl Into<String>,
    requester: UserId,
    approvers: Vec<UserId>,
    now: DateTime<Utc>,
) -> Result<ApprovalFlow, WorkflowError> {
    let request_id = request_id.into();
    if request_id.trim().is_empty() {
        return Err(WorkflowError::BlankRequestId);
    }
    if approvers.is_empty() {
        return Err(WorkflowError::EmptyApproverList);
    }

    let steps = approvers
        .into_iter()
        .enumerate()
        .map(|(index, approver)| ApprovalStep {
            approver,
            level: index as u32 + 1,
            status: StepStatus::Pending,
            comment: None,
            decided_at: None,
        })
        .collect();

    Ok(ApprovalFlow {
        id: FlowId::generate(),
        company,
        request_type,
        request_id,
        requester,
        steps,
        current_level: 1,
        status: FlowStatus::Pending,
        version: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Apply one approver's decision to a flow in memory.
///
/// A closed flow rejects every further decision, even from approvers whose
/// own steps are still pending. The actor must hold a pending step; a step
/// already decided makes its owner ineligible, which covers both "wrong
/// person" and "already voted".
///
/// On rejection the whole flow closes immediately. On approval the flow
/// advances only once every step sharing the decided level has approved;
/// when the level after that holds no pending step the flow closes as
/// approved.
pub fn decide(
    flow: &mut ApprovalFlow,
    actor: &UserId,
    decision: Decision,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<DecidedStep, WorkflowError> {
    if flow.is_closed() {
        return Err(WorkflowError::FlowAlreadyClosed {
            flow: flow.id.clone(),
            status: flow.status,
        });
    }

    let index = flow.pending_step_for(actor).ok_or_else(|| WorkflowError::NotAPendingApprover {
        flow: flow.id.clone(),
        user: actor.clone(),
    })?;
    let level = flow.steps[index].level;

    let step = &mut flow.steps[index];
    step.status = match decision {
        Decision::Approved => StepStatus::Approved,
        Decision::Rejected => StepStatus::Rejected,
    };
    step.comment = comment;
    step.decided_at = Some(now);

    match decision {
        Decision::Rejected => {
            flow.status = FlowStatus::Rejected;
        }
        Decision::Approved => {
            if flow.cohort_approved(level) {
                flow.current_level += 1;
                if !flow.has_pending_at(flow.current_level) {
                    flow.status = FlowStatus::Approved;
                }
            }
        }
    }

    flow.updated_at = now;
    Ok(DecidedStep { index, level, decision })
}
