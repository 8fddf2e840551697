//! JSON API for approval flows.
//!
//! Endpoints:
//! - `POST /api/approvals`             — open a flow (hr/admin only)
//! - `GET  /api/approvals`             — list the tenant's flows, newest first
//! - `GET  /api/approvals/pending/me`  — flows where the caller has a pending step
//! - `PUT  /api/approvals/{id}/approve` — record an approve/reject decision

use std::collections::{HashMap, HashSet};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crewflow_core::domain::flow::{ApprovalFlow, FlowId, FlowStatus, RequestType, StepStatus};
use crewflow_core::domain::identity::{TenantId, UserId};
use crewflow_core::domain::user::UserDisplay;
use crewflow_core::workflow::Decision;
use crewflow_db::UserRepository;

use crate::auth::AuthUser;
use crate::bootstrap::AppState;
use crate::error::ApiError;

use super::CreateFlow;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateFlowRequest {
    pub request_type: String,
    pub request_id: String,
    pub requester: String,
    pub approvers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub status: String,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub approver: UserDisplay,
    pub level: u32,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub decided_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlowResponse {
    pub id: String,
    pub request_type: RequestType,
    pub request_id: String,
    pub requester: UserDisplay,
    pub approvers: Vec<StepResponse>,
    pub current_level: u32,
    pub status: FlowStatus,
    pub created_at: String,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/approvals
pub async fn create_flow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(body): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<FlowResponse>), ApiError> {
    let request_type = body
        .request_type
        .parse::<RequestType>()
        .map_err(|error| ApiError::Validation(error.to_string()))?;

    let requester = body.requester.trim();
    if requester.is_empty() {
        return Err(ApiError::Validation("requester is required".to_string()));
    }
    let requester = UserId(requester.to_string());

    let approvers: Vec<UserId> = body
        .approvers
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(|raw| UserId(raw.to_string()))
        .collect();

    ensure_known_users(&state, &actor.company, &requester, &approvers).await?;

    let flow = state
        .approvals
        .create(
            &actor,
            CreateFlow {
                request_type,
                request_id: body.request_id,
                requester,
                approvers,
            },
        )
        .await?;

    let response = resolve_flow(&state, &actor.company, flow).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/approvals
pub async fn list_flows(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<FlowResponse>>, ApiError> {
    let flows = state.approvals.list_all(&actor).await?;
    let responses = resolve_flows(&state, &actor.company, flows).await?;
    Ok(Json(responses))
}

/// GET /api/approvals/pending/me
pub async fn list_pending(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<FlowResponse>>, ApiError> {
    let flows = state.approvals.list_pending_for(&actor).await?;
    let responses = resolve_flows(&state, &actor.company, flows).await?;
    Ok(Json(responses))
}

/// PUT /api/approvals/{id}/approve
pub async fn decide_flow(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<DecideRequest>,
) -> Result<Json<FlowResponse>, ApiError> {
    let decision = body
        .status
        .parse::<Decision>()
        .map_err(|error| ApiError::Validation(error.to_string()))?;
    let comment = body.comment.map(|value| value.trim().to_string()).filter(|v| !v.is_empty());

    let flow = state.approvals.decide(&actor, &FlowId(id), decision, comment).await?;
    let response = resolve_flow(&state, &actor.company, flow).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Identity resolution
// ---------------------------------------------------------------------------

/// Reject creation requests naming users outside the caller's tenant
/// directory. Keeps foreign-tenant ids indistinguishable from unknown ones.
async fn ensure_known_users(
    state: &AppState,
    company: &TenantId,
    requester: &UserId,
    approvers: &[UserId],
) -> Result<(), ApiError> {
    let mut ids: Vec<UserId> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for id in std::iter::once(requester).chain(approvers.iter()) {
        if seen.insert(id.0.as_str()) {
            ids.push(id.clone());
        }
    }

    let accounts = state.users.list_by_ids(company, &ids).await?;
    let known: HashSet<&str> = accounts.iter().map(|account| account.id.0.as_str()).collect();

    let missing: Vec<&str> =
        ids.iter().map(|id| id.0.as_str()).filter(|id| !known.contains(id)).collect();
    if !missing.is_empty() {
        return Err(ApiError::Validation(format!("unknown user ids: {}", missing.join(", "))));
    }

    Ok(())
}

async fn resolve_flow(
    state: &AppState,
    company: &TenantId,
    flow: ApprovalFlow,
) -> Result<FlowResponse, ApiError> {
    let mut responses = resolve_flows(state, company, vec![flow]).await?;
    responses
        .pop()
        .ok_or_else(|| ApiError::Internal("flow resolution produced no response".to_string()))
}

async fn resolve_flows(
    state: &AppState,
    company: &TenantId,
    flows: Vec<ApprovalFlow>,
) -> Result<Vec<FlowResponse>, ApiError> {
    let mut ids: Vec<UserId> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for flow in &flows {
        for id in std::iter::once(&flow.requester).chain(flow.steps.iter().map(|s| &s.approver)) {
            if seen.insert(id.0.clone()) {
                ids.push(id.clone());
            }
        }
    }

    let accounts = state.users.list_by_ids(company, &ids).await?;
    let display: HashMap<String, UserDisplay> = accounts
        .iter()
        .map(|account| (account.id.0.clone(), UserDisplay::from(account)))
        .collect();

    Ok(flows.into_iter().map(|flow| flow_response(flow, &display)).collect())
}

fn display_for(id: &UserId, display: &HashMap<String, UserDisplay>) -> UserDisplay {
    display.get(&id.0).cloned().unwrap_or_else(|| UserDisplay {
        id: id.clone(),
        name: id.0.clone(),
        email: String::new(),
    })
}

fn flow_response(flow: ApprovalFlow, display: &HashMap<String, UserDisplay>) -> FlowResponse {
    FlowResponse {
        id: flow.id.0.clone(),
        request_type: flow.request_type,
        request_id: flow.request_id.clone(),
        requester: display_for(&flow.requester, display),
        approvers: flow
            .steps
            .iter()
            .map(|step| StepResponse {
                approver: display_for(&step.approver, display),
                level: step.level,
                status: step.status,
                comment: step.comment.clone(),
                decided_at: step.decided_at.map(|value| value.to_rfc3339()),
            })
            .collect(),
        current_level: flow.current_level,
        status: flow.status,
        created_at: flow.created_at.to_rfc3339(),
        updated_at: flow.updated_at.to_rfc3339(),
    }
}
