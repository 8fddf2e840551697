use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row};

use crewflow_core::domain::flow::{
    ApprovalFlow, ApprovalStep, FlowId, FlowStatus, RequestType, StepStatus,
};
use crewflow_core::domain::identity::{TenantId, UserId};

use super::{FlowRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFlowRepository {
    pool: DbPool,
}

impl SqlFlowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_steps(
        &self,
        flow_ids: &[String],
    ) -> Result<HashMap<String, Vec<ApprovalStep>>, RepositoryError> {
        if flow_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query_builder = QueryBuilder::new(
            "SELECT flow_id, position, approver_id, level, status, comment, decided_at
             FROM approval_step WHERE flow_id IN (",
        );
        let mut separated = query_builder.separated(", ");
        for flow_id in flow_ids {
            separated.push_bind(flow_id);
        }
        query_builder.push(") ORDER BY flow_id, position");

        let rows = query_builder.build().fetch_all(&self.pool).await?;

        let mut steps: HashMap<String, Vec<ApprovalStep>> = HashMap::new();
        for row in rows {
            let flow_id: String =
                row.try_get("flow_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            steps.entry(flow_id).or_default().push(step_from_row(&row)?);
        }

        Ok(steps)
    }

    async fn attach_steps(
        &self,
        mut flows: Vec<ApprovalFlow>,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let flow_ids: Vec<String> = flows.iter().map(|flow| flow.id.0.clone()).collect();
        let mut steps = self.load_steps(&flow_ids).await?;

        for flow in &mut flows {
            flow.steps = steps.remove(&flow.id.0).unwrap_or_default();
        }

        Ok(flows)
    }
}

const FLOW_COLUMNS: &str = "id, company_id, request_type, request_id, requester_id,
        current_level, status, version, created_at, updated_at";

fn parse_flow_status(raw: &str) -> FlowStatus {
    match raw {
        "approved" => FlowStatus::Approved,
        "rejected" => FlowStatus::Rejected,
        _ => FlowStatus::Pending,
    }
}

fn parse_step_status(raw: &str) -> StepStatus {
    match raw {
        "approved" => StepStatus::Approved,
        "rejected" => StepStatus::Rejected,
        _ => StepStatus::Pending,
    }
}

fn parse_request_type(raw: &str) -> Result<RequestType, RepositoryError> {
    raw.parse::<RequestType>().map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn flow_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalFlow, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_type: String =
        row.try_get("request_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requester_id: String =
        row.try_get("requester_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_level: i64 =
        row.try_get("current_level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalFlow {
        id: FlowId(id),
        company: TenantId(company_id),
        request_type: parse_request_type(&request_type)?,
        request_id,
        requester: UserId(requester_id),
        steps: Vec::new(),
        current_level: current_level as u32,
        status: parse_flow_status(&status),
        version,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn step_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let approver_id: String =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level: i64 = row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at: Option<String> =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ApprovalStep {
        approver: UserId(approver_id),
        level: level as u32,
        status: parse_step_status(&status),
        comment,
        decided_at: decided_at.as_deref().map(parse_timestamp),
    })
}

#[async_trait::async_trait]
impl FlowRepository for SqlFlowRepository {
    async fn create(&self, flow: &ApprovalFlow) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_flow (id, company_id, request_type, request_id, requester_id,
                                        current_level, status, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&flow.id.0)
        .bind(&flow.company.0)
        .bind(flow.request_type.as_str())
        .bind(&flow.request_id)
        .bind(&flow.requester.0)
        .bind(i64::from(flow.current_level))
        .bind(flow.status.as_str())
        .bind(flow.version)
        .bind(flow.created_at.to_rfc3339())
        .bind(flow.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, step) in flow.steps.iter().enumerate() {
            sqlx::query(
                "INSERT INTO approval_step (flow_id, position, approver_id, level, status,
                                            comment, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&flow.id.0)
            .bind(position as i64)
            .bind(&step.approver.0)
            .bind(i64::from(step.level))
            .bind(step.status.as_str())
            .bind(step.comment.as_deref())
            .bind(step.decided_at.map(|value| value.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        company: &TenantId,
        id: &FlowId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flow WHERE id = ? AND company_id = ?"
        ))
        .bind(&id.0)
        .bind(&company.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let flows = self.attach_steps(vec![flow_from_row(&row)?]).await?;
        Ok(flows.into_iter().next())
    }

    async fn list_for_tenant(
        &self,
        company: &TenantId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flow
             WHERE company_id = ?
             ORDER BY created_at DESC"
        ))
        .bind(&company.0)
        .fetch_all(&self.pool)
        .await?;

        let flows = rows.iter().map(flow_from_row).collect::<Result<Vec<_>, _>>()?;
        self.attach_steps(flows).await
    }

    async fn list_pending_for_approver(
        &self,
        company: &TenantId,
        approver: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FLOW_COLUMNS} FROM approval_flow f
             WHERE f.company_id = ?
               AND EXISTS (
                   SELECT 1 FROM approval_step s
                   WHERE s.flow_id = f.id AND s.approver_id = ? AND s.status = 'pending'
               )
             ORDER BY f.created_at DESC"
        ))
        .bind(&company.0)
        .bind(&approver.0)
        .fetch_all(&self.pool)
        .await?;

        let flows = rows.iter().map(flow_from_row).collect::<Result<Vec<_>, _>>()?;
        self.attach_steps(flows).await
    }

    async fn update_decided(
        &self,
        flow: &ApprovalFlow,
        step_index: usize,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let step = flow.steps.get(step_index).ok_or_else(|| {
            RepositoryError::Decode(format!(
                "step index {step_index} out of bounds for flow `{}`",
                flow.id
            ))
        })?;

        let mut tx = self.pool.begin().await?;

        let header = sqlx::query(
            "UPDATE approval_flow
             SET current_level = ?, status = ?, version = ?, updated_at = ?
             WHERE id = ? AND company_id = ? AND version = ?",
        )
        .bind(i64::from(flow.current_level))
        .bind(flow.status.as_str())
        .bind(expected_version + 1)
        .bind(flow.updated_at.to_rfc3339())
        .bind(&flow.id.0)
        .bind(&flow.company.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if header.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE approval_step SET status = ?, comment = ?, decided_at = ?
             WHERE flow_id = ? AND position = ?",
        )
        .bind(step.status.as_str())
        .bind(step.comment.as_deref())
        .bind(step.decided_at.map(|value| value.to_rfc3339()))
        .bind(&flow.id.0)
        .bind(step_index as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
