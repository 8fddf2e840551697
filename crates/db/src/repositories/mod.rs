use async_trait::async_trait;
use thiserror::Error;

use crewflow_core::domain::flow::{ApprovalFlow, FlowId};
use crewflow_core::domain::identity::{TenantId, UserId};
use crewflow_core::domain::user::UserAccount;

pub mod flow;
pub mod memory;
pub mod user;

pub use flow::SqlFlowRepository;
pub use memory::{InMemoryFlowRepository, InMemoryUserRepository};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence port for approval flows. Every operation is tenant-scoped; a
/// flow belonging to another tenant behaves as if it did not exist.
#[async_trait]
pub trait FlowRepository: Send + Sync {
    async fn create(&self, flow: &ApprovalFlow) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        company: &TenantId,
        id: &FlowId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError>;

    /// All flows of a tenant, newest-created first.
    async fn list_for_tenant(
        &self,
        company: &TenantId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError>;

    /// Flows with at least one step still pending for `approver`, newest
    /// first. Matches any pending step, whether or not its level is the
    /// flow's current level.
    async fn list_pending_for_approver(
        &self,
        company: &TenantId,
        approver: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError>;

    /// Conditionally persist a decided flow. Writes the flow header and the
    /// step at `step_index` only if the stored version still equals
    /// `expected_version`, bumping the version on success. Returns `false`
    /// when another writer got there first.
    async fn update_decided(
        &self,
        flow: &ApprovalFlow,
        step_index: usize,
        expected_version: i64,
    ) -> Result<bool, RepositoryError>;
}

/// Read-side port over the user directory.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError>;

    async fn find_by_id(
        &self,
        company: &TenantId,
        id: &UserId,
    ) -> Result<Option<UserAccount>, RepositoryError>;

    async fn list_by_ids(
        &self,
        company: &TenantId,
        ids: &[UserId],
    ) -> Result<Vec<UserAccount>, RepositoryError>;
}
