use std::collections::HashMap;

use tokio::sync::RwLock;

use crewflow_core::domain::flow::{ApprovalFlow, FlowId, StepStatus};
use crewflow_core::domain::identity::{TenantId, UserId};
use crewflow_core::domain::user::UserAccount;

use super::{FlowRepository, RepositoryError, UserRepository};

/// In-memory stand-in for the SQL flow store, with the same tenant scoping
/// and version-check semantics. Exists so the approval service can be tested
/// without a database.
#[derive(Default)]
pub struct InMemoryFlowRepository {
    flows: RwLock<HashMap<String, ApprovalFlow>>,
}

#[async_trait::async_trait]
impl FlowRepository for InMemoryFlowRepository {
    async fn create(&self, flow: &ApprovalFlow) -> Result<(), RepositoryError> {
        let mut flows = self.flows.write().await;
        flows.insert(flow.id.0.clone(), flow.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        company: &TenantId,
        id: &FlowId,
    ) -> Result<Option<ApprovalFlow>, RepositoryError> {
        let flows = self.flows.read().await;
        Ok(flows.get(&id.0).filter(|flow| flow.company == *company).cloned())
    }

    async fn list_for_tenant(
        &self,
        company: &TenantId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let flows = self.flows.read().await;
        let mut matched: Vec<ApprovalFlow> =
            flows.values().filter(|flow| flow.company == *company).cloned().collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(matched)
    }

    async fn list_pending_for_approver(
        &self,
        company: &TenantId,
        approver: &UserId,
    ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
        let flows = self.flows.read().await;
        let mut matched: Vec<ApprovalFlow> = flows
            .values()
            .filter(|flow| flow.company == *company)
            .filter(|flow| {
                flow.steps
                    .iter()
                    .any(|step| step.approver == *approver && step.status == StepStatus::Pending)
            })
            .cloned()
            .collect();
        matched.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(matched)
    }

    async fn update_decided(
        &self,
        flow: &ApprovalFlow,
        _step_index: usize,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let mut flows = self.flows.write().await;
        let Some(stored) = flows.get_mut(&flow.id.0) else {
            return Ok(false);
        };
        if stored.company != flow.company || stored.version != expected_version {
            return Ok(false);
        }

        let mut updated = flow.clone();
        updated.version = expected_version + 1;
        *stored = updated;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, UserAccount>>,
}

impl InMemoryUserRepository {
    pub async fn insert(&self, account: UserAccount) {
        let mut users = self.users.write().await;
        users.insert(account.id.0.clone(), account);
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|account| account.email == email).cloned())
    }

    async fn find_by_id(
        &self,
        company: &TenantId,
        id: &UserId,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).filter(|account| account.company == *company).cloned())
    }

    async fn list_by_ids(
        &self,
        company: &TenantId,
        ids: &[UserId],
    ) -> Result<Vec<UserAccount>, RepositoryError> {
        let users = self.users.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| users.get(&id.0))
            .filter(|account| account.company == *company)
            .cloned()
            .collect())
    }
}
