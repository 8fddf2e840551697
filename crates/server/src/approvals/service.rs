use chrono::Utc;
use uuid::Uuid;

use crewflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crewflow_core::domain::flow::{ApprovalFlow, FlowId, RequestType};
use crewflow_core::domain::identity::{ActorContext, UserId};
use crewflow_core::workflow::{decide, open_flow, Decision};
use crewflow_core::ServiceError;
use crewflow_db::{FlowRepository, RepositoryError};

/// Bounded retries for the read-decide-write cycle when a concurrent
/// decision invalidates the loaded snapshot.
const MAX_DECIDE_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct CreateFlow {
    pub request_type: RequestType,
    pub request_id: String,
    pub requester: UserId,
    pub approvers: Vec<UserId>,
}

/// The approval engine composed with its persistence port. All operations
/// are scoped to the acting user's tenant; flows of other tenants behave as
/// nonexistent.
pub struct ApprovalService<R, S> {
    flows: R,
    sink: S,
}

impl<R, S> ApprovalService<R, S>
where
    R: FlowRepository,
    S: AuditSink,
{
    pub fn new(flows: R, sink: S) -> Self {
        Self { flows, sink }
    }

    pub async fn create(
        &self,
        actor: &ActorContext,
        request: CreateFlow,
    ) -> Result<ApprovalFlow, ServiceError> {
        if !actor.role.can_open_flows() {
            return Err(ServiceError::Forbidden(format!(
                "role `{}` may not open approval flows",
                actor.role
            )));
        }

        let flow = open_flow(
            actor.company.clone(),
            request.request_type,
            request.request_id,
            request.requester,
            request.approvers,
            Utc::now(),
        )?;
        self.flows.create(&flow).await.map_err(persistence)?;

        self.sink.emit(
            AuditEvent::new(
                Some(flow.id.clone()),
                correlation_id(),
                "flow.created",
                AuditCategory::Flow,
                actor.user.to_string(),
                AuditOutcome::Success,
            )
            .with_metadata("request_type", flow.request_type.as_str())
            .with_metadata("levels", flow.steps.len().to_string()),
        );

        Ok(flow)
    }

    pub async fn list_all(&self, actor: &ActorContext) -> Result<Vec<ApprovalFlow>, ServiceError> {
        self.flows.list_for_tenant(&actor.company).await.map_err(persistence)
    }

    pub async fn list_pending_for(
        &self,
        actor: &ActorContext,
    ) -> Result<Vec<ApprovalFlow>, ServiceError> {
        self.flows
            .list_pending_for_approver(&actor.company, &actor.user)
            .await
            .map_err(persistence)
    }

    pub async fn decide(
        &self,
        actor: &ActorContext,
        flow_id: &FlowId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<ApprovalFlow, ServiceError> {
        for _attempt in 0..MAX_DECIDE_ATTEMPTS {
            let Some(mut flow) =
                self.flows.find_by_id(&actor.company, flow_id).await.map_err(persistence)?
            else {
                return Err(ServiceError::NotFound);
            };

            let expected_version = flow.version;
            let decided = decide(&mut flow, &actor.user, decision, comment.clone(), Utc::now())?;

            if self
                .flows
                .update_decided(&flow, decided.index, expected_version)
                .await
                .map_err(persistence)?
            {
                flow.version = expected_version + 1;

                self.sink.emit(
                    AuditEvent::new(
                        Some(flow.id.clone()),
                        correlation_id(),
                        "flow.decision_applied",
                        AuditCategory::Flow,
                        actor.user.to_string(),
                        match decision {
                            Decision::Approved => AuditOutcome::Success,
                            Decision::Rejected => AuditOutcome::Rejected,
                        },
                    )
                    .with_metadata("decision", decision.as_str())
                    .with_metadata("level", decided.level.to_string())
                    .with_metadata("flow_status", flow.status.as_str()),
                );

                return Ok(flow);
            }
            // lost the write race; re-read and re-check eligibility against
            // the fresh snapshot
        }

        Err(ServiceError::Conflict(
            "concurrent decisions kept invalidating this update, try again".to_string(),
        ))
    }
}

fn persistence(error: RepositoryError) -> ServiceError {
    ServiceError::Persistence(error.to_string())
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crewflow_core::audit::InMemoryAuditSink;
    use crewflow_core::domain::flow::{ApprovalFlow, FlowId, FlowStatus, RequestType, StepStatus};
    use crewflow_core::domain::identity::{ActorContext, Role, TenantId, UserId};
    use crewflow_core::workflow::Decision;
    use crewflow_core::ServiceError;
    use crewflow_db::{FlowRepository, InMemoryFlowRepository, RepositoryError};

    use super::{ApprovalService, CreateFlow};

    fn actor(id: &str, role: Role) -> ActorContext {
        ActorContext {
            company: TenantId("acme".to_string()),
            user: UserId(id.to_string()),
            email: format!("{id}@acme.test"),
            role,
        }
    }

    fn foreign_actor(id: &str) -> ActorContext {
        ActorContext {
            company: TenantId("globex".to_string()),
            user: UserId(id.to_string()),
            email: format!("{id}@globex.test"),
            role: Role::Admin,
        }
    }

    fn service() -> ApprovalService<InMemoryFlowRepository, InMemoryAuditSink> {
        ApprovalService::new(InMemoryFlowRepository::default(), InMemoryAuditSink::default())
    }

    fn create_request() -> CreateFlow {
        CreateFlow {
            request_type: RequestType::Leave,
            request_id: "leave-2026-018".to_string(),
            requester: UserId("u-employee".to_string()),
            approvers: vec![UserId("u-manager".to_string()), UserId("u-hr".to_string())],
        }
    }

    #[tokio::test]
    async fn create_requires_an_hr_or_admin_actor() {
        let service = service();

        for role in [Role::Manager, Role::Employee] {
            let error = service
                .create(&actor("u-any", role), create_request())
                .await
                .expect_err("non-hr roles must not open flows");
            assert!(matches!(error, ServiceError::Forbidden(_)));
        }

        for role in [Role::Hr, Role::Admin] {
            service
                .create(&actor("u-privileged", role), create_request())
                .await
                .expect("hr and admin may open flows");
        }
    }

    #[tokio::test]
    async fn create_persists_steps_in_submitted_order() {
        let service = service();

        let flow = service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        assert_eq!(flow.company, TenantId("acme".to_string()));
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.steps[0].approver, UserId("u-manager".to_string()));
        assert_eq!(flow.steps[0].level, 1);
        assert_eq!(flow.steps[1].level, 2);
        assert_eq!(flow.status, FlowStatus::Pending);

        let listed = service.list_all(&actor("u-hr", Role::Hr)).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, flow.id);
    }

    #[tokio::test]
    async fn create_maps_empty_approver_list_to_validation() {
        let service = service();
        let mut request = create_request();
        request.approvers.clear();

        let error = service
            .create(&actor("u-hr", Role::Hr), request)
            .await
            .expect_err("empty approver list must fail");

        assert!(matches!(error, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_approved() {
        let service = service();
        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        let after_manager = service
            .decide(&actor("u-manager", Role::Manager), &flow.id, Decision::Approved, None)
            .await
            .expect("manager decision");
        assert_eq!(after_manager.status, FlowStatus::Pending);
        assert_eq!(after_manager.current_level, 2);
        assert_eq!(after_manager.version, 1);

        let after_hr = service
            .decide(
                &actor("u-hr", Role::Hr),
                &flow.id,
                Decision::Approved,
                Some("enjoy the break".to_string()),
            )
            .await
            .expect("hr decision");
        assert_eq!(after_hr.status, FlowStatus::Approved);
        assert_eq!(after_hr.steps[1].comment.as_deref(), Some("enjoy the break"));
        assert_eq!(after_hr.version, 2);
    }

    #[tokio::test]
    async fn rejection_closes_the_flow_and_blocks_the_rest() {
        let service = service();
        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        let rejected = service
            .decide(
                &actor("u-manager", Role::Manager),
                &flow.id,
                Decision::Rejected,
                Some("insufficient budget".to_string()),
            )
            .await
            .expect("rejection");
        assert_eq!(rejected.status, FlowStatus::Rejected);

        let error = service
            .decide(&actor("u-hr", Role::Hr), &flow.id, Decision::Approved, None)
            .await
            .expect_err("closed flow must block further decisions");
        assert!(matches!(error, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn deciding_an_unknown_flow_is_not_found() {
        let service = service();

        let error = service
            .decide(
                &actor("u-manager", Role::Manager),
                &FlowId("AF-missing".to_string()),
                Decision::Approved,
                None,
            )
            .await
            .expect_err("unknown flow must fail");

        assert_eq!(error, ServiceError::NotFound);
    }

    #[tokio::test]
    async fn foreign_tenant_flows_behave_as_nonexistent() {
        let service = service();
        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        let listed = service.list_all(&foreign_actor("u-spy")).await.expect("list");
        assert!(listed.is_empty());

        let error = service
            .decide(&foreign_actor("u-manager"), &flow.id, Decision::Approved, None)
            .await
            .expect_err("cross-tenant decide must fail");
        assert_eq!(error, ServiceError::NotFound);
    }

    #[tokio::test]
    async fn non_approvers_are_forbidden() {
        let service = service();
        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        let error = service
            .decide(&actor("u-stranger", Role::Employee), &flow.id, Decision::Approved, None)
            .await
            .expect_err("stranger must not decide");

        assert!(matches!(error, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn pending_query_tracks_undecided_steps_only() {
        let service = service();
        service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        // u-hr sits at level 2, not yet actionable, and is still listed
        let hr_pending =
            service.list_pending_for(&actor("u-hr", Role::Hr)).await.expect("hr pending");
        assert_eq!(hr_pending.len(), 1);

        let flow_id = hr_pending[0].id.clone();
        service
            .decide(&actor("u-manager", Role::Manager), &flow_id, Decision::Approved, None)
            .await
            .expect("manager decision");

        let manager_pending = service
            .list_pending_for(&actor("u-manager", Role::Manager))
            .await
            .expect("manager pending");
        assert!(manager_pending.is_empty());
    }

    #[tokio::test]
    async fn audit_events_cover_creation_and_decisions() {
        let sink = InMemoryAuditSink::default();
        let service = ApprovalService::new(InMemoryFlowRepository::default(), sink.clone());

        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");
        service
            .decide(&actor("u-manager", Role::Manager), &flow.id, Decision::Approved, None)
            .await
            .expect("decision");

        let events = sink.events();
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(types, vec!["flow.created", "flow.decision_applied"]);
        assert_eq!(events[1].metadata.get("decision").map(String::as_str), Some("approved"));
    }

    /// Wraps the in-memory store and reports a version conflict for the
    /// first `conflicts` conditional updates.
    struct ContendedRepository {
        inner: InMemoryFlowRepository,
        conflicts: AtomicU32,
    }

    impl ContendedRepository {
        fn new(conflicts: u32) -> Self {
            Self { inner: InMemoryFlowRepository::default(), conflicts: AtomicU32::new(conflicts) }
        }
    }

    #[async_trait::async_trait]
    impl FlowRepository for ContendedRepository {
        async fn create(&self, flow: &ApprovalFlow) -> Result<(), RepositoryError> {
            self.inner.create(flow).await
        }

        async fn find_by_id(
            &self,
            company: &TenantId,
            id: &FlowId,
        ) -> Result<Option<ApprovalFlow>, RepositoryError> {
            self.inner.find_by_id(company, id).await
        }

        async fn list_for_tenant(
            &self,
            company: &TenantId,
        ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
            self.inner.list_for_tenant(company).await
        }

        async fn list_pending_for_approver(
            &self,
            company: &TenantId,
            approver: &UserId,
        ) -> Result<Vec<ApprovalFlow>, RepositoryError> {
            self.inner.list_pending_for_approver(company, approver).await
        }

        async fn update_decided(
            &self,
            flow: &ApprovalFlow,
            step_index: usize,
            expected_version: i64,
        ) -> Result<bool, RepositoryError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner.update_decided(flow, step_index, expected_version).await
        }
    }

    #[tokio::test]
    async fn decide_retries_past_transient_version_conflicts() {
        let service =
            ApprovalService::new(ContendedRepository::new(2), InMemoryAuditSink::default());
        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        let updated = service
            .decide(&actor("u-manager", Role::Manager), &flow.id, Decision::Approved, None)
            .await
            .expect("decision should land after retries");

        assert_eq!(updated.steps[0].status, StepStatus::Approved);
    }

    #[tokio::test]
    async fn decide_surfaces_conflict_after_retry_exhaustion() {
        let service =
            ApprovalService::new(ContendedRepository::new(10), InMemoryAuditSink::default());
        let flow =
            service.create(&actor("u-hr", Role::Hr), create_request()).await.expect("create");

        let error = service
            .decide(&actor("u-manager", Role::Manager), &flow.id, Decision::Approved, None)
            .await
            .expect_err("exhausted retries must surface a conflict");

        assert!(matches!(error, ServiceError::Conflict(_)));
    }
}
