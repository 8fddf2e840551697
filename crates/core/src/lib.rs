pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod password;
pub mod workflow;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use domain::flow::{ApprovalFlow, ApprovalStep, FlowId, FlowStatus, RequestType, StepStatus};
pub use domain::identity::{ActorContext, Role, TenantId, UserId};
pub use domain::user::{UserAccount, UserDisplay};
pub use errors::ServiceError;
pub use workflow::{decide, open_flow, DecidedStep, Decision, WorkflowError};
