use chrono::Utc;

use crewflow_core::domain::flow::{ApprovalFlow, ApprovalStep, FlowId, FlowStatus, RequestType, StepStatus};
use crewflow_core::domain::identity::{TenantId, UserId};
use crewflow_core::password::hash_password_with_salt;

use crate::repositories::{FlowRepository, RepositoryError, SqlFlowRepository};
use crate::DbPool;

const SEED_COMPANY_ID: &str = "co-demo";
const SEED_FLOW_ID: &str = "AF-demo0000001";

/// Demo password shared by every seeded account.
pub const SEED_PASSWORD: &str = "crewflow-demo";

/// `(id, email, display name, role)` for each seeded account.
pub const SEED_USERS: &[(&str, &str, &str, &str)] = &[
    ("u-demo-admin", "admin@demo.crewflow.test", "Dana Admin", "admin"),
    ("u-demo-hr", "hr@demo.crewflow.test", "Harper Reyes", "hr"),
    ("u-demo-manager", "manager@demo.crewflow.test", "Morgan Lee", "manager"),
    ("u-demo-employee", "employee@demo.crewflow.test", "Eli Park", "employee"),
];

pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Deterministic demo dataset: one company, one account per role, and a
/// two-level leave flow waiting on the manager. Loading is idempotent.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool) -> Result<(), RepositoryError> {
        let now = Utc::now();

        sqlx::query("INSERT OR IGNORE INTO company (id, name, created_at) VALUES (?, ?, ?)")
            .bind(SEED_COMPANY_ID)
            .bind("Demo Company")
            .bind(now.to_rfc3339())
            .execute(pool)
            .await?;

        for (id, email, display_name, role) in SEED_USERS {
            let digest = hash_password_with_salt(id, SEED_PASSWORD);
            sqlx::query(
                "INSERT OR IGNORE INTO user_account (id, company_id, email, display_name, role,
                                                     password_digest, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(SEED_COMPANY_ID)
            .bind(email)
            .bind(display_name)
            .bind(role)
            .bind(digest)
            .bind(now.to_rfc3339())
            .execute(pool)
            .await?;
        }

        let repo = SqlFlowRepository::new(pool.clone());
        let existing =
            repo.find_by_id(&TenantId(SEED_COMPANY_ID.to_string()), &FlowId(SEED_FLOW_ID.to_string()))
                .await?;
        if existing.is_none() {
            repo.create(&demo_flow()).await?;
        }

        Ok(())
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let user_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_account WHERE company_id = ?")
                .bind(SEED_COMPANY_ID)
                .fetch_one(pool)
                .await?;

        let flow_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM approval_flow WHERE id = ?")
                .bind(SEED_FLOW_ID)
                .fetch_one(pool)
                .await?;

        let step_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM approval_step WHERE flow_id = ?")
                .bind(SEED_FLOW_ID)
                .fetch_one(pool)
                .await?;

        let checks = vec![
            ("demo-users", user_count == SEED_USERS.len() as i64),
            ("demo-flow", flow_count == 1),
            ("demo-flow-steps", step_count == 2),
        ];
        let all_present = checks.iter().all(|(_, passed)| *passed);

        Ok(SeedVerification { all_present, checks })
    }
}

fn demo_flow() -> ApprovalFlow {
    let now = Utc::now();
    ApprovalFlow {
        id: FlowId(SEED_FLOW_ID.to_string()),
        company: TenantId(SEED_COMPANY_ID.to_string()),
        request_type: RequestType::Leave,
        request_id: "leave-demo-001".to_string(),
        requester: UserId("u-demo-employee".to_string()),
        steps: vec![
            ApprovalStep {
                approver: UserId("u-demo-manager".to_string()),
                level: 1,
                status: StepStatus::Pending,
                comment: None,
                decided_at: None,
            },
            ApprovalStep {
                approver: UserId("u-demo-hr".to_string()),
                level: 2,
                status: StepStatus::Pending,
                comment: None,
                decided_at: None,
            },
        ],
        current_level: 1,
        status: FlowStatus::Pending,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use crewflow_core::password::verify_password;

    use super::{DemoSeedDataset, SEED_PASSWORD};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        DemoSeedDataset::load(&pool).await.expect("seed");
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");

        assert!(
            verification.all_present,
            "failed checks: {:?}",
            verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        DemoSeedDataset::load(&pool).await.expect("first load");
        DemoSeedDataset::load(&pool).await.expect("second load");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present);
    }

    #[tokio::test]
    async fn seeded_accounts_accept_the_demo_password() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");

        let digest: String = sqlx::query_scalar(
            "SELECT password_digest FROM user_account WHERE email = 'hr@demo.crewflow.test'",
        )
        .fetch_one(&pool)
        .await
        .expect("fetch digest");

        assert!(verify_password(&digest, SEED_PASSWORD));
        assert!(!verify_password(&digest, "not-the-password"));
    }
}
