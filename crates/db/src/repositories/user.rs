use sqlx::{QueryBuilder, Row};

use crewflow_core::domain::identity::{Role, TenantId, UserId};
use crewflow_core::domain::user::UserAccount;

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, company_id, email, display_name, role, password_digest, created_at";

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserAccount, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let password_digest: String =
        row.try_get("password_digest").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(UserAccount {
        id: UserId(id),
        company: TenantId(company_id),
        email,
        display_name,
        role: role.parse::<Role>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        password_digest,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM user_account WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(user_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(
        &self,
        company: &TenantId,
        id: &UserId,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM user_account WHERE id = ? AND company_id = ?"
        ))
        .bind(&id.0)
        .bind(&company.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(user_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_ids(
        &self,
        company: &TenantId,
        ids: &[UserId],
    ) -> Result<Vec<UserAccount>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::new(format!(
            "SELECT {USER_COLUMNS} FROM user_account WHERE company_id = "
        ));
        query_builder.push_bind(&company.0);
        query_builder.push(" AND id IN (");
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(&id.0);
        }
        query_builder.push(")");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }
}
