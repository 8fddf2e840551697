use chrono::{DateTime, Utc};

use crate::domain::identity::{Role, TenantId, UserId};

/// A directory entry for one authenticated user. `password_digest` holds the
/// salted digest in `salt$hex` form and must never leave the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    pub company: TenantId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

/// The public face of a user, embedded in flow responses.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserDisplay {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&UserAccount> for UserDisplay {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id.clone(),
            name: account.display_name.clone(),
            email: account.email.clone(),
        }
    }
}
