use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crewflow_core::config::AuthConfig;
use crewflow_core::domain::identity::{ActorContext, Role, TenantId, UserId};
use crewflow_core::domain::user::UserAccount;
use crewflow_core::password::verify_password;
use crewflow_db::UserRepository;

use crate::bootstrap::AppState;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingBearer,
    #[error("Authorization header must use the Bearer scheme")]
    InvalidScheme,
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("token generation failed: {0}")]
    TokenGeneration(String),
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::TokenGeneration(detail) => {
                tracing::error!(
                    event_name = "auth.token_generation_failed",
                    error = %detail,
                    "failed to sign a session token"
                );
                ApiError::Internal("could not issue a session token".to_string())
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub company: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies the signed session tokens carried on every
/// authenticated request.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
}

impl TokenSigner {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            token_ttl: Duration::hours(config.token_ttl_hours as i64),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.token_ttl.num_seconds()
    }

    pub fn issue(&self, account: &UserAccount) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id.0.clone(),
            company: account.company.0.clone(),
            email: account.email.clone(),
            role: account.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|error| AuthError::TokenGeneration(error.to_string()))
    }

    pub fn authenticate(&self, token: &str) -> Result<ActorContext, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        let role = data.claims.role.parse::<Role>().map_err(|_| AuthError::InvalidToken)?;

        Ok(ActorContext {
            company: TenantId(data.claims.company),
            user: UserId(data.claims.sub),
            email: data.claims.email,
            role,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))
        .ok_or(AuthError::MissingBearer)?;

    let value = header.to_str().map_err(|_| AuthError::InvalidScheme)?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthError::InvalidScheme)?;
    if token.trim().is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token.to_string())
}

/// Extractor resolving the caller's bearer token to an [`ActorContext`].
pub struct AuthUser(pub ActorContext);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let actor = state.signer.authenticate(&token)?;
        Ok(Self(actor))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub company: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_secs: i64,
    pub user: LoginUser,
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = body.email.trim();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation("email and password are required".to_string()));
    }

    // unknown address and bad password answer identically
    let account = state.users.find_by_email(email).await?.ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(&account.password_digest, &body.password) {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.signer.issue(&account)?;

    tracing::info!(
        event_name = "auth.login",
        correlation_id = %account.id,
        user = %account.id,
        company = %account.company,
        "user logged in"
    );

    Ok(Json(LoginResponse {
        token,
        expires_in_secs: state.signer.ttl_secs(),
        user: LoginUser {
            id: account.id.0.clone(),
            email: account.email.clone(),
            name: account.display_name.clone(),
            role: account.role,
            company: account.company.0,
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub company: String,
}

/// GET /api/auth/me
pub async fn me(AuthUser(actor): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: actor.user.0,
        email: actor.email,
        role: actor.role,
        company: actor.company.0,
    })
}
