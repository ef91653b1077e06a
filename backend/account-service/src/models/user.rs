use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How an account was originally created. A federated account may later set
/// a password (and vice versa); the provider records provenance, not the
/// set of usable login methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "auth_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Email,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Email => "email",
            AuthProvider::Google => "google",
        }
    }
}

/// Account row. Accounts are never hard-deleted; `is_active = false` is the
/// terminal state.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub auth_provider: AuthProvider,
    pub google_id: Option<String>,
    pub picture_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether password login is possible for this account.
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Wire representation of an account. Never exposes the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub auth_provider: AuthProvider,
    pub picture_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub has_password: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            auth_provider: user.auth_provider,
            picture_url: user.picture_url.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            has_password: user.has_password(),
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
