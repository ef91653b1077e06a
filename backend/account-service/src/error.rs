use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AccountError>;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User not found")]
    UserNotFound,

    #[error("Organization not found")]
    OrganizationNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Invitation not found")]
    InvitationNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("This account uses federated sign-in; password login is not available")]
    PasswordLoginUnavailable,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid federated credential")]
    InvalidFederatedToken,

    #[error("Email address not verified by the identity provider")]
    EmailNotVerifiedByProvider,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("This federated identity is already linked to another account")]
    FederatedIdentityInUse,

    #[error("An organization with this tax id already exists")]
    TaxIdAlreadyExists,

    #[error("Already a member of this organization")]
    AlreadyMember,

    #[error("Email already verified")]
    AlreadyVerified,

    #[error("Password already set; use change password")]
    PasswordAlreadySet,

    #[error("No password set for this account")]
    NoPasswordSet,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invitation is no longer active")]
    InvitationInactive,

    #[error("Invitation has expired")]
    InvitationExpired,

    #[error("Invitation has reached its usage limit")]
    InvitationExhausted,

    #[error("Invitation was issued for a different email address")]
    InvitationEmailMismatch,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AccountError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccountError::UserNotFound
            | AccountError::OrganizationNotFound
            | AccountError::MemberNotFound
            | AccountError::InvitationNotFound => StatusCode::NOT_FOUND,

            AccountError::InvalidCredentials
            | AccountError::PasswordLoginUnavailable
            | AccountError::AccountInactive
            | AccountError::InvalidToken
            | AccountError::InvalidFederatedToken
            | AccountError::EmailNotVerifiedByProvider => StatusCode::UNAUTHORIZED,

            AccountError::EmailAlreadyExists
            | AccountError::FederatedIdentityInUse
            | AccountError::TaxIdAlreadyExists
            | AccountError::AlreadyMember
            | AccountError::AlreadyVerified
            | AccountError::PasswordAlreadySet
            | AccountError::NoPasswordSet => StatusCode::CONFLICT,

            AccountError::Forbidden(_) => StatusCode::FORBIDDEN,

            AccountError::InvitationInactive
            | AccountError::InvitationExpired
            | AccountError::InvitationExhausted
            | AccountError::InvitationEmailMismatch
            | AccountError::PasswordMismatch
            | AccountError::WeakPassword(_)
            | AccountError::Validation(_) => StatusCode::BAD_REQUEST,

            AccountError::Database(_) | AccountError::Email(_) | AccountError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details in responses
        let message = match &self {
            AccountError::Database(_) | AccountError::Email(_) | AccountError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// Conversions from external error types
impl From<sqlx::Error> for AccountError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        AccountError::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AccountError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("JWT error: {}", err);
        AccountError::InvalidToken
    }
}

impl From<validator::ValidationErrors> for AccountError {
    fn from(err: validator::ValidationErrors) -> Self {
        AccountError::Validation(err.to_string())
    }
}
