/// HTTP surface: router, shared state, and the bearer-token extractor.
/// Handlers stay thin; every rule lives in the services.
mod auth;
mod organizations;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::AccountError;
use crate::security::{OrgContext, TokenKind};
use crate::services::{AuthService, OrganizationService};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub orgs: Arc<OrganizationService>,
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
/// Only access tokens are accepted here; refresh and single-purpose tokens
/// are rejected even though they parse.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub org: Option<OrgContext>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AccountError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AccountError::InvalidToken)?;

        let claims = state.auth.token_issuer().parse(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AccountError::InvalidToken);
        }

        Ok(AuthUser {
            id: claims.subject,
            org: claims.org,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/auth", auth_routes())
        .nest("/api/v1/organizations", organization_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/google", post(auth::google_auth))
        .route("/refresh", post(auth::refresh))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/link-google", post(auth::link_google))
        .route("/set-password", post(auth::set_password))
        .route("/change-password", post(auth::change_password))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/request-password-reset", post(auth::request_password_reset))
        .route("/reset-password", post(auth::reset_password))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/switch-organization", post(auth::switch_organization))
}

fn organization_routes() -> Router<AppState> {
    use axum::routing::delete;

    Router::new()
        .route(
            "/",
            post(organizations::create).get(organizations::list_mine),
        )
        .route(
            "/join",
            post(organizations::join),
        )
        .route("/join/validate", post(organizations::validate_invitation))
        .route(
            "/:org_id",
            get(organizations::get).patch(organizations::update),
        )
        .route("/:org_id/members", get(organizations::list_members))
        .route(
            "/:org_id/members/:membership_id",
            delete(organizations::remove_member),
        )
        .route(
            "/:org_id/members/:membership_id/role",
            put(organizations::change_role),
        )
        .route(
            "/:org_id/invitations",
            post(organizations::create_invitation).get(organizations::list_invitations),
        )
        .route(
            "/:org_id/invitations/:invitation_id",
            delete(organizations::deactivate_invitation),
        )
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
