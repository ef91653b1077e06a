/// Authentication endpoints.
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::http::{AppState, AuthUser};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    #[validate(url)]
    pub picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchOrganizationRequest {
    pub organization_id: Uuid,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let response = state
        .auth
        .register(&payload.email, &payload.password, payload.full_name)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let response = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(response))
}

pub async fn google_auth(
    State(state): State<AppState>,
    Json(payload): Json<GoogleAuthRequest>,
) -> Result<impl IntoResponse> {
    let response = state.auth.federated_auth(&payload.credential).await?;
    Ok(Json(response))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse> {
    let pair = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(pair))
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let view = state.auth.me(user.id).await?;
    Ok(Json(view))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state
        .auth
        .update_profile(
            user.id,
            payload.full_name.as_deref(),
            payload.picture_url.as_deref(),
        )
        .await?;
    Ok(Json(view))
}

pub async fn link_google(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<GoogleAuthRequest>,
) -> Result<impl IntoResponse> {
    let view = state.auth.link_federated(user.id, &payload.credential).await?;
    Ok(Json(view))
}

pub async fn set_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<impl IntoResponse> {
    state
        .auth
        .set_password(user.id, &payload.password, &payload.confirm_password)
        .await?;
    Ok(Json(json!({ "message": "Password set" })))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse> {
    state
        .auth
        .change_password(
            user.id,
            &payload.current_password,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;
    Ok(Json(json!({ "message": "Password changed" })))
}

/// Always answers with the same message, whether or not the address exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    state.auth.forgot_password(&payload.email).await?;
    Ok(Json(json!({
        "message": "If an account exists for this address, a reset email has been sent"
    })))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    state.auth.request_password_reset(user.id).await?;
    Ok(Json(json!({ "message": "Password reset email sent" })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse> {
    state
        .auth
        .reset_password(&payload.token, &payload.password, &payload.confirm_password)
        .await?;
    Ok(Json(json!({ "message": "Password reset" })))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse> {
    let view = state.auth.verify_email(&payload.token).await?;
    Ok(Json(view))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    state.auth.resend_verification(user.id).await?;
    Ok(Json(json!({ "message": "Verification email sent" })))
}

pub async fn switch_organization(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SwitchOrganizationRequest>,
) -> Result<impl IntoResponse> {
    let pair = state
        .auth
        .switch_organization(user.id, payload.organization_id)
        .await?;
    Ok(Json(pair))
}
