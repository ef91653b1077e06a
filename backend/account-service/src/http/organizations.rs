/// Organization, membership, and invitation endpoints.
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::http::{AppState, AuthUser};
use crate::models::{
    CreateInvitationRequest, CreateOrganizationRequest, JoinOrganizationRequest, OrgRole,
    UpdateOrganizationRequest,
};

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: OrgRole,
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse> {
    let org = state.orgs.create_organization(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(org)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let orgs = state.orgs.list_user_organizations(user.id).await?;
    Ok(Json(orgs))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let org = state.orgs.get_organization(org_id, user.id).await?;
    Ok(Json(org))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse> {
    let org = state
        .orgs
        .update_organization(org_id, payload, user.id)
        .await?;
    Ok(Json(org))
}

pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let members = state.orgs.list_members(org_id, user.id).await?;
    Ok(Json(members))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, membership_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .orgs
        .remove_member(org_id, membership_id, user.id)
        .await?;
    Ok(Json(json!({ "message": "Member removed" })))
}

pub async fn change_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, membership_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ChangeRoleRequest>,
) -> Result<impl IntoResponse> {
    let membership = state
        .orgs
        .change_role(org_id, membership_id, payload.role, user.id)
        .await?;
    Ok(Json(membership))
}

pub async fn create_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(payload): Json<CreateInvitationRequest>,
) -> Result<impl IntoResponse> {
    let invitation = state
        .orgs
        .create_invitation(org_id, user.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let invitations = state.orgs.list_invitations(org_id, user.id).await?;
    Ok(Json(invitations))
}

pub async fn deactivate_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path((_org_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .orgs
        .deactivate_invitation(invitation_id, user.id)
        .await?;
    Ok(Json(json!({ "message": "Invitation deactivated" })))
}

/// Preview a code before joining. Works without authentication; with it,
/// the response also says whether the caller is already a member.
pub async fn validate_invitation(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(payload): Json<JoinOrganizationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let preview = state
        .orgs
        .validate_invitation(&payload.code, user.map(|u| u.id))
        .await?;
    Ok(Json(preview))
}

pub async fn join(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<JoinOrganizationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let membership = state.orgs.redeem_invitation(user.id, &payload.code).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}
