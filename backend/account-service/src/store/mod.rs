//! Persistence traits and the canonical email form.
//!
//! Services depend on these traits rather than on sqlx directly; the
//! Postgres implementation lives in [`postgres`], and tests supply an
//! in-memory one.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Invitation, MemberView, Membership, OrgRole, Organization, UpdateOrganizationRequest, User,
};

pub use postgres::PgStore;

/// Canonical form for stored and looked-up email addresses: trimmed,
/// lowercased, and with dots stripped from the local part for Google-hosted
/// domains (Gmail ignores them, so `pipo.jordanoski@gmail.com` and
/// `pipojordanoski@gmail.com` are the same mailbox).
///
/// Idempotent: normalizing an already-normalized address is a no-op.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim().to_lowercase();

    match email.split_once('@') {
        Some((local, domain)) if domain == "gmail.com" || domain == "googlemail.com" => {
            let local: String = local.chars().filter(|c| *c != '.').collect();
            format!("{}@{}", local, domain)
        }
        _ => email,
    }
}

/// Fields for a password-based account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
}

/// Fields for an account created from a federated identity.
#[derive(Debug, Clone)]
pub struct NewFederatedUser {
    pub email: String,
    pub google_id: String,
    pub full_name: Option<String>,
    pub picture_url: Option<String>,
    pub verified: bool,
}

/// Fields for a new organization; the creator becomes owner in the same
/// transaction.
#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub company_name: String,
    pub registration_name: String,
    pub tax_id: String,
    pub company_id: String,
    pub vat_registered: bool,
    pub address: String,
    pub contact_person: String,
    pub contact_email: String,
    pub contact_phone: String,
}

/// Fields for a new invitation. The store generates the code and retries on
/// the (unlikely) uniqueness collision.
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub role: OrgRole,
    pub target_email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: Option<i32>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Looks up by the normalized form of `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>>;

    async fn create(&self, user: NewUser) -> Result<User>;
    async fn create_federated(&self, user: NewFederatedUser) -> Result<User>;

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<User>;
    async fn mark_verified(&self, user_id: Uuid) -> Result<User>;
    /// Attach (or refresh) a federated identity on an existing account.
    async fn update_federated_link(
        &self,
        user_id: Uuid,
        google_id: &str,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<User>;
    async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<User>;
    async fn touch_last_login(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Insert the organization and its owner membership in one transaction.
    async fn create_organization(
        &self,
        org: NewOrganization,
        creator: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Organization>;
    async fn find_org_by_id(&self, org_id: Uuid) -> Result<Option<Organization>>;
    async fn update_organization(
        &self,
        org_id: Uuid,
        changes: &UpdateOrganizationRequest,
    ) -> Result<Organization>;

    /// Active memberships for a user, paired with their organizations.
    async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Organization, Membership)>>;
    /// The membership row for (user, org) regardless of `is_active`.
    async fn find_membership(&self, user_id: Uuid, org_id: Uuid) -> Result<Option<Membership>>;
    async fn find_membership_by_id(&self, membership_id: Uuid) -> Result<Option<Membership>>;
    async fn list_members(&self, org_id: Uuid) -> Result<Vec<MemberView>>;
    async fn deactivate_membership(&self, membership_id: Uuid) -> Result<()>;
    async fn update_membership_role(&self, membership_id: Uuid, role: OrgRole)
        -> Result<Membership>;

    async fn create_invitation(&self, invitation: NewInvitation) -> Result<Invitation>;
    async fn find_invitation_by_code(&self, code: &str) -> Result<Option<Invitation>>;
    async fn find_invitation_by_id(&self, invitation_id: Uuid) -> Result<Option<Invitation>>;
    async fn list_invitations(&self, org_id: Uuid) -> Result<Vec<Invitation>>;
    async fn deactivate_invitation(&self, invitation_id: Uuid) -> Result<()>;

    /// Atomically consume one use of the invitation and write the
    /// membership (reactivating an inactive row if one exists).
    ///
    /// Returns `None` when the conditional use-count increment matched no
    /// row, meaning the invitation was exhausted, expired, or deactivated
    /// concurrently. Callers pre-validate, so `None` is a lost race.
    async fn redeem_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>>;
}
