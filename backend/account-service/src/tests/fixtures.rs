/// Test fixtures: in-memory store, fixed clock, static federated verifier,
/// and a harness that wires the services together.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::clock::{Clock, SharedClock};
use crate::config::{EmailSettings, JwtSettings};
use crate::error::{AccountError, Result};
use crate::models::{
    AuthProvider, CreateOrganizationRequest, Invitation, MemberView, Membership, OrgRole,
    Organization, UpdateOrganizationRequest, User,
};
use crate::security::{FederatedClaims, FederatedTokenVerifier, TokenIssuer};
use crate::services::{AuthService, EmailService, OrganizationService};
use crate::store::{
    normalize_email, AccountStore, NewFederatedUser, NewInvitation, NewOrganization, NewUser,
    OrganizationStore,
};

pub const TEST_EMAIL: &str = "owner@example.com";
pub const TEST_EMAIL_2: &str = "member@example.com";
pub const TEST_EMAIL_3: &str = "third@example.com";
pub const TEST_PASSWORD: &str = "correct horse battery";
pub const TEST_TAX_ID: &str = "1234567890123";

/// Clock whose "now" tests move by hand.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Federated verifier backed by a credential -> claims table.
#[derive(Default)]
pub struct StaticVerifier {
    claims: Mutex<HashMap<String, FederatedClaims>>,
}

impl StaticVerifier {
    pub fn insert(&self, credential: &str, claims: FederatedClaims) {
        self.claims
            .lock()
            .unwrap()
            .insert(credential.to_string(), claims);
    }
}

#[async_trait]
impl FederatedTokenVerifier for StaticVerifier {
    async fn verify(&self, credential: &str) -> Result<FederatedClaims> {
        self.claims
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .ok_or(AccountError::InvalidFederatedToken)
    }
}

pub fn google_claims(subject: &str, email: &str) -> FederatedClaims {
    FederatedClaims {
        subject: subject.to_string(),
        email: email.to_string(),
        email_verified: true,
        name: Some("Google User".to_string()),
        picture: None,
    }
}

#[derive(Default)]
struct MemState {
    users: Vec<User>,
    orgs: Vec<Organization>,
    memberships: Vec<Membership>,
    invitations: Vec<Invitation>,
}

/// In-memory implementation of both store traits. Mirrors the Postgres
/// store's semantics, including the conditional-update redemption (here a
/// check-and-increment under one lock).
pub struct MemStore {
    state: Mutex<MemState>,
    clock: SharedClock,
}

impl MemStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(MemState::default()),
            clock,
        }
    }

    /// Direct mutation for test setup, e.g. deactivating an account.
    pub fn set_user_active(&self, user_id: Uuid, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.is_active = active;
        }
    }
}

#[async_trait]
impl AccountStore for MemStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let email = normalize_email(&user.email);
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        if state.users.iter().any(|u| u.email == email) {
            return Err(AccountError::EmailAlreadyExists);
        }

        let created = User {
            id: Uuid::new_v4(),
            email,
            password_hash: Some(user.password_hash),
            full_name: user.full_name,
            auth_provider: AuthProvider::Email,
            google_id: None,
            picture_url: None,
            is_active: true,
            is_verified: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn create_federated(&self, user: NewFederatedUser) -> Result<User> {
        let email = normalize_email(&user.email);
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        if state.users.iter().any(|u| u.email == email) {
            return Err(AccountError::EmailAlreadyExists);
        }

        let created = User {
            id: Uuid::new_v4(),
            email,
            password_hash: None,
            full_name: user.full_name,
            auth_provider: AuthProvider::Google,
            google_id: Some(user.google_id),
            picture_url: user.picture_url,
            is_active: true,
            is_verified: user.verified,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<User> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AccountError::UserNotFound)?;
        user.password_hash = Some(password_hash.to_string());
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn mark_verified(&self, user_id: Uuid) -> Result<User> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AccountError::UserNotFound)?;
        user.is_verified = true;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn update_federated_link(
        &self,
        user_id: Uuid,
        google_id: &str,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<User> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        if state
            .users
            .iter()
            .any(|u| u.id != user_id && u.google_id.as_deref() == Some(google_id))
        {
            return Err(AccountError::FederatedIdentityInUse);
        }

        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AccountError::UserNotFound)?;
        user.google_id = Some(google_id.to_string());
        if user.full_name.is_none() {
            user.full_name = full_name.map(str::to_string);
        }
        if let Some(picture) = picture_url {
            user.picture_url = Some(picture.to_string());
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<User> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AccountError::UserNotFound)?;
        if let Some(name) = full_name {
            user.full_name = Some(name.to_string());
        }
        if let Some(picture) = picture_url {
            user.picture_url = Some(picture.to_string());
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn touch_last_login(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.last_login_at = Some(now);
            user.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for MemStore {
    async fn create_organization(
        &self,
        org: NewOrganization,
        creator: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Organization> {
        let mut state = self.state.lock().unwrap();

        if state.orgs.iter().any(|o| o.tax_id == org.tax_id) {
            return Err(AccountError::TaxIdAlreadyExists);
        }

        let created = Organization {
            id: Uuid::new_v4(),
            company_name: org.company_name,
            registration_name: org.registration_name,
            tax_id: org.tax_id,
            company_id: org.company_id,
            vat_registered: org.vat_registered,
            address: org.address,
            contact_person: org.contact_person,
            contact_email: org.contact_email,
            contact_phone: org.contact_phone,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.memberships.push(Membership {
            id: Uuid::new_v4(),
            user_id: creator,
            organization_id: created.id,
            role: OrgRole::Owner,
            joined_at: now,
            invited_by: None,
            is_active: true,
        });
        state.orgs.push(created.clone());
        Ok(created)
    }

    async fn find_org_by_id(&self, org_id: Uuid) -> Result<Option<Organization>> {
        let state = self.state.lock().unwrap();
        Ok(state.orgs.iter().find(|o| o.id == org_id).cloned())
    }

    async fn update_organization(
        &self,
        org_id: Uuid,
        changes: &UpdateOrganizationRequest,
    ) -> Result<Organization> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let org = state
            .orgs
            .iter_mut()
            .find(|o| o.id == org_id)
            .ok_or(AccountError::OrganizationNotFound)?;

        if let Some(v) = &changes.company_name {
            org.company_name = v.clone();
        }
        if let Some(v) = &changes.registration_name {
            org.registration_name = v.clone();
        }
        if let Some(v) = &changes.address {
            org.address = v.clone();
        }
        if let Some(v) = &changes.contact_person {
            org.contact_person = v.clone();
        }
        if let Some(v) = &changes.contact_email {
            org.contact_email = v.clone();
        }
        if let Some(v) = &changes.contact_phone {
            org.contact_phone = v.clone();
        }
        if let Some(v) = changes.vat_registered {
            org.vat_registered = v;
        }
        org.updated_at = now;
        Ok(org.clone())
    }

    async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Organization, Membership)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| {
                state
                    .orgs
                    .iter()
                    .find(|o| o.id == m.organization_id)
                    .map(|o| (o.clone(), m.clone()))
            })
            .collect())
    }

    async fn find_membership(&self, user_id: Uuid, org_id: Uuid) -> Result<Option<Membership>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.organization_id == org_id)
            .cloned())
    }

    async fn find_membership_by_id(&self, membership_id: Uuid) -> Result<Option<Membership>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .find(|m| m.id == membership_id)
            .cloned())
    }

    async fn list_members(&self, org_id: Uuid) -> Result<Vec<MemberView>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.organization_id == org_id && m.is_active)
            .filter_map(|m| {
                state.users.iter().find(|u| u.id == m.user_id).map(|u| MemberView {
                    membership_id: m.id,
                    user_id: u.id,
                    email: u.email.clone(),
                    full_name: u.full_name.clone(),
                    role: m.role,
                    joined_at: m.joined_at,
                    is_active: m.is_active,
                })
            })
            .collect())
    }

    async fn deactivate_membership(&self, membership_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state.memberships.iter_mut().find(|m| m.id == membership_id) {
            m.is_active = false;
        }
        Ok(())
    }

    async fn update_membership_role(
        &self,
        membership_id: Uuid,
        role: OrgRole,
    ) -> Result<Membership> {
        let mut state = self.state.lock().unwrap();
        let m = state
            .memberships
            .iter_mut()
            .find(|m| m.id == membership_id)
            .ok_or(AccountError::MemberNotFound)?;
        m.role = role;
        Ok(m.clone())
    }

    async fn create_invitation(&self, invitation: NewInvitation) -> Result<Invitation> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        let mut code = Invitation::generate_code();
        while state.invitations.iter().any(|i| i.code == code) {
            code = Invitation::generate_code();
        }

        let created = Invitation {
            id: Uuid::new_v4(),
            organization_id: invitation.organization_id,
            code,
            created_by: invitation.created_by,
            target_email: invitation.target_email,
            role: invitation.role,
            expires_at: invitation.expires_at,
            max_uses: invitation.max_uses,
            use_count: 0,
            is_active: true,
            created_at: now,
        };
        state.invitations.push(created.clone());
        Ok(created)
    }

    async fn find_invitation_by_code(&self, code: &str) -> Result<Option<Invitation>> {
        let state = self.state.lock().unwrap();
        Ok(state.invitations.iter().find(|i| i.code == code).cloned())
    }

    async fn find_invitation_by_id(&self, invitation_id: Uuid) -> Result<Option<Invitation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .invitations
            .iter()
            .find(|i| i.id == invitation_id)
            .cloned())
    }

    async fn list_invitations(&self, org_id: Uuid) -> Result<Vec<Invitation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .invitations
            .iter()
            .filter(|i| i.organization_id == org_id)
            .cloned()
            .collect())
    }

    async fn deactivate_invitation(&self, invitation_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(i) = state.invitations.iter_mut().find(|i| i.id == invitation_id) {
            i.is_active = false;
        }
        Ok(())
    }

    async fn redeem_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>> {
        let mut state = self.state.lock().unwrap();

        // Check-and-increment under one lock, matching the conditional
        // UPDATE in the Postgres store.
        let (org_id, role, invited_by) = {
            let Some(inv) = state.invitations.iter_mut().find(|i| i.id == invitation_id) else {
                return Ok(None);
            };
            if !inv.is_active || inv.is_expired(now) || inv.is_exhausted() {
                return Ok(None);
            }
            inv.use_count += 1;
            (inv.organization_id, inv.role, inv.created_by)
        };

        if let Some(existing) = state
            .memberships
            .iter_mut()
            .find(|m| m.user_id == user_id && m.organization_id == org_id)
        {
            existing.is_active = true;
            existing.role = role;
            existing.joined_at = now;
            existing.invited_by = Some(invited_by);
            return Ok(Some(existing.clone()));
        }

        let membership = Membership {
            id: Uuid::new_v4(),
            user_id,
            organization_id: org_id,
            role,
            joined_at: now,
            invited_by: Some(invited_by),
            is_active: true,
        };
        state.memberships.push(membership.clone());
        Ok(Some(membership))
    }
}

/// Fully wired service pair over the in-memory fakes.
pub struct TestEnv {
    pub store: Arc<MemStore>,
    pub clock: Arc<FixedClock>,
    pub verifier: Arc<StaticVerifier>,
    pub tokens: TokenIssuer,
    pub auth: AuthService,
    pub orgs: OrganizationService,
}

pub fn test_env() -> TestEnv {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let shared_clock: SharedClock = clock.clone();

    let store = Arc::new(MemStore::new(shared_clock.clone()));
    let accounts: Arc<dyn AccountStore> = store.clone();
    let org_store: Arc<dyn OrganizationStore> = store.clone();

    let verifier = Arc::new(StaticVerifier::default());
    let email = EmailService::new(&EmailSettings {
        smtp_host: None,
        smtp_port: 587,
        smtp_username: None,
        smtp_password: None,
        smtp_from: "noreply@test.local".to_string(),
        frontend_base_url: "http://localhost:5173".to_string(),
    })
    .unwrap();

    let tokens = TokenIssuer::new(
        &JwtSettings {
            secret: "test-secret".to_string(),
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
        },
        shared_clock.clone(),
    );

    let auth = AuthService::new(
        accounts.clone(),
        org_store.clone(),
        tokens.clone(),
        verifier.clone(),
        email.clone(),
        shared_clock.clone(),
    );
    let orgs = OrganizationService::new(org_store, accounts, email, shared_clock);

    TestEnv {
        store,
        clock,
        verifier,
        tokens,
        auth,
        orgs,
    }
}

pub fn org_request(tax_id: &str) -> CreateOrganizationRequest {
    CreateOrganizationRequest {
        company_name: "Acme DOO".to_string(),
        registration_name: "Acme Trading DOOEL Skopje".to_string(),
        tax_id: tax_id.to_string(),
        company_id: "7654321".to_string(),
        vat_registered: true,
        address: "Partizanska 1, Skopje".to_string(),
        contact_person: "A. Person".to_string(),
        contact_email: "office@acme.example".to_string(),
        contact_phone: "+389 2 000 000".to_string(),
    }
}
