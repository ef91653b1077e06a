/// Organization and membership engine: org CRUD, role lookups, the
/// invitation lifecycle, and the authority rules for removing members and
/// changing roles.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clock::SharedClock;
use crate::error::{AccountError, Result};
use crate::models::{
    CreateInvitationRequest, CreateOrganizationRequest, Invitation, InvitationPreview, MemberView,
    Membership, OrgRole, Organization, UpdateOrganizationRequest,
};
use crate::services::email::EmailService;
use crate::store::{normalize_email, AccountStore, NewInvitation, NewOrganization, OrganizationStore};

/// Organization paired with the caller's role in it.
#[derive(Debug, Clone, Serialize)]
pub struct UserOrganization {
    pub organization: Organization,
    pub role: OrgRole,
    pub joined_at: DateTime<Utc>,
}

pub struct OrganizationService {
    store: Arc<dyn OrganizationStore>,
    accounts: Arc<dyn AccountStore>,
    email: EmailService,
    clock: SharedClock,
}

impl OrganizationService {
    pub fn new(
        store: Arc<dyn OrganizationStore>,
        accounts: Arc<dyn AccountStore>,
        email: EmailService,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            accounts,
            email,
            clock,
        }
    }

    /// The caller's active role in the organization, if any.
    pub async fn get_role(&self, user_id: Uuid, org_id: Uuid) -> Result<Option<OrgRole>> {
        let membership = self.store.find_membership(user_id, org_id).await?;
        Ok(membership.filter(|m| m.is_active).map(|m| m.role))
    }

    async fn require_role(&self, user_id: Uuid, org_id: Uuid) -> Result<OrgRole> {
        self.get_role(user_id, org_id)
            .await?
            .ok_or_else(|| AccountError::Forbidden("Not a member of this organization".into()))
    }

    pub async fn create_organization(
        &self,
        creator: Uuid,
        req: CreateOrganizationRequest,
    ) -> Result<Organization> {
        req.validate()?;

        let org = self
            .store
            .create_organization(
                NewOrganization {
                    company_name: req.company_name,
                    registration_name: req.registration_name,
                    tax_id: req.tax_id.trim().to_string(),
                    company_id: req.company_id,
                    vat_registered: req.vat_registered,
                    address: req.address,
                    contact_person: req.contact_person,
                    contact_email: req.contact_email,
                    contact_phone: req.contact_phone,
                },
                creator,
                self.clock.now(),
            )
            .await?;

        info!(org_id = %org.id, user_id = %creator, "organization created");
        Ok(org)
    }

    pub async fn list_user_organizations(&self, user_id: Uuid) -> Result<Vec<UserOrganization>> {
        let pairs = self.store.list_user_organizations(user_id).await?;
        Ok(pairs
            .into_iter()
            .map(|(organization, membership)| UserOrganization {
                organization,
                role: membership.role,
                joined_at: membership.joined_at,
            })
            .collect())
    }

    pub async fn get_organization(&self, org_id: Uuid, requester: Uuid) -> Result<Organization> {
        self.require_role(requester, org_id).await?;
        self.store
            .find_org_by_id(org_id)
            .await?
            .ok_or(AccountError::OrganizationNotFound)
    }

    pub async fn update_organization(
        &self,
        org_id: Uuid,
        changes: UpdateOrganizationRequest,
        requester: Uuid,
    ) -> Result<Organization> {
        changes.validate()?;

        let role = self.require_role(requester, org_id).await?;
        if !matches!(role, OrgRole::Owner | OrgRole::Admin) {
            return Err(AccountError::Forbidden(
                "Only owners and admins can update the organization".into(),
            ));
        }

        self.store.update_organization(org_id, &changes).await
    }

    pub async fn list_members(&self, org_id: Uuid, requester: Uuid) -> Result<Vec<MemberView>> {
        self.require_role(requester, org_id).await?;
        self.store.list_members(org_id).await
    }

    pub async fn create_invitation(
        &self,
        org_id: Uuid,
        creator: Uuid,
        req: CreateInvitationRequest,
    ) -> Result<Invitation> {
        req.validate()?;

        let role = self.require_role(creator, org_id).await?;
        if !matches!(role, OrgRole::Owner | OrgRole::Admin | OrgRole::Accountant) {
            return Err(AccountError::Forbidden(
                "Only owners, admins, and accountants can create invitations".into(),
            ));
        }
        if req.role == OrgRole::Owner {
            return Err(AccountError::Forbidden(
                "The owner role cannot be granted by invitation".into(),
            ));
        }

        let target_email = req
            .target_email
            .as_deref()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let invitation = self
            .store
            .create_invitation(NewInvitation {
                organization_id: org_id,
                created_by: creator,
                role: req.role,
                target_email: target_email.clone(),
                expires_at: Invitation::expiry_from(self.clock.now()),
                max_uses: req.max_uses,
            })
            .await?;

        info!(
            org_id = %org_id,
            invitation_id = %invitation.id,
            role = invitation.role.as_str(),
            "invitation created"
        );

        if let Some(recipient) = target_email {
            self.send_invitation_email(org_id, creator, &invitation, recipient)
                .await;
        }

        Ok(invitation)
    }

    /// Fire-and-forget invitation email; failures are logged, never surfaced.
    async fn send_invitation_email(
        &self,
        org_id: Uuid,
        creator: Uuid,
        invitation: &Invitation,
        recipient: String,
    ) {
        let org_name = match self.store.find_org_by_id(org_id).await {
            Ok(Some(org)) => org.company_name,
            _ => return,
        };
        let inviter_name = match self.accounts.find_by_id(creator).await {
            Ok(Some(user)) => user.full_name.unwrap_or(user.email),
            _ => return,
        };
        let has_account = matches!(self.accounts.find_by_email(&recipient).await, Ok(Some(_)));

        let email = self.email.clone();
        let role = invitation.role;
        let code = invitation.code.clone();
        tokio::spawn(async move {
            if let Err(e) = email
                .send_invitation_email(&recipient, &org_name, &inviter_name, role, &code, has_account)
                .await
            {
                warn!("Failed to send invitation email: {}", e);
            }
        });
    }

    pub async fn list_invitations(&self, org_id: Uuid, requester: Uuid) -> Result<Vec<Invitation>> {
        let role = self.require_role(requester, org_id).await?;
        if !matches!(role, OrgRole::Owner | OrgRole::Admin) {
            return Err(AccountError::Forbidden(
                "Only owners and admins can list invitations".into(),
            ));
        }
        self.store.list_invitations(org_id).await
    }

    /// Look up an invitation by code and check its state, without consuming
    /// a use. Distinct failures for not-found, deactivated, expired, and
    /// exhausted.
    async fn checked_invitation(&self, code: &str) -> Result<Invitation> {
        let code = code.trim().to_ascii_uppercase();
        let invitation = self
            .store
            .find_invitation_by_code(&code)
            .await?
            .ok_or(AccountError::InvitationNotFound)?;

        if !invitation.is_active {
            return Err(AccountError::InvitationInactive);
        }
        // Expiry wins over exhaustion when both hold.
        if invitation.is_expired(self.clock.now()) {
            return Err(AccountError::InvitationExpired);
        }
        if invitation.is_exhausted() {
            return Err(AccountError::InvitationExhausted);
        }

        Ok(invitation)
    }

    /// Preview an invitation for a prospective member.
    pub async fn validate_invitation(
        &self,
        code: &str,
        requester: Option<Uuid>,
    ) -> Result<InvitationPreview> {
        let invitation = self.checked_invitation(code).await?;

        let org = self
            .store
            .find_org_by_id(invitation.organization_id)
            .await?
            .ok_or(AccountError::OrganizationNotFound)?;

        let already_member = match requester {
            Some(user_id) => self.get_role(user_id, org.id).await?.is_some(),
            None => false,
        };

        Ok(InvitationPreview {
            organization_id: org.id,
            organization_name: org.company_name,
            role: invitation.role,
            expires_at: invitation.expires_at,
            already_member,
        })
    }

    pub async fn redeem_invitation(&self, user_id: Uuid, code: &str) -> Result<Membership> {
        let invitation = self.checked_invitation(code).await?;

        let user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if let Some(target) = &invitation.target_email {
            if normalize_email(target) != normalize_email(&user.email) {
                return Err(AccountError::InvitationEmailMismatch);
            }
        }

        let existing = self
            .store
            .find_membership(user_id, invitation.organization_id)
            .await?;
        if existing.as_ref().is_some_and(|m| m.is_active) {
            return Err(AccountError::AlreadyMember);
        }

        // A concurrent redemption can still win between the check above and
        // the conditional increment; that loss reads as exhaustion.
        let membership = self
            .store
            .redeem_invitation(invitation.id, user_id, self.clock.now())
            .await?
            .ok_or(AccountError::InvitationExhausted)?;

        info!(
            org_id = %membership.organization_id,
            user_id = %user_id,
            role = membership.role.as_str(),
            "invitation redeemed"
        );

        Ok(membership)
    }

    pub async fn remove_member(
        &self,
        org_id: Uuid,
        membership_id: Uuid,
        requester: Uuid,
    ) -> Result<()> {
        let requester_role = self.require_role(requester, org_id).await?;
        if !matches!(requester_role, OrgRole::Owner | OrgRole::Admin) {
            return Err(AccountError::Forbidden(
                "Only owners and admins can remove members".into(),
            ));
        }

        let target = self
            .store
            .find_membership_by_id(membership_id)
            .await?
            .filter(|m| m.organization_id == org_id && m.is_active)
            .ok_or(AccountError::MemberNotFound)?;

        if target.user_id == requester {
            return Err(AccountError::Forbidden(
                "You cannot remove yourself from the organization".into(),
            ));
        }
        if !requester_role.outranks(target.role) {
            return Err(AccountError::Forbidden(
                "You can only remove members with a lower role than yours".into(),
            ));
        }

        self.store.deactivate_membership(membership_id).await?;
        info!(org_id = %org_id, membership_id = %membership_id, "member removed");
        Ok(())
    }

    pub async fn change_role(
        &self,
        org_id: Uuid,
        membership_id: Uuid,
        new_role: OrgRole,
        requester: Uuid,
    ) -> Result<Membership> {
        if new_role == OrgRole::Owner {
            return Err(AccountError::Forbidden(
                "The owner role cannot be assigned".into(),
            ));
        }

        let requester_role = self.require_role(requester, org_id).await?;
        if !matches!(requester_role, OrgRole::Owner | OrgRole::Admin) {
            return Err(AccountError::Forbidden(
                "Only owners and admins can change roles".into(),
            ));
        }

        let target = self
            .store
            .find_membership_by_id(membership_id)
            .await?
            .filter(|m| m.organization_id == org_id && m.is_active)
            .ok_or(AccountError::MemberNotFound)?;

        if target.user_id == requester {
            return Err(AccountError::Forbidden(
                "You cannot change your own role".into(),
            ));
        }
        if !requester_role.outranks(target.role) {
            return Err(AccountError::Forbidden(
                "You can only change roles of members below yours".into(),
            ));
        }
        if !requester_role.outranks(new_role) {
            return Err(AccountError::Forbidden(
                "You cannot assign a role at or above your own".into(),
            ));
        }

        let updated = self.store.update_membership_role(membership_id, new_role).await?;
        info!(
            org_id = %org_id,
            membership_id = %membership_id,
            role = new_role.as_str(),
            "member role changed"
        );
        Ok(updated)
    }

    pub async fn deactivate_invitation(&self, invitation_id: Uuid, requester: Uuid) -> Result<()> {
        let invitation = self
            .store
            .find_invitation_by_id(invitation_id)
            .await?
            .ok_or(AccountError::InvitationNotFound)?;

        let allowed = if invitation.created_by == requester {
            true
        } else {
            matches!(
                self.get_role(requester, invitation.organization_id).await?,
                Some(OrgRole::Owner) | Some(OrgRole::Admin)
            )
        };
        if !allowed {
            return Err(AccountError::Forbidden(
                "Only the invitation creator, owners, and admins can revoke it".into(),
            ));
        }

        self.store.deactivate_invitation(invitation_id).await?;
        info!(invitation_id = %invitation_id, "invitation deactivated");
        Ok(())
    }
}
