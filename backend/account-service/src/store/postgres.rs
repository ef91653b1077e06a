//! Postgres implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AccountError, Result};
use crate::models::{
    Invitation, MemberView, Membership, OrgRole, Organization, UpdateOrganizationRequest, User,
};
use crate::store::{
    normalize_email, AccountStore, NewFederatedUser, NewInvitation, NewOrganization, NewUser,
    OrganizationStore,
};

const CODE_INSERT_ATTEMPTS: u32 = 4;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Constraint name of a unique violation, if that is what `err` is.
fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = $1")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, auth_provider)
            VALUES ($1, $2, $3, $4, 'email')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("users_email_key") => AccountError::EmailAlreadyExists,
            _ => e.into(),
        })?;

        Ok(created)
    }

    async fn create_federated(&self, user: NewFederatedUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, full_name, auth_provider, google_id, picture_url, is_verified)
            VALUES ($1, $2, $3, 'google', $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&user.email))
        .bind(&user.full_name)
        .bind(&user.google_id)
        .bind(&user.picture_url)
        .bind(user.verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("users_email_key") => AccountError::EmailAlreadyExists,
            _ => e.into(),
        })?;

        Ok(created)
    }

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::UserNotFound)
    }

    async fn mark_verified(&self, user_id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::UserNotFound)
    }

    async fn update_federated_link(
        &self,
        user_id: Uuid,
        google_id: &str,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET google_id = $2,
                full_name = COALESCE(full_name, $3),
                picture_url = COALESCE($4, picture_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(google_id)
        .bind(full_name)
        .bind(picture_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("users_google_id_key") => AccountError::FederatedIdentityInUse,
            _ => e.into(),
        })?
        .ok_or(AccountError::UserNotFound)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                picture_url = COALESCE($3, picture_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(full_name)
        .bind(picture_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::UserNotFound)
    }

    async fn touch_last_login(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = $2, updated_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for PgStore {
    async fn create_organization(
        &self,
        org: NewOrganization,
        creator: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Organization> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations
                (id, company_name, registration_name, tax_id, company_id, vat_registered,
                 address, contact_person, contact_email, contact_phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&org.company_name)
        .bind(&org.registration_name)
        .bind(&org.tax_id)
        .bind(&org.company_id)
        .bind(org.vat_registered)
        .bind(&org.address)
        .bind(&org.contact_person)
        .bind(&org.contact_email)
        .bind(&org.contact_phone)
        .fetch_one(tx.as_mut())
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("organizations_tax_id_key") => AccountError::TaxIdAlreadyExists,
            _ => e.into(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO memberships (id, user_id, organization_id, role, joined_at)
            VALUES ($1, $2, $3, 'owner', $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(creator)
        .bind(created.id)
        .bind(now)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn find_org_by_id(&self, org_id: Uuid) -> Result<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(org)
    }

    async fn update_organization(
        &self,
        org_id: Uuid,
        changes: &UpdateOrganizationRequest,
    ) -> Result<Organization> {
        sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET company_name = COALESCE($2, company_name),
                registration_name = COALESCE($3, registration_name),
                address = COALESCE($4, address),
                contact_person = COALESCE($5, contact_person),
                contact_email = COALESCE($6, contact_email),
                contact_phone = COALESCE($7, contact_phone),
                vat_registered = COALESCE($8, vat_registered),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(org_id)
        .bind(&changes.company_name)
        .bind(&changes.registration_name)
        .bind(&changes.address)
        .bind(&changes.contact_person)
        .bind(&changes.contact_email)
        .bind(&changes.contact_phone)
        .bind(changes.vat_registered)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::OrganizationNotFound)
    }

    async fn list_user_organizations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Organization, Membership)>> {
        let memberships = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 AND is_active = TRUE ORDER BY joined_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let org_ids: Vec<Uuid> = memberships.iter().map(|m| m.organization_id).collect();
        let orgs = sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE id = ANY($1)",
        )
        .bind(&org_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: std::collections::HashMap<Uuid, Organization> =
            orgs.into_iter().map(|o| (o.id, o)).collect();

        Ok(memberships
            .into_iter()
            .filter_map(|m| by_id.remove(&m.organization_id).map(|o| (o, m)))
            .collect())
    }

    async fn find_membership(&self, user_id: Uuid, org_id: Uuid) -> Result<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 AND organization_id = $2",
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    async fn find_membership_by_id(&self, membership_id: Uuid) -> Result<Option<Membership>> {
        let membership =
            sqlx::query_as::<_, Membership>("SELECT * FROM memberships WHERE id = $1")
                .bind(membership_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(membership)
    }

    async fn list_members(&self, org_id: Uuid) -> Result<Vec<MemberView>> {
        let members = sqlx::query_as::<_, MemberView>(
            r#"
            SELECT m.id AS membership_id, m.user_id, u.email, u.full_name,
                   m.role, m.joined_at, m.is_active
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.organization_id = $1 AND m.is_active = TRUE
            ORDER BY m.joined_at
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn deactivate_membership(&self, membership_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE memberships SET is_active = FALSE WHERE id = $1")
            .bind(membership_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_membership_role(
        &self,
        membership_id: Uuid,
        role: OrgRole,
    ) -> Result<Membership> {
        sqlx::query_as::<_, Membership>(
            "UPDATE memberships SET role = $2 WHERE id = $1 RETURNING *",
        )
        .bind(membership_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::MemberNotFound)
    }

    async fn create_invitation(&self, invitation: NewInvitation) -> Result<Invitation> {
        // Codes are short, so collisions are possible; retry a few times on
        // the unique index.
        for _ in 0..CODE_INSERT_ATTEMPTS {
            let code = Invitation::generate_code();
            let inserted = sqlx::query_as::<_, Invitation>(
                r#"
                INSERT INTO invitations
                    (id, organization_id, code, created_by, target_email, role, expires_at, max_uses)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (code) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invitation.organization_id)
            .bind(&code)
            .bind(invitation.created_by)
            .bind(&invitation.target_email)
            .bind(invitation.role)
            .bind(invitation.expires_at)
            .bind(invitation.max_uses)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(created) = inserted {
                return Ok(created);
            }
        }

        Err(AccountError::Internal(
            "Failed to generate a unique invitation code".into(),
        ))
    }

    async fn find_invitation_by_code(&self, code: &str) -> Result<Option<Invitation>> {
        let invitation =
            sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        Ok(invitation)
    }

    async fn find_invitation_by_id(&self, invitation_id: Uuid) -> Result<Option<Invitation>> {
        let invitation = sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE id = $1")
            .bind(invitation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invitation)
    }

    async fn list_invitations(&self, org_id: Uuid) -> Result<Vec<Invitation>> {
        let invitations = sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE organization_id = $1 ORDER BY created_at DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(invitations)
    }

    async fn deactivate_invitation(&self, invitation_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE invitations SET is_active = FALSE WHERE id = $1")
            .bind(invitation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn redeem_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>> {
        let mut tx = self.pool.begin().await?;

        // Conditional increment: zero rows means a concurrent redemption got
        // there first (or the invitation expired or was deactivated).
        let consumed = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET use_count = use_count + 1
            WHERE id = $1
              AND is_active = TRUE
              AND expires_at > $2
              AND (max_uses IS NULL OR use_count < max_uses)
            RETURNING *
            "#,
        )
        .bind(invitation_id)
        .bind(now)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(invitation) = consumed else {
            return Ok(None);
        };

        let membership = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (id, user_id, organization_id, role, joined_at, invited_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, organization_id) DO UPDATE
            SET is_active = TRUE,
                role = EXCLUDED.role,
                joined_at = EXCLUDED.joined_at,
                invited_by = EXCLUDED.invited_by
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(invitation.organization_id)
        .bind(invitation.role)
        .bind(now)
        .bind(invitation.created_by)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;

        Ok(Some(membership))
    }
}
