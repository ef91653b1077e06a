use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Length of generated invitation codes.
pub const INVITATION_CODE_LEN: usize = 8;

/// Invitations always expire this long after creation; the value is not
/// caller-configurable.
pub const INVITATION_TTL_MINUTES: i64 = 30;

/// Membership role inside an organization.
///
/// Authority is an explicit rank, not declaration order: `owner` outranks
/// everyone, `viewer` outranks no one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "org_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Owner,
    Admin,
    Accountant,
    Member,
    Viewer,
}

impl OrgRole {
    /// Rank within the hierarchy; lower number means higher authority.
    pub fn authority(&self) -> u8 {
        match self {
            OrgRole::Owner => 0,
            OrgRole::Admin => 1,
            OrgRole::Accountant => 2,
            OrgRole::Member => 3,
            OrgRole::Viewer => 4,
        }
    }

    /// Whether `self` strictly outranks `other`.
    pub fn outranks(&self, other: OrgRole) -> bool {
        self.authority() < other.authority()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Owner => "owner",
            OrgRole::Admin => "admin",
            OrgRole::Accountant => "accountant",
            OrgRole::Member => "member",
            OrgRole::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(OrgRole::Owner),
            "admin" => Some(OrgRole::Admin),
            "accountant" => Some(OrgRole::Accountant),
            "member" => Some(OrgRole::Member),
            "viewer" => Some(OrgRole::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Organization {
    pub id: Uuid,
    pub company_name: String,
    pub registration_name: String,
    pub tax_id: String,
    pub company_id: String,
    pub vat_registered: bool,
    pub address: String,
    pub contact_person: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership row. One row per (user, organization); removal flips
/// `is_active` off and a later re-invite flips it back on the same row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: OrgRole,
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<Uuid>,
    pub is_active: bool,
}

/// Membership joined with account details, for member listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MemberView {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: OrgRole,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invitation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub code: String,
    pub created_by: Uuid,
    pub target_email: Option<String>,
    pub role: OrgRole,
    pub expires_at: DateTime<Utc>,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        match self.max_uses {
            Some(max) => self.use_count >= max,
            None => false,
        }
    }

    /// Expiry for an invitation created at `now`.
    pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(INVITATION_TTL_MINUTES)
    }

    /// Random uppercase alphanumeric code. Uniqueness is enforced by the
    /// store (unique index plus conflict retry), not here.
    pub fn generate_code() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(INVITATION_CODE_LEN)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect()
    }
}

/// What a prospective member sees when previewing an invitation code.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationPreview {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub role: OrgRole,
    pub expires_at: DateTime<Utc>,
    pub already_member: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 255))]
    pub company_name: String,
    #[validate(length(min = 1, max = 255))]
    pub registration_name: String,
    #[validate(length(min = 1, max = 13))]
    pub tax_id: String,
    #[validate(length(min = 1, max = 20))]
    pub company_id: String,
    #[serde(default = "default_true")]
    pub vat_registered: bool,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 255))]
    pub contact_person: String,
    #[validate(email)]
    pub contact_email: String,
    #[validate(length(min = 1, max = 50))]
    pub contact_phone: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 255))]
    pub company_name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub registration_name: Option<String>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub contact_person: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub contact_phone: Option<String>,
    pub vat_registered: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    pub role: OrgRole,
    #[validate(email)]
    pub target_email: Option<String>,
    /// Defaults to single-use; explicit null means unlimited.
    #[serde(default = "default_max_uses")]
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
}

fn default_max_uses() -> Option<i32> {
    Some(1)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JoinOrganizationRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_ranks_match_hierarchy() {
        assert!(OrgRole::Owner.outranks(OrgRole::Admin));
        assert!(OrgRole::Admin.outranks(OrgRole::Accountant));
        assert!(OrgRole::Accountant.outranks(OrgRole::Member));
        assert!(OrgRole::Member.outranks(OrgRole::Viewer));
        assert!(!OrgRole::Admin.outranks(OrgRole::Admin));
        assert!(!OrgRole::Viewer.outranks(OrgRole::Owner));
    }

    #[test]
    fn generated_codes_are_uppercase_alphanumeric() {
        let code = Invitation::generate_code();
        assert_eq!(code.len(), INVITATION_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn exhaustion_checks_max_uses() {
        let now = Utc::now();
        let mut inv = Invitation {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            code: "ABCD1234".into(),
            created_by: Uuid::new_v4(),
            target_email: None,
            role: OrgRole::Member,
            expires_at: Invitation::expiry_from(now),
            max_uses: Some(1),
            use_count: 0,
            is_active: true,
            created_at: now,
        };
        assert!(!inv.is_exhausted());
        inv.use_count = 1;
        assert!(inv.is_exhausted());

        inv.max_uses = None;
        inv.use_count = 1_000;
        assert!(!inv.is_exhausted());
    }

    #[test]
    fn expiry_is_thirty_minutes_out() {
        let now = Utc::now();
        let expires = Invitation::expiry_from(now);
        assert_eq!(expires - now, Duration::minutes(30));
    }
}
