pub mod organization;
pub mod user;

pub use organization::{
    CreateInvitationRequest, CreateOrganizationRequest, Invitation, InvitationPreview,
    JoinOrganizationRequest, MemberView, Membership, OrgRole, Organization,
    UpdateOrganizationRequest,
};
pub use user::{AuthProvider, User, UserView};
