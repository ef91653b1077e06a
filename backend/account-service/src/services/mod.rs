pub mod auth;
pub mod email;
pub mod organization;

pub use auth::{AuthResponse, AuthService};
pub use email::EmailService;
pub use organization::{OrganizationService, UserOrganization};
