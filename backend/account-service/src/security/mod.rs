pub mod google;
pub mod password;
pub mod tokens;

pub use google::{FederatedClaims, FederatedTokenVerifier, GoogleTokenVerifier};
pub use tokens::{OrgContext, TokenClaims, TokenIssuer, TokenKind, TokenPair};
