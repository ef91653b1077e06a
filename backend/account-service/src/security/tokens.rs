//! Session token issuing and parsing.
//!
//! HS256 JWTs with a `token_type` discriminator. The issuer owns its keys
//! and TTLs as instance state; there are no process-wide key singletons, so
//! tests construct as many issuers as they need.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::JwtSettings;
use crate::error::{AccountError, Result};
use crate::models::OrgRole;

const RESET_TTL_HOURS: i64 = 1;
const VERIFICATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    PasswordReset,
    EmailVerification,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::PasswordReset => "password_reset",
            TokenKind::EmailVerification => "email_verification",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            "password_reset" => Some(TokenKind::PasswordReset),
            "email_verification" => Some(TokenKind::EmailVerification),
            _ => None,
        }
    }
}

/// Organization context stamped into a token when the session is scoped to
/// an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgContext {
    pub org_id: Uuid,
    pub org_role: OrgRole,
}

/// Wire claims. Ids travel as strings.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    org_role: Option<OrgRole>,
}

/// Decoded, validated token contents.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub subject: Uuid,
    pub kind: TokenKind,
    pub org: Option<OrgContext>,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: SharedClock,
}

impl TokenIssuer {
    pub fn new(settings: &JwtSettings, clock: SharedClock) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            access_ttl: Duration::minutes(settings.access_ttl_minutes),
            refresh_ttl: Duration::days(settings.refresh_ttl_days),
            clock,
        }
    }

    pub fn issue(&self, kind: TokenKind, subject: Uuid, org: Option<OrgContext>) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::PasswordReset => Duration::hours(RESET_TTL_HOURS),
            TokenKind::EmailVerification => Duration::hours(VERIFICATION_TTL_HOURS),
        };
        self.issue_with_ttl(kind, subject, org, ttl)
    }

    pub fn issue_with_ttl(
        &self,
        kind: TokenKind,
        subject: Uuid,
        org: Option<OrgContext>,
        ttl: Duration,
    ) -> Result<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type: kind.as_str().to_string(),
            org_id: org.map(|o| o.org_id.to_string()),
            org_role: org.map(|o| o.org_role),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AccountError::Internal(format!("Token signing failed: {}", e)))
    }

    /// Access + refresh pair carrying the same organization context.
    pub fn issue_pair(&self, subject: Uuid, org: Option<OrgContext>) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(TokenKind::Access, subject, org)?,
            refresh_token: self.issue(TokenKind::Refresh, subject, org)?,
            token_type: "bearer",
        })
    }

    /// Decode and validate a token.
    ///
    /// Every failure mode collapses to `InvalidToken`; checking the kind is
    /// the caller's job. Expiry is checked against the injected clock.
    pub fn parse(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AccountError::InvalidToken)?;
        let claims = data.claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(AccountError::InvalidToken);
        }

        let subject = Uuid::parse_str(&claims.sub).map_err(|_| AccountError::InvalidToken)?;
        let kind =
            TokenKind::from_str(&claims.token_type).ok_or(AccountError::InvalidToken)?;

        let org = match (claims.org_id, claims.org_role) {
            (Some(id), Some(role)) => Some(OrgContext {
                org_id: Uuid::parse_str(&id).map_err(|_| AccountError::InvalidToken)?,
                org_role: role,
            }),
            _ => None,
        };

        Ok(TokenClaims {
            subject,
            kind,
            org,
            expires_at: claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            &JwtSettings {
                secret: "unit-test-secret".into(),
                access_ttl_minutes: 30,
                refresh_ttl_days: 7,
            },
            Arc::new(SystemClock),
        )
    }

    struct FrozenClock(DateTime<Utc>);

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn round_trip_all_kinds() {
        let issuer = issuer();
        let subject = Uuid::new_v4();

        for kind in [
            TokenKind::Access,
            TokenKind::Refresh,
            TokenKind::PasswordReset,
            TokenKind::EmailVerification,
        ] {
            let token = issuer.issue(kind, subject, None).unwrap();
            let claims = issuer.parse(&token).unwrap();
            assert_eq!(claims.subject, subject);
            assert_eq!(claims.kind, kind);
            assert!(claims.org.is_none());
        }
    }

    #[test]
    fn pair_carries_org_context() {
        let issuer = issuer();
        let subject = Uuid::new_v4();
        let org = OrgContext {
            org_id: Uuid::new_v4(),
            org_role: OrgRole::Admin,
        };

        let pair = issuer.issue_pair(subject, Some(org)).unwrap();

        let access = issuer.parse(&pair.access_token).unwrap();
        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(access.org, Some(org));

        let refresh = issuer.parse(&pair.refresh_token).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(refresh.org, Some(org));
    }

    #[test]
    fn expired_token_rejected() {
        let now = Utc::now();
        let settings = JwtSettings {
            secret: "unit-test-secret".into(),
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
        };
        let past = TokenIssuer::new(&settings, Arc::new(FrozenClock(now - Duration::hours(2))));
        let present = TokenIssuer::new(&settings, Arc::new(FrozenClock(now)));

        let token = past.issue(TokenKind::Access, Uuid::new_v4(), None).unwrap();
        assert!(matches!(
            present.parse(&token),
            Err(AccountError::InvalidToken)
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let issuer = issuer();
        let other = TokenIssuer::new(
            &JwtSettings {
                secret: "a-different-secret".into(),
                access_ttl_minutes: 30,
                refresh_ttl_days: 7,
            },
            Arc::new(SystemClock),
        );

        let token = issuer.issue(TokenKind::Access, Uuid::new_v4(), None).unwrap();
        assert!(matches!(other.parse(&token), Err(AccountError::InvalidToken)));
    }

    #[test]
    fn garbage_is_invalid_token() {
        assert!(matches!(
            issuer().parse("not.a.jwt"),
            Err(AccountError::InvalidToken)
        ));
    }
}
