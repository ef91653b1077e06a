/// Authentication orchestrator: password and federated sign-in, session
/// issuing and refresh, organization context switching, and the password
/// and email-verification lifecycles.
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{AccountError, Result};
use crate::models::{User, UserView};
use crate::security::password::{hash_password, verify_password};
use crate::security::{
    FederatedTokenVerifier, OrgContext, TokenIssuer, TokenKind, TokenPair,
};
use crate::services::email::EmailService;
use crate::store::{AccountStore, NewFederatedUser, NewUser, OrganizationStore};

/// A signed-in session: the account plus its token pair.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    orgs: Arc<dyn OrganizationStore>,
    tokens: TokenIssuer,
    verifier: Arc<dyn FederatedTokenVerifier>,
    email: EmailService,
    clock: SharedClock,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        orgs: Arc<dyn OrganizationStore>,
        tokens: TokenIssuer,
        verifier: Arc<dyn FederatedTokenVerifier>,
        email: EmailService,
        clock: SharedClock,
    ) -> Self {
        Self {
            accounts,
            orgs,
            tokens,
            verifier,
            email,
            clock,
        }
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.tokens
    }

    async fn signed_in(&self, mut user: User) -> Result<AuthResponse> {
        let now = self.clock.now();
        self.accounts.touch_last_login(user.id, now).await?;
        user.last_login_at = Some(now);

        Ok(AuthResponse {
            tokens: self.tokens.issue_pair(user.id, None)?,
            user: UserView::from(&user),
        })
    }

    /// Password login. Failure reasons stay distinct: unknown address,
    /// federated-only account, wrong password, inactive account.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let user = self
            .accounts
            .find_by_email(email)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AccountError::PasswordLoginUnavailable)?;

        if !verify_password(password, hash)? {
            return Err(AccountError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AccountError::AccountInactive);
        }

        info!(user_id = %user.id, "password login");
        self.signed_in(user).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<AuthResponse> {
        let password_hash = hash_password(password)?;

        if self.accounts.find_by_email(email).await?.is_some() {
            return Err(AccountError::EmailAlreadyExists);
        }

        let user = self
            .accounts
            .create(NewUser {
                email: email.to_string(),
                password_hash,
                full_name,
            })
            .await?;

        info!(user_id = %user.id, "account registered");
        self.send_verification(&user);

        self.signed_in(user).await
    }

    /// Fire-and-forget verification email; a failed send never fails the
    /// calling operation.
    fn send_verification(&self, user: &User) {
        let token = match self
            .tokens
            .issue(TokenKind::EmailVerification, user.id, None)
        {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to issue verification token: {}", e);
                return;
            }
        };

        let email = self.email.clone();
        let recipient = user.email.clone();
        tokio::spawn(async move {
            if let Err(e) = email.send_verification_email(&recipient, &token).await {
                warn!("Failed to send verification email: {}", e);
            }
        });
    }

    /// Federated sign-in. Matches by provider subject first, then by email
    /// (auto-linking the identity), and creates the account otherwise.
    pub async fn federated_auth(&self, credential: &str) -> Result<AuthResponse> {
        let claims = self.verifier.verify(credential).await?;

        if !claims.email_verified {
            return Err(AccountError::EmailNotVerifiedByProvider);
        }

        let user = match self.accounts.find_by_google_id(&claims.subject).await? {
            Some(user) => user,
            None => match self.accounts.find_by_email(&claims.email).await? {
                Some(existing) => {
                    info!(user_id = %existing.id, "linking federated identity to existing account");
                    self.accounts
                        .update_federated_link(
                            existing.id,
                            &claims.subject,
                            claims.name.as_deref(),
                            claims.picture.as_deref(),
                        )
                        .await?
                }
                None => {
                    let created = self
                        .accounts
                        .create_federated(NewFederatedUser {
                            email: claims.email.clone(),
                            google_id: claims.subject.clone(),
                            full_name: claims.name.clone(),
                            picture_url: claims.picture.clone(),
                            verified: true,
                        })
                        .await?;
                    info!(user_id = %created.id, "account created from federated identity");
                    created
                }
            },
        };

        if !user.is_active {
            return Err(AccountError::AccountInactive);
        }

        let user = if user.is_verified {
            user
        } else {
            // The provider vouched for the address.
            self.accounts.mark_verified(user.id).await?
        };

        self.signed_in(user).await
    }

    /// Attach a federated identity to an already-authenticated account.
    pub async fn link_federated(&self, user_id: Uuid, credential: &str) -> Result<UserView> {
        let claims = self.verifier.verify(credential).await?;

        if let Some(other) = self.accounts.find_by_google_id(&claims.subject).await? {
            if other.id != user_id {
                return Err(AccountError::FederatedIdentityInUse);
            }
        }

        let user = self
            .accounts
            .update_federated_link(
                user_id,
                &claims.subject,
                claims.name.as_deref(),
                claims.picture.as_deref(),
            )
            .await?;

        info!(user_id = %user.id, "federated identity linked");
        Ok(UserView::from(&user))
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserView> {
        let user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        Ok(UserView::from(&user))
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<UserView> {
        let user = self
            .accounts
            .update_profile(user_id, full_name, picture_url)
            .await?;
        Ok(UserView::from(&user))
    }

    /// Issue a pair scoped to an organization the user is an active member
    /// of. The previously issued pair is not invalidated.
    pub async fn switch_organization(&self, user_id: Uuid, org_id: Uuid) -> Result<TokenPair> {
        let membership = self
            .orgs
            .find_membership(user_id, org_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| {
                AccountError::Forbidden("Not a member of this organization".into())
            })?;

        self.tokens.issue_pair(
            user_id,
            Some(OrgContext {
                org_id,
                org_role: membership.role,
            }),
        )
    }

    /// First-time password for a federated-only account.
    pub async fn set_password(&self, user_id: Uuid, password: &str, confirm: &str) -> Result<()> {
        if password != confirm {
            return Err(AccountError::PasswordMismatch);
        }

        let user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        if user.has_password() {
            return Err(AccountError::PasswordAlreadySet);
        }

        let hash = hash_password(password)?;
        self.accounts.set_password(user_id, &hash).await?;
        info!(user_id = %user_id, "password set");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<()> {
        if new != confirm {
            return Err(AccountError::PasswordMismatch);
        }

        let user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        let hash = user.password_hash.as_deref().ok_or(AccountError::NoPasswordSet)?;

        if !verify_password(current, hash)? {
            return Err(AccountError::InvalidCredentials);
        }

        let new_hash = hash_password(new)?;
        self.accounts.set_password(user_id, &new_hash).await?;
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// Unauthenticated reset request. Always succeeds so the response does
    /// not reveal whether the address has an account; the email goes out
    /// only when it does.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let Some(user) = self.accounts.find_by_email(email).await? else {
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        let token = self.tokens.issue(TokenKind::PasswordReset, user.id, None)?;
        if let Err(e) = self.email.send_password_reset_email(&user.email, &token).await {
            warn!("Failed to send password reset email: {}", e);
        }
        Ok(())
    }

    /// Authenticated reset request. Unlike [`forgot_password`] there is
    /// nothing to hide, so a failed send surfaces as a server error.
    ///
    /// [`forgot_password`]: AuthService::forgot_password
    pub async fn request_password_reset(&self, user_id: Uuid) -> Result<()> {
        let user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        let token = self.tokens.issue(TokenKind::PasswordReset, user.id, None)?;
        self.email.send_password_reset_email(&user.email, &token).await?;
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, password: &str, confirm: &str) -> Result<()> {
        if password != confirm {
            return Err(AccountError::PasswordMismatch);
        }

        let claims = self.tokens.parse(token)?;
        if claims.kind != TokenKind::PasswordReset {
            return Err(AccountError::InvalidToken);
        }

        let user = self
            .accounts
            .find_by_id(claims.subject)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        let hash = hash_password(password)?;
        self.accounts.set_password(user.id, &hash).await?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> Result<UserView> {
        let claims = self.tokens.parse(token)?;
        if claims.kind != TokenKind::EmailVerification {
            return Err(AccountError::InvalidToken);
        }

        let user = self
            .accounts
            .find_by_id(claims.subject)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        if user.is_verified {
            return Err(AccountError::AlreadyVerified);
        }

        let user = self.accounts.mark_verified(user.id).await?;
        info!(user_id = %user.id, "email verified");
        Ok(UserView::from(&user))
    }

    pub async fn resend_verification(&self, user_id: Uuid) -> Result<()> {
        let user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AccountError::UserNotFound)?;
        if user.is_verified {
            return Err(AccountError::AlreadyVerified);
        }

        let token = self
            .tokens
            .issue(TokenKind::EmailVerification, user.id, None)?;
        self.email.send_verification_email(&user.email, &token).await?;
        Ok(())
    }

    /// Exchange a refresh token for a new pair. The organization context of
    /// the old token carries over; the old pair stays valid until expiry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.tokens.parse(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AccountError::InvalidToken);
        }

        let user = self
            .accounts
            .find_by_id(claims.subject)
            .await?
            .ok_or(AccountError::InvalidToken)?;
        if !user.is_active {
            return Err(AccountError::AccountInactive);
        }

        self.tokens.issue_pair(user.id, claims.org)
    }
}
