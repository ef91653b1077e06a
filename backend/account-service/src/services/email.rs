/// Outbound email: account verification, password reset, organization
/// invitations.
use crate::config::EmailSettings;
use crate::error::{AccountError, Result};
use crate::models::OrgRole;
use lettre::message::{header, Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// Mask an email address for logging: keep the first character of the
/// local part and the full domain.
fn mask_email(email: &str) -> String {
    match email.find('@') {
        Some(at_pos) => {
            let local = &email[..at_pos];
            let domain = &email[at_pos..];
            if local.chars().count() <= 2 {
                format!("**{}", domain)
            } else {
                let first: String = local.chars().take(1).collect();
                format!("{}***{}", first, domain)
            }
        }
        None => "***@***".to_string(),
    }
}

/// Async email transport wrapper (SMTP or no-op)
#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    frontend_base_url: String,
}

impl EmailService {
    /// Build email service from configuration.
    ///
    /// Without an SMTP host it operates in no-op mode (logs only), which is
    /// what development and CI run with.
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| AccountError::Internal(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = match &config.smtp_host {
            Some(host) if !host.trim().is_empty() => {
                let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| {
                        AccountError::Internal(format!("Failed to configure SMTP transport: {}", e))
                    })?
                    .port(config.smtp_port);

                let builder = if let (Some(username), Some(password)) =
                    (&config.smtp_username, &config.smtp_password)
                {
                    builder
                        .credentials(Credentials::new(username.to_string(), password.to_string()))
                } else {
                    builder
                };

                Some(Arc::new(builder.build()))
            }
            _ => {
                warn!("SMTP host not configured; email service will operate in no-op mode");
                None
            }
        };

        Ok(Self {
            transport,
            from,
            frontend_base_url: config.frontend_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Send the email-verification link.
    pub async fn send_verification_email(&self, recipient: &str, token: &str) -> Result<()> {
        let link = format!("{}/verify-email?token={}", self.frontend_base_url, token);
        let subject = "Verify your email address";
        let body = format!(
            "Welcome!\n\nPlease open the following link to verify your email address:\n{}\n\n\
            The link is valid for 24 hours. If you did not create an account, ignore this email.",
            link
        );
        self.send_mail(recipient, subject, &body).await
    }

    /// Send the password-reset link.
    pub async fn send_password_reset_email(&self, recipient: &str, token: &str) -> Result<()> {
        let link = format!("{}/reset-password?token={}", self.frontend_base_url, token);
        let subject = "Password reset";

        let html_body = format!(
            r#"<html>
<body style="font-family: sans-serif; padding: 20px; color: #333;">
    <h2>Password reset</h2>
    <p>We received a request to reset the password for this account.</p>
    <p style="margin: 30px 0;">
        <a href="{link}" style="background-color: #1a73e8; color: #fff; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block;">Reset password</a>
    </p>
    <p style="color: #666; font-size: 14px;">
        If the button does not work, copy this link into your browser:<br>
        <a href="{link}">{link}</a>
    </p>
    <p style="color: #999; font-size: 12px; margin-top: 30px;">
        This link expires in 1 hour. If you did not request a reset, ignore this email.
    </p>
</body>
</html>"#
        );

        let text_body = format!(
            "We received a request to reset the password for this account.\n\n\
            Open the following link to choose a new password:\n{}\n\n\
            This link expires in 1 hour. If you did not request a reset, ignore this email.",
            link
        );

        self.send_html_email(recipient, subject, &html_body, &text_body)
            .await
    }

    /// Send an organization invitation. The copy differs slightly for
    /// recipients who already have an account versus those who must
    /// register first.
    pub async fn send_invitation_email(
        &self,
        recipient: &str,
        organization_name: &str,
        inviter_name: &str,
        role: OrgRole,
        code: &str,
        recipient_has_account: bool,
    ) -> Result<()> {
        let link = format!("{}/join?code={}", self.frontend_base_url, code);
        let subject = format!("Invitation to join {}", organization_name);

        let action = if recipient_has_account {
            "Sign in and open the link below to accept the invitation."
        } else {
            "Create an account, then open the link below to accept the invitation."
        };

        let body = format!(
            "{inviter} invited you to join {org} as {role}.\n\n\
            {action}\n{link}\n\n\
            Invitation code: {code}\n\
            The invitation expires 30 minutes after it was issued.",
            inviter = inviter_name,
            org = organization_name,
            role = role.as_str(),
            action = action,
            link = link,
            code = code,
        );

        self.send_mail(recipient, &subject, &body).await
    }

    async fn send_mail(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if let Some(transport) = &self.transport {
            let to = recipient
                .parse::<Mailbox>()
                .map_err(|e| AccountError::Email(format!("Invalid recipient address: {}", e)))?;

            let email = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .header(header::ContentType::TEXT_PLAIN)
                .body(body.to_string())
                .map_err(|e| AccountError::Email(format!("Failed to build message: {}", e)))?;

            transport
                .send(email)
                .await
                .map_err(|e| AccountError::Email(format!("Failed to send email: {}", e)))?;
            info!(subject, "email sent");
        } else {
            info!(subject, recipient = %mask_email(recipient), "no-op email mode; skipping send");
        }
        Ok(())
    }

    /// HTML email with plain-text fallback.
    async fn send_html_email(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        if let Some(transport) = &self.transport {
            let to = recipient
                .parse::<Mailbox>()
                .map_err(|e| AccountError::Email(format!("Invalid recipient address: {}", e)))?;

            let email = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .multipart(MultiPart::alternative_plain_html(
                    text_body.to_string(),
                    html_body.to_string(),
                ))
                .map_err(|e| AccountError::Email(format!("Failed to build message: {}", e)))?;

            transport
                .send(email)
                .await
                .map_err(|e| AccountError::Email(format!("Failed to send email: {}", e)))?;
            info!(subject, "email sent");
        } else {
            info!(subject, recipient = %mask_email(recipient), "no-op email mode; skipping send");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_keeps_only_first_local_char_and_domain() {
        assert_eq!(mask_email("pipo.jordanoski@gmail.com"), "p***@gmail.com");
        assert_eq!(mask_email("ab@example.com"), "**@example.com");
        assert_eq!(mask_email("not-an-address"), "***@***");
    }
}
