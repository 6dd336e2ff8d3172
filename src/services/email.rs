//! Outgoing mail
//!
//! Messages carry a plain-text and an HTML alternative. Without an SMTP host
//! configured the service only logs what it would have sent, which keeps
//! local development and tests free of a mail server.

use crate::config::{AppConfig, EmailConfig};
use anyhow::{anyhow, Result};
use lettre::{
    message::{MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .code { font-size: 32px; font-weight: bold; color: #4F46E5; letter-spacing: 5px;
                text-align: center; padding: 20px; background: #F3F4F6; border-radius: 8px; }
        .button { display: inline-block; padding: 12px 24px; background: #4F46E5;
                  color: white; text-decoration: none; border-radius: 6px; margin: 20px 0; }
        .footer { margin-top: 30px; font-size: 12px; color: #666; }
"#;

/// A rendered message, ready to send
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct EmailService {
    config: EmailConfig,
    app_name: String,
    code_expire_minutes: i64,
    reset_expire_minutes: i64,
}

impl EmailService {
    pub fn new(
        config: EmailConfig,
        app: &AppConfig,
        code_expire_minutes: i64,
        reset_expire_minutes: i64,
    ) -> Self {
        Self {
            config,
            app_name: app.name.clone(),
            code_expire_minutes,
            reset_expire_minutes,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn wrap_html(&self, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n    <style>{}</style>\n</head>\n<body>\n    <div class=\"container\">\n{}\n        <div class=\"footer\">\n            <p>Best regards,<br>{} Team</p>\n        </div>\n    </div>\n</body>\n</html>\n",
            STYLE, body, self.app_name
        )
    }

    pub fn verification_email(&self, username: &str, code: &str) -> EmailContent {
        let body = format!(
            r#"        <h2>Welcome to {app}!</h2>
        <p>Hi {user},</p>
        <p>Thank you for registering. Please verify your email address using the code below:</p>
        <div class="code">{code}</div>
        <p>This code will expire in {minutes} minutes.</p>
        <p>If you didn't create an account, please ignore this email.</p>"#,
            app = self.app_name,
            user = username,
            code = code,
            minutes = self.code_expire_minutes,
        );

        EmailContent {
            subject: format!("Verify your email - {}", self.app_name),
            text: format!(
                "Hi {},\n\nYour verification code is: {}\n\nThis code will expire in {} minutes.\n\nIf you didn't create an account, please ignore this email.\n\n{} Team",
                username, code, self.code_expire_minutes, self.app_name
            ),
            html: self.wrap_html(&body),
        }
    }

    pub fn welcome_email(&self, username: &str) -> EmailContent {
        let body = format!(
            r#"        <h2>Welcome to {app}!</h2>
        <p>Hi {user},</p>
        <p>Your email has been verified successfully! You can now enjoy all features of our platform:</p>
        <ul>
            <li>Upload and share photos</li>
            <li>Follow other users</li>
            <li>Like and comment on photos</li>
            <li>Chat with other users</li>
        </ul>
        <p>Start exploring and sharing your amazing photos!</p>"#,
            app = self.app_name,
            user = username,
        );

        EmailContent {
            subject: format!("Welcome to {}!", self.app_name),
            text: format!(
                "Hi {},\n\nYour email has been verified successfully! You can now upload photos, follow other users, like and comment on photos and chat with other users.\n\n{} Team",
                username, self.app_name
            ),
            html: self.wrap_html(&body),
        }
    }

    pub fn password_reset_email(&self, username: &str, reset_link: &str) -> EmailContent {
        let body = format!(
            r#"        <h2>Password Reset Request</h2>
        <p>Hi {user},</p>
        <p>We received a request to reset your password. Click the button below to reset it:</p>
        <a href="{link}" class="button">Reset Password</a>
        <p>Or copy and paste this link into your browser:</p>
        <p style="word-break: break-all; color: #4F46E5;">{link}</p>
        <p>This link will expire in {minutes} minutes.</p>
        <p>If you didn't request a password reset, please ignore this email.</p>"#,
            user = username,
            link = reset_link,
            minutes = self.reset_expire_minutes,
        );

        EmailContent {
            subject: format!("Reset your password - {}", self.app_name),
            text: format!(
                "Hi {},\n\nReset your password using this link:\n{}\n\nThis link will expire in {} minutes.\n\nIf you didn't request a password reset, please ignore this email.\n\n{} Team",
                username, reset_link, self.reset_expire_minutes, self.app_name
            ),
            html: self.wrap_html(&body),
        }
    }

    pub async fn send(&self, to_email: &str, content: &EmailContent) -> Result<()> {
        let Some(smtp_host) = self.config.smtp_host.as_deref().filter(|h| !h.is_empty()) else {
            tracing::info!(
                to = to_email,
                subject = %content.subject,
                "SMTP not configured, email not sent:\n{}",
                content.text
            );
            return Ok(());
        };

        let email = Message::builder()
            .from(
                self.config
                    .sender()
                    .parse()
                    .map_err(|e| anyhow!("Invalid from address: {}", e))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(content.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(content.text.clone()))
                    .singlepart(SinglePart::html(content.html.clone())),
            )
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.config.smtp_port);

        if let (Some(user), Some(password)) = (&self.config.smtp_user, &self.config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        builder
            .build()
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::info!(to = to_email, subject = %content.subject, "Email sent");
        Ok(())
    }
}
