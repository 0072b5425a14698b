use anyhow::Result;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::settings::SmtpSettings;

#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
    frontend_url: String,
}

impl EmailService {
    pub fn new(smtp: &SmtpSettings, frontend_url: &str) -> Result<Self> {
        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());

        // Port 465 means implicit TLS; everything else starts plain and
        // upgrades via STARTTLS.
        let mailer: AsyncSmtpTransport<Tokio1Executor> = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
                .port(smtp.port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
                .port(smtp.port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from_email: smtp.from_email.clone(),
            from_name: smtp.from_name.clone(),
            frontend_url: frontend_url.to_string(),
        })
    }

    /// Send the password-reset link. The token itself is the credential, so
    /// it goes into the mail body and nowhere into the logs.
    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> Result<()> {
        let reset_link = format!("{}/reset-password?token={}", self.frontend_url, token);

        let body = format!(
            r#"Hi {},

You requested to reset your password. Click the link below to set a new one:

{}

This link will expire in 10 minutes.

If you didn't request a password reset, you can safely ignore this email.

The Murmur Team"#,
            username, reset_link
        );

        let from = format!("{} <{}>", self.from_name, self.from_email);

        let email = Message::builder()
            .from(from.parse()?)
            .to(to_email.parse()?)
            .subject("Reset Your Password - Murmur")
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(email).await?;

        tracing::info!("Password reset email sent to {}", to_email);
        Ok(())
    }
}
