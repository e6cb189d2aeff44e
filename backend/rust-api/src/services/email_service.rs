use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::config::MailSettings;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    settings: MailSettings,
}

impl SmtpMailer {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(self.settings.login.clone(), self.settings.password.clone());

        let builder = if self.settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.settings.server)
                .context("Invalid SMTP server for TLS")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.settings.server)
        }
        .port(self.settings.port)
        .credentials(creds);

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let from_address: Mailbox = format!(
            "{} <{}>",
            self.settings.from_name, self.settings.from_email
        )
        .parse()
        .context("Invalid from email address")?;
        let to_address: Mailbox = format!("{} <{}>", email.to_name, email.to_email)
            .parse()
            .context("Invalid recipient email address")?;

        let message = Message::builder()
            .from(from_address)
            .to(to_address)
            .subject(email.subject)
            .body(email.body)
            .context("Failed to build email message")?;

        self.build_transport()?
            .send(message)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}

/// Writes the message to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to_email,
            subject = %email.subject,
            "Email sending disabled, message not delivered"
        );
        tracing::debug!(body = %email.body, "Suppressed email body");
        Ok(())
    }
}

pub fn sending_disabled() -> bool {
    std::env::var("EMAIL_SEND_DISABLED")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Picks the mailer for the current environment.
pub fn mailer_from_settings(settings: &MailSettings) -> Box<dyn Mailer> {
    if sending_disabled() || settings.server.trim().is_empty() {
        Box::new(LogMailer)
    } else {
        Box::new(SmtpMailer::new(settings.clone()))
    }
}

pub fn reset_code_email(to_email: &str, to_name: &str, code: &str) -> OutgoingEmail {
    OutgoingEmail {
        to_email: to_email.to_string(),
        to_name: to_name.to_string(),
        subject: "Sicegah - Kode Reset Password".to_string(),
        body: format!(
            "Halo {},\n\n\
             Kami menerima permintaan untuk mereset password akun Anda. \
             Gunakan kode berikut untuk melanjutkan proses reset password:\n\n\
             {}\n\n\
             Kode ini berlaku selama 15 menit. Jangan bagikan kode ini kepada siapapun. \
             Jika Anda tidak meminta reset password, abaikan email ini.\n\n\
             Salam,\nTim Sicegah\n",
            to_name, code
        ),
    }
}
