use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// `Ok(None)` when no SMTP credentials are configured.
    pub fn from_config(config: &SmtpConfig, timeout: Duration) -> anyhow::Result<Option<Self>> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Ok(None);
        };
        if !config.is_configured() {
            return Ok(None);
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("smtp relay")?
            .port(config.port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .timeout(Some(timeout))
            .build();
        let from = config
            .from
            .as_deref()
            .unwrap_or(username)
            .parse::<Mailbox>()
            .context("parse sender address")?;

        info!(host = %config.host, port = config.port, "smtp mailer enabled");
        Ok(Some(Self { transport, from }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>().context("parse recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build message")?;
        self.transport
            .send(message)
            .await
            .context("smtp send")?;
        Ok(())
    }
}
