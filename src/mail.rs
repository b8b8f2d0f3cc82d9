use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::config::SmtpConfig;

/// Outbound mail seam. Production uses SMTP; tests inject a no-op.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let builder = if cfg.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
        };
        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }
}

fn verification_body(code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; font-size: 16px; color: #333;">
  <h2>Welcome to Passlab!</h2>
  <p>Use the verification code below to activate your account:</p>
  <p style="background-color: #f0f0f0; border-radius: 5px; padding: 12px 20px; font-size: 28px; font-weight: bold; letter-spacing: 3px; text-align: center;">
    {code}
  </p>
  <p>This code expires in <strong>10 minutes</strong>.</p>
  <p>If you did not request this code, you can ignore this email.</p>
</div>"#
    )
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("parse SMTP from address")?)
            .to(to.parse().context("parse recipient address")?)
            .subject("Your Passlab verification code")
            .header(ContentType::TEXT_HTML)
            .body(verification_body(code))
            .context("build verification email")?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!(to = %to, "verification email sent");
                Ok(())
            }
            Err(e) => {
                error!(to = %to, error = %e, "verification email failed");
                Err(anyhow::anyhow!("could not send verification email: {e}"))
            }
        }
    }
}
