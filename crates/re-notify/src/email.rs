//! SMTP email delivery via `lettre`, implementing [`re_core::ports::Emailer`].
//!
//! Supports STARTTLS and implicit TLS connections: port 465 always uses
//! implicit TLS, everything else falls back to STARTTLS.

use std::collections::HashMap;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use re_core::config::SmtpConfig;
use re_core::ports::Emailer;
use re_core::RulesError;

use crate::error::NotifyError;

/// Sends [`re_core::ports::Emailer::send_email_notification`] calls through
/// a single SMTP relay, assembling header/content/footer into one body.
#[derive(Debug)]
pub struct SmtpEmailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailer {
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(cfg.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(cfg.port)
        };

        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Emailer for SmtpEmailer {
    async fn send_email_notification(
        &self,
        to: &[String],
        from: &str,
        subject: &str,
        header: &str,
        user: &str,
        content: &str,
        footer: &str,
        attachments: &HashMap<String, Vec<u8>>,
    ) -> Result<(), RulesError> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        if to.is_empty() {
            return Err(NotifyError::Config("at least one recipient is required".into()).into());
        }
        let to_mailboxes: Vec<Mailbox> = to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let body = format!("{header}\n\n{user}\n\n{content}\n\n{footer}");

        let mut builder = Message::builder().from(from_mailbox).subject(subject);
        for recipient in to_mailboxes {
            builder = builder.to(recipient);
        }

        let email = if attachments.is_empty() {
            builder
                .body(body)
                .map_err(|e| NotifyError::Smtp(e.to_string()))?
        } else {
            let mut multipart = MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(body),
            );
            for (filename, bytes) in attachments {
                multipart = multipart.singlepart(Attachment::new(filename.clone()).body(
                    bytes.clone(),
                    ContentType::parse("application/octet-stream").unwrap(),
                ));
            }
            builder
                .multipart(multipart)
                .map_err(|e| NotifyError::Smtp(e.to_string()))?
        };

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(subject = %subject, recipients = to.len(), "email notification delivered");
        Ok(())
    }
}

impl From<lettre::address::AddressError> for NotifyError {
    fn from(err: lettre::address::AddressError) -> Self {
        NotifyError::Config(err.to_string())
    }
}
