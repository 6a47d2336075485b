/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use shared::types::Email;
use tracing::{debug, error, info};

use crate::errors::KeyserverError;
use crate::notification::{verify_key_message, verify_removal_message, ChallengeMessage, Mailer, RenderedMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpConnectionSecurity {
    None,
    Tls,
    StartTls,
}

pub struct SmtpMailer {
    connection: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    endpoint_url: String,
}

impl Debug for SmtpMailer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SmtpMailer: \n from: {:?}\n endpoint_url: {}",
            self.from, self.endpoint_url
        )
    }
}

impl SmtpMailer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: &str,
        user: &str,
        pass: &str,
        port: u16,
        from: &str,
        endpoint_url: &str,
        connection_security: SmtpConnectionSecurity,
    ) -> Result<Self, anyhow::Error> {
        let from = Mailbox::new(None, Address::from_str(from)?);
        let connection = match connection_security {
            SmtpConnectionSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            SmtpConnectionSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
            SmtpConnectionSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
        }
        .credentials(Credentials::new(user.to_string(), pass.to_string()))
        .port(port)
        .build();

        Ok(SmtpMailer {
            connection,
            from,
            endpoint_url: endpoint_url.to_string(),
        })
    }

    async fn send_mail(&self, email: &Email, message: RenderedMessage) -> Result<(), KeyserverError> {
        info!("MAILER send message: TO={} SUBJECT={}", email, message.subject);
        let to = Address::from_str(email.get_email().as_str()).map_err(|e| anyhow!(e))?;
        let mail = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to))
            .subject(message.subject)
            .body(message.body)
            .map_err(|e| anyhow!(e))?;
        match self.connection.send(mail).await {
            Ok(response) => {
                info!("MAILER send result: {:?}", response.code());
                Ok(())
            }
            Err(e) => {
                error!("MAILER failed to deliver to {}: {}", email, e);
                Err(KeyserverError::Internal(anyhow!(e)))
            }
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError> {
        let rendered = verify_key_message(self.endpoint_url.as_str(), message);
        self.send_mail(&message.email, rendered).await
    }

    async fn send_removal_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError> {
        let rendered = verify_removal_message(self.endpoint_url.as_str(), message);
        self.send_mail(&message.email, rendered).await
    }
}

#[derive(Debug)]
pub struct NoopMailer {}

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError> {
        info!("not sending verification for {} to <{}>", message.key_id, message.email);
        Ok(())
    }

    async fn send_removal_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError> {
        info!("not sending removal verification for {} to <{}>", message.key_id, message.email);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxKind {
    Verification,
    RemovalVerification,
}

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub kind: OutboxKind,
    pub message: ChallengeMessage,
    pub rendered: RenderedMessage,
}

/// Keeps the most recent [`OUTBOX_CAPACITY`] messages in memory instead of delivering them.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    endpoint_url: String,
    outbox: Arc<Mutex<VecDeque<OutboxEntry>>>,
}

pub const OUTBOX_CAPACITY: usize = 64;

impl OutboxMailer {
    pub fn new(endpoint_url: &str) -> Self {
        OutboxMailer {
            endpoint_url: endpoint_url.to_string(),
            outbox: Arc::new(Mutex::new(VecDeque::with_capacity(OUTBOX_CAPACITY))),
        }
    }

    pub fn messages(&self) -> Vec<OutboxEntry> {
        match self.outbox.lock() {
            Ok(outbox) => outbox.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn last_message(&self) -> Option<OutboxEntry> {
        self.messages().pop()
    }

    fn push(&self, kind: OutboxKind, message: &ChallengeMessage, rendered: RenderedMessage) {
        info!("OUTBOX message: TO={} SUBJECT={}", message.email, rendered.subject);
        debug!("OUTBOX body:\n{}", rendered.body);
        let entry = OutboxEntry {
            kind,
            message: message.clone(),
            rendered,
        };
        let mut outbox = match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        if outbox.len() == OUTBOX_CAPACITY {
            outbox.pop_front();
        }
        outbox.push_back(entry);
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError> {
        let rendered = verify_key_message(self.endpoint_url.as_str(), message);
        self.push(OutboxKind::Verification, message, rendered);
        Ok(())
    }

    async fn send_removal_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError> {
        let rendered = verify_removal_message(self.endpoint_url.as_str(), message);
        self.push(OutboxKind::RemovalVerification, message, rendered);
        Ok(())
    }
}
