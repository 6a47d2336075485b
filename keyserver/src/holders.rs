/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use keyserver_lib::notification::mailer::{NoopMailer, OutboxMailer, SmtpMailer};
use keyserver_lib::notification::Mailer;
use tracing::warn;

use crate::config::KeyserverConfig;

#[derive(Debug)]
pub enum MailerHolder {
    NoopMailer(),
    OutboxMailer(OutboxMailer),
    SmtpMailer(SmtpMailer),
}

impl MailerHolder {
    pub(crate) fn from_config(config: &KeyserverConfig) -> Result<Self, anyhow::Error> {
        if config.disable_notifications {
            return Ok(MailerHolder::NoopMailer());
        }
        Ok(match &config.smtp {
            None => {
                warn!("no smtp server configured, notifications are only logged and kept in memory");
                MailerHolder::OutboxMailer(OutboxMailer::new(config.external_url.as_str()))
            }
            Some(smtp) => MailerHolder::SmtpMailer(SmtpMailer::new(
                smtp.host.as_str(),
                smtp.user.as_str(),
                smtp.pass.as_str(),
                smtp.port,
                smtp.from.as_str(),
                config.external_url.as_str(),
                smtp.security,
            )?),
        })
    }

    pub(crate) fn get_mailer(&self) -> &dyn Mailer {
        match self {
            MailerHolder::NoopMailer() => &NoopMailer {},
            MailerHolder::OutboxMailer(o) => o,
            MailerHolder::SmtpMailer(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MailerHolder;
    use crate::config::KeyserverConfig;

    fn config(disable_notifications: bool) -> KeyserverConfig {
        KeyserverConfig {
            external_url: "https://keys.example.org".to_string(),
            smtp: None,
            disable_notifications,
        }
    }

    #[test]
    fn outbox_without_smtp() {
        let holder = MailerHolder::from_config(&config(false)).unwrap();
        assert!(matches!(holder, MailerHolder::OutboxMailer(_)));
    }

    #[test]
    fn disabled_notifications_use_noop() {
        let holder = MailerHolder::from_config(&config(true)).unwrap();
        assert!(matches!(holder, MailerHolder::NoopMailer()));
    }
}
