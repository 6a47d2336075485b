/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::{Debug, Formatter};

use keyserver_lib::notification::mailer::SmtpConnectionSecurity;
use serde::Deserialize;

/// The `keyserver` table of the Rocket configuration.
#[derive(Debug, Deserialize)]
pub struct KeyserverConfig {
    /// Base URL used for links in notification emails.
    pub external_url: String,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Drops notifications instead of delivering or logging them.
    #[serde(default)]
    pub disable_notifications: bool,
}

#[derive(Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from: String,
    #[serde(default = "default_smtp_security")]
    pub security: SmtpConnectionSecurity,
}

impl Debug for SmtpConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SmtpConfig: {{host: {}, user: {}, pass: <REDACTED>, port: {}, from: {}, security: {:?}}}",
            self.host, self.user, self.port, self.from, self.security
        )
    }
}

fn default_smtp_port() -> u16 {
    465
}

fn default_smtp_security() -> SmtpConnectionSecurity {
    SmtpConnectionSecurity::Tls
}

#[cfg(test)]
mod tests {
    use keyserver_lib::notification::mailer::SmtpConnectionSecurity;
    use rocket::figment::providers::{Format, Toml};
    use rocket::figment::Figment;

    use super::KeyserverConfig;

    #[test]
    fn smtp_table_is_optional() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [keyserver]
            external_url = "https://keys.example.org"
            "#,
        ));
        let config: KeyserverConfig = figment.extract_inner("keyserver").unwrap();
        assert_eq!(config.external_url, "https://keys.example.org");
        assert!(config.smtp.is_none());
        assert!(!config.disable_notifications);
    }

    #[test]
    fn smtp_table_is_parsed_and_redacted() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [keyserver]
            external_url = "https://keys.example.org"

            [keyserver.smtp]
            host = "smtp.example.org"
            user = "keyserver"
            pass = "hunter2"
            from = "keyserver@example.org"
            security = "starttls"
            "#,
        ));
        let config: KeyserverConfig = figment.extract_inner("keyserver").unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.security, SmtpConnectionSecurity::StartTls);
        assert!(!format!("{:?}", smtp).contains("hunter2"));
    }
}
