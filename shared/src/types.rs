/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::Display;

use anyhow::anyhow;
use serde::{Serialize, Serializer};

/// A syntactically valid email address, normalized to lowercase.
#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub struct Email {
    localpart: String,
    domain: String,
}

impl Email {
    pub fn new(localpart: &str, domain: &str) -> Self {
        Self {
            localpart: localpart.to_lowercase(),
            domain: domain.to_lowercase(),
        }
    }

    pub fn parse(email: &str) -> Result<Self, anyhow::Error> {
        let mut parts = email.split('@');
        let localpart = parts.next().ok_or_else(|| anyhow!("Invalid Email Address!"))?;
        let domain = parts.next().ok_or_else(|| anyhow!("Invalid Email Address!"))?;
        if parts.next().is_some() || !is_valid_localpart(localpart) || !is_valid_domain(domain) {
            return Err(anyhow!("Invalid Email Address!"));
        }
        Ok(Self::new(localpart, domain))
    }

    pub fn parse_option(email: &str) -> Option<Email> {
        Self::parse(email).ok()
    }

    pub fn get_domain(&self) -> &str {
        &self.domain
    }

    pub fn get_email(&self) -> String {
        self.localpart.clone() + "@" + self.get_domain()
    }
}

fn is_valid_localpart(localpart: &str) -> bool {
    !localpart.is_empty()
        && localpart.len() <= 64
        && !localpart.starts_with('.')
        && !localpart.ends_with('.')
        && !localpart.contains("..")
        && localpart
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(c))
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    // at least one dot and an alphabetic top level label
    labels.len() >= 2
        && domain.len() <= 253
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels
            .last()
            .map(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
            .unwrap_or(false)
}

impl From<Email> for String {
    fn from(e: Email) -> Self {
        e.to_string()
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.get_email())
    }
}

impl Serialize for Email {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.get_email().as_str())
    }
}

/// The trailing 64 bits of a V4 fingerprint as 16 uppercase hex characters.
#[derive(Eq, PartialEq, Hash, Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub const HEX_LENGTH: usize = 16;

    pub fn parse(key_id: &str) -> Result<Self, anyhow::Error> {
        parse_hex(key_id, Self::HEX_LENGTH).map(KeyId)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&KeyFingerprint> for KeyId {
    fn from(fpr: &KeyFingerprint) -> Self {
        KeyId(fpr.0[KeyFingerprint::HEX_LENGTH - KeyId::HEX_LENGTH..].to_string())
    }
}

impl Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A V4 fingerprint as 40 uppercase hex characters.
#[derive(Eq, PartialEq, Hash, Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    pub const HEX_LENGTH: usize = 40;

    pub fn parse(fingerprint: &str) -> Result<Self, anyhow::Error> {
        parse_hex(fingerprint, Self::HEX_LENGTH).map(KeyFingerprint)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn key_id(&self) -> KeyId {
        KeyId::from(self)
    }
}

impl Display for KeyFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_hex(value: &str, expected_length: usize) -> Result<String, anyhow::Error> {
    if value.len() != expected_length {
        return Err(anyhow!(
            "Expected {} hex characters but got {}.",
            expected_length,
            value.len()
        ));
    }
    hex::decode(value).map_err(|_| anyhow!("Expected a hex string but got <{}>.", value))?;
    Ok(value.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::{Email, KeyFingerprint, KeyId};

    #[test]
    fn email_is_normalized() {
        let email = Email::parse("SafeWithMe.TestUser@GMail.com").unwrap();
        assert_eq!(email.get_email(), "safewithme.testuser@gmail.com");
        assert_eq!(email.get_domain(), "gmail.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for email in ["a@bco", "a@b.c", "@b.co", "a@", "a@@b.co", "a b@c.de", "a@b..co", "0x1234", ""] {
            assert!(Email::parse(email).is_err(), "{} should be rejected", email);
        }
        assert!(Email::parse("a@b.co").is_ok());
    }

    #[test]
    fn key_id_requires_sixteen_hex_characters() {
        assert_eq!(KeyId::parse("dbc0b3d92b1b86e9").unwrap().as_str(), "DBC0B3D92B1B86E9");
        assert!(KeyId::parse("0123456789ABCDE").is_err());
        assert!(KeyId::parse("0123456789ABCDEF0").is_err());
        assert!(KeyId::parse("0123456789ABCDEG").is_err());
    }

    #[test]
    fn key_id_is_fingerprint_suffix() {
        let fpr = KeyFingerprint::parse("4277257930867231ce393fb8dbc0b3d92b1b86e9").unwrap();
        assert_eq!(fpr.as_str(), "4277257930867231CE393FB8DBC0B3D92B1B86E9");
        assert_eq!(fpr.key_id().as_str(), "DBC0B3D92B1B86E9");
    }
}
