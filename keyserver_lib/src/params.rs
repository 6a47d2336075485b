/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use shared::types::{Email, KeyFingerprint, KeyId};
use thiserror::Error;

use crate::challenges::Nonce;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing parameter: {0}")]
    Missing(&'static str),
    #[error("Malformed parameter: {0}")]
    Malformed(&'static str),
    #[error("Either keyId or email must be provided.")]
    MissingSelector,
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Malformed request payload.")]
    MalformedPayload,
}

/// Parameters of a verification or removal confirmation link.
#[derive(Debug, Clone)]
pub struct ChallengeParams {
    pub key_id: KeyId,
    pub nonce: Nonce,
}

impl ChallengeParams {
    pub fn from_query(key_id: Option<&str>, nonce: Option<&str>) -> Result<Self, ValidationError> {
        let key_id = required("keyId", key_id)?;
        let nonce = required("nonce", nonce)?;
        Ok(ChallengeParams {
            key_id: parse_key_id(key_id)?,
            nonce: Nonce::from(nonce),
        })
    }
}

/// Selects a stored key for removal: by key id first, falling back to email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySelector {
    key_id: Option<KeyId>,
    email: Option<Email>,
}

impl KeySelector {
    pub fn from_query(key_id: Option<&str>, email: Option<&str>) -> Result<Self, ValidationError> {
        let key_id = optional(key_id).map(parse_key_id).transpose()?;
        let email = optional(email).map(parse_email).transpose()?;
        match (&key_id, &email) {
            (None, None) => Err(ValidationError::MissingSelector),
            _ => Ok(KeySelector { key_id, email }),
        }
    }

    pub fn key_id(&self) -> Option<&KeyId> {
        self.key_id.as_ref()
    }

    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    pub fn describe(&self) -> String {
        match (&self.key_id, &self.email) {
            (Some(k), Some(e)) => format!("keyId {} or email {}", k, e),
            (Some(k), None) => format!("keyId {}", k),
            (None, Some(e)) => format!("email {}", e),
            (None, None) => "an empty selector".to_string(),
        }
    }
}

/// Locates a published key for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocator {
    KeyId(KeyId),
    Fingerprint(KeyFingerprint),
    Email(Email),
}

impl KeyLocator {
    pub fn from_query(
        key_id: Option<&str>,
        fingerprint: Option<&str>,
        email: Option<&str>,
    ) -> Result<Self, ValidationError> {
        if let Some(key_id) = optional(key_id) {
            return parse_key_id(key_id).map(KeyLocator::KeyId);
        }
        if let Some(fingerprint) = optional(fingerprint) {
            return KeyFingerprint::parse(fingerprint)
                .map(KeyLocator::Fingerprint)
                .map_err(|_| ValidationError::Malformed("fingerprint"));
        }
        if let Some(email) = optional(email) {
            return parse_email(email).map(KeyLocator::Email);
        }
        Err(ValidationError::MissingSelector)
    }

    pub fn describe(&self) -> String {
        match self {
            KeyLocator::KeyId(k) => format!("keyId {}", k),
            KeyLocator::Fingerprint(f) => format!("fingerprint {}", f),
            KeyLocator::Email(e) => format!("email {}", e),
        }
    }
}

fn optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    optional(value).ok_or(ValidationError::Missing(name))
}

fn parse_key_id(key_id: &str) -> Result<KeyId, ValidationError> {
    KeyId::parse(key_id).map_err(|_| ValidationError::Malformed("keyId"))
}

fn parse_email(email: &str) -> Result<Email, ValidationError> {
    Email::parse(email).map_err(|_| ValidationError::Malformed("email"))
}

#[cfg(test)]
mod tests {
    use super::{ChallengeParams, KeyLocator, KeySelector, ValidationError};

    #[test]
    fn challenge_params_require_key_id_and_nonce() {
        assert_eq!(
            ChallengeParams::from_query(None, Some("abc")).unwrap_err(),
            ValidationError::Missing("keyId")
        );
        assert_eq!(
            ChallengeParams::from_query(Some("DBC0B3D92B1B86E9"), None).unwrap_err(),
            ValidationError::Missing("nonce")
        );
        assert_eq!(
            ChallengeParams::from_query(Some("DBC0B3D92B1B86E9"), Some("")).unwrap_err(),
            ValidationError::Missing("nonce")
        );
        assert_eq!(
            ChallengeParams::from_query(Some("DBC0B3D92B1B86"), Some("abc")).unwrap_err(),
            ValidationError::Malformed("keyId")
        );
        let params = ChallengeParams::from_query(Some("dbc0b3d92b1b86e9"), Some("abc")).unwrap();
        assert_eq!(params.key_id.as_str(), "DBC0B3D92B1B86E9");
    }

    #[test]
    fn selector_needs_key_id_or_email() {
        assert_eq!(
            KeySelector::from_query(None, None).unwrap_err(),
            ValidationError::MissingSelector
        );
        assert_eq!(
            KeySelector::from_query(Some("0123456789ABCDE"), None).unwrap_err(),
            ValidationError::Malformed("keyId")
        );
        assert_eq!(
            KeySelector::from_query(None, Some("a@bco")).unwrap_err(),
            ValidationError::Malformed("email")
        );
        let selector = KeySelector::from_query(None, Some("A@Foo.com")).unwrap();
        assert!(selector.key_id().is_none());
        assert_eq!(selector.email().unwrap().get_email(), "a@foo.com");
    }

    #[test]
    fn locator_prefers_key_id() {
        let locator = KeyLocator::from_query(Some("0123456789ABCDEF"), None, Some("a@foo.com")).unwrap();
        assert!(matches!(locator, KeyLocator::KeyId(_)));
        let locator = KeyLocator::from_query(
            None,
            Some("4277257930867231CE393FB8DBC0B3D92B1B86E9"),
            None,
        )
        .unwrap();
        assert!(matches!(locator, KeyLocator::Fingerprint(_)));
        assert_eq!(
            KeyLocator::from_query(None, None, None).unwrap_err(),
            ValidationError::MissingSelector
        );
    }
}
