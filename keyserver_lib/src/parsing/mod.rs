/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use chrono::{DateTime, NaiveDateTime, Utc};
use sequoia_openpgp::parse::Parse;
use sequoia_openpgp::policy::StandardPolicy;
use sequoia_openpgp::Cert;
use shared::types::{Email, KeyFingerprint, KeyId};
use shared::utils::armor::export_armored_cert;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid OpenPGP public key: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUserId {
    pub name: String,
    pub email: Email,
    pub primary: bool,
}

impl ParsedUserId {
    pub fn display(&self) -> String {
        user_id_display(self.name.as_str(), &self.email)
    }
}

pub fn user_id_display(name: &str, email: &Email) -> String {
    match name.is_empty() {
        true => format!("<{}>", email),
        false => format!("{} <{}>", name, email),
    }
}

/// Normalized key material extracted from an uploaded certificate.
#[derive(Debug, Clone)]
pub struct ParsedKey {
    pub fingerprint: KeyFingerprint,
    pub key_id: KeyId,
    pub user_ids: Vec<ParsedUserId>,
    pub armored: String,
    pub algorithm: u8,
    pub key_size: Option<u32>,
    pub created: NaiveDateTime,
}

impl ParsedKey {
    pub fn primary_user_id(&self) -> Option<&ParsedUserId> {
        self.user_ids.iter().find(|uid| uid.primary)
    }
}

#[tracing::instrument(skip(armored))]
pub fn parse_public_key(armored: &str) -> Result<ParsedKey, ParseError> {
    let cert = Cert::from_bytes(armored.as_bytes()).map_err(invalid)?;
    let policy = StandardPolicy::new();
    let valid_cert = cert.with_policy(&policy, None).map_err(invalid)?;

    let fingerprint = KeyFingerprint::parse(cert.fingerprint().to_hex().as_str())
        .map_err(|_| ParseError::InvalidFormat("Only V4 keys are supported.".to_string()))?;
    let key_id = fingerprint.key_id();

    let primary_userid = valid_cert.primary_userid().ok().map(|uida| uida.userid().clone());
    let mut user_ids = vec![];
    for uida in valid_cert.userids() {
        let userid = uida.userid();
        let email = match userid
            .email_normalized()
            .unwrap_or_default()
            .and_then(|e| Email::parse_option(e.as_str()))
        {
            Some(e) => e,
            None => continue,
        };
        user_ids.push(ParsedUserId {
            name: userid.name().unwrap_or_default().unwrap_or_default(),
            email,
            primary: primary_userid.as_ref() == Some(userid),
        });
    }
    if user_ids.is_empty() {
        return Err(ParseError::InvalidFormat(
            "The key has no valid user id with an email address.".to_string(),
        ));
    }
    if !user_ids.iter().any(|uid| uid.primary) {
        user_ids[0].primary = true;
    }

    let primary_key = cert.primary_key().key();
    let armored = export_armored_cert(&cert).map_err(invalid)?;

    Ok(ParsedKey {
        fingerprint,
        key_id,
        user_ids,
        armored,
        algorithm: u8::from(primary_key.pk_algo()),
        key_size: primary_key.mpis().bits().map(|bits| bits as u32),
        created: DateTime::<Utc>::from(primary_key.creation_time()).naive_utc(),
    })
}

fn invalid(error: anyhow::Error) -> ParseError {
    ParseError::InvalidFormat(error.to_string())
}


#[cfg(test)]
mod tests {
    use sequoia_openpgp::serialize::SerializeInto;

    use super::test_keys::{generate_armored_key, generate_cert};
    use super::{parse_public_key, ParseError};

    #[test]
    fn rejects_non_pgp_input() {
        assert!(matches!(parse_public_key("foo"), Err(ParseError::InvalidFormat(_))));
        assert!(matches!(parse_public_key(""), Err(ParseError::InvalidFormat(_))));
        assert!(matches!(
            parse_public_key("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nasdf\n-----END PGP PUBLIC KEY BLOCK-----\n"),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn extracts_identifiers_and_user_ids() {
        let cert = generate_cert(&["Safe With Me <SafeWithMe.TestUser@gmail.com>", "Work <work@example.org>"]);
        let armored = shared::utils::armor::export_armored_cert(&cert).unwrap();
        let key = parse_public_key(armored.as_str()).unwrap();

        assert_eq!(key.fingerprint.as_str(), cert.fingerprint().to_hex());
        assert_eq!(key.fingerprint.as_str().len(), 40);
        assert_eq!(key.key_id.as_str(), &cert.fingerprint().to_hex()[24..]);
        assert_eq!(key.user_ids.len(), 2);
        assert_eq!(key.primary_user_id().unwrap().email.get_email(), "safewithme.testuser@gmail.com");
        assert_eq!(key.primary_user_id().unwrap().name, "Safe With Me");
        assert_eq!(key.user_ids.iter().filter(|uid| uid.primary).count(), 1);
        assert!(key.armored.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
    }

    #[test]
    fn rejects_key_without_email() {
        let armored = generate_armored_key(&["Just A Name"]);
        assert!(matches!(parse_public_key(armored.as_str()), Err(ParseError::InvalidFormat(_))));
    }

    #[test]
    fn skips_user_ids_without_email() {
        let armored = generate_armored_key(&["Just A Name", "Alice <alice@example.org>"]);
        let key = parse_public_key(armored.as_str()).unwrap();
        assert_eq!(key.user_ids.len(), 1);
        assert!(key.user_ids[0].primary);
        assert_eq!(key.user_ids[0].email.get_email(), "alice@example.org");
    }

    #[test]
    fn secret_key_material_is_not_kept() {
        let cert = generate_cert(&["Alice <alice@example.org>"]);
        let tsk = String::from_utf8(cert.as_tsk().armored().to_vec().unwrap()).unwrap();
        assert!(tsk.contains("PRIVATE KEY BLOCK"));

        let key = parse_public_key(tsk.as_str()).unwrap();
        assert!(key.armored.contains("PUBLIC KEY BLOCK"));
        assert!(!key.armored.contains("PRIVATE KEY BLOCK"));
    }

    #[test]
    fn rejects_keyrings() {
        let mut armored = generate_armored_key(&["Alice <alice@example.org>"]);
        armored.push_str(generate_armored_key(&["Bob <bob@example.org>"]).as_str());
        assert!(parse_public_key(armored.as_str()).is_err());
    }
}
