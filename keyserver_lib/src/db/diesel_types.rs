/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use shared::types::{Email, KeyFingerprint, KeyId};

use crate::db::schema::{public_keys, user_ids};
use crate::db::{KeyStatus, PublicKeyRecord, UserIdRecord};
use crate::parsing::ParsedKey;

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = public_keys)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct PublicKeyEntry {
    pub(crate) key_id: String,
    pub(crate) published: bool,
    pub(crate) fingerprint: String,
    pub(crate) armored: String,
    pub(crate) algorithm: i32,
    pub(crate) key_size: Option<i32>,
    pub(crate) created: NaiveDateTime,
    pub(crate) status: String,
    pub(crate) uploaded_at: NaiveDateTime,
    pub(crate) verified_at: Option<NaiveDateTime>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = user_ids)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct UserIdEntry {
    pub(crate) key_id: String,
    pub(crate) published: bool,
    pub(crate) position: i32,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) is_primary: bool,
    pub(crate) status: String,
    pub(crate) nonce: Option<String>,
}

impl PublicKeyEntry {
    pub(crate) fn pending(key: &ParsedKey, uploaded_at: NaiveDateTime) -> Self {
        PublicKeyEntry {
            key_id: key.key_id.to_string(),
            published: false,
            fingerprint: key.fingerprint.to_string(),
            armored: key.armored.clone(),
            algorithm: i32::from(key.algorithm),
            key_size: key.key_size.map(|bits| bits as i32),
            created: key.created,
            status: KeyStatus::Pending.as_str().to_string(),
            uploaded_at,
            verified_at: None,
        }
    }

    pub(crate) fn into_record(self, user_ids: Vec<UserIdEntry>) -> Result<PublicKeyRecord, anyhow::Error> {
        let user_ids = user_ids
            .into_iter()
            .map(UserIdRecord::try_from)
            .collect::<Result<Vec<UserIdRecord>, anyhow::Error>>()?;
        Ok(PublicKeyRecord {
            key_id: KeyId::parse(self.key_id.as_str())?,
            fingerprint: KeyFingerprint::parse(self.fingerprint.as_str())?,
            armored: self.armored,
            algorithm: u8::try_from(self.algorithm)?,
            key_size: self.key_size.map(u32::try_from).transpose()?,
            created: self.created,
            status: KeyStatus::from_str(self.status.as_str())?,
            published: self.published,
            uploaded_at: self.uploaded_at,
            verified_at: self.verified_at,
            user_ids,
        })
    }
}

impl UserIdEntry {
    pub(crate) fn pending(key: &ParsedKey) -> Vec<Self> {
        key.user_ids
            .iter()
            .enumerate()
            .map(|(position, uid)| UserIdEntry {
                key_id: key.key_id.to_string(),
                published: false,
                position: position as i32,
                name: uid.name.clone(),
                email: uid.email.get_email(),
                is_primary: uid.primary,
                status: KeyStatus::Pending.as_str().to_string(),
                nonce: None,
            })
            .collect()
    }
}

impl TryFrom<UserIdEntry> for UserIdRecord {
    type Error = anyhow::Error;

    fn try_from(entry: UserIdEntry) -> Result<Self, Self::Error> {
        Ok(UserIdRecord {
            name: entry.name,
            email: Email::parse(entry.email.as_str())?,
            primary: entry.is_primary,
            status: KeyStatus::from_str(entry.status.as_str())?,
        })
    }
}
