/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::Display;
use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::connection::SimpleConnection;
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;
use shared::types::{Email, KeyFingerprint, KeyId};
use tracing::info;

use crate::challenges::{Nonce, NonceOutcome};
use crate::parsing::ParsedKey;

pub mod diesel_sqlite;
mod diesel_types;
mod schema;

#[cfg(test)]
pub(crate) mod test_store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "VERIFIED")]
    Verified,
    #[serde(rename = "PENDING_REMOVAL")]
    PendingRemoval,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Pending => "PENDING",
            KeyStatus::Verified => "VERIFIED",
            KeyStatus::PendingRemoval => "PENDING_REMOVAL",
        }
    }
}

impl FromStr for KeyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(KeyStatus::Pending),
            "VERIFIED" => Ok(KeyStatus::Verified),
            "PENDING_REMOVAL" => Ok(KeyStatus::PendingRemoval),
            other => Err(anyhow!("Unknown key status <{}> in DB!", other)),
        }
    }
}

impl Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which layers of the store a lookup may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupScope {
    /// Only keys whose primary email has been verified.
    Published,
    /// The published layer if present, otherwise the pending upload.
    Any,
}

impl LookupScope {
    pub(crate) fn layers(&self) -> &'static [bool] {
        match self {
            LookupScope::Published => &[true],
            LookupScope::Any => &[true, false],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdRecord {
    pub name: String,
    pub email: Email,
    pub primary: bool,
    pub status: KeyStatus,
}

impl UserIdRecord {
    /// Only the primary user id gets verified, through the mailed nonce.
    pub fn is_verified(&self) -> bool {
        self.status != KeyStatus::Pending
    }
}

#[derive(Debug, Clone)]
pub struct PublicKeyRecord {
    pub key_id: KeyId,
    pub fingerprint: KeyFingerprint,
    pub armored: String,
    pub algorithm: u8,
    pub key_size: Option<u32>,
    pub created: NaiveDateTime,
    pub status: KeyStatus,
    pub published: bool,
    pub uploaded_at: NaiveDateTime,
    pub verified_at: Option<NaiveDateTime>,
    pub user_ids: Vec<UserIdRecord>,
}

impl PublicKeyRecord {
    pub fn primary_user_id(&self) -> Option<&UserIdRecord> {
        self.user_ids
            .iter()
            .find(|uid| uid.primary)
            .or_else(|| self.user_ids.first())
    }

    pub fn is_verified(&self) -> bool {
        self.published && self.status == KeyStatus::Verified
    }
}

/// Persistence of key documents and their challenge nonces.
///
/// Every key id has at most one pending layer (the latest upload) and at most one
/// published layer (the last verified upload). Each method is atomic.
#[async_trait]
pub trait KeyDocumentStore: Send + Sync {
    /// Replaces the pending layer of the key with a freshly uploaded one, discarding any earlier nonce.
    async fn upsert_pending(&self, key: ParsedKey) -> Result<(), anyhow::Error>;

    /// Attaches a verification nonce to the pending layer. `None` if there is no pending layer.
    async fn set_verify_nonce(&self, key_id: KeyId, nonce: Nonce) -> Result<Option<PublicKeyRecord>, anyhow::Error>;

    /// Promotes the pending layer if the nonce matches, replacing published keys with the same primary email.
    async fn mark_verified(&self, key_id: KeyId, nonce: Nonce) -> Result<NonceOutcome, anyhow::Error>;

    /// Flags the key as pending removal and attaches a removal nonce. `None` if the key is unknown.
    async fn mark_pending_removal(
        &self,
        key_id: KeyId,
        nonce: Nonce,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error>;

    /// Deletes every layer of the key if the removal nonce matches.
    async fn remove(&self, key_id: KeyId, nonce: Nonce) -> Result<NonceOutcome, anyhow::Error>;

    async fn find_by_key_id(&self, key_id: KeyId, scope: LookupScope)
        -> Result<Option<PublicKeyRecord>, anyhow::Error>;

    async fn find_by_fingerprint(
        &self,
        fingerprint: KeyFingerprint,
        scope: LookupScope,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error>;

    /// Most recently uploaded key whose primary user id carries the (normalized) email.
    async fn find_by_email(&self, email: Email, scope: LookupScope) -> Result<Option<PublicKeyRecord>, anyhow::Error>;
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn perform_migrations(connection: &mut SqliteConnection) -> Result<(), anyhow::Error> {
    info!("performing DB migrations");
    connection.batch_execute("PRAGMA journal_mode = WAL;")?;
    diesel_sqlite::configure_connection(connection)?;
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("DB Migrations failed: {}", e))?;
    info!("applied {} DB migrations", applied.len());
    Ok(())
}
