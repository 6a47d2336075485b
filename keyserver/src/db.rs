/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use keyserver_lib::challenges::{Nonce, NonceOutcome};
use keyserver_lib::db::{diesel_sqlite, KeyDocumentStore, LookupScope, PublicKeyRecord};
use keyserver_lib::parsing::ParsedKey;
use rocket_sync_db_pools::database;
use shared::types::{Email, KeyFingerprint, KeyId};

#[database("keyserver")]
pub struct KeyDBConn(diesel::SqliteConnection);

impl Debug for KeyDBConn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyDBConn")
    }
}

#[async_trait]
impl KeyDocumentStore for KeyDBConn {
    async fn upsert_pending(&self, key: ParsedKey) -> Result<(), anyhow::Error> {
        self.run(move |c| diesel_sqlite::upsert_pending(c, &key)).await
    }

    async fn set_verify_nonce(&self, key_id: KeyId, nonce: Nonce) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.run(move |c| diesel_sqlite::set_verify_nonce(c, &key_id, &nonce))
            .await
    }

    async fn mark_verified(&self, key_id: KeyId, nonce: Nonce) -> Result<NonceOutcome, anyhow::Error> {
        self.run(move |c| diesel_sqlite::mark_verified(c, &key_id, &nonce)).await
    }

    async fn mark_pending_removal(
        &self,
        key_id: KeyId,
        nonce: Nonce,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.run(move |c| diesel_sqlite::mark_pending_removal(c, &key_id, &nonce))
            .await
    }

    async fn remove(&self, key_id: KeyId, nonce: Nonce) -> Result<NonceOutcome, anyhow::Error> {
        self.run(move |c| diesel_sqlite::remove(c, &key_id, &nonce)).await
    }

    async fn find_by_key_id(
        &self,
        key_id: KeyId,
        scope: LookupScope,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.run(move |c| diesel_sqlite::find_by_key_id(c, &key_id, scope)).await
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: KeyFingerprint,
        scope: LookupScope,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.run(move |c| diesel_sqlite::find_by_fingerprint(c, &fingerprint, scope))
            .await
    }

    async fn find_by_email(&self, email: Email, scope: LookupScope) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.run(move |c| diesel_sqlite::find_by_email(c, &email, scope)).await
    }
}
