/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::sync::Mutex;

use async_trait::async_trait;
use diesel::{Connection, SqliteConnection};
use shared::types::{Email, KeyFingerprint, KeyId};

use crate::challenges::{Nonce, NonceOutcome};
use crate::db::{diesel_sqlite, perform_migrations, KeyDocumentStore, LookupScope, PublicKeyRecord};
use crate::parsing::ParsedKey;

/// In-memory SQLite store for tests.
pub(crate) struct TestStore {
    conn: Mutex<SqliteConnection>,
}

impl TestStore {
    pub(crate) fn new() -> Self {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        perform_migrations(&mut conn).unwrap();
        TestStore { conn: Mutex::new(conn) }
    }

    fn with<T>(&self, f: impl FnOnce(&mut SqliteConnection) -> T) -> T {
        f(&mut self.conn.lock().unwrap())
    }
}

#[async_trait]
impl KeyDocumentStore for TestStore {
    async fn upsert_pending(&self, key: ParsedKey) -> Result<(), anyhow::Error> {
        self.with(|c| diesel_sqlite::upsert_pending(c, &key))
    }

    async fn set_verify_nonce(&self, key_id: KeyId, nonce: Nonce) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.with(|c| diesel_sqlite::set_verify_nonce(c, &key_id, &nonce))
    }

    async fn mark_verified(&self, key_id: KeyId, nonce: Nonce) -> Result<NonceOutcome, anyhow::Error> {
        self.with(|c| diesel_sqlite::mark_verified(c, &key_id, &nonce))
    }

    async fn mark_pending_removal(
        &self,
        key_id: KeyId,
        nonce: Nonce,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.with(|c| diesel_sqlite::mark_pending_removal(c, &key_id, &nonce))
    }

    async fn remove(&self, key_id: KeyId, nonce: Nonce) -> Result<NonceOutcome, anyhow::Error> {
        self.with(|c| diesel_sqlite::remove(c, &key_id, &nonce))
    }

    async fn find_by_key_id(
        &self,
        key_id: KeyId,
        scope: LookupScope,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.with(|c| diesel_sqlite::find_by_key_id(c, &key_id, scope))
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: KeyFingerprint,
        scope: LookupScope,
    ) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.with(|c| diesel_sqlite::find_by_fingerprint(c, &fingerprint, scope))
    }

    async fn find_by_email(&self, email: Email, scope: LookupScope) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
        self.with(|c| diesel_sqlite::find_by_email(c, &email, scope))
    }
}

#[cfg(test)]
mod tests {
    use shared::types::Email;

    use super::TestStore;
    use crate::challenges::{Nonce, NonceOutcome};
    use crate::db::{KeyDocumentStore, KeyStatus, LookupScope};
    use crate::parsing::parse_public_key;
    use crate::parsing::test_keys::generate_armored_key;

    #[tokio::test]
    async fn pending_upload_is_not_published() {
        let store = TestStore::new();
        let key = parse_public_key(generate_armored_key(&["Alice <alice@example.org>"]).as_str()).unwrap();
        store.upsert_pending(key.clone()).await.unwrap();

        let any = store.find_by_key_id(key.key_id.clone(), LookupScope::Any).await.unwrap().unwrap();
        assert!(!any.published);
        assert_eq!(any.status, KeyStatus::Pending);
        assert!(store
            .find_by_key_id(key.key_id.clone(), LookupScope::Published)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn verification_promotes_pending_layer() {
        let store = TestStore::new();
        let key = parse_public_key(generate_armored_key(&["Alice <alice@example.org>"]).as_str()).unwrap();
        store.upsert_pending(key.clone()).await.unwrap();
        let nonce = Nonce::generate();
        store.set_verify_nonce(key.key_id.clone(), nonce.clone()).await.unwrap().unwrap();

        assert_eq!(
            store.mark_verified(key.key_id.clone(), Nonce::generate()).await.unwrap(),
            NonceOutcome::Mismatch
        );
        assert_eq!(
            store.mark_verified(key.key_id.clone(), nonce.clone()).await.unwrap(),
            NonceOutcome::Consumed
        );
        assert_eq!(
            store.mark_verified(key.key_id.clone(), nonce).await.unwrap(),
            NonceOutcome::NotFound
        );

        let published = store
            .find_by_fingerprint(key.fingerprint.clone(), LookupScope::Published)
            .await
            .unwrap()
            .unwrap();
        assert!(published.is_verified());
        assert!(published.verified_at.is_some());
        assert!(published.user_ids.iter().all(|uid| uid.status == KeyStatus::Verified));
        let by_email = store
            .find_by_email(Email::parse("ALICE@example.org").unwrap(), LookupScope::Published)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.key_id, key.key_id);
    }

    #[tokio::test]
    async fn only_primary_email_is_verified_and_searchable() {
        let store = TestStore::new();
        let key = parse_public_key(
            generate_armored_key(&["Mallory <mallory@evil.org>", "Victim <victim@corp.com>"]).as_str(),
        )
        .unwrap();
        store.upsert_pending(key.clone()).await.unwrap();
        let nonce = Nonce::generate();
        store.set_verify_nonce(key.key_id.clone(), nonce.clone()).await.unwrap().unwrap();
        assert_eq!(
            store.mark_verified(key.key_id.clone(), nonce).await.unwrap(),
            NonceOutcome::Consumed
        );

        let published = store
            .find_by_key_id(key.key_id.clone(), LookupScope::Published)
            .await
            .unwrap()
            .unwrap();
        let verified: Vec<String> = published
            .user_ids
            .iter()
            .filter(|uid| uid.is_verified())
            .map(|uid| uid.email.get_email())
            .collect();
        assert_eq!(verified, vec!["mallory@evil.org".to_string()]);

        for scope in [LookupScope::Published, LookupScope::Any] {
            assert!(store
                .find_by_email(Email::parse("victim@corp.com").unwrap(), scope)
                .await
                .unwrap()
                .is_none());
        }
        assert!(store
            .find_by_email(Email::parse("mallory@evil.org").unwrap(), LookupScope::Published)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn removal_deletes_all_layers() {
        let store = TestStore::new();
        let key = parse_public_key(generate_armored_key(&["Alice <alice@example.org>"]).as_str()).unwrap();
        store.upsert_pending(key.clone()).await.unwrap();

        assert_eq!(
            store.remove(key.key_id.clone(), Nonce::generate()).await.unwrap(),
            NonceOutcome::NotFound
        );
        let nonce = Nonce::generate();
        let record = store
            .mark_pending_removal(key.key_id.clone(), nonce.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, KeyStatus::PendingRemoval);
        assert_eq!(
            store.remove(key.key_id.clone(), Nonce::generate()).await.unwrap(),
            NonceOutcome::Mismatch
        );
        assert_eq!(
            store.remove(key.key_id.clone(), nonce).await.unwrap(),
            NonceOutcome::Consumed
        );
        assert!(store
            .find_by_key_id(key.key_id.clone(), LookupScope::Any)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_keys_yield_nothing() {
        let store = TestStore::new();
        let key = parse_public_key(generate_armored_key(&["Alice <alice@example.org>"]).as_str()).unwrap();
        assert!(store
            .set_verify_nonce(key.key_id.clone(), Nonce::generate())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .mark_pending_removal(key.key_id.clone(), Nonce::generate())
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.mark_verified(key.key_id.clone(), Nonce::generate()).await.unwrap(),
            NonceOutcome::NotFound
        );
    }
}
