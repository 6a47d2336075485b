/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::{Debug, Formatter};

use shared::types::KeyId;
use shared::utils::random::random_key;
use subtle::ConstantTimeEq;

use crate::db::{KeyDocumentStore, PublicKeyRecord};
use crate::errors::KeyserverError;

/// Unguessable token proving control of the email address it was sent to.
#[derive(Clone)]
pub struct Nonce(String);

impl Nonce {
    pub fn generate() -> Self {
        Nonce(base64::encode_config(random_key(), base64::URL_SAFE_NO_PAD))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Compares against a stored nonce in constant time.
    pub fn matches(&self, stored: &str) -> bool {
        bool::from(self.0.as_bytes().ct_eq(stored.as_bytes()))
    }
}

impl Debug for Nonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonce(<redacted>)")
    }
}

impl From<&str> for Nonce {
    fn from(nonce: &str) -> Self {
        Nonce(nonce.to_string())
    }
}

impl From<String> for Nonce {
    fn from(nonce: String) -> Self {
        Nonce(nonce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeIntent {
    Verify,
    Remove,
}

/// Result of checking a presented nonce against the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceOutcome {
    Consumed,
    Mismatch,
    NotFound,
}

pub struct NonceChallenges<'a> {
    store: &'a dyn KeyDocumentStore,
}

impl<'a> NonceChallenges<'a> {
    pub fn new(store: &'a dyn KeyDocumentStore) -> Self {
        NonceChallenges { store }
    }

    /// Stores a fresh nonce for the given intent. Issuing a removal nonce moves the key to `PENDING_REMOVAL`.
    #[tracing::instrument(skip(self))]
    pub async fn issue(
        &self,
        key_id: &KeyId,
        intent: ChallengeIntent,
    ) -> Result<Option<(Nonce, PublicKeyRecord)>, KeyserverError> {
        let nonce = Nonce::generate();
        let record = match intent {
            ChallengeIntent::Verify => self.store.set_verify_nonce(key_id.clone(), nonce.clone()).await?,
            ChallengeIntent::Remove => {
                self.store
                    .mark_pending_removal(key_id.clone(), nonce.clone())
                    .await?
            }
        };
        Ok(record.map(|record| (nonce, record)))
    }

    /// Consumes a presented nonce and applies the state transition of its intent.
    #[tracing::instrument(skip(self))]
    pub async fn consume(&self, key_id: &KeyId, nonce: &Nonce, intent: ChallengeIntent) -> Result<(), KeyserverError> {
        let outcome = match intent {
            ChallengeIntent::Verify => self.store.mark_verified(key_id.clone(), nonce.clone()).await?,
            ChallengeIntent::Remove => self.store.remove(key_id.clone(), nonce.clone()).await?,
        };
        match outcome {
            NonceOutcome::Consumed => Ok(()),
            NonceOutcome::Mismatch => Err(KeyserverError::InvalidNonce),
            NonceOutcome::NotFound => Err(KeyserverError::NotFound(format!(
                "No pending challenge found for keyId {}.",
                key_id
            ))),
        }
    }
}
