/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::{Debug, Formatter};

use shared::types::KeyId;
use tracing::info;

use crate::challenges::{ChallengeIntent, Nonce, NonceChallenges};
use crate::db::{KeyDocumentStore, LookupScope, PublicKeyRecord};
use crate::errors::KeyserverError;
use crate::notification::{ChallengeMessage, Mailer};
use crate::params::{ChallengeParams, KeyLocator, KeySelector};
use crate::parsing::parse_public_key;

/// Upload, verification, removal and lookup of keys on top of a store and a mailer.
pub struct KeyLifecycle<'a> {
    store: &'a dyn KeyDocumentStore,
    mailer: &'a dyn Mailer,
}

impl Debug for KeyLifecycle<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyLifecycle: {{store: <DEBUG_NOT_IMPLEMENTED>, mailer: {:?}}}", self.mailer)
    }
}

impl<'a> KeyLifecycle<'a> {
    pub fn new(store: &'a dyn KeyDocumentStore, mailer: &'a dyn Mailer) -> Self {
        KeyLifecycle { store, mailer }
    }

    fn challenges(&self) -> NonceChallenges<'a> {
        NonceChallenges::new(self.store)
    }

    /// Stores the key as pending and mails a verification link to its primary user id.
    #[tracing::instrument(skip(armored))]
    pub async fn upload(&self, armored: &str) -> Result<KeyId, KeyserverError> {
        let key = parse_public_key(armored)?;
        let key_id = key.key_id.clone();
        self.store.upsert_pending(key).await?;

        let (nonce, record) = self
            .challenges()
            .issue(&key_id, ChallengeIntent::Verify)
            .await?
            .ok_or_else(|| KeyserverError::not_found(format!("keyId {}", key_id).as_str()))?;
        let message = challenge_message(&record, nonce)?;
        self.mailer.send_verification(&message).await?;
        info!("stored pending key {} and sent verification to <{}>", key_id, message.email);
        Ok(key_id)
    }

    #[tracing::instrument]
    pub async fn verify(&self, params: ChallengeParams) -> Result<(), KeyserverError> {
        self.challenges()
            .consume(&params.key_id, &params.nonce, ChallengeIntent::Verify)
            .await?;
        info!("published key {}", params.key_id);
        Ok(())
    }

    /// Starts removal of the selected key by mailing a removal link to its primary user id.
    #[tracing::instrument]
    pub async fn request_removal(&self, selector: KeySelector) -> Result<KeyId, KeyserverError> {
        let record = self
            .select_for_removal(&selector)
            .await?
            .ok_or_else(|| KeyserverError::not_found(selector.describe().as_str()))?;

        let (nonce, record) = self
            .challenges()
            .issue(&record.key_id, ChallengeIntent::Remove)
            .await?
            .ok_or_else(|| KeyserverError::not_found(selector.describe().as_str()))?;
        let message = challenge_message(&record, nonce)?;
        self.mailer.send_removal_verification(&message).await?;
        info!("requested removal of key {}", record.key_id);
        Ok(record.key_id)
    }

    #[tracing::instrument]
    pub async fn confirm_removal(&self, params: ChallengeParams) -> Result<(), KeyserverError> {
        self.challenges()
            .consume(&params.key_id, &params.nonce, ChallengeIntent::Remove)
            .await
    }

    /// Reads a published key. Pending uploads are never served.
    #[tracing::instrument]
    pub async fn lookup(&self, locator: KeyLocator) -> Result<PublicKeyRecord, KeyserverError> {
        let record = match &locator {
            KeyLocator::KeyId(key_id) => self.store.find_by_key_id(key_id.clone(), LookupScope::Published).await?,
            KeyLocator::Fingerprint(fpr) => {
                self.store
                    .find_by_fingerprint(fpr.clone(), LookupScope::Published)
                    .await?
            }
            KeyLocator::Email(email) => self.store.find_by_email(email.clone(), LookupScope::Published).await?,
        };
        record.ok_or_else(|| KeyserverError::not_found(locator.describe().as_str()))
    }

    async fn select_for_removal(&self, selector: &KeySelector) -> Result<Option<PublicKeyRecord>, KeyserverError> {
        if let Some(key_id) = selector.key_id() {
            if let Some(record) = self.store.find_by_key_id(key_id.clone(), LookupScope::Any).await? {
                return Ok(Some(record));
            }
        }
        if let Some(email) = selector.email() {
            return Ok(self.store.find_by_email(email.clone(), LookupScope::Any).await?);
        }
        Ok(None)
    }
}

fn challenge_message(record: &PublicKeyRecord, nonce: Nonce) -> Result<ChallengeMessage, KeyserverError> {
    let primary = record
        .primary_user_id()
        .ok_or_else(|| KeyserverError::not_found(format!("user id of keyId {}", record.key_id).as_str()))?;
    Ok(ChallengeMessage {
        name: primary.name.clone(),
        email: primary.email.clone(),
        nonce,
        key_id: record.key_id.clone(),
    })
}
