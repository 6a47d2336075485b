/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::fmt::Debug;

use async_trait::async_trait;
use shared::types::{Email, KeyId};

use crate::challenges::Nonce;
use crate::errors::KeyserverError;

pub mod mailer;

/// Everything needed to address a challenge email to the owner of a key.
#[derive(Debug, Clone)]
pub struct ChallengeMessage {
    pub name: String,
    pub email: Email,
    pub nonce: Nonce,
    pub key_id: KeyId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Debug + Send + Sync {
    async fn send_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError>;
    async fn send_removal_verification(&self, message: &ChallengeMessage) -> Result<(), KeyserverError>;
}

pub fn verify_key_message(endpoint_url: &str, message: &ChallengeMessage) -> RenderedMessage {
    RenderedMessage {
        subject: "Verify your public key".to_string(),
        body: format!(
            "\
            Hello {},\n\
            \n\
            please confirm the upload of your public key {} by clicking this link.\n\
            Link: {}\n\
            \n\
            If you did not upload this key, you can ignore this message.\n\
            ",
            greeting_name(message),
            message.key_id,
            challenge_link(endpoint_url, "verify", message),
        ),
    }
}

pub fn verify_removal_message(endpoint_url: &str, message: &ChallengeMessage) -> RenderedMessage {
    RenderedMessage {
        subject: "Verify removal of your public key".to_string(),
        body: format!(
            "\
            Hello {},\n\
            \n\
            please confirm the removal of your public key {} from the key directory by clicking this link.\n\
            Link: {}\n\
            \n\
            If you did not request the removal, you can ignore this message.\n\
            ",
            greeting_name(message),
            message.key_id,
            challenge_link(endpoint_url, "verifyRemove", message),
        ),
    }
}

fn challenge_link(endpoint_url: &str, op: &str, message: &ChallengeMessage) -> String {
    format!(
        "{}/api/v1/key?op={}&keyId={}&nonce={}",
        endpoint_url.trim_end_matches('/'),
        op,
        urlencoding::encode(message.key_id.as_str()),
        urlencoding::encode(message.nonce.as_str())
    )
}

fn greeting_name(message: &ChallengeMessage) -> String {
    match message.name.is_empty() {
        true => message.email.to_string(),
        false => sanitize_name(message.name.as_str()),
    }
}

fn sanitize_name(name: &str) -> String {
    let mut name = name.replace('<', "□").replace('>', "□");
    if name.chars().count() > 256 {
        name = name.chars().take(256).collect();
        name.push_str("[...]")
    }
    name
}
