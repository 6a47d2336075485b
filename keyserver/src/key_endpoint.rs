/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use chrono::NaiveDateTime;
use keyserver_lib::db::PublicKeyRecord;
use keyserver_lib::lifecycle::KeyLifecycle;
use keyserver_lib::params::{ChallengeParams, KeyLocator, KeySelector, ValidationError};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};

use crate::db::KeyDBConn;
use crate::error::ErrorResponse;
use crate::holders::MailerHolder;

#[derive(Debug, Deserialize)]
pub struct KeyUpload {
    #[serde(rename = "publicKeyArmored")]
    public_key_armored: String,
}

#[derive(Debug, FromForm)]
pub struct KeyQuery {
    op: Option<String>,
    #[field(name = "keyId")]
    key_id: Option<String>,
    nonce: Option<String>,
    email: Option<String>,
    fingerprint: Option<String>,
}

#[derive(Debug, FromForm)]
pub struct KeySelectorQuery {
    #[field(name = "keyId")]
    key_id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdView {
    name: String,
    email: String,
    verified: bool,
}

/// JSON representation of a published key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyView {
    key_id: String,
    fingerprint: String,
    user_ids: Vec<UserIdView>,
    created: NaiveDateTime,
    algorithm: u8,
    key_size: Option<u32>,
    uploaded: NaiveDateTime,
    verified: Option<NaiveDateTime>,
    public_key_armored: String,
}

impl From<PublicKeyRecord> for PublicKeyView {
    fn from(record: PublicKeyRecord) -> Self {
        PublicKeyView {
            key_id: record.key_id.to_string(),
            fingerprint: record.fingerprint.to_string(),
            user_ids: record
                .user_ids
                .into_iter()
                .map(|uid| UserIdView {
                    name: uid.name.clone(),
                    email: uid.email.get_email(),
                    verified: uid.is_verified(),
                })
                .collect(),
            created: record.created,
            algorithm: record.algorithm,
            key_size: record.key_size,
            uploaded: record.uploaded_at,
            verified: record.verified_at,
            public_key_armored: record.armored,
        }
    }
}

#[derive(Debug, Responder)]
pub enum KeyResponse {
    Message(String),
    Key(Json<PublicKeyView>),
}

#[post("/api/v1/key", data = "<upload>")]
#[tracing::instrument(skip(upload))]
pub async fn upload(
    conn: KeyDBConn,
    mailer: &State<MailerHolder>,
    upload: Option<Json<KeyUpload>>,
) -> Result<Status, ErrorResponse> {
    let upload = upload.ok_or(ValidationError::MalformedPayload)?;
    KeyLifecycle::new(&conn, mailer.inner().get_mailer())
        .upload(upload.public_key_armored.as_str())
        .await?;
    Ok(Status::Created)
}

#[get("/api/v1/key?<query..>")]
#[tracing::instrument]
pub async fn get_key(conn: KeyDBConn, mailer: &State<MailerHolder>, query: KeyQuery) -> Result<KeyResponse, ErrorResponse> {
    let lifecycle = KeyLifecycle::new(&conn, mailer.inner().get_mailer());
    match query.op.as_deref().map(str::trim) {
        Some("verify") => {
            let params = ChallengeParams::from_query(query.key_id.as_deref(), query.nonce.as_deref())?;
            lifecycle.verify(params).await?;
            Ok(KeyResponse::Message("Key successfully verified.".to_string()))
        }
        Some("verifyRemove") => {
            let params = ChallengeParams::from_query(query.key_id.as_deref(), query.nonce.as_deref())?;
            lifecycle.confirm_removal(params).await?;
            Ok(KeyResponse::Message("Key successfully removed.".to_string()))
        }
        None | Some("") => {
            let locator = KeyLocator::from_query(
                query.key_id.as_deref(),
                query.fingerprint.as_deref(),
                query.email.as_deref(),
            )?;
            let record = lifecycle.lookup(locator).await?;
            Ok(KeyResponse::Key(Json(PublicKeyView::from(record))))
        }
        Some(other) => Err(ValidationError::UnknownOperation(other.to_string()).into()),
    }
}

#[delete("/api/v1/key?<query..>")]
#[tracing::instrument]
pub async fn delete_key(
    conn: KeyDBConn,
    mailer: &State<MailerHolder>,
    query: KeySelectorQuery,
) -> Result<Status, ErrorResponse> {
    let selector = KeySelector::from_query(query.key_id.as_deref(), query.email.as_deref())?;
    KeyLifecycle::new(&conn, mailer.inner().get_mailer())
        .request_removal(selector)
        .await?;
    Ok(Status::Accepted)
}
