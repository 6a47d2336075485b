/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use serde::Serialize;
use shared::types::{Email, KeyFingerprint, KeyId};
use shared::utils::armor::add_armor_comment;

use crate::db::PublicKeyRecord;
use crate::errors::KeyserverError;
use crate::lifecycle::KeyLifecycle;
use crate::params::KeyLocator;
use crate::parsing::user_id_display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    KeyId(KeyId),
    Fingerprint(KeyFingerprint),
    Email(Email),
}

impl SearchTerm {
    pub fn classify(search: Option<&str>) -> Result<Self, KeyserverError> {
        let search = search.map(str::trim).unwrap_or_default();
        if let Some(hex) = search.strip_prefix("0x").or_else(|| search.strip_prefix("0X")) {
            return match hex.len() {
                KeyId::HEX_LENGTH => KeyId::parse(hex)
                    .map(SearchTerm::KeyId)
                    .map_err(|_| unsupported_search(search)),
                KeyFingerprint::HEX_LENGTH => KeyFingerprint::parse(hex)
                    .map(SearchTerm::Fingerprint)
                    .map_err(|_| unsupported_search(search)),
                // short key ids and v3 fingerprints are ambiguous
                _ => Err(unsupported_search(search)),
            };
        }
        Email::parse(search)
            .map(SearchTerm::Email)
            .map_err(|_| unsupported_search(search))
    }

    fn locator(&self) -> KeyLocator {
        match self {
            SearchTerm::KeyId(key_id) => KeyLocator::KeyId(key_id.clone()),
            SearchTerm::Fingerprint(fpr) => KeyLocator::Fingerprint(fpr.clone()),
            SearchTerm::Email(email) => KeyLocator::Email(email.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            SearchTerm::KeyId(key_id) => format!("0x{}", key_id),
            SearchTerm::Fingerprint(fpr) => format!("0x{}", fpr),
            SearchTerm::Email(email) => email.to_string(),
        }
    }
}

fn unsupported_search(search: &str) -> KeyserverError {
    match search.is_empty() {
        true => KeyserverError::not_implemented("Missing search parameter."),
        false => KeyserverError::not_implemented(format!("Unsupported search <{}>.", search).as_str()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HkpOperation {
    Get,
    Index,
    Vindex,
}

impl HkpOperation {
    pub fn parse(op: Option<&str>) -> Result<Self, KeyserverError> {
        match op.map(str::trim) {
            Some("get") => Ok(HkpOperation::Get),
            Some("index") => Ok(HkpOperation::Index),
            Some("vindex") => Ok(HkpOperation::Vindex),
            Some(other) if !other.is_empty() => Err(KeyserverError::not_implemented(
                format!("Operation <{}> is not supported.", other).as_str(),
            )),
            _ => Err(KeyserverError::not_implemented("Missing op parameter.")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HkpOptions {
    pub machine_readable: bool,
}

impl HkpOptions {
    pub fn parse(options: Option<&str>) -> Self {
        let machine_readable = options
            .unwrap_or_default()
            .split(',')
            .any(|option| option.trim() == "mr");
        HkpOptions { machine_readable }
    }
}

#[derive(Debug, Clone)]
pub struct HkpRequest {
    pub op: HkpOperation,
    pub search: SearchTerm,
    pub options: HkpOptions,
}

impl HkpRequest {
    pub fn from_query(op: Option<&str>, search: Option<&str>, options: Option<&str>) -> Result<Self, KeyserverError> {
        Ok(HkpRequest {
            op: HkpOperation::parse(op)?,
            search: SearchTerm::classify(search)?,
            options: HkpOptions::parse(options),
        })
    }
}

/// Data for the HTML page showing a single key.
#[derive(Debug, Clone, Serialize)]
pub struct KeyPageView {
    pub search: String,
    pub armored: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexKeyView {
    pub fingerprint: String,
    pub key_id: String,
    pub algorithm: String,
    pub bits: Option<u32>,
    pub created: String,
    pub primary_user_id: String,
    pub user_ids: Vec<String>,
}

/// Data for the HTML index and verbose index pages.
#[derive(Debug, Clone, Serialize)]
pub struct IndexPageView {
    pub search: String,
    pub verbose: bool,
    pub count: usize,
    pub keys: Vec<IndexKeyView>,
}

#[derive(Debug, Clone)]
pub enum HkpResult {
    /// Raw armored key for machine-readable `get`.
    KeyFile(String),
    KeyPage(KeyPageView),
    /// Machine-readable index listing.
    Index(String),
    IndexPage(IndexPageView),
}

#[tracing::instrument]
pub async fn resolve(lifecycle: &KeyLifecycle<'_>, request: HkpRequest) -> Result<HkpResult, KeyserverError> {
    let record = lifecycle.lookup(request.search.locator()).await?;
    let search = request.search.describe();
    let mr = request.options.machine_readable;

    Ok(match request.op {
        HkpOperation::Get if mr => HkpResult::KeyFile(record.armored),
        HkpOperation::Get => HkpResult::KeyPage(KeyPageView {
            armored: add_armor_comment(
                record.armored.as_str(),
                format!("Search result for {}", search).as_str(),
            ),
            search,
        }),
        HkpOperation::Index | HkpOperation::Vindex if mr => {
            HkpResult::Index(machine_readable_index(std::slice::from_ref(&record)))
        }
        HkpOperation::Index | HkpOperation::Vindex => HkpResult::IndexPage(IndexPageView {
            search,
            verbose: request.op == HkpOperation::Vindex,
            count: 1,
            keys: vec![index_key_view(&record)],
        }),
    })
}

/// `info`, `pub` and `uid` lines of the HKP machine-readable index format.
pub fn machine_readable_index(records: &[PublicKeyRecord]) -> String {
    let mut index = format!("info:1:{}\n", records.len());
    for record in records {
        index.push_str(
            format!(
                "pub:{}:{}:{}:{}::\n",
                record.fingerprint,
                record.algorithm,
                record.key_size.map(|bits| bits.to_string()).unwrap_or_default(),
                record.created.and_utc().timestamp()
            )
            .as_str(),
        );
        for uid in record.user_ids.iter().filter(|uid| uid.is_verified()) {
            let display = user_id_display(uid.name.as_str(), &uid.email);
            index.push_str(format!("uid:{}:::\n", urlencoding::encode(display.as_str())).as_str());
        }
    }
    index
}

fn index_key_view(record: &PublicKeyRecord) -> IndexKeyView {
    let user_ids: Vec<String> = record
        .user_ids
        .iter()
        .filter(|uid| uid.is_verified())
        .map(|uid| user_id_display(uid.name.as_str(), &uid.email))
        .collect();
    IndexKeyView {
        fingerprint: record.fingerprint.to_string(),
        key_id: record.key_id.to_string(),
        algorithm: algorithm_letter(record.algorithm).to_string(),
        bits: record.key_size,
        created: record.created.format("%Y-%m-%d").to_string(),
        primary_user_id: record
            .primary_user_id()
            .map(|uid| user_id_display(uid.name.as_str(), &uid.email))
            .unwrap_or_default(),
        user_ids,
    }
}

fn algorithm_letter(algorithm: u8) -> &'static str {
    match algorithm {
        1..=3 => "R",
        16 | 20 => "g",
        17 => "D",
        18 => "e",
        19 | 22 => "E",
        _ => "?",
    }
}
