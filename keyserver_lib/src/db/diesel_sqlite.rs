/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Synchronous SQLite implementation of the [`KeyDocumentStore`](crate::db::KeyDocumentStore) operations.
//!
//! Every function takes the connection it runs on so that it can be called from a pooled
//! connection closure as well as from a plain connection.
//!
//! Writes run in `BEGIN IMMEDIATE` transactions and wait for competing writers up to
//! [`BUSY_TIMEOUT_MS`]. Only the primary user id is proven by the mailed nonce, so it is the
//! only one promoted to verified and the only one email lookups match.

use chrono::{NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::SqliteConnection;
use shared::types::{Email, KeyFingerprint, KeyId};
use tracing::{debug, info};

use crate::challenges::{Nonce, NonceOutcome};
use crate::db::diesel_types::{PublicKeyEntry, UserIdEntry};
use crate::db::schema::{public_keys, user_ids};
use crate::db::{KeyStatus, LookupScope, PublicKeyRecord};
use crate::parsing::ParsedKey;

const PENDING: bool = false;
const PUBLISHED: bool = true;

pub const BUSY_TIMEOUT_MS: u32 = 5000;

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Lets the connection wait for locks held by other connections instead of failing at once.
pub fn configure_connection(connection: &mut SqliteConnection) -> Result<(), anyhow::Error> {
    connection.batch_execute(format!("PRAGMA busy_timeout = {};", BUSY_TIMEOUT_MS).as_str())?;
    Ok(())
}

fn write<T, F>(connection: &mut SqliteConnection, f: F) -> Result<T, anyhow::Error>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, anyhow::Error>,
{
    configure_connection(connection)?;
    connection.immediate_transaction::<_, anyhow::Error, _>(f)
}

pub fn upsert_pending(connection: &mut SqliteConnection, key: &ParsedKey) -> Result<(), anyhow::Error> {
    write(connection, |conn| {
        delete_layer(conn, key.key_id.as_str(), PENDING)?;
        diesel::insert_into(public_keys::table)
            .values(PublicKeyEntry::pending(key, now()))
            .execute(conn)?;
        diesel::insert_into(user_ids::table)
            .values(UserIdEntry::pending(key))
            .execute(conn)?;
        debug!("stored pending layer for {}", key.key_id);
        Ok(())
    })
}

pub fn set_verify_nonce(
    connection: &mut SqliteConnection,
    key_id: &KeyId,
    nonce: &Nonce,
) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
    write(connection, |conn| {
        let entry = match load_entry(conn, key_id.as_str(), PENDING)? {
            None => return Ok(None),
            Some(entry) => entry,
        };
        set_primary_nonce(conn, key_id.as_str(), PENDING, Some(nonce.as_str()))?;
        attach_user_ids(conn, entry).map(Some)
    })
}

pub fn mark_verified(
    connection: &mut SqliteConnection,
    key_id: &KeyId,
    nonce: &Nonce,
) -> Result<NonceOutcome, anyhow::Error> {
    write(connection, |conn| {
        let pending = match load_entry(conn, key_id.as_str(), PENDING)? {
            Some(entry) if entry.status == KeyStatus::Pending.as_str() => entry,
            _ => return Ok(NonceOutcome::NotFound),
        };
        let primary = match load_primary_user_id(conn, key_id.as_str(), PENDING)? {
            None => return Ok(NonceOutcome::NotFound),
            Some(uid) => uid,
        };
        match primary.nonce.as_deref() {
            None => return Ok(NonceOutcome::NotFound),
            Some(stored) if !nonce.matches(stored) => return Ok(NonceOutcome::Mismatch),
            Some(_) => {}
        }

        delete_layer(conn, pending.key_id.as_str(), PUBLISHED)?;
        let superseded: Vec<String> = user_ids::table
            .filter(user_ids::published.eq(PUBLISHED))
            .filter(user_ids::is_primary.eq(true))
            .filter(user_ids::email.eq(primary.email.as_str()))
            .filter(user_ids::key_id.ne(pending.key_id.as_str()))
            .select(user_ids::key_id)
            .load(conn)?;
        for other in superseded.iter() {
            info!("replacing published key {} by {}", other, pending.key_id);
            delete_layer(conn, other.as_str(), PUBLISHED)?;
        }

        let verified = KeyStatus::Verified.as_str();
        diesel::update(public_keys::table.find((pending.key_id.as_str(), PENDING)))
            .set((
                public_keys::published.eq(PUBLISHED),
                public_keys::status.eq(verified),
                public_keys::verified_at.eq(Some(now())),
            ))
            .execute(conn)?;
        diesel::update(
            user_ids::table
                .filter(user_ids::key_id.eq(pending.key_id.as_str()))
                .filter(user_ids::published.eq(PENDING)),
        )
        .set((user_ids::published.eq(PUBLISHED), user_ids::nonce.eq(None::<String>)))
        .execute(conn)?;
        diesel::update(
            user_ids::table
                .filter(user_ids::key_id.eq(pending.key_id.as_str()))
                .filter(user_ids::published.eq(PUBLISHED))
                .filter(user_ids::is_primary.eq(true)),
        )
        .set(user_ids::status.eq(verified))
        .execute(conn)?;
        Ok(NonceOutcome::Consumed)
    })
}

pub fn mark_pending_removal(
    connection: &mut SqliteConnection,
    key_id: &KeyId,
    nonce: &Nonce,
) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
    write(connection, |conn| {
        let entry = match find_entry(conn, LookupScope::Any, |conn, layer| {
            load_entry(conn, key_id.as_str(), layer)
        })? {
            None => return Ok(None),
            Some(entry) => entry,
        };
        let layer = entry.published;
        let removal = KeyStatus::PendingRemoval.as_str();
        diesel::update(public_keys::table.find((key_id.as_str(), layer)))
            .set(public_keys::status.eq(removal))
            .execute(conn)?;
        diesel::update(
            user_ids::table
                .filter(user_ids::key_id.eq(key_id.as_str()))
                .filter(user_ids::published.eq(layer))
                .filter(user_ids::is_primary.eq(true)),
        )
        .set((user_ids::status.eq(removal), user_ids::nonce.eq(Some(nonce.as_str()))))
        .execute(conn)?;

        match load_entry(conn, key_id.as_str(), layer)? {
            None => Ok(None),
            Some(entry) => attach_user_ids(conn, entry).map(Some),
        }
    })
}

pub fn remove(connection: &mut SqliteConnection, key_id: &KeyId, nonce: &Nonce) -> Result<NonceOutcome, anyhow::Error> {
    write(connection, |conn| {
        let primary: Option<UserIdEntry> = user_ids::table
            .filter(user_ids::key_id.eq(key_id.as_str()))
            .filter(user_ids::is_primary.eq(true))
            .filter(user_ids::status.eq(KeyStatus::PendingRemoval.as_str()))
            .order(user_ids::published.desc())
            .select(UserIdEntry::as_select())
            .first(conn)
            .optional()?;
        match primary.and_then(|uid| uid.nonce) {
            None => return Ok(NonceOutcome::NotFound),
            Some(stored) if !nonce.matches(stored.as_str()) => return Ok(NonceOutcome::Mismatch),
            Some(_) => {}
        }
        delete_layer(conn, key_id.as_str(), PENDING)?;
        delete_layer(conn, key_id.as_str(), PUBLISHED)?;
        info!("removed all data for {}", key_id);
        Ok(NonceOutcome::Consumed)
    })
}

pub fn find_by_key_id(
    connection: &mut SqliteConnection,
    key_id: &KeyId,
    scope: LookupScope,
) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
    configure_connection(connection)?;
    find_record(connection, scope, |conn, layer| load_entry(conn, key_id.as_str(), layer))
}

pub fn find_by_fingerprint(
    connection: &mut SqliteConnection,
    fingerprint: &KeyFingerprint,
    scope: LookupScope,
) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
    configure_connection(connection)?;
    find_record(connection, scope, |conn, layer| {
        public_keys::table
            .filter(public_keys::fingerprint.eq(fingerprint.as_str()))
            .filter(public_keys::published.eq(layer))
            .select(PublicKeyEntry::as_select())
            .first(conn)
            .optional()
            .map_err(anyhow::Error::from)
    })
}

pub fn find_by_email(
    connection: &mut SqliteConnection,
    email: &Email,
    scope: LookupScope,
) -> Result<Option<PublicKeyRecord>, anyhow::Error> {
    let email = email.get_email();
    configure_connection(connection)?;
    find_record(connection, scope, |conn, layer| {
        let key_ids: Vec<String> = user_ids::table
            .filter(user_ids::email.eq(email.as_str()))
            .filter(user_ids::published.eq(layer))
            .filter(user_ids::is_primary.eq(true))
            .select(user_ids::key_id)
            .distinct()
            .load(conn)?;
        if key_ids.is_empty() {
            return Ok(None);
        }
        public_keys::table
            .filter(public_keys::key_id.eq_any(key_ids))
            .filter(public_keys::published.eq(layer))
            .order(public_keys::uploaded_at.desc())
            .select(PublicKeyEntry::as_select())
            .first(conn)
            .optional()
            .map_err(anyhow::Error::from)
    })
}

fn find_entry<F>(
    conn: &mut SqliteConnection,
    scope: LookupScope,
    mut query: F,
) -> Result<Option<PublicKeyEntry>, anyhow::Error>
where
    F: FnMut(&mut SqliteConnection, bool) -> Result<Option<PublicKeyEntry>, anyhow::Error>,
{
    for layer in scope.layers() {
        if let Some(entry) = query(conn, *layer)? {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

fn find_record<F>(
    conn: &mut SqliteConnection,
    scope: LookupScope,
    query: F,
) -> Result<Option<PublicKeyRecord>, anyhow::Error>
where
    F: FnMut(&mut SqliteConnection, bool) -> Result<Option<PublicKeyEntry>, anyhow::Error>,
{
    match find_entry(conn, scope, query)? {
        None => Ok(None),
        Some(entry) => attach_user_ids(conn, entry).map(Some),
    }
}

fn load_entry(conn: &mut SqliteConnection, key_id: &str, layer: bool) -> Result<Option<PublicKeyEntry>, anyhow::Error> {
    Ok(public_keys::table
        .find((key_id, layer))
        .select(PublicKeyEntry::as_select())
        .first(conn)
        .optional()?)
}

fn load_primary_user_id(
    conn: &mut SqliteConnection,
    key_id: &str,
    layer: bool,
) -> Result<Option<UserIdEntry>, anyhow::Error> {
    Ok(user_ids::table
        .filter(user_ids::key_id.eq(key_id))
        .filter(user_ids::published.eq(layer))
        .filter(user_ids::is_primary.eq(true))
        .select(UserIdEntry::as_select())
        .first(conn)
        .optional()?)
}

fn attach_user_ids(conn: &mut SqliteConnection, entry: PublicKeyEntry) -> Result<PublicKeyRecord, anyhow::Error> {
    let uids: Vec<UserIdEntry> = user_ids::table
        .filter(user_ids::key_id.eq(entry.key_id.as_str()))
        .filter(user_ids::published.eq(entry.published))
        .order(user_ids::position.asc())
        .select(UserIdEntry::as_select())
        .load(conn)?;
    entry.into_record(uids)
}

fn set_primary_nonce(
    conn: &mut SqliteConnection,
    key_id: &str,
    layer: bool,
    nonce: Option<&str>,
) -> Result<usize, anyhow::Error> {
    Ok(diesel::update(
        user_ids::table
            .filter(user_ids::key_id.eq(key_id))
            .filter(user_ids::published.eq(layer))
            .filter(user_ids::is_primary.eq(true)),
    )
    .set(user_ids::nonce.eq(nonce))
    .execute(conn)?)
}

fn delete_layer(conn: &mut SqliteConnection, key_id: &str, layer: bool) -> Result<(), anyhow::Error> {
    diesel::delete(
        user_ids::table
            .filter(user_ids::key_id.eq(key_id))
            .filter(user_ids::published.eq(layer)),
    )
    .execute(conn)?;
    diesel::delete(public_keys::table.find((key_id, layer))).execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use diesel::connection::SimpleConnection;
    use diesel::{Connection, SqliteConnection};
    use tempfile::TempDir;

    use super::{find_by_key_id, upsert_pending};
    use crate::db::{perform_migrations, LookupScope};
    use crate::parsing::parse_public_key;
    use crate::parsing::test_keys::generate_armored_key;

    #[test]
    fn writer_waits_for_competing_lock() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().join("keys.sqlite").to_string_lossy().to_string();
        let mut holder = SqliteConnection::establish(url.as_str()).unwrap();
        perform_migrations(&mut holder).unwrap();
        holder.batch_execute("BEGIN IMMEDIATE;").unwrap();

        let key = parse_public_key(generate_armored_key(&["Alice <alice@example.org>"]).as_str()).unwrap();
        let writer = {
            let url = url.clone();
            let key = key.clone();
            thread::spawn(move || {
                let mut conn = SqliteConnection::establish(url.as_str()).unwrap();
                upsert_pending(&mut conn, &key).map_err(|e| e.to_string())
            })
        };
        thread::sleep(Duration::from_millis(300));
        holder.batch_execute("COMMIT;").unwrap();

        assert_eq!(writer.join().unwrap(), Ok(()));
        let stored = find_by_key_id(&mut holder, &key.key_id, LookupScope::Any).unwrap();
        assert!(stored.is_some());
    }
}
