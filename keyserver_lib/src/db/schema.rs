/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

diesel::table! {
    public_keys (key_id, published) {
        key_id -> Text,
        published -> Bool,
        fingerprint -> Text,
        armored -> Text,
        algorithm -> Integer,
        key_size -> Nullable<Integer>,
        created -> Timestamp,
        status -> Text,
        uploaded_at -> Timestamp,
        verified_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    user_ids (key_id, published, position) {
        key_id -> Text,
        published -> Bool,
        position -> Integer,
        name -> Text,
        email -> Text,
        is_primary -> Bool,
        status -> Text,
        nonce -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(public_keys, user_ids);
