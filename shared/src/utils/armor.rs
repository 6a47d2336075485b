/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use sequoia_openpgp::cert::Cert;

use super::openpgp::serialize::SerializeInto;

/// Armors the public parts of a certificate. Secret key material is never exported.
pub fn export_armored_cert(cert: &Cert) -> Result<String, anyhow::Error> {
    let serialized = cert.armored().export_to_vec()?;
    Ok(String::from_utf8(serialized)?)
}

/// Inserts an additional `Comment` header directly below the armor header line.
pub fn add_armor_comment(armored: &str, comment: &str) -> String {
    let comment = comment.replace(['\r', '\n'], " ");
    match armored.split_once('\n') {
        Some((header_line, rest)) if header_line.starts_with("-----BEGIN ") => {
            format!("{}\nComment: {}\n{}", header_line.trim_end(), comment, rest)
        }
        _ => armored.to_string(),
    }
}
