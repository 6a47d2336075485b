/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use thiserror::Error;

use crate::params::ValidationError;
use crate::parsing::ParseError;

#[derive(Debug, Error)]
pub enum KeyserverError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    NotFound(String),
    #[error("The provided nonce is not valid for this key.")]
    InvalidNonce,
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl KeyserverError {
    pub fn not_found(what: &str) -> Self {
        KeyserverError::NotFound(format!("No key found for {}.", what))
    }

    pub fn not_implemented(what: &str) -> Self {
        KeyserverError::NotImplemented(what.to_string())
    }

    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            KeyserverError::Parse(_) | KeyserverError::Validation(_) => 400,
            KeyserverError::NotFound(_) | KeyserverError::InvalidNonce => 404,
            KeyserverError::NotImplemented(_) => 501,
            KeyserverError::Internal(_) => 500,
        }
    }
}
