/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use keyserver_lib::errors::KeyserverError;
use keyserver_lib::params::ValidationError;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::Request;

#[derive(Debug)]
pub struct ErrorResponse(KeyserverError);

impl<'r, 'o: 'r> Responder<'r, 'o> for ErrorResponse {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = Status::from_code(self.0.status_code()).unwrap_or(Status::InternalServerError);
        let message = if status == Status::InternalServerError {
            tracing::error!("ERROR_RESPONSE for {}: {:#?}", request.uri(), self.0);
            "Internal server error.".to_string()
        } else {
            tracing::info!("ERROR_RESPONSE for {}: {}", request.uri(), self.0);
            self.0.to_string()
        };
        rocket::response::status::Custom(status, message).respond_to(request)
    }
}

impl From<KeyserverError> for ErrorResponse {
    fn from(e: KeyserverError) -> Self {
        ErrorResponse(e)
    }
}

impl From<ValidationError> for ErrorResponse {
    fn from(e: ValidationError) -> Self {
        ErrorResponse(KeyserverError::from(e))
    }
}
