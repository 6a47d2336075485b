/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use keyserver_lib::hkp::{resolve, HkpRequest, HkpResult};
use keyserver_lib::lifecycle::KeyLifecycle;
use keyserver_lib::params::ValidationError;
use rocket::form::{Form, Lenient};
use rocket::http::{ContentType, Header, Status};
use rocket::State;
use rocket_dyn_templates::Template;

use crate::db::KeyDBConn;
use crate::error::ErrorResponse;
use crate::holders::MailerHolder;

#[derive(FromForm, Debug)]
pub struct KeySubmission {
    keytext: String,
}

#[derive(FromForm, Debug)]
pub struct LookupQuery {
    op: Option<String>,
    search: Option<String>,
    options: Option<String>,
}

#[derive(Debug, Responder)]
pub enum HkpResponse {
    KeyFile(String, ContentType, Header<'static>),
    Index(String, ContentType),
    Page(Template),
}

#[post("/pks/add", data = "<submission>")]
#[tracing::instrument(skip(submission))]
pub async fn add(
    conn: KeyDBConn,
    mailer: &State<MailerHolder>,
    submission: Option<Form<Lenient<KeySubmission>>>,
) -> Result<Status, ErrorResponse> {
    let submission = submission.ok_or(ValidationError::MalformedPayload)?;
    KeyLifecycle::new(&conn, mailer.inner().get_mailer())
        .upload(submission.keytext.as_str())
        .await?;
    Ok(Status::Created)
}

#[get("/pks/lookup?<query..>")]
#[tracing::instrument]
// "exact" and "fingerprint" are implied and therefore ignored
pub async fn lookup(conn: KeyDBConn, mailer: &State<MailerHolder>, query: LookupQuery) -> Result<HkpResponse, ErrorResponse> {
    let request = HkpRequest::from_query(query.op.as_deref(), query.search.as_deref(), query.options.as_deref())?;
    let lifecycle = KeyLifecycle::new(&conn, mailer.inner().get_mailer());

    Ok(match resolve(&lifecycle, request).await? {
        HkpResult::KeyFile(armored) => HkpResponse::KeyFile(
            armored,
            ContentType::new("application", "pgp-keys").with_params(("charset", "utf-8")),
            Header::new("Content-Disposition", "attachment; filename=openpgpkey.asc"),
        ),
        HkpResult::Index(index) => HkpResponse::Index(index, ContentType::Plain),
        HkpResult::KeyPage(page) => HkpResponse::Page(Template::render("hkp_get", &page)),
        HkpResult::IndexPage(page) => HkpResponse::Page(Template::render("hkp_index", &page)),
    })
}
