/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

#[macro_use]
extern crate rocket;

use keyserver_lib::db::perform_migrations;
use rocket::fairing::{self, AdHoc};
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;

use crate::config::KeyserverConfig;
use crate::db::KeyDBConn;
use crate::holders::MailerHolder;

mod config;
mod db;
mod error;
mod hkp_endpoint;
mod holders;
mod key_endpoint;

#[launch]
//noinspection RsMainFunctionNotFound
fn rocket() -> Rocket<Build> {
    tracing_subscriber::fmt::init();
    build_rocket(rocket::Config::figment())
}

pub(crate) fn build_rocket(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .mount(
            "/",
            routes![
                key_endpoint::upload,
                key_endpoint::get_key,
                key_endpoint::delete_key,
                hkp_endpoint::add,
                hkp_endpoint::lookup,
            ],
        )
        .attach(KeyDBConn::fairing())
        .attach(Template::fairing())
        .attach(AdHoc::try_on_ignite("Configuration", configure))
        .attach(AdHoc::try_on_ignite("Migrations", migrate))
}

async fn configure(rocket: Rocket<Build>) -> fairing::Result {
    let config: KeyserverConfig = match rocket.figment().extract_inner("keyserver") {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Keyserver configuration missing or invalid: {}", e);
            return Err(rocket);
        }
    };
    tracing::info!("using configuration {:?}", config);
    match MailerHolder::from_config(&config) {
        Ok(mailer) => Ok(rocket.manage(mailer)),
        Err(e) => {
            tracing::error!("Failed to set up the mailer: {}", e);
            Err(rocket)
        }
    }
}

async fn migrate(rocket: Rocket<Build>) -> fairing::Result {
    let conn = match KeyDBConn::get_one(&rocket).await {
        Some(conn) => conn,
        None => {
            tracing::error!("Failed to get db connection for migrations.");
            return Err(rocket);
        }
    };
    match conn.run(|c| perform_migrations(c)).await {
        Ok(()) => Ok(rocket),
        Err(e) => {
            tracing::error!("{}", e);
            Err(rocket)
        }
    }
}
