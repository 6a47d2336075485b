/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

pub mod challenges;
pub mod db;
pub mod errors;
pub mod hkp;
pub mod lifecycle;
pub mod notification;
pub mod params;
pub mod parsing;
