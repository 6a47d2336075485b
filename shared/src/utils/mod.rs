/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

extern crate sequoia_openpgp as openpgp;

pub mod armor;
pub mod random;
