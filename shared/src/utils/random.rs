/*
 * Copyright (c) 2021. Erik Escher. PortuLock Keyserver. GPL-3.0-only.
 * SPDX-License-Identifier: GPL-3.0-only
 */

use rand::Rng;

pub fn random_key() -> Vec<u8> {
    rand::thread_rng().gen::<[u8; 32]>().to_vec()
}
