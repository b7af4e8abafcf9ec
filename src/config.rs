// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime configuration for the server core.

/// Tunables for [`crate::server::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upper bound on how many times `submit` re-reads the record and
    /// retries catch-up after the adapter reports a concurrency conflict.
    pub max_retries: usize,
}

impl ServerConfig {
    #[must_use]
    pub const fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}
