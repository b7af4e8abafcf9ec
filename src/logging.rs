// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing subscriber setup for applications embedding this crate.

use tracing_subscriber::FmtSubscriber;

/// Installs a global `tracing` subscriber at `DEBUG` or `INFO`, mirroring
/// the console-friendly defaults a daemon wires up at startup. Intended
/// for examples and tests; applications with their own logging stack
/// should configure `tracing` themselves and skip this entirely.
pub fn initialize(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default log subscriber failed");
}
