// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared data types for documents and the client/server wire protocol.

use crate::ot::Operation;
use derive_more::{AsRef, Deref, Display};
use serde::{Deserialize, Serialize};

/// Identifies a document. A thin newtype over `String` so adapter and
/// server signatures read as intent rather than stringly-typed plumbing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, AsRef, Deref, Display)]
#[as_ref(str)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The server-side record an adapter persists for one document: its
/// registered type, current revision, and snapshot. The log of committed
/// operations that produced this state lives alongside it in the adapter,
/// not in this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub type_name: String,
    pub v: u64,
    pub snapshot: String,
}

/// A message a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientToServer {
    Op { op: Operation, revision: u64 },
}

/// A message the server (or a broadcasting peer) sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerToClient {
    Ack,
    Op { op: Operation, revision: u64 },
    Init { snapshot: String, revision: u64 },
    /// Transport-specific hint, not produced by the core; kept here so a
    /// transport can round-trip it through the same message type.
    Timeout {
        #[serde(rename = "suggestPolling")]
        suggest_polling: bool,
    },
}
