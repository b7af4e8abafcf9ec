// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The transport contract [`crate::client::Client`] is generic over.
//! Concrete transports (WebSocket, SSE, polling, hybrid) are out of scope
//! for this crate; see `tests/` for an in-process double used to exercise
//! the client state machine.

use crate::error::TransportError;
use crate::types::ServerToClient;
use async_trait::async_trait;

/// A callback invoked for every message the transport receives from the
/// server. `Client::new`/`Client::reconnect` register one at `connect`
/// time and drain it via `Client::poll_incoming`.
pub type OnReceive = Box<dyn FnMut(ServerToClient) + Send>;

/// The client's view of its connection to the server. Implementations own
/// reconnect/backoff policy and message framing; the client core only
/// calls these three methods.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, on_receive: OnReceive) -> Result<(), TransportError>;
    async fn send(&self, msg: crate::types::ClientToServer) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}
