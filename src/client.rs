// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The client synchronization state machine: tracks a local snapshot and
//! revision, coalesces local edits behind at most one outstanding send, and
//! reconciles concurrent remote operations against whatever is pending.

use crate::error::ClientError;
use crate::ot::{self, Operation, Side};
use crate::transport::{OnReceive, Transport};
use crate::types::{ClientToServer, ServerToClient};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Where the client's synchronization state machine currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Synchronized,
    AwaitingConfirm { pending: Operation },
    AwaitingWithBuffer { pending: Operation, buffer: Operation },
}

/// A listener invoked synchronously after every snapshot mutation, with
/// the new snapshot.
pub type ChangeListener = Box<dyn FnMut(&str) + Send>;

/// One document's client-side synchronization state.
pub struct Client<T: Transport> {
    snapshot: String,
    revision: u64,
    state: ClientState,
    transport: Option<T>,
    listeners: Vec<Option<ChangeListener>>,
    /// Messages the receive callback registered at `connect`/`reconnect`
    /// time has queued. `poll_incoming` drains this in order; the
    /// callback itself only enqueues, since the transport's `OnReceive`
    /// is `FnMut(ServerToClient)` and has no way to reach back into
    /// `&mut Client` (spec §9's note that no cross-thread delivery
    /// semantics are implied).
    incoming: Arc<Mutex<VecDeque<ServerToClient>>>,
}

/// A handle returned by [`Client::subscribe`] that removes the listener
/// when passed to [`Client::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

impl<T: Transport> Client<T> {
    /// Constructs a client in `Synchronized`, seeded with the snapshot and
    /// revision of the document as the caller last observed it (typically
    /// from an `Init` message). If a transport is supplied, registers the
    /// client's receive callback and initiates connect, per spec §4.2.
    /// Connecting does not block local edits: `apply_local` accumulates
    /// and sends regardless of whether the transport has finished its
    /// handshake.
    pub async fn new(
        initial_snapshot: impl Into<String>,
        initial_revision: u64,
        transport: Option<T>,
    ) -> Result<Self, ClientError> {
        let incoming = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(transport) = &transport {
            transport.connect(Self::receive_callback(&incoming)).await?;
        }
        Ok(Self {
            snapshot: initial_snapshot.into(),
            revision: initial_revision,
            state: ClientState::Synchronized,
            transport,
            listeners: Vec::new(),
            incoming,
        })
    }

    fn receive_callback(incoming: &Arc<Mutex<VecDeque<ServerToClient>>>) -> OnReceive {
        let incoming = incoming.clone();
        Box::new(move |msg| incoming.lock().unwrap().push_back(msg))
    }

    /// Reconnects the transport after it dropped, re-registering the
    /// receive callback and resending whatever op is still outstanding at
    /// its original revision. A dropped transport never mutates the state
    /// machine by itself (spec §5); this is the caller-driven recovery
    /// path once it decides to retry.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };
        transport
            .connect(Self::receive_callback(&self.incoming))
            .await?;

        match self.state.clone() {
            ClientState::Synchronized => Ok(()),
            ClientState::AwaitingConfirm { pending }
            | ClientState::AwaitingWithBuffer { pending, .. } => self.send(pending).await,
        }
    }

    /// Drains messages the registered receive callback has queued since
    /// the last call and applies each in order: an `Ack` advances the
    /// pending op, an `Op` is an already-linearized remote edit. `Init`
    /// and `Timeout` are transport bootstrapping/hints this core doesn't
    /// act on directly and are dropped once observed.
    pub async fn poll_incoming(&mut self) -> Result<(), ClientError> {
        loop {
            let message = self.incoming.lock().unwrap().pop_front();
            match message {
                Some(ServerToClient::Ack) => self.on_server_ack().await?,
                Some(ServerToClient::Op { op, .. }) => self.on_remote(&op)?,
                Some(ServerToClient::Init { .. } | ServerToClient::Timeout { .. }) => {}
                None => break,
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub const fn state(&self) -> &ClientState {
        &self.state
    }

    /// Registers a listener invoked after every snapshot mutation.
    /// Delivery is synchronous with the mutation that triggered it.
    pub fn subscribe(&mut self, listener: ChangeListener) -> SubscriptionId {
        self.listeners.push(Some(listener));
        SubscriptionId(self.listeners.len() - 1)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(slot) = self.listeners.get_mut(id.0) {
            *slot = None;
        }
    }

    fn notify(&mut self) {
        for listener in self.listeners.iter_mut().flatten() {
            listener(&self.snapshot);
        }
    }

    /// Applies a locally authored edit: validates it against the current
    /// snapshot, updates the snapshot, and either sends it immediately or
    /// coalesces it into whatever is already outstanding.
    pub async fn apply_local(&mut self, op: Operation) -> Result<(), ClientError> {
        let new_snapshot = ot::apply(&self.snapshot, &op).map_err(ClientError::OpInvalid)?;
        self.snapshot = new_snapshot;

        match std::mem::replace(&mut self.state, ClientState::Synchronized) {
            ClientState::Synchronized => {
                self.state = ClientState::AwaitingConfirm {
                    pending: op.clone(),
                };
                self.send(op).await?;
            }
            ClientState::AwaitingConfirm { pending } => {
                debug!("buffering local edit behind one in-flight op");
                self.state = ClientState::AwaitingWithBuffer {
                    pending,
                    buffer: op,
                };
            }
            ClientState::AwaitingWithBuffer { pending, buffer } => {
                self.state = ClientState::AwaitingWithBuffer {
                    pending,
                    buffer: ot::compose(&buffer, &op),
                };
            }
        }

        self.notify();
        Ok(())
    }

    async fn send(&self, op: Operation) -> Result<(), ClientError> {
        if let Some(transport) = &self.transport {
            transport
                .send(ClientToServer::Op {
                    op,
                    revision: self.revision,
                })
                .await?;
        }
        Ok(())
    }

    /// Handles an acknowledgment of the currently pending op.
    pub async fn on_server_ack(&mut self) -> Result<(), ClientError> {
        match std::mem::replace(&mut self.state, ClientState::Synchronized) {
            ClientState::Synchronized => {
                self.state = ClientState::Synchronized;
                warn!("received an ack while not awaiting one");
                Err(ClientError::UnexpectedAck)
            }
            ClientState::AwaitingConfirm { .. } => {
                self.revision += 1;
                self.state = ClientState::Synchronized;
                Ok(())
            }
            ClientState::AwaitingWithBuffer { buffer, .. } => {
                self.revision += 1;
                self.state = ClientState::AwaitingConfirm {
                    pending: buffer.clone(),
                };
                self.send(buffer).await
            }
        }
    }

    /// Handles an already-linearized remote operation arriving from the
    /// server, transforming it against whatever local state is in flight.
    pub fn on_remote(&mut self, op: &Operation) -> Result<(), ClientError> {
        let applied = match std::mem::replace(&mut self.state, ClientState::Synchronized) {
            ClientState::Synchronized => {
                self.state = ClientState::Synchronized;
                op.clone()
            }
            ClientState::AwaitingConfirm { pending } => {
                let op_prime = ot::transform(op, &pending, Side::Right);
                let pending_prime = ot::transform(&pending, op, Side::Left);
                self.state = ClientState::AwaitingConfirm {
                    pending: pending_prime,
                };
                op_prime
            }
            ClientState::AwaitingWithBuffer { pending, buffer } => {
                let op_vs_pending = ot::transform(op, &pending, Side::Right);
                let pending_prime = ot::transform(&pending, op, Side::Left);
                let op_prime = ot::transform(&op_vs_pending, &buffer, Side::Right);
                let buffer_prime = ot::transform(&buffer, &op_vs_pending, Side::Left);
                self.state = ClientState::AwaitingWithBuffer {
                    pending: pending_prime,
                    buffer: buffer_prime,
                };
                op_prime
            }
        };

        self.snapshot = ot::apply(&self.snapshot, &applied).map_err(ClientError::OpInvalid)?;
        self.revision += 1;
        self.notify();
        Ok(())
    }
}
