// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed error taxonomy for the three cores, and the wire error codes
//! (spec §6) a transport layer maps them onto.

use thiserror::Error;

/// Failures from the pure Text OT algebra (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtError {
    #[error("operation is not normalized or contains an unknown component")]
    OpMalformed,
    #[error("applying the operation would read past the end of the snapshot")]
    OpOutOfBounds,
}

impl OtError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OpMalformed => "OP_MALFORMED",
            Self::OpOutOfBounds => "OP_MALFORMED",
        }
    }
}

/// Failures surfaced by the client state machine (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("local operation was rejected by the type's apply function: {0}")]
    OpInvalid(#[from] OtError),
    #[error("received an ack while not awaiting one")]
    UnexpectedAck,
    #[error("transport failed to send or receive: {0}")]
    TransportFailure(String),
}

impl ClientError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OpInvalid(_) => "OP_MALFORMED",
            Self::UnexpectedAck => "INTERNAL",
            Self::TransportFailure(_) => "INTERNAL",
        }
    }
}

/// Failures surfaced by the authoritative server (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("document {0:?} does not exist")]
    DocumentNotFound(String),
    #[error("no type is registered under the name {0:?}")]
    TypeUnknown(String),
    #[error("a different type is already registered under the name {0:?}")]
    TypeConflict(String),
    #[error("client revision {client_revision} is ahead of the server's revision {server_revision}")]
    RevisionFromFuture {
        client_revision: u64,
        server_revision: u64,
    },
    #[error("adapter rejected the commit: revision moved under us")]
    ConcurrencyConflict,
    #[error("submitted operation is malformed: {0}")]
    OpMalformed(#[from] OtError),
    #[error("storage backend is unavailable: {0}")]
    StorageUnavailable(String),
}

impl ServerError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::TypeUnknown(_) | Self::TypeConflict(_) => "TYPE_UNKNOWN",
            Self::RevisionFromFuture { .. } => "REVISION_MISMATCH",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::OpMalformed(_) => "OP_MALFORMED",
            Self::StorageUnavailable(_) => "INTERNAL",
        }
    }
}

/// Failures from a `BackendAdapter` implementation (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("document {0:?} does not exist")]
    DocumentNotFound(String),
    #[error("expected current revision {expected}, but the record has moved on")]
    ConcurrencyConflict { expected: u64 },
    #[error("storage operation failed: {0}")]
    StorageUnavailable(String),
}

impl From<AdapterError> for ServerError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::DocumentNotFound(id) => Self::DocumentNotFound(id),
            AdapterError::ConcurrencyConflict { .. } => Self::ConcurrencyConflict,
            AdapterError::StorageUnavailable(msg) => Self::StorageUnavailable(msg),
        }
    }
}

/// Failures from a `Transport` implementation (§4.4), propagated to the
/// client without mutating the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::TransportFailure(err.0)
    }
}
