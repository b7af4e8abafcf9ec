// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The storage adapter contract, and an in-memory reference
//! implementation sufficient for tests and embedding examples.

use crate::error::AdapterError;
use crate::ot::Operation;
use crate::types::{DocId, DocumentRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Narrow persistence interface the server commits through. Production
/// adapters (Redis, a SQL transaction, ...) implement this against
/// whatever atomic primitive their backend offers; this crate ships only
/// the in-memory reference below.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    async fn get_record(&self, doc_id: &DocId) -> Result<DocumentRecord, AdapterError>;

    /// Operations at log indices `[start, end)`, oldest first. `end: None`
    /// means "to tail."
    async fn get_history(
        &self,
        doc_id: &DocId,
        start: u64,
        end: Option<u64>,
    ) -> Result<Vec<Operation>, AdapterError>;

    /// Atomically appends `op` and sets the revision to `new_revision`.
    /// Must fail with `ConcurrencyConflict` unless the record's current
    /// `v == new_revision - 1`.
    async fn save_operation(
        &self,
        doc_id: &DocId,
        op: Operation,
        new_revision: u64,
    ) -> Result<(), AdapterError>;

    async fn create_document(
        &self,
        doc_id: &DocId,
        type_name: &str,
        initial_snapshot: String,
    ) -> Result<(), AdapterError>;
}

struct StoredDocument {
    type_name: String,
    initial_snapshot: String,
    log: Vec<Operation>,
}

/// A reference adapter backed by a mutex-guarded map. It does not
/// materialize the current snapshot on each commit: it keeps the initial
/// snapshot plus the append-only log and replays on read. A production
/// adapter may instead persist snapshots periodically for faster cold
/// starts, provided snapshot and revision are read atomically together.
#[derive(Default)]
pub struct InMemoryAdapter {
    documents: Mutex<HashMap<DocId, StoredDocument>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackendAdapter for InMemoryAdapter {
    async fn get_record(&self, doc_id: &DocId) -> Result<DocumentRecord, AdapterError> {
        let documents = self.documents.lock().unwrap();
        let doc = documents
            .get(doc_id)
            .ok_or_else(|| AdapterError::DocumentNotFound(doc_id.to_string()))?;

        let mut snapshot = doc.initial_snapshot.clone();
        for op in &doc.log {
            snapshot = crate::ot::apply(&snapshot, op)
                .map_err(|e| AdapterError::StorageUnavailable(e.to_string()))?;
        }

        Ok(DocumentRecord {
            type_name: doc.type_name.clone(),
            v: doc.log.len() as u64,
            snapshot,
        })
    }

    async fn get_history(
        &self,
        doc_id: &DocId,
        start: u64,
        end: Option<u64>,
    ) -> Result<Vec<Operation>, AdapterError> {
        let documents = self.documents.lock().unwrap();
        let doc = documents
            .get(doc_id)
            .ok_or_else(|| AdapterError::DocumentNotFound(doc_id.to_string()))?;

        let start = start as usize;
        let end = end.map_or(doc.log.len(), |e| e as usize);
        Ok(doc.log.get(start..end).unwrap_or_default().to_vec())
    }

    async fn save_operation(
        &self,
        doc_id: &DocId,
        op: Operation,
        new_revision: u64,
    ) -> Result<(), AdapterError> {
        let mut documents = self.documents.lock().unwrap();
        let doc = documents
            .get_mut(doc_id)
            .ok_or_else(|| AdapterError::DocumentNotFound(doc_id.to_string()))?;

        let current = doc.log.len() as u64;
        if new_revision != current + 1 {
            return Err(AdapterError::ConcurrencyConflict { expected: current });
        }

        doc.log.push(op);
        Ok(())
    }

    async fn create_document(
        &self,
        doc_id: &DocId,
        type_name: &str,
        initial_snapshot: String,
    ) -> Result<(), AdapterError> {
        let mut documents = self.documents.lock().unwrap();
        documents.insert(
            doc_id.clone(),
            StoredDocument {
                type_name: type_name.to_string(),
                initial_snapshot,
                log: Vec::new(),
            },
        );
        Ok(())
    }
}
