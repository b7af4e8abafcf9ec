// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The authoritative server: registers OT types, catches a client
//! submission up against committed history, and commits it under
//! optimistic locking via a `BackendAdapter`.

use crate::adapter::BackendAdapter;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ot::{self, Operation, Side};
use crate::types::DocId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// The server's view of a registered OT type: a name-keyed vtable over an
/// opaque snapshot/operation pair. All concrete typing stays on the
/// client and adapter side; the server dispatches every algebra operation
/// it needs — `apply`, `transform`, `compose` — through this vtable, so a
/// second registered type never has its catch-up silently run through
/// another type's algebra.
pub trait OtType: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn apply(&self, snapshot: &str, op: &Operation) -> Result<String, crate::error::OtError>;
    fn transform(&self, a: &Operation, b: &Operation, side: Side) -> Operation;
    fn compose(&self, a: &Operation, b: &Operation) -> Operation;

    /// Identifies the concrete implementor behind this trait object, so
    /// `Server::register_type` can tell a true re-registration (the exact
    /// same type under its own name) from a name collision with a
    /// genuinely different type.
    fn type_id(&self) -> std::any::TypeId {
        std::any::TypeId::of::<Self>()
    }
}

/// The Text core's sole implementor of [`OtType`].
pub struct TextType {
    name: String,
}

impl TextType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl OtType for TextType {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, snapshot: &str, op: &Operation) -> Result<String, crate::error::OtError> {
        ot::apply(snapshot, op)
    }

    fn transform(&self, a: &Operation, b: &Operation, side: Side) -> Operation {
        ot::transform(a, b, side)
    }

    fn compose(&self, a: &Operation, b: &Operation) -> Operation {
        ot::compose(a, b)
    }
}

/// The result of a successful [`Server::submit`]: the (possibly
/// catch-up-transformed) operation as committed, and the revision it
/// produced. The caller is responsible for broadcasting both to every
/// other subscriber of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub op: Operation,
    pub revision: u64,
}

/// Registers OT types and linearizes client submissions against a
/// canonical, adapter-persisted history.
pub struct Server<A: BackendAdapter> {
    adapter: Arc<A>,
    types: RwLock<HashMap<String, Arc<dyn OtType>>>,
    config: ServerConfig,
}

impl<A: BackendAdapter> Server<A> {
    pub fn new(adapter: Arc<A>, config: ServerConfig) -> Self {
        Self {
            adapter,
            types: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Registers `ot_type` under its name. Re-registering the same
    /// concrete type under its own name is idempotent; a name collision
    /// with a genuinely different type fails `TypeConflict`.
    pub fn register_type(&self, ot_type: Arc<dyn OtType>) -> Result<(), ServerError> {
        let mut types = self.types.write().unwrap();
        let name = ot_type.name().to_string();
        match types.get(&name) {
            Some(existing) if existing.type_id() == ot_type.type_id() => {
                info!(%name, "type already registered under this name, treating as idempotent");
                Ok(())
            }
            Some(_) => Err(ServerError::TypeConflict(name)),
            None => {
                types.insert(name, ot_type);
                Ok(())
            }
        }
    }

    pub async fn create_document(
        &self,
        doc_id: &DocId,
        type_name: &str,
        initial_snapshot: String,
    ) -> Result<(), ServerError> {
        if !self.types.read().unwrap().contains_key(type_name) {
            return Err(ServerError::TypeUnknown(type_name.to_string()));
        }
        self.adapter
            .create_document(doc_id, type_name, initial_snapshot)
            .await
            .map_err(ServerError::from)
    }

    pub async fn document_revision(&self, doc_id: &DocId) -> Result<u64, ServerError> {
        Ok(self.adapter.get_record(doc_id).await?.v)
    }

    pub async fn document_snapshot(&self, doc_id: &DocId) -> Result<String, ServerError> {
        Ok(self.adapter.get_record(doc_id).await?.snapshot)
    }

    /// Catches `op` up against the committed history since
    /// `client_revision` and commits it, retrying the read-transform-write
    /// cycle up to `config.max_retries` times if the adapter reports a
    /// concurrency conflict from a racing submission.
    pub async fn submit(
        &self,
        doc_id: &DocId,
        op: Operation,
        client_revision: u64,
    ) -> Result<SubmitResult, ServerError> {
        op.validate().map_err(ServerError::OpMalformed)?;

        let mut attempt = 0;
        loop {
            let record = self.adapter.get_record(doc_id).await?;

            let Some(ot_type) = self.types.read().unwrap().get(&record.type_name).cloned() else {
                return Err(ServerError::TypeUnknown(record.type_name));
            };

            if client_revision > record.v {
                return Err(ServerError::RevisionFromFuture {
                    client_revision,
                    server_revision: record.v,
                });
            }

            let transformed = if client_revision < record.v {
                let history = self
                    .adapter
                    .get_history(doc_id, client_revision, Some(record.v))
                    .await?;
                history
                    .iter()
                    .fold(op.clone(), |acc, past_op| {
                        ot_type.transform(&acc, past_op, Side::Right)
                    })
            } else {
                op.clone()
            };

            let new_revision = record.v + 1;
            match self
                .adapter
                .save_operation(doc_id, transformed.clone(), new_revision)
                .await
            {
                Ok(()) => {
                    return Ok(SubmitResult {
                        op: transformed,
                        revision: new_revision,
                    });
                }
                Err(err) if attempt < self.config.max_retries => {
                    warn!(?err, attempt, "concurrency conflict on commit, retrying catch-up");
                    attempt += 1;
                }
                Err(err) => return Err(ServerError::from(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use crate::error::AdapterError;
    use crate::types::DocumentRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::{logs_contain, traced_test};

    fn insert(s: &str) -> Operation {
        let mut op = Operation::new();
        op.insert(s);
        op
    }

    async fn server_with_text_doc(doc_id: &DocId) -> Server<InMemoryAdapter> {
        let adapter = Arc::new(InMemoryAdapter::new());
        let server = Server::new(adapter, ServerConfig::default());
        server
            .register_type(Arc::new(TextType::new("text")))
            .unwrap();
        server
            .create_document(doc_id, "text", String::new())
            .await
            .unwrap();
        server
    }

    #[tokio::test]
    async fn submit_at_current_revision_commits_unchanged() {
        let doc_id = DocId::from("doc-1");
        let server = server_with_text_doc(&doc_id).await;

        let result = server.submit(&doc_id, insert("Hello"), 0).await.unwrap();
        assert_eq!(result.op, insert("Hello"));
        assert_eq!(result.revision, 1);
    }

    #[tokio::test]
    async fn s6_server_catch_up() {
        let doc_id = DocId::from("doc-1");
        let server = server_with_text_doc(&doc_id).await;

        let a = server.submit(&doc_id, insert("Hello"), 0).await.unwrap();
        assert_eq!(a.revision, 1);

        let b = server.submit(&doc_id, insert("World"), 0).await.unwrap();
        assert_eq!(b.revision, 2);

        let mut expected = Operation::new();
        expected.retain(5).insert("World");
        assert_eq!(b.op, expected);

        assert_eq!(server.document_snapshot(&doc_id).await.unwrap(), "HelloWorld");
    }

    #[tokio::test]
    async fn submit_ahead_of_server_revision_is_rejected() {
        let doc_id = DocId::from("doc-1");
        let server = server_with_text_doc(&doc_id).await;

        let result = server.submit(&doc_id, insert("Hello"), 5).await;
        assert_eq!(
            result,
            Err(ServerError::RevisionFromFuture {
                client_revision: 5,
                server_revision: 0,
            })
        );
    }

    #[tokio::test]
    async fn submit_against_unregistered_type_fails() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let server = Server::new(adapter, ServerConfig::default());
        let doc_id = DocId::from("doc-1");

        let result = server.create_document(&doc_id, "text", String::new()).await;
        assert_eq!(result, Err(ServerError::TypeUnknown("text".into())));
    }

    #[tokio::test]
    async fn register_type_is_idempotent_under_the_same_name() {
        let server = Server::new(Arc::new(InMemoryAdapter::new()), ServerConfig::default());
        server
            .register_type(Arc::new(TextType::new("text")))
            .unwrap();
        server
            .register_type(Arc::new(TextType::new("text")))
            .unwrap();
    }

    /// A second, distinct `OtType` implementor purely to force a name
    /// collision between two genuinely different concrete types.
    struct OtherType {
        name: String,
    }

    impl OtType for OtherType {
        fn name(&self) -> &str {
            &self.name
        }

        fn apply(&self, snapshot: &str, op: &Operation) -> Result<String, crate::error::OtError> {
            ot::apply(snapshot, op)
        }

        fn transform(&self, a: &Operation, b: &Operation, side: Side) -> Operation {
            ot::transform(a, b, side)
        }

        fn compose(&self, a: &Operation, b: &Operation) -> Operation {
            ot::compose(a, b)
        }
    }

    #[tokio::test]
    async fn register_type_under_a_taken_name_with_a_different_type_conflicts() {
        let server = Server::new(Arc::new(InMemoryAdapter::new()), ServerConfig::default());
        server
            .register_type(Arc::new(TextType::new("text")))
            .unwrap();

        let result = server.register_type(Arc::new(OtherType {
            name: "text".to_string(),
        }));

        assert_eq!(result, Err(ServerError::TypeConflict("text".into())));
    }

    /// Wraps `InMemoryAdapter` so the first `save_operation` call in a test
    /// fails as if a racing submission had just committed, exercising the
    /// bounded-retry branch of `submit` without a real second task.
    struct ConflictOnceAdapter {
        inner: InMemoryAdapter,
        remaining_conflicts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BackendAdapter for ConflictOnceAdapter {
        async fn get_record(&self, doc_id: &DocId) -> Result<DocumentRecord, AdapterError> {
            self.inner.get_record(doc_id).await
        }

        async fn get_history(
            &self,
            doc_id: &DocId,
            start: u64,
            end: Option<u64>,
        ) -> Result<Vec<Operation>, AdapterError> {
            self.inner.get_history(doc_id, start, end).await
        }

        async fn save_operation(
            &self,
            doc_id: &DocId,
            op: Operation,
            new_revision: u64,
        ) -> Result<(), AdapterError> {
            if self.remaining_conflicts.load(Ordering::SeqCst) > 0 {
                self.remaining_conflicts.fetch_sub(1, Ordering::SeqCst);
                return Err(AdapterError::ConcurrencyConflict {
                    expected: new_revision - 1,
                });
            }
            self.inner.save_operation(doc_id, op, new_revision).await
        }

        async fn create_document(
            &self,
            doc_id: &DocId,
            type_name: &str,
            initial_snapshot: String,
        ) -> Result<(), AdapterError> {
            self.inner
                .create_document(doc_id, type_name, initial_snapshot)
                .await
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn submit_retries_past_a_transient_concurrency_conflict_and_logs_it() {
        let adapter = Arc::new(ConflictOnceAdapter {
            inner: InMemoryAdapter::new(),
            remaining_conflicts: AtomicUsize::new(1),
        });
        let server = Server::new(adapter, ServerConfig::default());
        let doc_id = DocId::from("doc-1");
        server
            .register_type(Arc::new(TextType::new("text")))
            .unwrap();
        server
            .create_document(&doc_id, "text", String::new())
            .await
            .unwrap();

        let result = server.submit(&doc_id, insert("Hello"), 0).await.unwrap();
        assert_eq!(result.revision, 1);
        assert_eq!(
            server.document_snapshot(&doc_id).await.unwrap(),
            "Hello"
        );
        assert!(logs_contain("concurrency conflict on commit, retrying catch-up"));
    }

    #[tokio::test]
    async fn submit_gives_up_after_exhausting_retries() {
        let adapter = Arc::new(ConflictOnceAdapter {
            inner: InMemoryAdapter::new(),
            remaining_conflicts: AtomicUsize::new(100),
        });
        let server = Server::new(adapter, ServerConfig::new(2));
        let doc_id = DocId::from("doc-1");
        server
            .register_type(Arc::new(TextType::new("text")))
            .unwrap();
        server
            .create_document(&doc_id, "text", String::new())
            .await
            .unwrap();

        let result = server.submit(&doc_id, insert("Hello"), 0).await;
        assert_eq!(result, Err(ServerError::ConcurrencyConflict));
    }
}
