//! Bulk writes / 批量写入
//!
//! Item failures never abort a batch: they are counted, logged at `warn` and
//! returned in the [`BulkReport`]. Only malformed input (a missing id when ids
//! were promised) or a transport failure fails the whole call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::Document;
use crate::backend::{BulkAction, BulkItemResult, BulkOp, SearchBackend};
use crate::error::{Result, SearchError};

/// Untyped document for [`BulkWriter::bulk_raw`] / 原始文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// Outcome of one bulk call / 批量结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Failing items in submission order
    pub errors: Vec<BulkItemResult>,
}

impl BulkReport {
    fn from_items(items: Vec<BulkItemResult>) -> Self {
        let mut report = BulkReport::default();
        for item in items {
            if item.is_ok() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                report.errors.push(item);
            }
        }
        report
    }
}

/// Bulk writer bound to one index / 批量写入器
#[derive(Clone)]
pub struct BulkWriter {
    backend: Arc<dyn SearchBackend>,
    index: String,
}

impl BulkWriter {
    pub fn new(backend: Arc<dyn SearchBackend>, index: &str) -> Self {
        Self {
            backend,
            index: index.to_string(),
        }
    }

    fn action(&self, op: BulkOp, id: Option<String>, source: Map<String, Value>) -> BulkAction {
        BulkAction {
            op,
            index: self.index.clone(),
            id,
            source: (op != BulkOp::Delete).then_some(source),
        }
    }

    /// Write typed documents / 写入类型化文档
    ///
    /// With `with_ids`, each document's own id is used; otherwise the backend
    /// assigns one.
    pub async fn bulk_documents<D, I>(&self, documents: I, op: BulkOp, with_ids: bool) -> Result<BulkReport>
    where
        D: Document,
        I: IntoIterator<Item = D>,
    {
        let mut actions = Vec::new();
        for document in documents {
            let id = if with_ids {
                Some(document.document_id()?)
            } else {
                None
            };
            actions.push(self.action(op, id, document.to_source()?));
        }
        self.submit(op, actions).await
    }

    /// Write untyped `{_id, _source}` documents / 写入原始文档
    pub async fn bulk_raw<I>(&self, documents: I, op: BulkOp, with_ids: bool) -> Result<BulkReport>
    where
        I: IntoIterator<Item = RawDocument>,
    {
        let mut actions = Vec::new();
        for document in documents {
            let id = match (with_ids, document.id) {
                (true, Some(id)) => Some(id),
                (true, None) => return Err(SearchError::validation("raw document without `_id`")),
                (false, _) => None,
            };
            actions.push(self.action(op, id, document.source));
        }
        self.submit(op, actions).await
    }

    async fn submit(&self, op: BulkOp, actions: Vec<BulkAction>) -> Result<BulkReport> {
        if actions.is_empty() {
            return Ok(BulkReport::default());
        }

        tracing::info!("Sending bulk {} of {} documents to {}", op, actions.len(), self.index);
        let report = BulkReport::from_items(self.backend.bulk(actions).await?);

        tracing::info!(
            "Bulk {} finished: {} succeeded, {} failed",
            op,
            report.succeeded,
            report.failed
        );
        for item in &report.errors {
            tracing::warn!(
                "Bulk {} failed for {:?} (status {}): {}",
                item.op,
                item.id,
                item.status,
                item.error.as_deref().unwrap_or("not found")
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::catalog::schema::{upload_index_layout, CatalogUpload, CatalogUploadStatus};
    use crate::error::ErrorKind;
    use serde_json::json;

    fn upload(hash: &str) -> CatalogUpload {
        CatalogUpload {
            client_id: "c-1".to_string(),
            rut_proveedor: "76350871".to_string(),
            file_hash: hash.to_string(),
            status: CatalogUploadStatus::InProgress,
            incomplete_errors: Vec::new(),
            fatal_errors: Vec::new(),
        }
    }

    fn writer() -> (Arc<MemoryBackend>, BulkWriter) {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_index(upload_index_layout("catalogo_upload"));
        let writer = BulkWriter::new(backend.clone(), "catalogo_upload");
        (backend, writer)
    }

    #[tokio::test]
    async fn test_index_then_update_then_delete() {
        let (backend, writer) = writer();
        let report = writer
            .bulk_documents(vec![upload("h1"), upload("h2")], BulkOp::Index, true)
            .await
            .unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 0));
        assert_eq!(backend.document_count("catalogo_upload"), 2);

        let mut done = upload("h1");
        done.status = CatalogUploadStatus::Complete;
        writer.bulk_documents([done], BulkOp::Update, true).await.unwrap();
        assert_eq!(backend.get_document("catalogo_upload", "h1").unwrap()["status"], "Completo");

        let report = writer
            .bulk_documents([upload("h2"), upload("missing")], BulkOp::Delete, true)
            .await
            .unwrap();
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(report.errors[0].status, 404);
        assert_eq!(backend.document_count("catalogo_upload"), 1);
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort_the_batch() {
        let (backend, writer) = writer();
        let documents = vec![
            RawDocument {
                id: Some("ok".to_string()),
                source: json!({ "file_hash": "ok" }).as_object().cloned().unwrap(),
            },
            RawDocument {
                id: Some("bad".to_string()),
                source: json!({ "not_mapped": true }).as_object().cloned().unwrap(),
            },
            RawDocument {
                id: Some("also-ok".to_string()),
                source: json!({ "file_hash": "also-ok" }).as_object().cloned().unwrap(),
            },
        ];
        let report = writer.bulk_raw(documents, BulkOp::Index, true).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert_eq!(report.errors[0].id.as_deref(), Some("bad"));
        assert_eq!(backend.document_count("catalogo_upload"), 2);
    }

    #[tokio::test]
    async fn test_missing_ids_are_rejected_up_front() {
        let (backend, writer) = writer();
        let err = writer
            .bulk_raw([RawDocument::default()], BulkOp::Index, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = writer.bulk_documents([upload(" ")], BulkOp::Index, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.document_count("catalogo_upload"), 0);

        let report = writer
            .bulk_raw(
                [RawDocument {
                    id: None,
                    source: json!({ "file_hash": "generated" }).as_object().cloned().unwrap(),
                }],
                BulkOp::Index,
                false,
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(writer.bulk_raw(Vec::new(), BulkOp::Index, true).await.unwrap().errors.is_empty());
    }
}
