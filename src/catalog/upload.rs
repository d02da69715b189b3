//! Catalog upload status lookups / 上传状态查询

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::bind_index;
use crate::backend::SearchBackend;
use crate::config::CatalogConfig;
use crate::error::{Result, SearchError};
use crate::search::serialize::{serialize, Record, ResponseShape};
use crate::search::SearchRequest;

/// Result size of upload lookups
const UPLOAD_LOOKUP_SIZE: usize = 10;

/// Searchable upload attribute / 可查询字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadField {
    FileHash,
    ClientId,
    RutProveedor,
}

impl UploadField {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadField::FileHash => "file_hash",
            UploadField::ClientId => "client_id",
            UploadField::RutProveedor => "rut_proveedor",
        }
    }
}

impl fmt::Display for UploadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadField {
    type Err = SearchError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file_hash" => Ok(UploadField::FileHash),
            "client_id" => Ok(UploadField::ClientId),
            "rut_proveedor" => Ok(UploadField::RutProveedor),
            other => Err(SearchError::validation(format!(
                "field must be `file_hash`, `client_id` or `rut_proveedor`, got `{}`",
                other
            ))),
        }
    }
}

/// Upload status search / 上传状态搜索
#[derive(Clone)]
pub struct CatalogUploadSearch {
    backend: Arc<dyn SearchBackend>,
    index: String,
}

impl CatalogUploadSearch {
    pub async fn connect(backend: Arc<dyn SearchBackend>, catalog: &CatalogConfig) -> Result<Self> {
        bind_index(backend.as_ref(), &catalog.upload_index_name).await?;
        Ok(Self {
            backend,
            index: catalog.upload_index_name.clone(),
        })
    }

    /// `match` lookup on one upload attribute / 按字段查询
    pub async fn search_by_field(
        &self,
        field: UploadField,
        value: &str,
        include_meta: bool,
    ) -> Result<Vec<Record>> {
        let body = SearchRequest::matching(field.as_str(), value, UPLOAD_LOOKUP_SIZE)?.body();
        tracing::info!("Query on {}: {}", self.index, body.to_json());

        let response = self.backend.execute(&self.index, &body, None).await?;
        serialize(ResponseShape::Typed(&response), include_meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::catalog::schema::upload_index_layout;
    use crate::error::ErrorKind;
    use serde_json::json;

    async fn service() -> CatalogUploadSearch {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_index(upload_index_layout("catalogo_upload"));
        let uploads = [
            ("h1", "c-1", "76350871", "Completo"),
            ("h2", "c-1", "96885880", "En proceso"),
            ("h3", "c-2", "76350871", "Incompleto"),
        ];
        for (hash, client, rut, status) in uploads {
            backend
                .index_document(
                    "catalogo_upload",
                    hash,
                    json!({ "file_hash": hash, "client_id": client, "rut_proveedor": rut, "status": status }),
                )
                .unwrap();
        }
        CatalogUploadSearch::connect(backend, &CatalogConfig::default()).await.unwrap()
    }

    #[test]
    fn test_field_names() {
        assert_eq!("client_id".parse::<UploadField>().unwrap(), UploadField::ClientId);
        let err = "status".parse::<UploadField>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(UploadField::RutProveedor.to_string(), "rut_proveedor");
    }

    #[tokio::test]
    async fn test_search_by_field() {
        let uploads = service().await;

        let by_hash = uploads.search_by_field(UploadField::FileHash, "h2", true).await.unwrap();
        assert_eq!(by_hash.len(), 1);
        assert_eq!(by_hash[0].id(), Some("h2"));

        let by_rut = uploads
            .search_by_field(UploadField::RutProveedor, "76350871", false)
            .await
            .unwrap();
        assert_eq!(by_rut.len(), 2);

        let none = uploads.search_by_field(UploadField::ClientId, "c-9", false).await.unwrap();
        assert!(none.is_empty());

        let err = uploads.search_by_field(UploadField::ClientId, "", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
