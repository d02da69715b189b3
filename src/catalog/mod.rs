//! Catalog services / 目录服务
//!
//! Services bound to one index each:
//! - [`SkuSearch`]: product search, SKU lookup, listing and pagination
//! - [`CatalogUploadSearch`]: upload status lookups
//! - [`BulkWriter`]: batched index / update / delete

pub mod bulk;
pub mod schema;
pub mod sku;
pub mod upload;

pub use bulk::{BulkReport, BulkWriter, RawDocument};
pub use schema::{CatalogUpload, CatalogUploadStatus, Document, Sku, SkuQualityStatus};
pub use sku::{SearchOptions, SearchPage, SkuSearch};
pub use upload::{CatalogUploadSearch, UploadField};

use crate::backend::SearchBackend;
use crate::error::{ErrorKind, Result, SearchError};

/// Check that `index` is named and exists before a service binds to it
pub(crate) async fn bind_index(backend: &dyn SearchBackend, index: &str) -> Result<()> {
    if index.trim().is_empty() {
        return Err(SearchError::new(ErrorKind::NoIndexBound));
    }
    if !backend.index_exists(index).await? {
        return Err(SearchError::index_not_exists(index));
    }
    tracing::debug!("Bound to index {} on {}", index, backend.name());
    Ok(())
}
