//! Search backend contract / 搜索后端接口
//!
//! The catalog layer talks to the full-text engine only through
//! [`SearchBackend`]. Two implementations ship with the crate:
//! - [`ElasticBackend`]: Elasticsearch over HTTP
//! - [`MemoryBackend`]: in-process inverted index (offline runs and tests)

pub mod dsl;
pub mod elastic;
pub mod memory;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use dsl::{FieldBoost, Operator, Query, SearchBody, SourceFilter, SuggestMode, SuggestSpec};
pub use elastic::ElasticBackend;
pub use memory::{Analyzer, MemoryBackend, MemoryIndex};
pub use types::{BulkAction, BulkItemResult, BulkOp, Hit, SearchResponse, SuggestEntry};

/// Search backend interface (primitive operations only) / 搜索后端接口
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs / 后端名称
    fn name(&self) -> &str;

    /// Liveness check; transport failures report `false` / 连通性检查
    async fn ping(&self) -> Result<bool>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Run a `_search`. With `scroll` set, a scroll context is opened and its
    /// token returned in `SearchResponse::scroll_id`.
    async fn execute(
        &self,
        index: &str,
        body: &SearchBody,
        scroll: Option<Duration>,
    ) -> Result<SearchResponse>;

    async fn count(&self, index: &str, body: &SearchBody) -> Result<u64>;

    /// Continue a scroll context. Returns the raw JSON response, which carries
    /// a refreshed `_scroll_id`. A stale token fails with `CursorExpired`.
    async fn scroll(&self, token: &str, ttl: Duration) -> Result<Value>;

    /// Release scroll contexts; unknown tokens are not an error / 释放游标
    async fn clear_scroll(&self, tokens: &[String]) -> Result<()>;

    /// Submit bulk actions; item failures are reported, not raised / 批量写入
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<Vec<BulkItemResult>>;
}

/// Render a context lifetime the way the scroll API expects (`"60s"`)
pub fn ttl_param(ttl: Duration) -> String {
    if ttl.subsec_millis() == 0 {
        format!("{}s", ttl.as_secs())
    } else {
        format!("{}ms", ttl.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_param() {
        assert_eq!(ttl_param(Duration::from_secs(60)), "60s");
        assert_eq!(ttl_param(Duration::from_millis(1500)), "1500ms");
    }
}
