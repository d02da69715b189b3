//! Scroll pagination / 滚动分页
//!
//! Lifecycle: `Unopened -> Open -> Exhausted | Closed`.
//! - the first page opens a scroll context
//! - each following page trades the current token for a refreshed one
//! - an empty page releases the context and leaves the cursor `Exhausted`
//! - `close` releases the context; later requests fail with `CursorExpired`
//! - dropping an open cursor releases its context in the background

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use serde_json::Value;

use super::query::SearchRequest;
use super::serialize::{serialize, Record, ResponseShape};
use crate::backend::SearchBackend;
use crate::error::{ErrorKind, Result, SearchError};

/// Default scroll context lifetime ("1m")
pub const DEFAULT_SCROLL_TTL: Duration = Duration::from_secs(60);

/// Live scroll context / 游标句柄
#[derive(Debug, Clone, PartialEq)]
pub struct CursorHandle {
    token: String,
    ttl: Duration,
    request: SearchRequest,
}

impl CursorHandle {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Request the context was opened for / 所属查询
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }
}

/// Cursor state / 游标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    Unopened,
    Open,
    Exhausted,
    Closed,
}

#[derive(Debug)]
enum CursorState {
    Unopened,
    Open(CursorHandle),
    Exhausted,
    Closed(String),
}

/// Open a scroll context and fetch its first page
///
/// Returns no handle when the first page is already empty; the context is
/// released before returning in that case.
pub async fn open_scroll(
    backend: &Arc<dyn SearchBackend>,
    index: &str,
    request: &SearchRequest,
    ttl: Duration,
    include_meta: bool,
) -> Result<(Vec<Record>, Option<CursorHandle>)> {
    let response = backend.execute(index, &request.body(), Some(ttl)).await?;
    let records = serialize(ResponseShape::Typed(&response), include_meta)?;
    let token = response
        .scroll_id
        .ok_or_else(|| SearchError::backend("scroll response without `_scroll_id`"))?;
    tracing::debug!("Opened scroll context on {} ({} hits)", index, records.len());

    if records.is_empty() {
        release_scroll(backend, &token).await;
        return Ok((records, None));
    }

    Ok((
        records,
        Some(CursorHandle {
            token,
            ttl,
            request: request.clone(),
        }),
    ))
}

/// Fetch the next page of a scroll context; returns the refreshed token
pub async fn continue_scroll(
    backend: &Arc<dyn SearchBackend>,
    token: &str,
    ttl: Duration,
    include_meta: bool,
) -> Result<(Vec<Record>, String)> {
    let raw = backend.scroll(token, ttl).await?;
    let records = serialize(ResponseShape::Raw(&raw), include_meta)?;
    let refreshed = raw
        .get("_scroll_id")
        .and_then(Value::as_str)
        .unwrap_or(token)
        .to_string();
    Ok((records, refreshed))
}

/// Release a scroll context; failures are logged and swallowed / 释放游标
pub async fn release_scroll(backend: &Arc<dyn SearchBackend>, token: &str) {
    match backend.clear_scroll(&[token.to_string()]).await {
        Ok(()) => tracing::debug!("Released scroll context"),
        Err(e) => tracing::warn!("Failed to release scroll context: {}", e),
    }
}

/// Stateful scroll cursor / 滚动游标
pub struct ScrollCursor {
    backend: Arc<dyn SearchBackend>,
    index: String,
    request: SearchRequest,
    ttl: Duration,
    include_meta: bool,
    state: CursorState,
}

impl ScrollCursor {
    /// Cursor over `request`, serving `page_size` records per page
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        index: &str,
        request: &SearchRequest,
        page_size: usize,
        ttl: Duration,
        include_meta: bool,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(SearchError::validation("page size must be positive"));
        }
        Ok(Self {
            backend,
            index: index.to_string(),
            request: request.for_scroll(page_size),
            ttl,
            include_meta,
            state: CursorState::Unopened,
        })
    }

    pub fn status(&self) -> CursorStatus {
        match self.state {
            CursorState::Unopened => CursorStatus::Unopened,
            CursorState::Open(_) => CursorStatus::Open,
            CursorState::Exhausted => CursorStatus::Exhausted,
            CursorState::Closed(_) => CursorStatus::Closed,
        }
    }

    pub fn handle(&self) -> Option<&CursorHandle> {
        match &self.state {
            CursorState::Open(handle) => Some(handle),
            _ => None,
        }
    }

    /// Next page of records; empty once exhausted / 下一页
    pub async fn next_page(&mut self) -> Result<Vec<Record>> {
        match std::mem::replace(&mut self.state, CursorState::Exhausted) {
            CursorState::Unopened => {
                let opened = open_scroll(
                    &self.backend,
                    &self.index,
                    &self.request,
                    self.ttl,
                    self.include_meta,
                )
                .await;
                // A failed open leaves the cursor retryable
                let (records, handle) = match opened {
                    Ok(opened) => opened,
                    Err(e) => {
                        self.state = CursorState::Unopened;
                        return Err(e);
                    }
                };
                self.state = match handle {
                    Some(handle) => CursorState::Open(handle),
                    None => CursorState::Exhausted,
                };
                Ok(records)
            }
            CursorState::Open(mut handle) => {
                match continue_scroll(&self.backend, &handle.token, self.ttl, self.include_meta)
                    .await
                {
                    Ok((records, token)) if records.is_empty() => {
                        release_scroll(&self.backend, &token).await;
                        tracing::debug!("Scroll on {} exhausted", self.index);
                        Ok(records)
                    }
                    Ok((records, token)) => {
                        handle.token = token;
                        self.state = CursorState::Open(handle);
                        Ok(records)
                    }
                    Err(e) if e.is(ErrorKind::CursorExpired) => {
                        self.state = CursorState::Closed(handle.token);
                        Err(e)
                    }
                    Err(e) => {
                        self.state = CursorState::Open(handle);
                        Err(e)
                    }
                }
            }
            CursorState::Exhausted => Ok(Vec::new()),
            CursorState::Closed(token) => {
                let err = SearchError::cursor_expired(&token);
                self.state = CursorState::Closed(token);
                Err(err)
            }
        }
    }

    /// Release the context; release errors are swallowed / 关闭游标
    pub async fn close(&mut self) {
        let token = match std::mem::replace(&mut self.state, CursorState::Closed(String::new())) {
            CursorState::Open(handle) => {
                release_scroll(&self.backend, &handle.token).await;
                handle.token
            }
            CursorState::Closed(token) => token,
            CursorState::Unopened | CursorState::Exhausted => "closed".to_string(),
        };
        self.state = CursorState::Closed(token);
    }

    /// Lazy sequence of non-empty pages / 惰性分页流
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Record>>> {
        stream::try_unfold(self, |mut cursor| async move {
            let page = cursor.next_page().await?;
            if page.is_empty() {
                Ok(None)
            } else {
                Ok(Some((page, cursor)))
            }
        })
    }
}

impl Drop for ScrollCursor {
    fn drop(&mut self) {
        if let CursorState::Open(handle) = std::mem::replace(&mut self.state, CursorState::Exhausted) {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let backend = self.backend.clone();
                    runtime.spawn(async move {
                        release_scroll(&backend, &handle.token).await;
                    });
                }
                Err(_) => tracing::warn!("Scroll context dropped outside a runtime; left to expire"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryIndex};
    use futures::TryStreamExt;
    use serde_json::json;

    fn corpus(count: usize) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_index(MemoryIndex::new("catalogo"));
        for i in 0..count {
            backend
                .index_document("catalogo", &i.to_string(), json!({ "n": i }))
                .unwrap();
        }
        backend
    }

    fn cursor(backend: &Arc<MemoryBackend>, page_size: usize) -> ScrollCursor {
        let request = SearchRequest::match_all(5).unwrap();
        ScrollCursor::new(backend.clone(), "catalogo", &request, page_size, DEFAULT_SCROLL_TTL, false)
            .unwrap()
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let backend = corpus(25);
        let mut cursor = cursor(&backend, 10);
        assert_eq!(cursor.status(), CursorStatus::Unopened);

        assert_eq!(cursor.next_page().await.unwrap().len(), 10);
        let first_token = cursor.handle().unwrap().token().to_string();
        assert_eq!(cursor.next_page().await.unwrap().len(), 10);
        assert_ne!(cursor.handle().unwrap().token(), first_token);
        assert_eq!(cursor.next_page().await.unwrap().len(), 5);
        assert!(cursor.next_page().await.unwrap().is_empty());
        assert_eq!(cursor.status(), CursorStatus::Exhausted);
        assert!(cursor.next_page().await.unwrap().is_empty());
        assert_eq!(backend.live_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_failed_open_stays_unopened() {
        let backend = corpus(5);
        let mut cursor = cursor(&backend, 10);
        backend.set_available(false);
        let err = cursor.next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(cursor.status(), CursorStatus::Unopened);

        backend.set_available(true);
        assert_eq!(cursor.next_page().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_offset_is_dropped_for_scrolling() {
        let backend = corpus(6);
        let request = SearchRequest::match_all(2).unwrap().starting_at(2);
        let mut cursor =
            ScrollCursor::new(backend.clone(), "catalogo", &request, 10, DEFAULT_SCROLL_TTL, false)
                .unwrap();
        assert_eq!(cursor.next_page().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_close_then_request_fails() {
        let backend = corpus(25);
        let mut cursor = cursor(&backend, 10);
        cursor.next_page().await.unwrap();
        cursor.close().await;
        assert_eq!(cursor.status(), CursorStatus::Closed);
        assert_eq!(backend.live_scrolls(), 0);

        let err = cursor.next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CursorExpired);
        // Still closed, never reopened
        assert!(cursor.next_page().await.is_err());
    }

    #[tokio::test]
    async fn test_stale_token_surfaces_as_expired() {
        let backend = corpus(25);
        let mut cursor = cursor(&backend, 10);
        cursor.next_page().await.unwrap();
        let token = cursor.handle().unwrap().token().to_string();
        backend.clear_scroll(&[token]).await.unwrap();

        let err = cursor.next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CursorExpired);
        assert_eq!(cursor.status(), CursorStatus::Closed);
    }

    #[tokio::test]
    async fn test_empty_result_never_opens() {
        let backend = corpus(0);
        let mut cursor = cursor(&backend, 10);
        assert!(cursor.next_page().await.unwrap().is_empty());
        assert_eq!(cursor.status(), CursorStatus::Exhausted);
        assert_eq!(backend.live_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let backend = corpus(25);
        {
            let mut cursor = cursor(&backend, 10);
            cursor.next_page().await.unwrap();
            assert_eq!(backend.live_scrolls(), 1);
        }
        for _ in 0..10 {
            if backend.live_scrolls() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.live_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_stream_collects_all_pages() {
        let backend = corpus(20);
        let pages: Vec<Vec<Record>> = cursor(&backend, 10).into_stream().try_collect().await.unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|page| page.len() == 10));
        assert_eq!(backend.live_scrolls(), 0);
    }
}
