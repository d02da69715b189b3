use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use catalog_search::catalog::{SearchOptions, SearchPage, UploadField};
use catalog_search::search::{FilterValue, Record};
use catalog_search::SearchError;

use crate::api::ApiResponse;
use crate::state::AppState;

/// Header carrying the caller's session / 会话头
pub const SESSION_HEADER: &str = "x-session-id";

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn respond<T>(result: Result<T, SearchError>) -> Json<ApiResponse<T>> {
    match result {
        Ok(data) => Json(ApiResponse::success(data)),
        Err(e) => {
            tracing::debug!("Request failed: {}", e);
            Json(ApiResponse::from_error(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductSearchRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: SearchOptions,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub records: Vec<Record>,
    /// `/api/search/more` has something to page through
    pub see_more: bool,
}

/// POST /api/search - 商品搜索
pub async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProductSearchRequest>,
) -> Json<ApiResponse<SearchResults>> {
    let search = state.session(session_id(&headers));
    let result = search.search_product(&req.text, &req.options).await.map(|records| SearchResults {
        records,
        see_more: !search.registry().is_empty(),
    });
    respond(result)
}

/// POST /api/search/suggest - 纠错后搜索
pub async fn suggest_and_search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProductSearchRequest>,
) -> Json<ApiResponse<SearchResults>> {
    let search = state.session(session_id(&headers));
    let result = search
        .suggest_and_search(&req.text, &req.options)
        .await
        .map(|records| SearchResults {
            records,
            see_more: !search.registry().is_empty(),
        });
    respond(result)
}

#[derive(Debug, Deserialize)]
pub struct SkuLookupRequest {
    pub sku: String,
    #[serde(default)]
    pub rut_proveedor_: Option<FilterValue>,
    #[serde(default)]
    pub include_meta: bool,
}

/// POST /api/search/sku - 按编码查询
pub async fn search_by_sku(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SkuLookupRequest>,
) -> Json<ApiResponse<Vec<Record>>> {
    respond(
        state
            .sku_search
            .search_by_sku(&req.sku, req.rut_proveedor_, req.include_meta)
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub from: usize,
    #[serde(default)]
    pub size: Option<usize>,
    pub rut_proveedor_: FilterValue,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    #[serde(default)]
    pub include_meta: bool,
}

/// POST /api/list - 分页列出供应商商品
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ListRequest>,
) -> Json<ApiResponse<SearchResults>> {
    let search = state.session(session_id(&headers));
    let size = req.size.unwrap_or(state.config.catalog.default_search_size);
    let result = search
        .list_all(req.from, size, req.rut_proveedor_, req.includes, req.excludes, req.include_meta)
        .await
        .map(|records| SearchResults {
            records,
            see_more: !search.registry().is_empty(),
        });
    respond(result)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeeMoreRequest {
    pub page_size: Option<usize>,
    pub include_meta: bool,
}

/// POST /api/search/more - 查看更多（打开滚动）
pub async fn see_more(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SeeMoreRequest>,
) -> Json<ApiResponse<SearchPage>> {
    let search = state.session(session_id(&headers));
    let page_size = req.page_size.unwrap_or(state.config.catalog.default_page_size);
    let result = match search.stored_request() {
        Ok(request) => search.init_scroll(&request, page_size, req.include_meta, None).await,
        Err(e) => Err(e),
    };
    respond(result)
}

#[derive(Debug, Deserialize)]
pub struct ScrollRequest {
    pub token: String,
    #[serde(default)]
    pub include_meta: bool,
}

/// POST /api/search/next - 下一页
pub async fn next_page(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrollRequest>,
) -> Json<ApiResponse<SearchPage>> {
    if req.token.trim().is_empty() {
        return Json(ApiResponse::error("token must not be empty"));
    }
    respond(state.sku_search.next_page(&req.token, req.include_meta, None).await)
}

/// POST /api/search/release - 释放滚动
pub async fn release(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrollRequest>,
) -> Json<ApiResponse<()>> {
    state.sku_search.release(&req.token).await;
    Json(ApiResponse::success(()))
}

#[derive(Debug, Deserialize)]
pub struct UploadLookupRequest {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub include_meta: bool,
}

/// POST /api/uploads/search - 上传状态查询
pub async fn search_uploads(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadLookupRequest>,
) -> Json<ApiResponse<Vec<Record>>> {
    let uploads = match &state.uploads {
        Some(uploads) => uploads,
        None => return Json(ApiResponse::error("upload index is not available")),
    };
    let field: UploadField = match req.field.parse() {
        Ok(field) => field,
        Err(e) => return respond(Err(e)),
    };
    respond(uploads.search_by_field(field, &req.value, req.include_meta).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_request_flattens_options() {
        let req: ProductSearchRequest = serde_json::from_value(json!({
            "text": "cemento",
            "operator": "and",
            "size": 3,
            "rut_proveedor_": [1, 2]
        }))
        .unwrap();
        assert_eq!(req.text, "cemento");
        assert_eq!(req.options.size, Some(3));
        assert_eq!(req.options.provider, Some(FilterValue::from(vec![1_i64, 2])));
        assert!(!req.options.include_meta);
    }

    #[test]
    fn test_session_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_HEADER, "abc".parse().unwrap());
        assert_eq!(session_id(&headers), Some("abc"));
    }
}
