pub mod search;
pub mod server;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use catalog_search::{ErrorKind, SearchError};

use crate::state::AppState;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            kind: None,
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            code: 400,
            message: message.to_string(),
            kind: Some(ErrorKind::Validation),
            data: None,
        }
    }

    /// Error envelope with the code matching its kind / 错误映射
    pub fn from_error(err: &SearchError) -> Self {
        Self {
            code: error_code(err.kind()),
            message: err.to_string(),
            kind: Some(err.kind()),
            data: None,
        }
    }
}

fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation | ErrorKind::InvalidProjection | ErrorKind::EmptyFieldList => 400,
        ErrorKind::NoStoredQuery | ErrorKind::IndexNotExists | ErrorKind::NoIndexBound => 404,
        ErrorKind::CursorExpired => 410,
        ErrorKind::SuggestionUnavailable | ErrorKind::Backend => 502,
        ErrorKind::BackendUnavailable | ErrorKind::NotConnected => 503,
    }
}

/// HTTP routes / 路由表
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(server::health_check))
        .route("/api/search", post(search::search))
        .route("/api/search/suggest", post(search::suggest_and_search))
        .route("/api/search/sku", post(search::search_by_sku))
        .route("/api/list", post(search::list_all))
        .route("/api/search/more", post(search::see_more))
        .route("/api/search/next", post(search::next_page))
        .route("/api/search/release", post(search::release))
        .route("/api/uploads/search", post(search::search_uploads))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope() {
        let resp: ApiResponse<()> = ApiResponse::from_error(&SearchError::cursor_expired("abc"));
        assert_eq!(resp.code, 410);
        assert_eq!(resp.message, "Scroll cursor `abc` has expired");

        let json = serde_json::to_value(ApiResponse::success(vec![1])).unwrap();
        assert_eq!(json["code"], 200);
        assert!(json.get("kind").is_none());
    }
}
