//! Error taxonomy / 错误分类
//!
//! Every failure carries an [`ErrorKind`] tag plus a structured context map.
//! The human readable message is rendered from a per-kind template, so call
//! sites only attach facts (`index`, `token`, `reason`, ...) and never format
//! strings themselves.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate / 统一结果类型
pub type Result<T> = std::result::Result<T, SearchError>;

/// Error kind tag / 错误类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad operator, bad filter shape, empty required argument / 参数校验失败
    Validation,
    /// A field is both included and excluded / 投影字段冲突
    InvalidProjection,
    /// Multi-field query without fields / 字段列表为空
    EmptyFieldList,
    /// Connection or ping failure / 后端不可用
    BackendUnavailable,
    /// No backend bound to the operation / 未连接
    NotConnected,
    /// No index bound to the operation / 未绑定索引
    NoIndexBound,
    /// The bound index does not exist on the backend / 索引不存在
    IndexNotExists,
    /// Response carried no suggestion section / 无建议结果段
    SuggestionUnavailable,
    /// "See more" requested with nothing stored / 没有可继续的查询
    NoStoredQuery,
    /// Scroll token rejected or already released / 游标已失效
    CursorExpired,
    /// Non-success status or malformed payload from the backend / 后端错误
    Backend,
}

impl ErrorKind {
    /// Message template; `{name}` placeholders are filled from the context map.
    fn template(self) -> &'static str {
        match self {
            ErrorKind::Validation => "Invalid argument: {reason}",
            ErrorKind::InvalidProjection => "Field `{field}` is both included and excluded",
            ErrorKind::EmptyFieldList => "A multi-field query needs at least one field",
            ErrorKind::BackendUnavailable => "Search backend is not ready: {reason}",
            ErrorKind::NotConnected => "Operation attempted without a backend connection",
            ErrorKind::NoIndexBound => "Operation attempted without an index",
            ErrorKind::IndexNotExists => "Index `{index}` does not exist",
            ErrorKind::SuggestionUnavailable => {
                "Backend returned no suggestion section for `{name}`"
            }
            ErrorKind::NoStoredQuery => "There are no more results to show",
            ErrorKind::CursorExpired => "Scroll cursor `{token}` has expired",
            ErrorKind::Backend => "Backend request failed: {reason}",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidProjection => "invalid_projection",
            ErrorKind::EmptyFieldList => "empty_field_list",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::NoIndexBound => "no_index_bound",
            ErrorKind::IndexNotExists => "index_not_exists",
            ErrorKind::SuggestionUnavailable => "suggestion_unavailable",
            ErrorKind::NoStoredQuery => "no_stored_query",
            ErrorKind::CursorExpired => "cursor_expired",
            ErrorKind::Backend => "backend",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search layer error / 搜索层错误
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SearchError {
    kind: ErrorKind,
    context: BTreeMap<String, String>,
    message: String,
}

/// Fill `{name}` placeholders of the kind's template; missing values render as `?`.
fn render(kind: ErrorKind, context: &BTreeMap<String, String>) -> String {
    let template = kind.template();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(context.get(name).map(String::as_str).unwrap_or("?"));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl SearchError {
    pub fn new(kind: ErrorKind) -> Self {
        let context = BTreeMap::new();
        Self {
            kind,
            message: render(kind, &context),
            context,
        }
    }

    /// Attach a context entry / 附加上下文
    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self.message = render(self.kind, &self.context);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn validation(reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Validation).with("reason", reason)
    }

    pub fn backend(reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Backend).with("reason", reason)
    }

    pub fn unavailable(reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::BackendUnavailable).with("reason", reason)
    }

    pub fn index_not_exists(index: &str) -> Self {
        Self::new(ErrorKind::IndexNotExists).with("index", index)
    }

    pub fn cursor_expired(token: &str) -> Self {
        Self::new(ErrorKind::CursorExpired).with("token", token)
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            SearchError::unavailable(err)
        } else {
            SearchError::backend(err)
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::backend(format!("malformed payload: {}", err))
    }
}
