//! Elasticsearch HTTP backend / Elasticsearch HTTP 客户端

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};

use super::dsl::SearchBody;
use super::types::{BulkAction, BulkItemResult, BulkOp, SearchResponse};
use super::{ttl_param, SearchBackend};
use crate::config::ElasticsearchConfig;
use crate::error::{ErrorKind, Result, SearchError};

/// Elasticsearch client / Elasticsearch 客户端
pub struct ElasticBackend {
    client: Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl ElasticBackend {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let host = config.host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(SearchError::new(ErrorKind::NotConnected));
        }

        let auth = match (&config.user, &config.password) {
            (Some(user), Some(password)) if !user.is_empty() => {
                Some((user.clone(), password.clone()))
            }
            _ => None,
        };

        // Credentials imply https when the host carries no scheme
        let base_url = if host.contains("://") {
            host.to_string()
        } else if auth.is_some() {
            format!("https://{}", host)
        } else {
            format!("http://{}", host)
        };

        let mut builder =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs.max(1)));
        if let Some(path) = config.ssl_cert_path.as_deref().filter(|p| !p.is_empty()) {
            let pem = std::fs::read(path).map_err(|e| {
                SearchError::validation(format!("cannot read CA certificate {}: {}", path, e))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.auth {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }

    async fn read_json(resp: Response) -> Result<(StatusCode, Value)> {
        let status = resp.status();
        let text = resp.text().await?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }
}

/// Extract a readable reason from an error body / 提取错误原因
fn error_reason(status: StatusCode, body: &Value) -> String {
    body.pointer("/error/reason")
        .and_then(Value::as_str)
        .or_else(|| body.get("error").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn status_error(status: StatusCode, body: &Value) -> SearchError {
    SearchError::backend(error_reason(status, body)).with("status", status.as_u16())
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<bool> {
        match self.request(Method::HEAD, "/").send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                tracing::debug!("Ping to {} failed: {}", self.base_url, e);
                Ok(false)
            }
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let path = format!("/{}", urlencoding::encode(index));
        let resp = self.request(Method::HEAD, &path).send().await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, &Value::Null)),
        }
    }

    async fn execute(
        &self,
        index: &str,
        body: &SearchBody,
        scroll: Option<Duration>,
    ) -> Result<SearchResponse> {
        let mut path = format!("/{}/_search", urlencoding::encode(index));
        if let Some(ttl) = scroll {
            path.push_str("?scroll=");
            path.push_str(&ttl_param(ttl));
        }

        let resp = self
            .request(Method::POST, &path)
            .json(&body.to_json())
            .send()
            .await?;
        let (status, value) = Self::read_json(resp).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(SearchError::index_not_exists(index));
        }
        if !status.is_success() {
            return Err(status_error(status, &value));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn count(&self, index: &str, body: &SearchBody) -> Result<u64> {
        let path = format!("/{}/_count", urlencoding::encode(index));
        let resp = self
            .request(Method::POST, &path)
            .json(&body.count_json())
            .send()
            .await?;
        let (status, value) = Self::read_json(resp).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(SearchError::index_not_exists(index));
        }
        if !status.is_success() {
            return Err(status_error(status, &value));
        }
        value
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::backend("count response without `count`"))
    }

    async fn scroll(&self, token: &str, ttl: Duration) -> Result<Value> {
        let resp = self
            .request(Method::POST, "/_search/scroll")
            .json(&json!({ "scroll_id": token, "scroll": ttl_param(ttl) }))
            .send()
            .await?;
        let (status, value) = Self::read_json(resp).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(SearchError::cursor_expired(token));
        }
        if !status.is_success() {
            return Err(status_error(status, &value));
        }
        Ok(value)
    }

    async fn clear_scroll(&self, tokens: &[String]) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let resp = self
            .request(Method::DELETE, "/_search/scroll")
            .json(&json!({ "scroll_id": tokens }))
            .send()
            .await?;
        let (status, value) = Self::read_json(resp).await?;

        // Already expired contexts answer 404
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(status, &value))
        }
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<Vec<BulkItemResult>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        let mut payload = String::new();
        for action in &actions {
            let mut meta = json!({ "_index": action.index });
            if let Some(id) = &action.id {
                meta["_id"] = json!(id);
            }
            payload.push_str(&json!({ action.op.as_str(): meta }).to_string());
            payload.push('\n');

            match (action.op, &action.source) {
                (BulkOp::Index, Some(source)) => {
                    payload.push_str(&Value::Object(source.clone()).to_string());
                    payload.push('\n');
                }
                (BulkOp::Update, Some(source)) => {
                    payload.push_str(&json!({ "doc": source }).to_string());
                    payload.push('\n');
                }
                (BulkOp::Delete, _) => {}
                (op, None) => {
                    return Err(SearchError::validation(format!("{} action without a body", op)));
                }
            }
        }

        let resp = self
            .request(Method::POST, "/_bulk")
            .header("content-type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let (status, value) = Self::read_json(resp).await?;
        if !status.is_success() {
            return Err(status_error(status, &value));
        }

        let items = value
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::backend("bulk response without `items`"))?;

        Ok(actions
            .iter()
            .zip(items)
            .map(|(action, item)| {
                let detail = item.get(action.op.as_str()).unwrap_or(item);
                let status = detail.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
                let error = detail.get("error").map(|e| {
                    e.get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                });
                BulkItemResult {
                    op: action.op,
                    id: detail
                        .get("_id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| action.id.clone()),
                    status,
                    error,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> ElasticsearchConfig {
        ElasticsearchConfig {
            host: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_host_is_not_connected() {
        let err = ElasticBackend::new(&config("  ")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn test_scheme_defaults() {
        let plain = ElasticBackend::new(&config("localhost:9200/")).unwrap();
        assert_eq!(plain.base_url(), "http://localhost:9200");

        let secured = ElasticBackend::new(&ElasticsearchConfig {
            host: "es.internal:9200".to_string(),
            user: Some("elastic".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(secured.base_url(), "https://es.internal:9200");

        let explicit = ElasticBackend::new(&config("http://127.0.0.1:9200")).unwrap();
        assert_eq!(explicit.base_url(), "http://127.0.0.1:9200");
    }

    #[test]
    fn test_error_reason_prefers_nested_reason() {
        let body = json!({ "error": { "reason": "no such index [x]" }, "status": 404 });
        assert_eq!(error_reason(StatusCode::NOT_FOUND, &body), "no such index [x]");
        assert_eq!(
            error_reason(StatusCode::BAD_GATEWAY, &Value::Null),
            "HTTP 502 Bad Gateway"
        );
    }
}
