//! Backend response and bulk types / 后端响应类型

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed `_search` response / 搜索响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub hits: HitsEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest: Option<HashMap<String, Vec<SuggestEntry>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitsEnvelope {
    /// `{"value": n, "relation": ..}` on 7.x, a bare number on 6.x
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Value>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

impl HitsEnvelope {
    pub fn total_value(&self) -> Option<u64> {
        match self.total.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::Object(obj) => obj.get("value").and_then(Value::as_u64),
            _ => None,
        }
    }
}

/// Single hit / 单条命中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// One suggestion group (one per analysed input span) / 建议分组
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestEntry {
    pub text: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub options: Vec<SuggestOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestOption {
    pub text: String,
    #[serde(default)]
    pub score: f64,
}

/// Bulk operation type / 批量操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOp {
    Index,
    Update,
    Delete,
}

impl BulkOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkOp::Index => "index",
            BulkOp::Update => "update",
            BulkOp::Delete => "delete",
        }
    }
}

impl fmt::Display for BulkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bulk action / 单个批量动作
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    pub op: BulkOp,
    pub index: String,
    pub id: Option<String>,
    /// Document body (`doc` for updates), absent for deletes
    pub source: Option<Map<String, Value>>,
}

/// Per-item outcome of a bulk request / 批量单项结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemResult {
    pub op: BulkOp,
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_value_both_shapes() {
        let v7: SearchResponse = serde_json::from_value(json!({
            "hits": { "total": { "value": 3, "relation": "eq" }, "hits": [] }
        }))
        .unwrap();
        let v6: SearchResponse = serde_json::from_value(json!({
            "hits": { "total": 3, "hits": [] }
        }))
        .unwrap();
        assert_eq!(v7.hits.total_value(), Some(3));
        assert_eq!(v6.hits.total_value(), Some(3));
    }

    #[test]
    fn test_hit_meta_renames() {
        let resp: SearchResponse = serde_json::from_value(json!({
            "_scroll_id": "abc",
            "hits": { "hits": [
                { "_index": "catalogo", "_id": "7", "_score": 1.5, "_source": { "sku": "800250" } }
            ]}
        }))
        .unwrap();
        assert_eq!(resp.scroll_id.as_deref(), Some("abc"));
        let hit = &resp.hits.hits[0];
        assert_eq!(hit.id, "7");
        assert_eq!(hit.index, "catalogo");
        assert_eq!(hit.score, Some(1.5));
        assert_eq!(hit.source["sku"], "800250");
        assert!(resp.suggest.is_none());
    }
}
