//! Result serialization / 结果序列化
//!
//! `_search` responses arrive typed, scroll continuations arrive as raw JSON.
//! Both flatten into the same [`Record`] list.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::backend::types::{Hit, SearchResponse};
use crate::error::{Result, SearchError};

/// Response shapes accepted by [`serialize`] / 响应形态
#[derive(Debug, Clone, Copy)]
pub enum ResponseShape<'a> {
    /// Raw JSON mapping (scroll API)
    Raw(&'a Value),
    /// Typed `_search` response
    Typed(&'a SearchResponse),
}

/// Engine metadata of a hit / 命中元数据
#[derive(Debug, Clone, PartialEq)]
pub struct HitMeta {
    pub id: String,
    pub score: Option<f64>,
    pub index: String,
}

/// One flat result record / 单条结果
///
/// Serializes as the bare `_source` mapping, or as
/// `{"_id", "_score", "_index", "_source"}` when metadata is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub source: Map<String, Value>,
    pub meta: Option<HitMeta>,
}

impl Record {
    fn from_hit(hit: &Hit, include_meta: bool) -> Self {
        Self {
            source: hit.source.clone(),
            meta: include_meta.then(|| HitMeta {
                id: hit.id.clone(),
                score: hit.score,
                index: hit.index.clone(),
            }),
        }
    }

    fn from_raw(hit: &Value, include_meta: bool) -> Result<Self> {
        let hit = hit
            .as_object()
            .ok_or_else(|| SearchError::backend("hit is not an object"))?;
        let source = match hit.get("_source") {
            Some(Value::Object(source)) => source.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(SearchError::backend("hit `_source` is not an object")),
        };
        let text = |key: &str| hit.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        Ok(Self {
            source,
            meta: include_meta.then(|| HitMeta {
                id: text("_id"),
                score: hit.get("_score").and_then(Value::as_f64),
                index: text("_index"),
            }),
        })
    }

    /// Field of the source document / 读取字段
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.source.get(field)
    }

    pub fn id(&self) -> Option<&str> {
        self.meta.as_ref().map(|meta| meta.id.as_str())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.meta {
            None => self.source.serialize(serializer),
            Some(meta) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("_id", &meta.id)?;
                map.serialize_entry("_score", &meta.score)?;
                map.serialize_entry("_index", &meta.index)?;
                map.serialize_entry("_source", &self.source)?;
                map.end()
            }
        }
    }
}

/// Flatten a response into records, in hit order / 展平结果
pub fn serialize(response: ResponseShape<'_>, include_meta: bool) -> Result<Vec<Record>> {
    match response {
        ResponseShape::Typed(resp) => Ok(resp
            .hits
            .hits
            .iter()
            .map(|hit| Record::from_hit(hit, include_meta))
            .collect()),
        ResponseShape::Raw(value) => {
            let hits = value
                .pointer("/hits/hits")
                .and_then(Value::as_array)
                .ok_or_else(|| SearchError::backend("response without `hits.hits`"))?;
            hits.iter()
                .map(|hit| Record::from_raw(hit, include_meta))
                .collect()
        }
    }
}

/// Cut an N+1 probe back to `size`; reports whether more results exist
pub fn truncate_probe(mut records: Vec<Record>, size: usize) -> (Vec<Record>, bool) {
    let overflow = records.len() > size;
    records.truncate(size);
    (records, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> Value {
        json!({
            "_scroll_id": "t1",
            "hits": { "hits": [
                { "_index": "catalogo", "_id": "1", "_score": 2.0, "_source": { "sku": "200032" } },
                { "_index": "catalogo", "_id": "2", "_score": null, "_source": { "sku": "800250" } }
            ]}
        })
    }

    #[test]
    fn test_both_shapes_agree() {
        let raw = raw();
        let typed: SearchResponse = serde_json::from_value(raw.clone()).unwrap();

        let from_raw = serialize(ResponseShape::Raw(&raw), true).unwrap();
        let from_typed = serialize(ResponseShape::Typed(&typed), true).unwrap();
        assert_eq!(from_raw, from_typed);
        assert_eq!(from_raw[0].id(), Some("1"));
    }

    #[test]
    fn test_record_serialization() {
        let raw = raw();
        let bare = serialize(ResponseShape::Raw(&raw), false).unwrap();
        assert_eq!(serde_json::to_value(&bare[0]).unwrap(), json!({ "sku": "200032" }));

        let meta = serialize(ResponseShape::Raw(&raw), true).unwrap();
        assert_eq!(
            serde_json::to_value(&meta[1]).unwrap(),
            json!({ "_id": "2", "_score": null, "_index": "catalogo", "_source": { "sku": "800250" } })
        );
    }

    #[test]
    fn test_malformed_raw_response() {
        let err = serialize(ResponseShape::Raw(&json!({ "took": 1 })), false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Backend);
    }

    #[test]
    fn test_truncate_probe() {
        let raw = raw();
        let records = serialize(ResponseShape::Raw(&raw), false).unwrap();
        let (kept, overflow) = truncate_probe(records.clone(), 1);
        assert_eq!(kept.len(), 1);
        assert!(overflow);
        let (kept, overflow) = truncate_probe(records, 2);
        assert_eq!(kept.len(), 2);
        assert!(!overflow);
    }
}
