//! Query DSL sent to the backend / 查询 DSL
//!
//! A typed subset of the Elasticsearch query language. Every type renders
//! itself into the JSON the HTTP backend posts; the in-memory backend matches
//! on the types directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::SearchError;

/// Token-matching semantics for multi-word text / 分词匹配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Every token must match / 全部匹配
    And,
    /// At least one token must match / 任一匹配
    Or,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            other => Err(SearchError::validation(format!(
                "operator must be `and` or `or`, got `{}`",
                other
            ))),
        }
    }
}

/// Field with relevance weight, rendered as `field^boost` / 带权重字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBoost {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

impl FieldBoost {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            boost: None,
        }
    }

    pub fn boosted(field: &str, boost: f32) -> Self {
        Self {
            field: field.to_string(),
            boost: Some(boost),
        }
    }

    /// Effective weight (1.0 when unboosted)
    pub fn weight(&self) -> f32 {
        self.boost.unwrap_or(1.0)
    }
}

impl fmt::Display for FieldBoost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.boost {
            Some(boost) => write!(f, "{}^{}", self.field, boost),
            None => f.write_str(&self.field),
        }
    }
}

impl FromStr for FieldBoost {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('^') {
            Some((field, boost)) if !field.is_empty() => {
                let boost: f32 = boost
                    .parse()
                    .map_err(|_| SearchError::validation(format!("bad boost in `{}`", s)))?;
                Ok(FieldBoost::boosted(field, boost))
            }
            None if !s.is_empty() => Ok(FieldBoost::new(s)),
            _ => Err(SearchError::validation(format!("bad field `{}`", s))),
        }
    }
}

/// Query clause / 查询子句
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    Match {
        field: String,
        text: String,
    },
    MultiMatch {
        text: String,
        operator: Operator,
        fields: Vec<FieldBoost>,
    },
    /// Exact single-term match / 单值精确匹配
    Term {
        field: String,
        value: Value,
    },
    /// Any-of-set match / 多值任一匹配
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Bool {
        must: Vec<Query>,
        filter: Vec<Query>,
    },
}

impl Query {
    pub fn to_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Match { field, text } => json!({ "match": { field.as_str(): text } }),
            Query::MultiMatch {
                text,
                operator,
                fields,
            } => json!({
                "multi_match": {
                    "query": text,
                    "operator": operator.as_str(),
                    "fields": fields.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
                }
            }),
            Query::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Query::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            Query::Bool { must, filter } => {
                let mut body = Map::new();
                if !must.is_empty() {
                    body.insert(
                        "must".to_string(),
                        Value::Array(must.iter().map(Query::to_json).collect()),
                    );
                }
                if !filter.is_empty() {
                    body.insert(
                        "filter".to_string(),
                        Value::Array(filter.iter().map(Query::to_json).collect()),
                    );
                }
                json!({ "bool": body })
            }
        }
    }
}

/// `_source` projection / 返回字段过滤
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl SourceFilter {
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

/// Suggester strategy / 建议策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestMode {
    Phrase,
    Term,
}

impl FromStr for SuggestMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phrase" => Ok(SuggestMode::Phrase),
            "term" => Ok(SuggestMode::Term),
            other => Err(SearchError::validation(format!(
                "suggestion type must be `phrase` or `term`, got `{}`",
                other
            ))),
        }
    }
}

/// Suggestion request section / 建议请求
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestSpec {
    pub name: String,
    pub text: String,
    pub field: String,
    pub mode: SuggestMode,
    pub max_errors: u32,
}

impl SuggestSpec {
    fn to_json(&self) -> Value {
        let settings = match self.mode {
            SuggestMode::Phrase => json!({ "phrase": {
                "field": self.field,
                "max_errors": self.max_errors,
            }}),
            SuggestMode::Term => json!({ "term": { "field": self.field } }),
        };
        let mut entry = Map::new();
        entry.insert("text".to_string(), Value::String(self.text.clone()));
        if let Value::Object(settings) = settings {
            entry.extend(settings);
        }
        json!({ self.name.as_str(): entry })
    }
}

/// Body of a `_search` request / 搜索请求体
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchBody {
    pub query: Option<Query>,
    pub source: Option<SourceFilter>,
    pub from: Option<usize>,
    pub size: Option<usize>,
    pub suggest: Option<SuggestSpec>,
}

impl SearchBody {
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        if let Some(query) = &self.query {
            body.insert("query".to_string(), query.to_json());
        }
        if let Some(source) = self.source.as_ref().filter(|s| !s.is_empty()) {
            body.insert("_source".to_string(), json!(source));
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if let Some(suggest) = &self.suggest {
            body.insert("suggest".to_string(), suggest.to_json());
        }
        Value::Object(body)
    }

    /// Body accepted by `_count` (query only)
    pub fn count_json(&self) -> Value {
        match &self.query {
            Some(query) => json!({ "query": query.to_json() }),
            None => json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_from_str() {
        assert_eq!("AND".parse::<Operator>().unwrap(), Operator::And);
        assert_eq!(" or ".parse::<Operator>().unwrap(), Operator::Or);
        assert!("xor".parse::<Operator>().is_err());
    }

    #[test]
    fn test_field_boost_render_and_parse() {
        assert_eq!(FieldBoost::boosted("sku", 10.0).to_string(), "sku^10");
        assert_eq!(FieldBoost::new("descripcion_corta").to_string(), "descripcion_corta");
        let parsed: FieldBoost = "sku^2.5".parse().unwrap();
        assert_eq!(parsed, FieldBoost::boosted("sku", 2.5));
        assert!("^3".parse::<FieldBoost>().is_err());
        assert!("sku^x".parse::<FieldBoost>().is_err());
    }

    #[test]
    fn test_term_and_terms_render_differently() {
        let term = Query::Term {
            field: "rut_proveedor_".to_string(),
            value: json!(1),
        };
        let terms = Query::Terms {
            field: "rut_proveedor_".to_string(),
            values: vec![json!(1)],
        };
        assert_eq!(term.to_json(), json!({ "term": { "rut_proveedor_": 1 } }));
        assert_eq!(terms.to_json(), json!({ "terms": { "rut_proveedor_": [1] } }));
    }

    #[test]
    fn test_search_body_json() {
        let body = SearchBody {
            query: Some(Query::Bool {
                must: vec![Query::MultiMatch {
                    text: "cemento".to_string(),
                    operator: Operator::And,
                    fields: vec![FieldBoost::boosted("sku", 10.0), FieldBoost::new("descripcion_corta")],
                }],
                filter: vec![],
            }),
            source: Some(SourceFilter {
                includes: vec![],
                excludes: vec!["descripcion_corta_".to_string()],
            }),
            from: None,
            size: Some(6),
            suggest: None,
        };
        assert_eq!(
            body.to_json(),
            json!({
                "query": { "bool": { "must": [ { "multi_match": {
                    "query": "cemento",
                    "operator": "and",
                    "fields": ["sku^10", "descripcion_corta"],
                }}]}},
                "_source": { "excludes": ["descripcion_corta_"] },
                "size": 6,
            })
        );
        assert_eq!(body.count_json()["query"]["bool"]["must"][0]["multi_match"]["query"], "cemento");
    }

    #[test]
    fn test_phrase_suggest_carries_max_errors() {
        let body = SearchBody {
            suggest: Some(SuggestSpec {
                name: "sku_suggest".to_string(),
                text: "cemneto".to_string(),
                field: "descripcion_corta_".to_string(),
                mode: SuggestMode::Phrase,
                max_errors: 3,
            }),
            ..Default::default()
        };
        assert_eq!(
            body.to_json(),
            json!({ "suggest": { "sku_suggest": {
                "text": "cemneto",
                "phrase": { "field": "descripcion_corta_", "max_errors": 3 },
            }}})
        );
    }
}
