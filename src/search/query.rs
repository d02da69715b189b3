//! Query construction / 查询构建
//!
//! [`QueryBuilder`] validates caller input and produces an immutable
//! [`SearchRequest`]. Derived requests (the N+1 probe, a page-sized copy for
//! scrolling) are new values; a built request is never mutated in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::dsl::{FieldBoost, Operator, Query, SearchBody, SourceFilter};
use crate::error::{ErrorKind, Result, SearchError};

/// Categorical filter value: one value renders `term`, a set renders `terms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Many(Vec<Value>),
    One(Value),
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::One(Value::from(value))
    }
}

impl From<Vec<i64>> for FilterValue {
    fn from(values: Vec<i64>) -> Self {
        FilterValue::Many(values.into_iter().map(Value::from).collect())
    }
}

/// Filter context on one attribute / 过滤条件
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(field: &str, value: impl Into<FilterValue>) -> Result<Self> {
        let value = value.into();
        match &value {
            FilterValue::Many(values) if values.is_empty() => {
                return Err(SearchError::validation(format!(
                    "filter on `{}` needs at least one value",
                    field
                )));
            }
            FilterValue::One(Value::Null) => {
                return Err(SearchError::validation(format!(
                    "filter on `{}` has a null value",
                    field
                )));
            }
            _ => {}
        }
        Ok(Self {
            field: field.to_string(),
            value,
        })
    }

    pub fn to_query(&self) -> Query {
        match &self.value {
            FilterValue::One(value) => Query::Term {
                field: self.field.clone(),
                value: value.clone(),
            },
            FilterValue::Many(values) => Query::Terms {
                field: self.field.clone(),
                values: values.clone(),
            },
        }
    }
}

/// Validate include/exclude lists / 校验字段投影
pub fn projection(includes: Vec<String>, excludes: Vec<String>) -> Result<SourceFilter> {
    if let Some(field) = includes.iter().find(|f| excludes.contains(f)) {
        return Err(SearchError::new(ErrorKind::InvalidProjection).with("field", field));
    }
    Ok(SourceFilter { includes, excludes })
}

/// Immutable search request / 不可变搜索请求
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    query: Query,
    projection: SourceFilter,
    filter: Option<Filter>,
    from: Option<usize>,
    size: usize,
}

impl SearchRequest {
    /// `match_all` listing / 全部列出
    pub fn match_all(size: usize) -> Result<Self> {
        Self::with_query(Query::MatchAll, size)
    }

    /// Single-field `match` (SKU lookup, upload lookups) / 单字段匹配
    pub fn matching(field: &str, text: &str, size: usize) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(SearchError::validation(format!("`{}` must not be empty", field)));
        }
        Self::with_query(
            Query::Match {
                field: field.to_string(),
                text: text.to_string(),
            },
            size,
        )
    }

    fn with_query(query: Query, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SearchError::validation("size must be positive"));
        }
        Ok(Self {
            query,
            projection: SourceFilter::default(),
            filter: None,
            from: None,
            size,
        })
    }

    pub fn filtered(self, filter: Option<Filter>) -> Self {
        Self { filter, ..self }
    }

    pub fn projected(self, projection: SourceFilter) -> Self {
        Self { projection, ..self }
    }

    pub fn starting_at(self, from: usize) -> Self {
        Self {
            from: Some(from),
            ..self
        }
    }

    /// Same request with another size / 调整条数
    pub fn resized(&self, size: usize) -> Self {
        Self {
            size: size.max(1),
            ..self.clone()
        }
    }

    /// Page-sized copy for a scroll context; scrolls cannot start at an offset
    pub fn for_scroll(&self, page_size: usize) -> Self {
        Self {
            from: None,
            ..self.resized(page_size)
        }
    }

    /// Overflow probe: one more hit than will be shown / 多取一条用于探测
    pub fn probe(&self) -> Self {
        self.resized(self.size + 1)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn projection(&self) -> &SourceFilter {
        &self.projection
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn from(&self) -> Option<usize> {
        self.from
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Query with the filter folded into a `bool` context / 组合查询
    pub fn effective_query(&self) -> Query {
        match &self.filter {
            Some(filter) => Query::Bool {
                must: vec![self.query.clone()],
                filter: vec![filter.to_query()],
            },
            None => self.query.clone(),
        }
    }

    /// Render as a `_search` body / 生成请求体
    pub fn body(&self) -> SearchBody {
        SearchBody {
            query: Some(self.effective_query()),
            source: Some(self.projection.clone()).filter(|p| !p.is_empty()),
            from: self.from,
            size: Some(self.size),
            suggest: None,
        }
    }
}

/// Multi-field text query builder / 多字段查询构建器
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    text: String,
    operator: Operator,
    fields: Vec<FieldBoost>,
    size: usize,
    includes: Vec<String>,
    excludes: Vec<String>,
    filter: Option<Filter>,
}

impl QueryBuilder {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            operator: Operator::Or,
            fields: Vec::new(),
            size: 5,
            includes: Vec::new(),
            excludes: Vec::new(),
            filter: None,
        }
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    pub fn fields(mut self, fields: Vec<FieldBoost>) -> Self {
        self.fields = fields;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn includes(mut self, includes: Vec<String>) -> Self {
        self.includes = includes;
        self
    }

    pub fn excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn build(self) -> Result<SearchRequest> {
        if self.text.trim().is_empty() {
            return Err(SearchError::validation("search text must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(SearchError::new(ErrorKind::EmptyFieldList));
        }
        if self.size == 0 {
            return Err(SearchError::validation("size must be positive"));
        }
        let projection = projection(self.includes, self.excludes)?;

        Ok(SearchRequest {
            query: Query::MultiMatch {
                text: self.text,
                operator: self.operator,
                fields: self.fields,
            },
            projection,
            filter: self.filter,
            from: None,
            size: self.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<FieldBoost> {
        vec![FieldBoost::boosted("sku", 10.0), FieldBoost::new("descripcion_corta")]
    }

    #[test]
    fn test_build_renders_multi_match() {
        let request = QueryBuilder::new("cemento")
            .operator(Operator::And)
            .fields(fields())
            .size(5)
            .excludes(vec!["descripcion_corta_".to_string()])
            .build()
            .unwrap();

        let body = request.probe().body().to_json();
        assert_eq!(body["size"], 6);
        assert_eq!(body["query"]["multi_match"]["operator"], "and");
        assert_eq!(body["_source"], json!({ "excludes": ["descripcion_corta_"] }));
        assert_eq!(request.size(), 5);
    }

    #[test]
    fn test_filter_wraps_in_bool() {
        let request = QueryBuilder::new("test")
            .fields(fields())
            .filter(Some(Filter::new("rut_proveedor_", vec![1_i64, 2]).unwrap()))
            .build()
            .unwrap();
        let body = request.body().to_json();
        assert_eq!(body["query"]["bool"]["filter"][0], json!({ "terms": { "rut_proveedor_": [1, 2] } }));
        assert!(body["query"]["bool"]["must"][0].get("multi_match").is_some());
    }

    #[test]
    fn test_validation_errors() {
        let empty_text = QueryBuilder::new("  ").fields(fields()).build().unwrap_err();
        assert_eq!(empty_text.kind(), ErrorKind::Validation);

        let no_fields = QueryBuilder::new("cemento").build().unwrap_err();
        assert_eq!(no_fields.kind(), ErrorKind::EmptyFieldList);

        let zero = QueryBuilder::new("cemento").fields(fields()).size(0).build().unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::Validation);

        let clash = QueryBuilder::new("cemento")
            .fields(fields())
            .includes(vec!["sku".to_string()])
            .excludes(vec!["sku".to_string()])
            .build()
            .unwrap_err();
        assert_eq!(clash.kind(), ErrorKind::InvalidProjection);
        assert_eq!(clash.to_string(), "Field `sku` is both included and excluded");

        let empty_set = Filter::new("rut_proveedor_", Vec::<i64>::new()).unwrap_err();
        assert_eq!(empty_set.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_filter_value_deserializes_scalar_or_set() {
        let one: FilterValue = serde_json::from_value(json!(76350871)).unwrap();
        let many: FilterValue = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert_eq!(one, FilterValue::from(76350871_i64));
        assert_eq!(many, FilterValue::from(vec![1_i64, 2, 3]));
    }

    #[test]
    fn test_listing_request() {
        let request = SearchRequest::match_all(3)
            .unwrap()
            .filtered(Some(Filter::new("rut_proveedor_", 76350871_i64).unwrap()))
            .starting_at(2);
        let body = request.probe().body().to_json();
        assert_eq!(body["from"], 2);
        assert_eq!(body["size"], 4);
        assert_eq!(body["query"]["bool"]["must"][0], json!({ "match_all": {} }));
        assert!(SearchRequest::match_all(0).is_err());

        let scroll = request.for_scroll(10).body().to_json();
        assert!(scroll.get("from").is_none());
        assert_eq!(scroll["size"], 10);
        assert_eq!(request.from(), Some(2));
    }
}
