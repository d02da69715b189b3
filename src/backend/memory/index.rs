//! Inverted index for one in-memory index / 倒排索引
//!
//! Postings are keyed by `(field, token)`. Documents keep insertion order
//! through a monotonically increasing sequence number, which is also the tie
//! breaker when scores are equal.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{Map, Value};

use super::analyzer::Analyzer;
use crate::backend::dsl::{Operator, Query, SourceFilter};
use crate::backend::types::Hit;

/// Index layout: analyzers per field, strictness / 索引布局
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    pub(crate) name: String,
    pub(crate) fields: HashMap<String, Analyzer>,
    pub(crate) strict: bool,
}

impl MemoryIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: HashMap::new(),
            strict: false,
        }
    }

    /// Declare a field and its analyzer / 声明字段
    pub fn field(mut self, name: &str, analyzer: Analyzer) -> Self {
        self.fields.insert(name.to_string(), analyzer);
        self
    }

    /// Reject documents carrying undeclared top-level fields / 严格模式
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn analyzer_for(&self, field: &str) -> Analyzer {
        self.fields.get(field).copied().unwrap_or_default()
    }
}

/// Posting entry / 倒排条目
#[derive(Debug, Clone)]
struct PostingEntry {
    seq: u64,
    frequency: usize,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    id: String,
    source: Map<String, Value>,
}

/// Stored documents plus postings / 文档与倒排表
#[derive(Debug)]
pub(crate) struct StoredIndex {
    pub(crate) layout: MemoryIndex,
    documents: BTreeMap<u64, StoredDoc>,
    ids: HashMap<String, u64>,
    postings: HashMap<(String, String), Vec<PostingEntry>>,
    next_seq: u64,
}

impl StoredIndex {
    pub(crate) fn new(layout: MemoryIndex) -> Self {
        Self {
            layout,
            documents: BTreeMap::new(),
            ids: HashMap::new(),
            postings: HashMap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Map<String, Value>> {
        let seq = self.ids.get(id)?;
        self.documents.get(seq).map(|doc| &doc.source)
    }

    /// First undeclared top-level field, when the layout is strict
    pub(crate) fn strict_violation(&self, source: &Map<String, Value>) -> Option<String> {
        if !self.layout.strict {
            return None;
        }
        source
            .keys()
            .find(|key| !self.layout.fields.contains_key(key.as_str()))
            .cloned()
    }

    /// Insert or replace a document (primitive) / 写入文档
    pub(crate) fn put(&mut self, id: &str, source: Map<String, Value>) {
        // Replacing keeps the original position
        let seq = match self.ids.get(id) {
            Some(&seq) => {
                self.unindex(seq);
                seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.ids.insert(id.to_string(), seq);
                seq
            }
        };

        let mut texts = Vec::new();
        flatten_text("", &Value::Object(source.clone()), &mut texts);
        for (field, text) in texts {
            let analyzer = self.layout.analyzer_for(&field);
            let mut frequencies: HashMap<String, usize> = HashMap::new();
            for token in analyzer.index_tokens(&text) {
                *frequencies.entry(token).or_default() += 1;
            }
            for (token, frequency) in frequencies {
                let postings = self.postings.entry((field.clone(), token)).or_default();
                match postings.iter_mut().find(|p| p.seq == seq) {
                    Some(entry) => entry.frequency += frequency,
                    None => postings.push(PostingEntry { seq, frequency }),
                }
            }
        }

        self.documents.insert(
            seq,
            StoredDoc {
                id: id.to_string(),
                source,
            },
        );
    }

    /// Delete a document (primitive) / 删除文档
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        match self.ids.remove(id) {
            Some(seq) => {
                self.unindex(seq);
                self.documents.remove(&seq);
                true
            }
            None => false,
        }
    }

    fn unindex(&mut self, seq: u64) {
        for postings in self.postings.values_mut() {
            postings.retain(|p| p.seq != seq);
        }
        self.postings.retain(|_, postings| !postings.is_empty());
    }

    /// Tokens indexed for `field`, with document frequency / 字段词表
    pub(crate) fn vocabulary(&self, field: &str) -> HashMap<&str, usize> {
        self.postings
            .iter()
            .filter(|((f, _), _)| f == field)
            .map(|((_, token), postings)| (token.as_str(), postings.len()))
            .collect()
    }

    /// Docs matching `query`, best score first / 执行查询
    pub(crate) fn search(&self, query: &Query) -> Vec<(u64, f32)> {
        let mut scored: Vec<(u64, f32)> = self.evaluate(query).into_iter().collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }

    pub(crate) fn hit(&self, seq: u64, score: f32, source: Option<&SourceFilter>) -> Option<Hit> {
        let doc = self.documents.get(&seq)?;
        Some(Hit {
            index: self.layout.name.clone(),
            id: doc.id.clone(),
            score: Some(score as f64),
            source: project(&doc.source, source),
        })
    }

    fn evaluate(&self, query: &Query) -> HashMap<u64, f32> {
        match query {
            Query::MatchAll => self.documents.keys().map(|&seq| (seq, 1.0)).collect(),
            Query::Match { field, text } => {
                let tokens = self.layout.analyzer_for(field).query_tokens(text);
                let mut scores: HashMap<u64, f32> = HashMap::new();
                for token in &tokens {
                    for posting in self.postings_for(field, token) {
                        *scores.entry(posting.seq).or_default() +=
                            1.0 + posting.frequency as f32 * 0.1;
                    }
                }
                scores
            }
            Query::MultiMatch {
                text,
                operator,
                fields,
            } => {
                let mut scores: HashMap<u64, f32> = HashMap::new();
                for field in fields {
                    let tokens = self.layout.analyzer_for(&field.field).query_tokens(text);
                    if tokens.is_empty() {
                        continue;
                    }
                    // Matched distinct tokens per document within this field
                    let mut matched: HashMap<u64, usize> = HashMap::new();
                    let unique: HashSet<&String> = tokens.iter().collect();
                    for token in &unique {
                        for posting in self.postings_for(&field.field, token) {
                            *matched.entry(posting.seq).or_default() += 1;
                        }
                    }
                    for (seq, count) in matched {
                        let accepted = match operator {
                            Operator::And => count == unique.len(),
                            Operator::Or => count > 0,
                        };
                        if !accepted {
                            continue;
                        }
                        // best_fields: keep the strongest field
                        let score = field.weight() * count as f32;
                        let best = scores.entry(seq).or_insert(0.0);
                        if score > *best {
                            *best = score;
                        }
                    }
                }
                scores
            }
            Query::Term { field, value } => self
                .documents
                .iter()
                .filter(|(_, doc)| field_matches(&doc.source, field, std::slice::from_ref(value)))
                .map(|(&seq, _)| (seq, 1.0))
                .collect(),
            Query::Terms { field, values } => self
                .documents
                .iter()
                .filter(|(_, doc)| field_matches(&doc.source, field, values))
                .map(|(&seq, _)| (seq, 1.0))
                .collect(),
            Query::Bool { must, filter } => {
                let mut scores = match must.split_first() {
                    Some((first, rest)) => {
                        let mut acc = self.evaluate(first);
                        for clause in rest {
                            let other = self.evaluate(clause);
                            acc.retain(|seq, _| other.contains_key(seq));
                            for (seq, score) in acc.iter_mut() {
                                *score += other.get(seq).copied().unwrap_or(0.0);
                            }
                        }
                        acc
                    }
                    None => self.documents.keys().map(|&seq| (seq, 0.0)).collect(),
                };
                for clause in filter {
                    let allowed = self.evaluate(clause);
                    scores.retain(|seq, _| allowed.contains_key(seq));
                }
                scores
            }
        }
    }

    fn postings_for(&self, field: &str, token: &str) -> &[PostingEntry] {
        self.postings
            .get(&(field.to_string(), token.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Collect `(dotted.path, text)` pairs for every scalar in a document
fn flatten_text(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_text(&path, child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_text(prefix, item, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Null => {}
    }
}

/// Resolve a dotted path inside a source document
fn lookup<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = source.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Exact term comparison; numbers compare numerically, also against numeric strings
fn term_equals(stored: &Value, wanted: &Value) -> bool {
    let as_number = |v: &Value| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match (stored, wanted) {
        (Value::String(a), Value::String(b)) => a == b,
        _ => match (as_number(stored), as_number(wanted)) {
            (Some(a), Some(b)) => a == b,
            _ => stored == wanted,
        },
    }
}

fn field_matches(source: &Map<String, Value>, field: &str, wanted: &[Value]) -> bool {
    match lookup(source, field) {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| wanted.iter().any(|w| term_equals(item, w))),
        Some(value) => wanted.iter().any(|w| term_equals(value, w)),
        None => false,
    }
}

/// Apply `_source` includes, then excludes / 字段投影
fn project(source: &Map<String, Value>, filter: Option<&SourceFilter>) -> Map<String, Value> {
    let filter = match filter {
        Some(filter) if !filter.is_empty() => filter,
        _ => return source.clone(),
    };

    source
        .iter()
        .filter(|(key, _)| filter.includes.is_empty() || filter.includes.contains(key))
        .filter(|(key, _)| !filter.excludes.contains(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dsl::FieldBoost;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn catalog() -> StoredIndex {
        let layout = MemoryIndex::new("catalogo")
            .field("sku", Analyzer::edge_ngram(3, 20))
            .field("descripcion_corta", Analyzer::edge_ngram(2, 15));
        let mut index = StoredIndex::new(layout);
        index.put("1", doc(json!({ "sku": "A10N", "descripcion_corta": "Arena MELON ARIDOS Unidad", "rut": 1 })));
        index.put("2", doc(json!({ "sku": "200032", "descripcion_corta": "Cemento CBB Especial Unidad", "rut": 2 })));
        index.put("3", doc(json!({ "sku": "800250", "descripcion_corta": "Cemento MELON Extra", "rut": 3 })));
        index
    }

    fn multi(text: &str, operator: Operator) -> Query {
        Query::MultiMatch {
            text: text.to_string(),
            operator,
            fields: vec![FieldBoost::boosted("sku", 10.0), FieldBoost::new("descripcion_corta")],
        }
    }

    #[test]
    fn test_and_requires_every_token_in_one_field() {
        let index = catalog();
        let hits = index.search(&multi("cemento melon", Operator::And));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 2);

        let hits = index.search(&multi("cemento melon", Operator::Or));
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_boosted_field_ranks_first() {
        let index = catalog();
        let hits = index.search(&multi("cemento 200032", Operator::Or));
        let ids: Vec<u64> = hits.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_prefix_match_through_edge_ngrams() {
        let index = catalog();
        let hits = index.search(&multi("ceme", Operator::And));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_term_and_terms_filters() {
        let index = catalog();
        let term = Query::Term { field: "rut".to_string(), value: json!(1) };
        let terms = Query::Terms { field: "rut".to_string(), values: vec![json!(1), json!("3")] };
        assert_eq!(index.search(&term).len(), 1);
        assert_eq!(index.search(&terms).len(), 2);
    }

    #[test]
    fn test_replace_and_remove_keep_postings_consistent() {
        let mut index = catalog();
        index.put("2", doc(json!({ "sku": "XYZ", "descripcion_corta": "Grava" })));
        assert_eq!(index.len(), 3);
        assert_eq!(index.search(&multi("cemento", Operator::And)).len(), 1);
        assert!(index.remove("3"));
        assert!(!index.remove("3"));
        assert!(index.search(&multi("cemento", Operator::And)).is_empty());
    }

    #[test]
    fn test_projection_excludes_after_includes() {
        let source = doc(json!({ "a": 1, "b": 2, "c": 3 }));
        let filter = SourceFilter {
            includes: vec!["a".to_string(), "b".to_string()],
            excludes: vec!["b".to_string()],
        };
        let projected = project(&source, Some(&filter));
        assert_eq!(Value::Object(projected), json!({ "a": 1 }));
    }
}
