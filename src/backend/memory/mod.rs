//! In-memory search backend / 内存搜索后端
//!
//! Architecture principle: only expose primitive operations, do not control flow
//! - create_index / index_document: write side
//! - execute / count / scroll: read side
//! - bulk: batched writes with per-item outcomes
//!
//! Used for offline runs and as the fixture backend of the test suite.

pub mod analyzer;
mod index;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};

use super::dsl::{SearchBody, SuggestMode, SuggestSpec};
use super::types::{
    BulkAction, BulkItemResult, BulkOp, Hit, HitsEnvelope, SearchResponse, SuggestEntry,
    SuggestOption,
};
use super::SearchBackend;
use crate::error::{Result, SearchError};

pub use analyzer::Analyzer;
pub use index::MemoryIndex;

use analyzer::{levenshtein_distance, tokenize};
use index::StoredIndex;

const DEFAULT_PAGE_SIZE: usize = 10;
/// Tokens shorter than this are never corrected
const MIN_CORRECTABLE_LEN: usize = 4;
/// Largest edit distance a correction may have
const MAX_EDIT_DISTANCE: usize = 2;

/// Open scroll context / 滚动上下文
struct ScrollContext {
    hits: Vec<Hit>,
    total: usize,
    position: usize,
    page_size: usize,
    expires_at: Instant,
}

/// In-memory backend / 内存后端
pub struct MemoryBackend {
    indices: RwLock<HashMap<String, StoredIndex>>,
    scrolls: Mutex<HashMap<String, ScrollContext>>,
    available: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            scrolls: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Create (or reset) an index with the given layout / 创建索引
    pub fn create_index(&self, layout: MemoryIndex) {
        let name = layout.name().to_string();
        tracing::debug!("Creating in-memory index {}", name);
        self.indices.write().insert(name, StoredIndex::new(layout));
    }

    /// Index single document (primitive operation) / 索引单个文档
    pub fn index_document(&self, index: &str, id: &str, source: Value) -> Result<()> {
        let source = match source {
            Value::Object(map) => map,
            other => {
                return Err(SearchError::validation(format!(
                    "document body must be an object, got {}",
                    other
                )))
            }
        };

        let mut indices = self.indices.write();
        let stored = indices
            .get_mut(index)
            .ok_or_else(|| SearchError::index_not_exists(index))?;
        if let Some(field) = stored.strict_violation(&source) {
            return Err(SearchError::validation(format!(
                "field `{}` is not declared on strict index `{}`",
                field, index
            )));
        }
        stored.put(id, source);
        Ok(())
    }

    /// Stored source of one document / 读取文档
    pub fn get_document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.indices.read().get(index)?.get(id).cloned()
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.indices.read().get(index).map(StoredIndex::len).unwrap_or(0)
    }

    /// Number of scroll contexts still held / 未释放的游标数
    pub fn live_scrolls(&self) -> usize {
        self.scrolls.lock().len()
    }

    /// Simulate the engine going away (or coming back) / 模拟可用性
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SearchError::unavailable("in-memory backend marked unavailable"))
        }
    }

    fn open_scroll(&self, hits: Vec<Hit>, total: usize, page_size: usize, ttl: Duration) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.scrolls.lock().insert(
            token.clone(),
            ScrollContext {
                hits,
                total,
                position: 0,
                page_size,
                expires_at: Instant::now() + ttl,
            },
        );
        token
    }

    fn apply_bulk_action(
        indices: &mut HashMap<String, StoredIndex>,
        action: BulkAction,
    ) -> BulkItemResult {
        let op = action.op;
        let failed = |id: Option<String>, status: u16, reason: String| BulkItemResult {
            op,
            id,
            status,
            error: Some(reason),
        };

        let stored = indices
            .entry(action.index.clone())
            .or_insert_with(|| StoredIndex::new(MemoryIndex::new(&action.index)));

        match op {
            BulkOp::Index => {
                let source = match action.source {
                    Some(source) => source,
                    None => return failed(action.id, 400, "index action without a body".into()),
                };
                let id = action
                    .id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
                if let Some(field) = stored.strict_violation(&source) {
                    return failed(
                        Some(id),
                        400,
                        format!("strict_dynamic_mapping_exception: field `{}`", field),
                    );
                }
                let status = if stored.get(&id).is_some() { 200 } else { 201 };
                stored.put(&id, source);
                BulkItemResult {
                    op,
                    id: Some(id),
                    status,
                    error: None,
                }
            }
            BulkOp::Update => {
                let (id, partial) = match (action.id, action.source) {
                    (Some(id), Some(partial)) => (id, partial),
                    (id, _) => return failed(id, 400, "update needs an id and a doc".into()),
                };
                let mut merged = match stored.get(&id) {
                    Some(existing) => existing.clone(),
                    None => {
                        return failed(Some(id), 404, "document_missing_exception".into());
                    }
                };
                merged.extend(partial);
                if let Some(field) = stored.strict_violation(&merged) {
                    return failed(
                        Some(id),
                        400,
                        format!("strict_dynamic_mapping_exception: field `{}`", field),
                    );
                }
                stored.put(&id, merged);
                BulkItemResult {
                    op,
                    id: Some(id),
                    status: 200,
                    error: None,
                }
            }
            BulkOp::Delete => {
                let id = match action.id {
                    Some(id) => id,
                    None => return failed(None, 400, "delete action without an id".into()),
                };
                let status = if stored.remove(&id) { 200 } else { 404 };
                BulkItemResult {
                    op,
                    id: Some(id),
                    status,
                    error: None,
                }
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Closest indexed term sharing the first character, within the edit budget
fn closest_term<'a>(token: &str, vocabulary: &HashMap<&'a str, usize>) -> Option<(&'a str, usize)> {
    let first = token.chars().next()?;
    vocabulary
        .iter()
        .filter(|(term, _)| term.starts_with(first) && **term != token)
        .map(|(term, freq)| (*term, levenshtein_distance(token, term), *freq))
        .filter(|(_, distance, _)| *distance <= MAX_EDIT_DISTANCE)
        .min_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)))
        .map(|(term, distance, _)| (term, distance))
}

/// Build the suggestion groups for `spec` over `stored` / 生成拼写建议
fn suggest(stored: &StoredIndex, spec: &SuggestSpec) -> Option<Vec<SuggestEntry>> {
    let vocabulary = stored.vocabulary(&spec.field);
    if vocabulary.is_empty() {
        return None;
    }

    let tokens = tokenize(&spec.text);
    match spec.mode {
        SuggestMode::Phrase => {
            let mut corrections = 0u32;
            let mut corrected = Vec::with_capacity(tokens.len());
            let mut penalty = 0usize;
            for token in &tokens {
                let candidate = if vocabulary.contains_key(token.as_str())
                    || token.chars().count() < MIN_CORRECTABLE_LEN
                    || corrections >= spec.max_errors
                {
                    None
                } else {
                    closest_term(token, &vocabulary)
                };
                match candidate {
                    Some((term, distance)) => {
                        corrections += 1;
                        penalty += distance;
                        corrected.push(term.to_string());
                    }
                    None => corrected.push(token.clone()),
                }
            }

            let options = if corrections > 0 {
                vec![SuggestOption {
                    text: corrected.join(" "),
                    score: 1.0 / (1.0 + penalty as f64),
                }]
            } else {
                Vec::new()
            };
            Some(vec![SuggestEntry {
                text: spec.text.clone(),
                offset: 0,
                length: spec.text.chars().count(),
                options,
            }])
        }
        SuggestMode::Term => {
            let mut offset = 0;
            let entries = tokens
                .iter()
                .map(|token| {
                    let length = token.chars().count();
                    let mut options: Vec<(usize, &str)> = vocabulary
                        .keys()
                        .filter(|term| **term != token.as_str())
                        .map(|term| (levenshtein_distance(token, term), *term))
                        .filter(|(distance, _)| *distance <= MAX_EDIT_DISTANCE)
                        .collect();
                    options.sort();
                    let entry = SuggestEntry {
                        text: token.clone(),
                        offset,
                        length,
                        options: options
                            .into_iter()
                            .map(|(distance, term)| SuggestOption {
                                text: term.to_string(),
                                score: 1.0 - distance as f64 / length.max(1) as f64,
                            })
                            .collect(),
                    };
                    offset += length + 1;
                    entry
                })
                .collect();
            Some(entries)
        }
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.indices.read().contains_key(index))
    }

    async fn execute(
        &self,
        index: &str,
        body: &SearchBody,
        scroll: Option<Duration>,
    ) -> Result<SearchResponse> {
        self.ensure_available()?;
        if scroll.is_some() && body.from.unwrap_or(0) > 0 {
            return Err(SearchError::backend("using [from] is not allowed in a scroll context")
                .with("status", 400));
        }
        let started = Instant::now();

        let (mut hits, suggestion) = {
            let indices = self.indices.read();
            let stored = indices
                .get(index)
                .ok_or_else(|| SearchError::index_not_exists(index))?;

            let query = body.query.clone().unwrap_or(super::dsl::Query::MatchAll);
            let hits: Vec<Hit> = stored
                .search(&query)
                .into_iter()
                .filter_map(|(seq, score)| stored.hit(seq, score, body.source.as_ref()))
                .collect();
            let suggestion = body
                .suggest
                .as_ref()
                .and_then(|spec| suggest(stored, spec).map(|entries| (spec.name.clone(), entries)));
            (hits, suggestion)
        };

        let total = hits.len();
        let size = body.size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut scroll_id = None;

        let page = match scroll {
            Some(ttl) => {
                // Scroll contexts page by `size`
                let rest = hits.split_off(size.min(hits.len()));
                let token = self.open_scroll(rest, total, size.max(1), ttl);
                scroll_id = Some(token);
                hits
            }
            None => {
                let from = body.from.unwrap_or(0);
                hits.into_iter().skip(from).take(size).collect()
            }
        };

        tracing::debug!(
            "memory search on {} returned {}/{} hits",
            index,
            page.len(),
            total
        );

        Ok(SearchResponse {
            scroll_id,
            took: started.elapsed().as_millis() as u64,
            hits: HitsEnvelope {
                total: Some(json!({ "value": total, "relation": "eq" })),
                hits: page,
            },
            suggest: suggestion.map(|(name, entries)| HashMap::from([(name, entries)])),
        })
    }

    async fn count(&self, index: &str, body: &SearchBody) -> Result<u64> {
        self.ensure_available()?;
        let indices = self.indices.read();
        let stored = indices
            .get(index)
            .ok_or_else(|| SearchError::index_not_exists(index))?;
        let query = body.query.clone().unwrap_or(super::dsl::Query::MatchAll);
        Ok(stored.search(&query).len() as u64)
    }

    async fn scroll(&self, token: &str, ttl: Duration) -> Result<Value> {
        self.ensure_available()?;
        let mut scrolls = self.scrolls.lock();

        // Each continuation hands out a fresh token; the old one is spent
        let mut context = scrolls
            .remove(token)
            .ok_or_else(|| SearchError::cursor_expired(token))?;
        if context.expires_at <= Instant::now() {
            return Err(SearchError::cursor_expired(token));
        }

        let end = (context.position + context.page_size).min(context.hits.len());
        let page: Vec<Hit> = context.hits[context.position..end].to_vec();
        context.position = end;
        context.expires_at = Instant::now() + ttl;
        let total = context.total;

        let next = uuid::Uuid::new_v4().simple().to_string();
        scrolls.insert(next.clone(), context);

        Ok(json!({
            "_scroll_id": next,
            "took": 0,
            "hits": {
                "total": { "value": total, "relation": "eq" },
                "hits": page,
            }
        }))
    }

    async fn clear_scroll(&self, tokens: &[String]) -> Result<()> {
        self.ensure_available()?;
        let mut scrolls = self.scrolls.lock();
        for token in tokens {
            scrolls.remove(token);
        }
        Ok(())
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<Vec<BulkItemResult>> {
        self.ensure_available()?;
        let mut indices = self.indices.write();
        Ok(actions
            .into_iter()
            .map(|action| Self::apply_bulk_action(&mut indices, action))
            .collect())
    }
}
