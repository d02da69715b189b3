//! SKU search service / 商品搜索服务

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::bind_index;
use crate::backend::dsl::{FieldBoost, Operator, SuggestMode};
use crate::backend::SearchBackend;
use crate::config::CatalogConfig;
use crate::error::{ErrorKind, Result, SearchError};
use crate::search::cursor::{continue_scroll, open_scroll, release_scroll};
use crate::search::query::projection;
use crate::search::serialize::{serialize, truncate_probe, Record, ResponseShape};
use crate::search::{
    quick_exit, Filter, FilterValue, LastSearchRegistry, QueryBuilder, ScrollCursor, SearchRequest,
    SuggestionEngine,
};

/// Provider attribute used by every SKU filter
pub const PROVIDER_FIELD: &str = "rut_proveedor_";
/// Correlation name of product suggestions
pub const SUGGESTION_NAME: &str = "sku_suggest";
/// Result size of SKU code lookups
const SKU_LOOKUP_SIZE: usize = 10;

/// Options of a product search / 商品搜索选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Single operator instead of the race / 指定匹配模式
    pub operator: Option<Operator>,
    /// Records to return; the configured default when absent
    pub size: Option<usize>,
    /// Provider rut or set of ruts / 供应商过滤
    #[serde(rename = "rut_proveedor_")]
    pub provider: Option<FilterValue>,
    pub includes: Vec<String>,
    /// Replaces the configured default excludes when given
    pub excludes: Option<Vec<String>>,
    /// Keep `_id`, `_score` and `_index` / 包含元数据
    pub include_meta: bool,
}

/// One page of results / 结果页
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub records: Vec<Record>,
    /// More results exist than were returned
    pub overflow: bool,
    /// Opaque scroll token for the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

/// Outcome of one bounded search; only the committed one is remembered
struct BoundedOutcome {
    records: Vec<Record>,
    overflow: bool,
    request: Option<SearchRequest>,
}

impl BoundedOutcome {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            overflow: false,
            request: None,
        }
    }
}

/// Run `request` with one extra hit and cut it back / 有界查询
async fn bounded_search(
    backend: Arc<dyn SearchBackend>,
    index: String,
    request: SearchRequest,
    include_meta: bool,
) -> Result<BoundedOutcome> {
    let body = request.probe().body();
    tracing::info!("Query on {}: {}", index, body.to_json());

    let response = backend.execute(&index, &body, None).await?;
    let records = serialize(ResponseShape::Typed(&response), include_meta)?;
    let (records, overflow) = truncate_probe(records, request.size());

    Ok(BoundedOutcome {
        records,
        overflow,
        request: Some(request),
    })
}

/// SKU search / 商品搜索
#[derive(Clone)]
pub struct SkuSearch {
    backend: Arc<dyn SearchBackend>,
    index: String,
    catalog: CatalogConfig,
    registry: LastSearchRegistry,
    suggestions: SuggestionEngine,
}

impl SkuSearch {
    /// Bind to the SKU index; fails when the index does not exist / 连接索引
    pub async fn connect(backend: Arc<dyn SearchBackend>, catalog: &CatalogConfig) -> Result<Self> {
        bind_index(backend.as_ref(), &catalog.index_name).await?;
        Ok(Self {
            suggestions: SuggestionEngine::new(backend.clone(), &catalog.index_name),
            backend,
            index: catalog.index_name.clone(),
            catalog: catalog.clone(),
            registry: LastSearchRegistry::new(),
        })
    }

    /// Same service remembering searches in `registry` / 绑定会话
    pub fn for_session(&self, registry: LastSearchRegistry) -> Self {
        Self {
            registry,
            ..self.clone()
        }
    }

    pub fn registry(&self) -> &LastSearchRegistry {
        &self.registry
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn search_fields(&self) -> Vec<FieldBoost> {
        self.catalog.search_fields.clone()
    }

    fn excludes(&self, excludes: &Option<Vec<String>>) -> Vec<String> {
        match excludes {
            Some(excludes) if !excludes.is_empty() => excludes.clone(),
            _ => self.catalog.default_excludes.clone(),
        }
    }

    fn provider_filter(provider: &Option<FilterValue>) -> Result<Option<Filter>> {
        provider
            .clone()
            .map(|value| Filter::new(PROVIDER_FIELD, value))
            .transpose()
    }

    fn product_request(&self, text: &str, operator: Operator, options: &SearchOptions) -> Result<SearchRequest> {
        QueryBuilder::new(text)
            .operator(operator)
            .fields(self.search_fields())
            .size(options.size.unwrap_or(self.catalog.default_search_size))
            .includes(options.includes.clone())
            .excludes(self.excludes(&options.excludes))
            .filter(Self::provider_filter(&options.provider)?)
            .build()
    }

    fn commit(&self, outcome: BoundedOutcome) -> Vec<Record> {
        match &outcome.request {
            Some(request) => self.registry.record(outcome.overflow, request),
            None => self.registry.clear(),
        }
        outcome.records
    }

    /// Product search by text / 按文本搜索商品
    ///
    /// Without an explicit operator, AND, OR and suggestion-derived OR
    /// searches race; the first non-empty result in that priority order wins.
    /// Only the committed search updates the "see more" registry.
    pub async fn search_product(&self, text: &str, options: &SearchOptions) -> Result<Vec<Record>> {
        if let Some(operator) = options.operator {
            let request = self.product_request(text, operator, options)?;
            let outcome =
                bounded_search(self.backend.clone(), self.index.clone(), request, options.include_meta)
                    .await?;
            return Ok(self.commit(outcome));
        }

        // Validate before anything is spawned
        let and_request = self.product_request(text, Operator::And, options)?;
        let or_request = self.product_request(text, Operator::Or, options)?;

        let tasks: Vec<BoxFuture<'static, Result<BoundedOutcome>>> = vec![
            bounded_search(self.backend.clone(), self.index.clone(), and_request, options.include_meta)
                .boxed(),
            bounded_search(self.backend.clone(), self.index.clone(), or_request, options.include_meta)
                .boxed(),
            self.clone()
                .suggested_search(text.to_string(), options.clone())
                .boxed(),
        ];

        let outcome = quick_exit(|outcome: &BoundedOutcome| !outcome.records.is_empty(), tasks).await?;
        Ok(self.commit(outcome))
    }

    async fn suggested_search(self, text: String, options: SearchOptions) -> Result<BoundedOutcome> {
        match self.suggest(&text).await?.into_iter().next() {
            Some(suggested) => {
                let request = self.product_request(&suggested, Operator::Or, &options)?;
                bounded_search(self.backend, self.index, request, options.include_meta).await
            }
            None => Ok(BoundedOutcome::empty()),
        }
    }

    /// Phrase corrections of `text` / 文本纠错
    pub async fn suggest(&self, text: &str) -> Result<Vec<String>> {
        self.suggestions
            .suggest(text, &self.catalog.suggest_field, SuggestMode::Phrase, SUGGESTION_NAME)
            .await
    }

    /// Correct `text`, then search the correction with OR / 纠错后搜索
    ///
    /// Returns an empty list when there is nothing to correct.
    pub async fn suggest_and_search(&self, text: &str, options: &SearchOptions) -> Result<Vec<Record>> {
        let outcome = self
            .clone()
            .suggested_search(text.to_string(), options.clone())
            .await?;
        Ok(self.commit(outcome))
    }

    /// Direct lookup by SKU code / 按编码查询
    pub async fn search_by_sku(
        &self,
        sku: &str,
        provider: Option<FilterValue>,
        include_meta: bool,
    ) -> Result<Vec<Record>> {
        let request = SearchRequest::matching("sku", sku, SKU_LOOKUP_SIZE)?
            .filtered(Self::provider_filter(&provider)?);
        let body = request.body();
        tracing::info!("Query on {}: {}", self.index, body.to_json());

        let response = self.backend.execute(&self.index, &body, None).await?;
        serialize(ResponseShape::Typed(&response), include_meta)
    }

    /// Offset listing of a provider's SKUs / 分页列出
    pub async fn list_all(
        &self,
        from: usize,
        size: usize,
        provider: FilterValue,
        includes: Vec<String>,
        excludes: Option<Vec<String>>,
        include_meta: bool,
    ) -> Result<Vec<Record>> {
        let request = SearchRequest::match_all(size)?
            .filtered(Some(Filter::new(PROVIDER_FIELD, provider)?))
            .projected(projection(includes, self.excludes(&excludes))?)
            .starting_at(from);

        let outcome =
            bounded_search(self.backend.clone(), self.index.clone(), request, include_meta).await?;
        Ok(self.commit(outcome))
    }

    /// Request remembered by the last oversized search / 已保存的查询
    pub fn stored_request(&self) -> Result<SearchRequest> {
        self.registry
            .get()
            .ok_or_else(|| SearchError::new(ErrorKind::NoStoredQuery))
    }

    /// Paginate the last oversized search / 查看更多
    ///
    /// The cursor yields pages of `page_size` until exhausted; use
    /// [`ScrollCursor::into_stream`] for a lazy page sequence.
    pub fn see_more(&self, page_size: usize, include_meta: bool) -> Result<ScrollCursor> {
        let request = self.stored_request()?;
        ScrollCursor::new(
            self.backend.clone(),
            &self.index,
            &request,
            page_size,
            self.catalog.scroll_ttl(),
            include_meta,
        )
    }

    fn ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or_else(|| self.catalog.scroll_ttl())
    }

    /// Open a scroll over `request` and return its first page / 初始化滚动
    pub async fn init_scroll(
        &self,
        request: &SearchRequest,
        page_size: usize,
        include_meta: bool,
        ttl: Option<Duration>,
    ) -> Result<SearchPage> {
        if page_size == 0 {
            return Err(SearchError::validation("page size must be positive"));
        }
        let (records, handle) = open_scroll(
            &self.backend,
            &self.index,
            &request.for_scroll(page_size),
            self.ttl(ttl),
            include_meta,
        )
        .await?;
        Ok(SearchPage {
            overflow: handle.is_some(),
            continuation: handle.map(|h| h.token().to_string()),
            records,
        })
    }

    /// Continue a scroll by token; an empty page releases the context / 下一页
    pub async fn next_page(&self, token: &str, include_meta: bool, ttl: Option<Duration>) -> Result<SearchPage> {
        let (records, refreshed) =
            continue_scroll(&self.backend, token, self.ttl(ttl), include_meta).await?;
        if records.is_empty() {
            release_scroll(&self.backend, &refreshed).await;
            return Ok(SearchPage {
                records,
                overflow: false,
                continuation: None,
            });
        }
        Ok(SearchPage {
            records,
            overflow: true,
            continuation: Some(refreshed),
        })
    }

    /// Release a scroll token; errors are swallowed / 释放滚动
    pub async fn release(&self, token: &str) {
        release_scroll(&self.backend, token).await;
    }

    /// Number of documents matching `request` / 计数
    pub async fn count(&self, request: &SearchRequest) -> Result<u64> {
        self.backend.count(&self.index, &request.body()).await
    }
}
