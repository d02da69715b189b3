use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use catalog_search::backend::SearchBackend;
use catalog_search::catalog::{CatalogUploadSearch, SkuSearch};
use catalog_search::config::AppConfig;
use catalog_search::search::LastSearchRegistry;

/// Session used when a request carries no `x-session-id`
pub const DEFAULT_SESSION: &str = "default";

struct SessionEntry {
    registry: LastSearchRegistry,
    last_seen: Instant,
}

/// "See more" slot per session, forgotten when idle / 会话查询槽
///
/// Idle sessions are swept whenever a new one is created; past `capacity`
/// the least recently used session is evicted.
pub struct SessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
    idle: Duration,
    capacity: usize,
}

impl SessionStore {
    pub fn new(idle: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle,
            capacity: capacity.max(1),
        }
    }

    pub fn registry(&self, session_id: &str) -> LastSearchRegistry {
        self.registry_at(session_id, Instant::now())
    }

    fn registry_at(&self, session_id: &str, now: Instant) -> LastSearchRegistry {
        let idle = self.idle;
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(session_id) {
            if now.saturating_duration_since(entry.last_seen) < idle {
                entry.last_seen = now;
                return entry.registry.clone();
            }
        }

        entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen) < idle);
        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    entries.remove(&id);
                }
                None => break,
            }
        }

        let registry = LastSearchRegistry::new();
        entries.insert(
            session_id.to_string(),
            SessionEntry {
                registry: registry.clone(),
                last_seen: now,
            },
        );
        tracing::debug!("Session {} created ({} live)", session_id, entries.len());
        registry
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Shared application state / 应用共享状态
pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<dyn SearchBackend>,
    pub sku_search: SkuSearch,
    /// Absent when the upload index does not exist / 上传索引可能不存在
    pub uploads: Option<CatalogUploadSearch>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn SearchBackend>,
        sku_search: SkuSearch,
        uploads: Option<CatalogUploadSearch>,
    ) -> Self {
        let sessions = SessionStore::new(config.server.session_idle(), config.server.max_sessions);
        Self {
            config,
            backend,
            sku_search,
            uploads,
            sessions,
        }
    }

    /// SKU search remembering into the session's registry / 获取会话搜索
    pub fn session(&self, session_id: Option<&str>) -> SkuSearch {
        let key = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_SESSION);
        self.sku_search.for_session(self.sessions.registry(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_search::backend::MemoryBackend;
    use catalog_search::catalog::schema::sku_index_layout;
    use catalog_search::search::SearchRequest;

    fn request() -> SearchRequest {
        SearchRequest::match_all(5).unwrap()
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let config = AppConfig::default();
        let backend = Arc::new(MemoryBackend::new());
        backend.create_index(sku_index_layout(&config.catalog.index_name));
        let sku_search = SkuSearch::connect(backend.clone(), &config.catalog).await.unwrap();
        let state = AppState::new(config, backend, sku_search, None);

        state.session(Some("a")).registry().record(true, &request());
        assert!(!state.session(Some("a")).registry().is_empty());
        assert!(state.session(Some("b")).registry().is_empty());
        assert!(state.session(None).registry().is_empty());
        assert!(state.session(Some("  ")).registry().is_empty());
        assert_eq!(state.sessions.len(), 3);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let start = Instant::now();
        store.registry_at("a", start).record(true, &request());
        store.registry_at("b", start + Duration::from_secs(30)).record(true, &request());

        // "a" idled past the limit and is swept when "c" arrives
        store.registry_at("c", start + Duration::from_secs(70));
        assert_eq!(store.len(), 2);
        assert!(!store.registry_at("b", start + Duration::from_secs(80)).is_empty());
        assert!(store.registry_at("a", start + Duration::from_secs(80)).is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let store = SessionStore::new(Duration::from_secs(3600), 2);
        let start = Instant::now();
        store.registry_at("a", start).record(true, &request());
        store.registry_at("b", start + Duration::from_secs(1));
        // Touching "a" makes "b" the oldest
        store.registry_at("a", start + Duration::from_secs(2));
        store.registry_at("c", start + Duration::from_secs(3));

        assert_eq!(store.len(), 2);
        assert!(!store.registry_at("a", start + Duration::from_secs(4)).is_empty());
        for id in 0..50 {
            store.registry_at(&format!("s{}", id), start + Duration::from_secs(5 + id));
        }
        assert_eq!(store.len(), 2);
    }
}
