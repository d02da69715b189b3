//! Last oversized search, kept for "see more" / 最近一次溢出查询

use std::sync::Arc;

use parking_lot::Mutex;

use super::query::SearchRequest;

/// Per-session slot holding the most recent oversized request
///
/// Cloning shares the slot. Every bounded search either stores its request
/// (more results exist) or clears the slot.
#[derive(Debug, Clone, Default)]
pub struct LastSearchRegistry {
    slot: Arc<Mutex<Option<SearchRequest>>>,
}

impl LastSearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a bounded search / 记录查询结果
    pub fn record(&self, overflow: bool, request: &SearchRequest) {
        let mut slot = self.slot.lock();
        *slot = overflow.then(|| request.clone());
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    pub fn get(&self) -> Option<SearchRequest> {
        self.slot.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_overwrites_and_clears() {
        let registry = LastSearchRegistry::new();
        let shared = registry.clone();
        let request = SearchRequest::match_all(5).unwrap();

        registry.record(true, &request);
        assert_eq!(shared.get(), Some(request.clone()));

        registry.record(false, &request);
        assert!(shared.is_empty());

        shared.record(true, &request);
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.get().is_none());
    }
}
