//! Spelling suggestions / 拼写建议

use std::sync::Arc;

use crate::backend::dsl::{SearchBody, SuggestMode, SuggestSpec};
use crate::backend::SearchBackend;
use crate::error::{ErrorKind, Result, SearchError};

/// Edit budget sent with phrase suggestions
pub const MAX_SUGGEST_ERRORS: u32 = 3;

/// Suggestion engine / 建议引擎
#[derive(Clone)]
pub struct SuggestionEngine {
    backend: Arc<dyn SearchBackend>,
    index: String,
}

impl SuggestionEngine {
    pub fn new(backend: Arc<dyn SearchBackend>, index: &str) -> Self {
        Self {
            backend,
            index: index.to_string(),
        }
    }

    /// Ranked candidate texts for `text`, read from the first suggestion group
    ///
    /// An empty list means the engine had nothing better to offer. A response
    /// without any suggestion section fails with `SuggestionUnavailable`.
    pub async fn suggest(
        &self,
        text: &str,
        field: &str,
        mode: SuggestMode,
        name: &str,
    ) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Err(SearchError::validation("suggestion text must not be empty"));
        }

        let body = SearchBody {
            size: Some(0),
            suggest: Some(SuggestSpec {
                name: name.to_string(),
                text: text.to_string(),
                field: field.to_string(),
                mode,
                max_errors: MAX_SUGGEST_ERRORS,
            }),
            ..Default::default()
        };

        let response = self.backend.execute(&self.index, &body, None).await?;
        let unavailable = || SearchError::new(ErrorKind::SuggestionUnavailable).with("name", name);

        let mut sections = response.suggest.ok_or_else(unavailable)?;
        let groups = sections.remove(name).ok_or_else(unavailable)?;

        let candidates: Vec<String> = groups
            .into_iter()
            .next()
            .map(|group| group.options.into_iter().map(|option| option.text).collect())
            .unwrap_or_default();

        tracing::debug!("Suggestions for {:?}: {:?}", text, candidates);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Analyzer, MemoryBackend, MemoryIndex};
    use serde_json::json;

    fn engine(backend: Arc<MemoryBackend>) -> SuggestionEngine {
        SuggestionEngine::new(backend, "catalogo")
    }

    fn backend() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_index(
            MemoryIndex::new("catalogo").field("descripcion_corta_", Analyzer::Standard),
        );
        backend
    }

    #[tokio::test]
    async fn test_phrase_correction() {
        let backend = backend();
        backend
            .index_document("catalogo", "1", json!({ "descripcion_corta_": "Cemento MELON Extra" }))
            .unwrap();

        let engine = engine(backend);
        let fixed = engine
            .suggest("cemneto", "descripcion_corta_", SuggestMode::Phrase, "sku_suggest")
            .await
            .unwrap();
        assert_eq!(fixed, vec!["cemento"]);

        let exact = engine
            .suggest("cemento", "descripcion_corta_", SuggestMode::Phrase, "sku_suggest")
            .await
            .unwrap();
        assert!(exact.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_has_no_section() {
        let err = engine(backend())
            .suggest("cemento", "descripcion_corta_", SuggestMode::Phrase, "sku_suggest")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SuggestionUnavailable);
        assert_eq!(err.to_string(), "Backend returned no suggestion section for `sku_suggest`");
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let err = engine(backend())
            .suggest(" ", "descripcion_corta_", SuggestMode::Term, "s")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
