//! Backend connection and readiness / 后端连接与就绪检查

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::backend::{ElasticBackend, MemoryBackend, SearchBackend};
use crate::catalog::schema::{sku_index_layout, upload_index_layout, Document, Sku};
use crate::config::{AppConfig, BackendKind, ReadinessConfig};
use crate::error::{Result, SearchError};

/// Build the configured backend / 创建后端
///
/// The memory backend gets both catalog indices created and, when
/// `catalog.seed_file` is set, the SKUs of that file loaded.
pub async fn connect(config: &AppConfig) -> Result<Arc<dyn SearchBackend>> {
    match config.backend {
        BackendKind::Elasticsearch => {
            let backend = ElasticBackend::new(&config.elasticsearch)?;
            tracing::info!("Using Elasticsearch at {}", backend.base_url());
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => {
            let backend = MemoryBackend::new();
            backend.create_index(sku_index_layout(&config.catalog.index_name));
            backend.create_index(upload_index_layout(&config.catalog.upload_index_name));
            if let Some(path) = config.catalog.seed_file.as_deref().filter(|p| !p.is_empty()) {
                let loaded = seed_skus(&backend, &config.catalog.index_name, Path::new(path))?;
                tracing::info!("Loaded {} SKUs from {}", loaded, path);
            }
            tracing::info!("Using in-memory backend");
            Ok(Arc::new(backend))
        }
    }
}

/// Load a JSON array of SKU documents into `index` / 加载种子数据
pub fn seed_skus(backend: &MemoryBackend, index: &str, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SearchError::validation(format!("cannot read seed file {}: {}", path.display(), e))
    })?;
    let skus: Vec<Sku> = serde_json::from_str(&content)
        .map_err(|e| SearchError::validation(format!("invalid seed file {}: {}", path.display(), e)))?;

    for sku in &skus {
        let source = serde_json::Value::Object(sku.to_source()?);
        backend.index_document(index, &sku.document_id()?, source)?;
    }
    Ok(skus.len())
}

/// Fail with `BackendUnavailable` unless the backend answers a ping / 检查连接
pub async fn raise_unconnected(backend: &dyn SearchBackend) -> Result<()> {
    if backend.ping().await? {
        Ok(())
    } else {
        Err(SearchError::unavailable(format!("{} did not answer ping", backend.name())))
    }
}

/// Poll until the backend answers, giving up after the configured wait / 等待就绪
pub async fn wait_until_ready(backend: &dyn SearchBackend, readiness: &ReadinessConfig) -> Result<()> {
    poll_ready(backend, readiness.max_wait(), readiness.poll_interval()).await
}

async fn poll_ready(backend: &dyn SearchBackend, max_wait: Duration, poll: Duration) -> Result<()> {
    let deadline = Instant::now() + max_wait;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match raise_unconnected(backend).await {
            Ok(()) => {
                tracing::info!("{} ready after {} attempt(s)", backend.name(), attempt);
                return Ok(());
            }
            Err(e) if Instant::now() + poll > deadline => {
                tracing::error!("{} not ready after {} attempt(s): {}", backend.name(), attempt, e);
                return Err(e.with("attempts", attempt));
            }
            Err(e) => {
                tracing::warn!("Waiting for {} (attempt {}): {}", backend.name(), attempt, e);
                tokio::time::sleep(poll).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_raise_unconnected() {
        let backend = MemoryBackend::new();
        assert!(raise_unconnected(&backend).await.is_ok());

        backend.set_available(false);
        let err = raise_unconnected(&backend).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_max_wait() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        let err = poll_ready(&backend, Duration::from_millis(30), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(err.context().contains_key("attempts"));
    }

    #[tokio::test]
    async fn test_poll_succeeds_once_backend_returns() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);

        let revived = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            revived.set_available(true);
        });

        poll_ready(backend.as_ref(), Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_memory_connect_with_seed_file() {
        let path = std::env::temp_dir().join(format!("catalog-seed-{}.json", uuid::Uuid::new_v4()));
        let seed = json!([{
            "sku_id": "76350871_A10N",
            "sku": "A10N",
            "dv_proveedor": "3",
            "rut_proveedor_": 76350871,
            "contenido": "1",
            "formato_venta": "Unidad",
            "unidad_medida": "m3",
            "descripcion_corta": "Arena MELON ARIDOS Unidad",
            "descripcion_corta_": "Arena MELON ARIDOS Unidad",
            "status": "Completo"
        }]);
        std::fs::write(&path, seed.to_string()).unwrap();

        let mut config = AppConfig::default();
        config.backend = BackendKind::Memory;
        config.catalog.seed_file = Some(path.to_string_lossy().to_string());

        let backend = connect(&config).await.unwrap();
        assert_eq!(backend.name(), "memory");
        assert!(backend.index_exists("catalogo").await.unwrap());
        assert!(backend.index_exists("catalogo_upload").await.unwrap());
        assert_eq!(backend.count("catalogo", &Default::default()).await.unwrap(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_elasticsearch_needs_a_host() {
        let mut config = AppConfig::default();
        config.elasticsearch.host = " ".to_string();
        let err = connect(&config).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }
}
