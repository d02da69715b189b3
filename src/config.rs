//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件
//!
//! The loaded [`AppConfig`] is owned by the host and handed to constructors;
//! there is no process-wide instance.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::FieldBoost;

/// Environment variable naming an alternative config file / 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "CATALOG_SEARCH_CONFIG";

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Which backend implementation to build / 后端类型
    pub backend: BackendKind,
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Elasticsearch connection / Elasticsearch 连接配置
    pub elasticsearch: ElasticsearchConfig,
    /// Catalog index and query defaults / 目录索引配置
    pub catalog: CatalogConfig,
    /// Readiness polling / 就绪检查
    pub readiness: ReadinessConfig,
}

/// Backend implementation / 后端实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Elasticsearch,
    /// In-process index, optionally seeded from `catalog.seed_file`
    Memory,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
    /// Sessions unused for this many seconds are forgotten / 会话空闲过期
    pub session_idle_secs: u64,
    /// Upper bound on remembered sessions / 最大会话数
    pub max_sessions: usize,
}

/// Elasticsearch connection / Elasticsearch 连接配置
///
/// Credentials and the CA path are passed through to the HTTP client as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    /// `host:port` or full URL / 主机地址
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// PEM file with the CA certificate / CA 证书路径
    pub ssl_cert_path: Option<String>,
    /// Per-request timeout in seconds / 请求超时
    pub request_timeout_secs: u64,
}

/// Catalog configuration / 目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SKU index / 商品索引
    pub index_name: String,
    /// Catalog upload status index / 目录上传索引
    pub upload_index_name: String,
    /// Searched fields with boosts, rendered `field^boost` / 搜索字段
    pub search_fields: Vec<FieldBoost>,
    /// Field the suggesters read / 建议字段
    pub suggest_field: String,
    /// Fields stripped from every returned record / 默认排除字段
    pub default_excludes: Vec<String>,
    /// Result size of product searches / 默认搜索条数
    pub default_search_size: usize,
    /// Page size of "see more" scrolls / 默认分页大小
    pub default_page_size: usize,
    /// Scroll context lifetime in seconds / 游标存活时间
    pub scroll_ttl_secs: u64,
    /// JSON array of SKU documents loaded into the memory backend / 种子数据
    pub seed_file: Option<String>,
}

/// Readiness configuration / 就绪检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Give up after this many seconds / 最长等待
    pub max_wait_secs: u64,
    /// Delay between pings / 轮询间隔
    pub poll_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8180,
            session_idle_secs: 1800,
            max_sessions: 10_000,
        }
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            host: "localhost:9200".to_string(),
            user: None,
            password: None,
            ssl_cert_path: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            index_name: "catalogo".to_string(),
            upload_index_name: "catalogo_upload".to_string(),
            search_fields: vec![
                FieldBoost::boosted("sku", 10.0),
                FieldBoost::new("descripcion_corta"),
            ],
            suggest_field: "descripcion_corta_".to_string(),
            default_excludes: vec!["descripcion_corta_".to_string()],
            default_search_size: 5,
            default_page_size: 10,
            scroll_ttl_secs: 60,
            seed_file: None,
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 120,
            poll_secs: 5,
        }
    }
}

impl CatalogConfig {
    pub fn scroll_ttl(&self) -> Duration {
        Duration::from_secs(self.scroll_ttl_secs)
    }
}

impl ServerConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

impl ReadinessConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

impl AppConfig {
    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply environment overrides / 应用环境变量覆盖
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty("ELASTICSEARCH_HOST") {
            self.elasticsearch.host = host;
        }
        if let Some(user) = non_empty("ELASTICSEARCH_USER") {
            self.elasticsearch.user = Some(user);
        }
        if let Some(password) = non_empty("ELASTICSEARCH_PASSWORD") {
            self.elasticsearch.password = Some(password);
        }
        if let Some(path) = non_empty("ELASTICSEARCH_SSL_CERT_PATH") {
            self.elasticsearch.ssl_cert_path = Some(path);
        }
        if let Some(index) = non_empty("CATALOGO_INDEX_NAME") {
            self.catalog.index_name = index;
        }
    }
}

/// Get the config file path / 获取配置文件路径
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config(config_path: &Path) -> Result<AppConfig, String> {
    let mut config = if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        config
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config(config_path, &config)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        config
    };

    config.apply_env();
    Ok(config)
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config_path: &Path, config: &AppConfig) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}
