use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use catalog_search::catalog::{CatalogUploadSearch, SearchOptions, SkuSearch};
use catalog_search::config::{self, AppConfig};
use catalog_search::connection;
use state::AppState;

/// Command line subcommand / 命令行子命令
enum Command {
    Serve,
    WaitReady,
    Search(String),
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        None | Some("serve") => Ok(Command::Serve),
        Some("wait-ready") => Ok(Command::WaitReady),
        Some("search") => {
            let text = args[1..].join(" ");
            if text.trim().is_empty() {
                anyhow::bail!("usage: catalog-search search <text>");
            }
            Ok(Command::Search(text))
        }
        Some(other) => anyhow::bail!(
            "unknown command `{}` (expected serve, wait-ready or search <text>)",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_search=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    // Load configuration / 加载配置
    let config_path = config::get_config_path();
    let app_config = config::load_config(&config_path)
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;
    tracing::info!(
        "catalog-search {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME")
    );

    let backend = connection::connect(&app_config).await?;

    match command {
        Command::WaitReady => {
            connection::wait_until_ready(backend.as_ref(), &app_config.readiness).await?;
            Ok(())
        }
        Command::Search(text) => {
            connection::raise_unconnected(backend.as_ref()).await?;
            let search = SkuSearch::connect(backend, &app_config.catalog).await?;
            let records = search.search_product(&text, &SearchOptions::default()).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::Serve => serve(app_config, backend).await,
    }
}

async fn serve(
    app_config: AppConfig,
    backend: Arc<dyn catalog_search::backend::SearchBackend>,
) -> anyhow::Result<()> {
    connection::wait_until_ready(backend.as_ref(), &app_config.readiness).await?;

    let sku_search = SkuSearch::connect(backend.clone(), &app_config.catalog).await?;
    let uploads = match CatalogUploadSearch::connect(backend.clone(), &app_config.catalog).await {
        Ok(uploads) => Some(uploads),
        Err(e) => {
            tracing::warn!("Upload lookups disabled: {}", e);
            None
        }
    };

    let bind_addr = app_config.get_bind_address();
    let state = Arc::new(AppState::new(app_config, backend, sku_search, uploads));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse_args(&args(&[])).unwrap(), Command::Serve));
        assert!(matches!(parse_args(&args(&["wait-ready"])).unwrap(), Command::WaitReady));
        match parse_args(&args(&["search", "Cemento", "MELON"])).unwrap() {
            Command::Search(text) => assert_eq!(text, "Cemento MELON"),
            _ => panic!("expected search"),
        }
        assert!(parse_args(&args(&["search"])).is_err());
        assert!(parse_args(&args(&["index"])).is_err());
    }
}
