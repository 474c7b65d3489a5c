pub mod adapters;
pub mod assets;
pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod partition;
pub mod pipeline;
pub mod projects;
pub mod redaction;
pub mod service;
pub mod sheets;
pub mod store;

use crate::adapters::gemini::GeminiClient;
use crate::adapters::groq::GroqClient;
use crate::assets::{AppsScriptUploader, AssetRemover, DriveAssetRemover, NoopAssetRemover};
use crate::config::{ConfigKey, ConfigStore, EnvSnapshot};
use crate::errors::{AppError, AppResult};
use crate::service::{ServiceParts, WorklogService};
use crate::sheets::google::{resolve_credentials, GoogleAuth, GoogleSheets};
use crate::sheets::memory::MemorySheets;
use crate::sheets::SheetsBackend;
use crate::store::TabularStore;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub addr: SocketAddr,
    pub spreadsheet_id: Option<String>,
    pub log_dir: PathBuf,
    pub in_memory: bool,
}

pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "worklog.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

/// Wires backends, adapters and settings into a ready service. Settings are loaded
/// before returning.
pub async fn build_service(options: &ServeOptions, env: EnvSnapshot) -> AppResult<Arc<WorklogService>> {
    let http = reqwest::Client::new();
    let config = Arc::new(ConfigStore::new(env));

    let (backend, remover): (Arc<dyn SheetsBackend>, Arc<dyn AssetRemover>) = if options.in_memory {
        tracing::warn!("using in-memory spreadsheet, data is lost on exit");
        (Arc::new(MemorySheets::new()), Arc::new(NoopAssetRemover))
    } else {
        let spreadsheet_id = match options.spreadsheet_id.clone() {
            Some(id) => id,
            None => config
                .first_text(&[ConfigKey::GoogleSheetIdJobs, ConfigKey::GoogleSheetId])
                .await
                .ok_or_else(|| {
                    AppError::missing_setting(
                        ConfigKey::GoogleSheetIdJobs.as_str(),
                        ConfigKey::GoogleSheetIdJobs.env_vars()[0],
                    )
                })?,
        };
        let key = resolve_credentials(&config, config.env()).await?;
        tracing::info!(client_email = %key.client_email, "using service account");
        let auth = Arc::new(GoogleAuth::new(key, http.clone()));
        (
            Arc::new(GoogleSheets::new(spreadsheet_id, http.clone(), auth.clone())),
            Arc::new(DriveAssetRemover::new(auth, http.clone())),
        )
    };

    let store = Arc::new(TabularStore::new(backend, remover));
    let service = Arc::new(WorklogService::new(ServiceParts {
        store,
        config: config.clone(),
        vision_model: Arc::new(GeminiClient::new(config.clone(), http.clone())),
        text_model: Arc::new(GroqClient::new(config.clone(), http.clone())),
        uploader: Arc::new(AppsScriptUploader::new(config, http)),
    }));
    service.load_config().await;
    Ok(service)
}

pub async fn run(options: ServeOptions) -> anyhow::Result<()> {
    init_tracing(&options.log_dir).map_err(anyhow::Error::msg)?;

    let service = build_service(&options, EnvSnapshot::from_process()).await?;
    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind(options.addr).await?;
    tracing::info!(addr = %options.addr, in_memory = options.in_memory, "worklog server listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    tracing::info!("worklog server stopped");
    Ok(())
}
