use crate::config::{ConfigKey, ConfigStore};
use crate::errors::{AppError, AppResult, RemoteFailure};
use crate::models::AssetCleanup;
use crate::sheets::google::{check_response, GoogleAuth};
use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

static DRIVE_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("valid regex"),
        Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMeta {
    pub file_name: String,
    pub mime_type: String,
}

#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Stores the bytes and returns a shareable URL.
    async fn upload(&self, bytes: &[u8], meta: &AssetMeta) -> AppResult<String>;
}

#[async_trait]
pub trait AssetRemover: Send + Sync {
    async fn remove(&self, url: &str) -> AppResult<AssetCleanup>;
}

/// Extracts the Drive file id from a `drive.google.com` link.
pub fn drive_file_id(url: &str) -> Option<String> {
    if !url.contains("drive.google.com") {
        return None;
    }
    DRIVE_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody<'a> {
    base64: String,
    file_name: &'a str,
    mime_type: &'a str,
    folder_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Uploads through an Apps Script web app that writes into a Drive folder.
/// Proxy URL and folder are read from settings on every call.
pub struct AppsScriptUploader {
    config: Arc<ConfigStore>,
    http: reqwest::Client,
}

impl AppsScriptUploader {
    pub fn new(config: Arc<ConfigStore>, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl AssetUploader for AppsScriptUploader {
    async fn upload(&self, bytes: &[u8], meta: &AssetMeta) -> AppResult<String> {
        let script_url = self.config.require_text(ConfigKey::GoogleAppsScriptUrl).await?;
        let folder_id = self
            .config
            .first_text(&[ConfigKey::GoogleDriveFolderIdJobs, ConfigKey::GoogleDriveFolderId])
            .await
            .ok_or_else(|| {
                AppError::missing_setting(
                    ConfigKey::GoogleDriveFolderIdJobs.as_str(),
                    ConfigKey::GoogleDriveFolderIdJobs.env_vars()[0],
                )
            })?;

        let body = UploadBody {
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            file_name: &meta.file_name,
            mime_type: &meta.mime_type,
            folder_id: &folder_id,
        };
        let response = self
            .http
            .post(&script_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| AppError::transport("apps-script", error))?;
        let reply: UploadReply = check_response("apps-script", response)
            .await?
            .json()
            .await
            .map_err(|error| AppError::transport("apps-script", error))?;

        match reply.url {
            Some(url) if reply.status == "success" && !url.is_empty() => {
                tracing::debug!(file_name = %meta.file_name, "uploaded asset");
                Ok(url)
            }
            _ => Err(AppError::remote(
                "apps-script",
                RemoteFailure::Other,
                reply.message.unwrap_or_else(|| format!("upload returned status '{}'", reply.status)),
            )),
        }
    }
}

/// Deletes Drive files linked from records.
pub struct DriveAssetRemover {
    auth: Arc<GoogleAuth>,
    http: reqwest::Client,
}

impl DriveAssetRemover {
    pub fn new(auth: Arc<GoogleAuth>, http: reqwest::Client) -> Self {
        Self { auth, http }
    }
}

#[async_trait]
impl AssetRemover for DriveAssetRemover {
    async fn remove(&self, url: &str) -> AppResult<AssetCleanup> {
        let Some(file_id) = drive_file_id(url) else {
            return Ok(AssetCleanup::Unrecognized { url: url.to_string() });
        };
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .delete(format!("{}/{}", DRIVE_FILES_URL, file_id))
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| AppError::transport("drive", error))?;
        check_response("drive", response).await?;
        tracing::info!(file_id = %file_id, "deleted linked asset");
        Ok(AssetCleanup::Deleted { file_id })
    }
}

/// Leaves linked assets in place. Used when no Drive credentials are available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAssetRemover;

#[async_trait]
impl AssetRemover for NoopAssetRemover {
    async fn remove(&self, url: &str) -> AppResult<AssetCleanup> {
        Ok(match drive_file_id(url) {
            Some(_) => AssetCleanup::None,
            None => AssetCleanup::Unrecognized { url: url.to_string() },
        })
    }
}
