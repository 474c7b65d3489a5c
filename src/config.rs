//! Runtime settings: values persisted in the `_SYS_CONFIG` metadata partition, overlaid on
//! the process environment captured once at startup.

use crate::errors::{AppError, AppResult};
use crate::models::{ConfigMap, ConfigValue};
use crate::redaction::{is_mask, SECRET_MASK};
use crate::store::TabularStore;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

pub const CONFIG_PARTITION: &str = "_SYS_CONFIG";
const CONFIG_HEADER: [&str; 2] = ["key", "value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    GeminiApiKey,
    GroqApiKey,
    GoogleSheetId,
    GoogleSheetIdJobs,
    GoogleDriveFolderId,
    GoogleDriveFolderIdJobs,
    GoogleAppsScriptUrl,
    ServiceAccountJson,
    SystemPassword,
    Users,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 10] = [
        ConfigKey::GeminiApiKey,
        ConfigKey::GroqApiKey,
        ConfigKey::GoogleSheetId,
        ConfigKey::GoogleSheetIdJobs,
        ConfigKey::GoogleDriveFolderId,
        ConfigKey::GoogleDriveFolderIdJobs,
        ConfigKey::GoogleAppsScriptUrl,
        ConfigKey::ServiceAccountJson,
        ConfigKey::SystemPassword,
        ConfigKey::Users,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeminiApiKey => "geminiApiKey",
            Self::GroqApiKey => "groqApiKey",
            Self::GoogleSheetId => "googleSheetId",
            Self::GoogleSheetIdJobs => "googleSheetIdJobs",
            Self::GoogleDriveFolderId => "googleDriveFolderId",
            Self::GoogleDriveFolderIdJobs => "googleDriveFolderIdJobs",
            Self::GoogleAppsScriptUrl => "googleAppsScriptUrl",
            Self::ServiceAccountJson => "serviceAccountJson",
            Self::SystemPassword => "systemPassword",
            Self::Users => "users",
        }
    }

    /// Environment variables consulted for this key, first match wins.
    pub fn env_vars(self) -> &'static [&'static str] {
        match self {
            Self::GeminiApiKey => &["GEMINI_API_KEY"],
            Self::GroqApiKey => &["GROQ_API_KEY"],
            Self::GoogleSheetId => &["GOOGLE_SHEET_ID"],
            Self::GoogleSheetIdJobs => &["GOOGLE_SHEET_ID_JOBS", "GOOGLE_SHEET_ID"],
            Self::GoogleDriveFolderId => &["GOOGLE_DRIVE_FOLDER_ID"],
            Self::GoogleDriveFolderIdJobs => &["GOOGLE_DRIVE_FOLDER_ID_JOBS", "GOOGLE_DRIVE_FOLDER_ID"],
            Self::GoogleAppsScriptUrl => &["GOOGLE_APPS_SCRIPT_URL", "GOOGLE_SCRIPT_URL"],
            Self::ServiceAccountJson => &["GOOGLE_APPLICATION_CREDENTIALS_JSON"],
            Self::SystemPassword => &["SYSTEM_PASSWORD"],
            Self::Users => &["SYSTEM_USERS"],
        }
    }

    /// Keys where a deployment's environment overrides whatever was saved through the UI.
    pub fn env_priority(self) -> bool {
        matches!(
            self,
            Self::GeminiApiKey
                | Self::GroqApiKey
                | Self::ServiceAccountJson
                | Self::GoogleSheetIdJobs
                | Self::GoogleDriveFolderIdJobs
        )
    }

    pub fn is_secret(self) -> bool {
        matches!(
            self,
            Self::GeminiApiKey | Self::GroqApiKey | Self::ServiceAccountJson | Self::SystemPassword
        )
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Environment captured once. Empty, `undefined` and `null` values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let value = self.vars.get(name)?.trim();
        match value {
            "" | "undefined" | "null" => None,
            _ => Some(value),
        }
    }

    fn value_for(&self, key: ConfigKey) -> Option<ConfigValue> {
        let raw = key.env_vars().iter().find_map(|name| self.get(name))?;
        if key == ConfigKey::Users {
            if let Ok(users) = serde_json::from_str::<Vec<String>>(raw) {
                return Some(ConfigValue::List(users));
            }
            let users: Vec<String> = raw
                .split(',')
                .map(|user| user.trim().to_string())
                .filter(|user| !user.is_empty())
                .collect();
            return Some(ConfigValue::List(users));
        }
        Some(ConfigValue::Text(raw.to_string()))
    }
}

/// In-memory view of persisted settings. Reads resolve against the cache and the
/// environment; only `load` and `save` touch the spreadsheet.
#[derive(Debug, Default)]
pub struct ConfigStore {
    env: EnvSnapshot,
    cache: RwLock<ConfigMap>,
}

impl ConfigStore {
    pub fn new(env: EnvSnapshot) -> Self {
        Self {
            env,
            cache: RwLock::new(ConfigMap::new()),
        }
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Replaces the cache with the metadata partition. Returns the number of keys read.
    pub async fn load(&self, store: &TabularStore) -> AppResult<usize> {
        let rows = store.read_tab(CONFIG_PARTITION).await?;
        let loaded: ConfigMap = rows
            .iter()
            .skip(1)
            .filter_map(|row| {
                let key = row.first()?.trim();
                if key.is_empty() {
                    return None;
                }
                let raw = row.get(1).map(String::as_str).unwrap_or("");
                Some((key.to_string(), ConfigValue::from_cell(raw)))
            })
            .collect();
        let count = loaded.len();
        *self.cache.write().await = loaded;
        tracing::info!(keys = count, "loaded settings");
        Ok(count)
    }

    /// Merges `update` into the cache and rewrites the whole metadata partition.
    /// A secret submitted as the mask keeps its stored value.
    pub async fn save(&self, store: &TabularStore, update: ConfigMap) -> AppResult<()> {
        let snapshot = {
            let mut cache = self.cache.write().await;
            for (name, value) in update {
                let secret = ConfigKey::from_name(&name).is_some_and(ConfigKey::is_secret);
                if secret && value.as_text().is_some_and(is_mask) {
                    continue;
                }
                cache.insert(name, value);
            }
            cache.clone()
        };

        let mut rows = vec![CONFIG_HEADER.iter().map(|label| label.to_string()).collect::<Vec<_>>()];
        rows.extend(snapshot.iter().map(|(name, value)| vec![name.clone(), value.to_cell()]));
        store.write_tab(CONFIG_PARTITION, rows).await?;
        tracing::info!(keys = snapshot.len(), "saved settings");
        Ok(())
    }

    /// Effective value: environment first for priority keys, otherwise a populated cached
    /// value, otherwise the environment.
    pub async fn get(&self, key: ConfigKey) -> Option<ConfigValue> {
        if key.env_priority() {
            if let Some(value) = self.env.value_for(key) {
                return Some(value);
            }
        }
        let cached = self
            .cache
            .read()
            .await
            .get(key.as_str())
            .filter(|value| value.is_populated())
            .cloned();
        cached.or_else(|| self.env.value_for(key))
    }

    pub async fn get_text(&self, key: ConfigKey) -> Option<String> {
        match self.get(key).await? {
            ConfigValue::Text(value) => {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            }
            _ => None,
        }
    }

    pub async fn require_text(&self, key: ConfigKey) -> AppResult<String> {
        self.get_text(key)
            .await
            .ok_or_else(|| AppError::missing_setting(key.as_str(), key.env_vars()[0]))
    }

    /// First populated key of `keys`, in order.
    pub async fn first_text(&self, keys: &[ConfigKey]) -> Option<String> {
        for key in keys {
            if let Some(value) = self.get_text(*key).await {
                return Some(value);
            }
        }
        None
    }

    pub async fn users(&self) -> Vec<String> {
        match self.get(ConfigKey::Users).await {
            Some(ConfigValue::List(users)) => users,
            Some(ConfigValue::Text(raw)) => raw
                .split(',')
                .map(|user| user.trim().to_string())
                .filter(|user| !user.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Cached settings for display, populated secrets replaced by the mask.
    pub async fn masked(&self) -> ConfigMap {
        let mut view = self.cache.read().await.clone();
        for key in ConfigKey::ALL.into_iter().filter(|key| key.is_secret()) {
            if let Some(value) = view.get_mut(key.as_str()) {
                if value.is_populated() {
                    *value = ConfigValue::Text(SECRET_MASK.to_string());
                }
            }
        }
        view.entry(ConfigKey::Users.as_str().to_string())
            .or_insert_with(|| ConfigValue::List(Vec::new()));
        view
    }
}
