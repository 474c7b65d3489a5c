use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TASK_NAME: &str = "Untitled Task";
pub const DEFAULT_ASSIGNEE: &str = "Unassigned";
pub const UPLOAD_FAILED: &str = "UPLOAD_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    Pending,
    #[serde(rename = "In Progress", alias = "InProgress")]
    InProgress,
    Completed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    /// Lenient parse used for sheet cells and model output.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Some(Self::Pending),
            "inprogress" => Some(Self::InProgress),
            "completed" | "complete" | "done" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// The eight persisted columns minus the audit stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    pub date: String,
    pub task_name: String,
    pub assignee: String,
    pub status: RecordStatus,
    pub description: String,
    pub cost: f64,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Row offset inside the partition. Shifts when an earlier row is deleted.
    pub id: u32,
    pub partition: String,
    #[serde(flatten)]
    pub fields: RecordFields,
    pub last_updated: String,
}

/// Model output before it is merged with user input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub task_name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub cost: Option<f64>,
    pub status: Option<RecordStatus>,
    #[serde(default)]
    pub degraded: bool,
}

impl Draft {
    /// Built only from the note, kept as written; nothing is guessed.
    pub fn fallback(note: &str) -> Self {
        Self {
            description: (!note.trim().is_empty()).then(|| note.to_string()),
            degraded: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    pub assignee: Option<String>,
    pub status: Option<RecordStatus>,
    pub task_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub note: Option<String>,
    pub image: Option<ImageUpload>,
    pub overrides: Overrides,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub partition: String,
    #[serde(flatten)]
    pub record: RecordFields,
    pub category: Option<String>,
    pub last_updated: String,
    pub ai_degraded: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub date: String,
    pub task_name: String,
    pub assignee: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AssetCleanup {
    None,
    Deleted { file_id: String },
    Unrecognized { url: String },
    Failed { reason: String },
    /// The row could not be read, so any linked asset was left in place.
    ReadFailed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub partition: String,
    pub id: u32,
    pub asset: AssetCleanup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total: usize,
    pub completed: usize,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub stats: ProjectStats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectPayload {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectPayload {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// A persisted setting: plain text, a list (e.g. `users`), or a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    List(Vec<String>),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl ConfigValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn is_populated(&self) -> bool {
        match self {
            Self::Text(value) => !value.trim().is_empty(),
            Self::List(values) => !values.is_empty(),
            Self::Object(map) => !map.is_empty(),
        }
    }

    /// Cell text for the metadata partition.
    pub fn to_cell(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::List(values) => serde_json::to_string(values).unwrap_or_default(),
            Self::Object(map) => serde_json::to_string(map).unwrap_or_default(),
        }
    }

    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<ConfigValue>(raw) {
                return parsed;
            }
        }
        Self::Text(raw.to_string())
    }
}

pub type ConfigMap = BTreeMap<String, ConfigValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefineMode {
    #[serde(alias = "refine")]
    Tighten,
    Expand,
    #[serde(alias = "organize")]
    Structure,
    #[serde(alias = "shorten")]
    Condense,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Th,
    En,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinePayload {
    pub text: String,
    pub mode: RefineMode,
    #[serde(default)]
    pub language: Language,
}
