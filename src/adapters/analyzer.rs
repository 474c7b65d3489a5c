use super::structured_output::{parse_json_reply, validate_structured_output};
use super::{ModelClient, ModelRequest};
use crate::models::{Draft, ImageUpload, RecordStatus};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;

pub const CATEGORIES: [&str; 9] = [
    "Feature",
    "BugFix",
    "Refactor",
    "Testing",
    "DevOps",
    "Maintenance",
    "Meeting",
    "Support",
    "Research",
];

static DRAFT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    let text = serde_json::json!({ "type": ["string", "null"] });
    serde_json::json!({
        "type": "object",
        "properties": {
            "taskName": text,
            "category": text,
            "description": text,
            "date": text,
            "cost": { "type": ["number", "null"] },
            "status": text
        }
    })
});

/// Turns a free-text note (and optional photo) into a draft record.
pub struct Analyzer {
    client: Arc<dyn ModelClient>,
}

impl Analyzer {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    /// Never fails: any model, parse or schema problem yields `Draft::fallback`.
    pub async fn analyze(&self, note: &str, image: Option<&ImageUpload>, today: &str) -> Draft {
        let request = ModelRequest::new(build_prompt(note, today)).with_image(image.cloned());
        let reply = match self.client.generate(request).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(error = %error, model = self.client.name(), "analysis failed, using fallback draft");
                return Draft::fallback(note);
            }
        };

        let validation = validate_structured_output(parse_json_reply(&reply), &DRAFT_SCHEMA);
        match validation.value.as_ref() {
            Some(value) if validation.is_valid() => draft_from_value(value),
            _ => {
                tracing::warn!(
                    error = validation.error.as_deref().unwrap_or("invalid reply"),
                    details = ?validation.errors,
                    "analysis reply rejected, using fallback draft"
                );
                Draft::fallback(note)
            }
        }
    }
}

fn build_prompt(note: &str, today: &str) -> String {
    format!(
        r#"Analyze this daily work log entry (text note and optional image).
The author is usually in a software or technical role. Today is {today}.

Note: "{note}"

Reply with one JSON object:
{{
  "taskName": string,     short professional title
  "category": string,     one of {categories}
  "description": string,  professional summary of the work done
  "date": "YYYY-MM-DD",   date mentioned, else today
  "cost": number,         any cost mentioned, else 0
  "status": string        "Completed", "In Progress" or "Pending"
}}

Return only raw JSON. No markdown."#,
        today = today,
        note = note.trim(),
        categories = CATEGORIES.join(", "),
    )
}

fn draft_from_value(value: &Value) -> Draft {
    let text = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToString::to_string)
    };
    Draft {
        task_name: text("taskName"),
        category: text("category"),
        description: text("description"),
        date: text("date"),
        cost: value.get("cost").and_then(Value::as_f64),
        status: text("status").and_then(|status| RecordStatus::parse(&status)),
        degraded: false,
    }
}
