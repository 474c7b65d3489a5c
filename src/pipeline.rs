use crate::adapters::Analyzer;
use crate::assets::{AssetMeta, AssetUploader};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Draft, IngestOutcome, IngestRequest, Overrides, RecordFields, RecordStatus, DEFAULT_ASSIGNEE,
    DEFAULT_TASK_NAME, UPLOAD_FAILED,
};
use crate::partition;
use crate::store::{TabularStore, RECORD_HEADER};
use chrono::{Local, NaiveDate, Utc};
use std::sync::Arc;

/// Note/photo → analyzed, uploaded and persisted record.
pub struct IngestionPipeline {
    store: Arc<TabularStore>,
    analyzer: Analyzer,
    uploader: Arc<dyn AssetUploader>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<TabularStore>, analyzer: Analyzer, uploader: Arc<dyn AssetUploader>) -> Self {
        Self {
            store,
            analyzer,
            uploader,
        }
    }

    pub async fn ingest(&self, request: IngestRequest) -> AppResult<IngestOutcome> {
        // blank notes count as absent; anything else is kept verbatim
        let note = request
            .note
            .as_deref()
            .filter(|note| !note.trim().is_empty())
            .unwrap_or("");
        if note.is_empty() && request.image.is_none() {
            return Err(AppError::Validation("A note or an image is required".to_string()));
        }

        let today = Local::now().date_naive();
        let draft = self
            .analyzer
            .analyze(note, request.image.as_ref(), &today.format("%Y-%m-%d").to_string())
            .await;

        let image_url = match &request.image {
            Some(image) => {
                let meta = AssetMeta {
                    file_name: upload_file_name(&draft, &request.overrides, today),
                    mime_type: image.mime_type.clone(),
                };
                match self.uploader.upload(&image.bytes, &meta).await {
                    Ok(url) => url,
                    Err(error) => {
                        tracing::warn!(error = %error, file_name = %meta.file_name, "image upload failed");
                        UPLOAD_FAILED.to_string()
                    }
                }
            }
            None => String::new(),
        };

        let fields = merge_draft(&draft, &request.overrides, note, image_url, today);
        let record_date = partition::parse_record_date(&fields.date).unwrap_or(today);
        let partition = partition::resolve(&record_date, request.scope.as_deref());

        self.store.ensure_partition(&partition, &RECORD_HEADER).await?;
        let last_updated = self.store.append(&partition, &fields).await?;
        tracing::info!(partition = %partition, degraded = draft.degraded, "record ingested");

        Ok(IngestOutcome {
            partition,
            record: fields,
            category: draft.category,
            last_updated,
            ai_degraded: draft.degraded,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Combines model output with user input. Overrides win over the draft; anything still
/// missing or unusable falls back to a default.
pub fn merge_draft(draft: &Draft, overrides: &Overrides, note: &str, image_url: String, today: NaiveDate) -> RecordFields {
    let date = non_empty(draft.date.as_deref())
        .and_then(partition::parse_record_date)
        .unwrap_or(today);
    let cost = draft
        .cost
        .filter(|cost| cost.is_finite() && *cost >= 0.0)
        .unwrap_or(0.0);
    let description = non_empty(draft.description.as_deref()).unwrap_or(note);

    RecordFields {
        date: date.format("%Y-%m-%d").to_string(),
        task_name: non_empty(overrides.task_name.as_deref())
            .or(non_empty(draft.task_name.as_deref()))
            .unwrap_or(DEFAULT_TASK_NAME)
            .to_string(),
        assignee: non_empty(overrides.assignee.as_deref())
            .unwrap_or(DEFAULT_ASSIGNEE)
            .to_string(),
        status: overrides
            .status
            .or(draft.status)
            .unwrap_or(RecordStatus::Pending),
        description: description.to_string(),
        cost,
        image_url,
    }
}

fn upload_file_name(draft: &Draft, overrides: &Overrides, today: NaiveDate) -> String {
    let date = non_empty(draft.date.as_deref())
        .and_then(partition::parse_record_date)
        .unwrap_or(today);
    let context = non_empty(overrides.task_name.as_deref())
        .or(non_empty(draft.task_name.as_deref()))
        .unwrap_or("Job")
        .replace('/', "-");
    format!("{}_{}_{}.jpg", date.format("%Y-%m-%d"), context, Utc::now().timestamp_millis())
}
