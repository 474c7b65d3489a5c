use crate::adapters::{Analyzer, ModelClient, Refiner};
use crate::assets::AssetUploader;
use crate::config::{ConfigKey, ConfigStore};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ConfigMap, CreateProjectPayload, DeleteOutcome, IngestOutcome, IngestRequest, Project, ProjectSummary, Record,
    RecordStatus, RecordUpdate, RefinePayload, UpdateProjectPayload,
};
use crate::partition;
use crate::pipeline::IngestionPipeline;
use crate::projects::ProjectRegistry;
use crate::store::TabularStore;
use std::sync::Arc;

/// Everything the HTTP layer calls into.
pub struct WorklogService {
    store: Arc<TabularStore>,
    config: Arc<ConfigStore>,
    projects: ProjectRegistry,
    pipeline: IngestionPipeline,
    refiner: Refiner,
}

pub struct ServiceParts {
    pub store: Arc<TabularStore>,
    pub config: Arc<ConfigStore>,
    pub vision_model: Arc<dyn ModelClient>,
    pub text_model: Arc<dyn ModelClient>,
    pub uploader: Arc<dyn AssetUploader>,
}

fn require_partition(partition: &str) -> AppResult<&str> {
    let partition = partition.trim();
    if partition.is_empty() {
        return Err(AppError::Validation("Partition is required".to_string()));
    }
    Ok(partition)
}

impl WorklogService {
    pub fn new(parts: ServiceParts) -> Self {
        let ServiceParts {
            store,
            config,
            vision_model,
            text_model,
            uploader,
        } = parts;
        Self {
            projects: ProjectRegistry::new(store.clone()),
            pipeline: IngestionPipeline::new(store.clone(), Analyzer::new(vision_model), uploader),
            refiner: Refiner::new(text_model),
            store,
            config,
        }
    }

    /// Fills the settings cache. A failed load leaves it empty and is only logged.
    pub async fn load_config(&self) {
        if let Err(error) = self.config.load(&self.store).await {
            tracing::warn!(error = %error, "settings load failed, continuing with environment only");
        }
    }

    pub async fn ingest(&self, request: IngestRequest) -> AppResult<IngestOutcome> {
        self.pipeline.ingest(request).await
    }

    /// Records of one month, newest first. A month with no partition yet is empty.
    pub async fn list_records(
        &self,
        month: Option<&str>,
        year: Option<&str>,
        scope: Option<&str>,
    ) -> AppResult<(String, Vec<Record>)> {
        let partition = partition::resolve_month(month, year, scope)?;
        match self.store.list(&partition).await {
            Ok(records) => Ok((partition, records)),
            Err(AppError::NotFound(_)) => Ok((partition, Vec::new())),
            Err(error) => Err(error),
        }
    }

    pub async fn update_status(&self, partition: &str, id: u32, status: RecordStatus) -> AppResult<String> {
        self.store.update_status(require_partition(partition)?, id, status).await
    }

    pub async fn update_record(&self, partition: &str, id: u32, update: &RecordUpdate) -> AppResult<String> {
        self.store.update_record(require_partition(partition)?, id, update).await
    }

    pub async fn delete_record(&self, partition: &str, id: u32) -> AppResult<DeleteOutcome> {
        let partition = require_partition(partition)?;
        let asset = self.store.delete_record(partition, id).await?;
        tracing::info!(partition = %partition, id, "deleted record");
        Ok(DeleteOutcome {
            partition: partition.to_string(),
            id,
            asset,
        })
    }

    pub async fn config_masked(&self) -> ConfigMap {
        self.config.masked().await
    }

    pub async fn save_config(&self, update: ConfigMap) -> AppResult<()> {
        self.config.save(&self.store, update).await
    }

    /// Shared-password check. There is no built-in default password.
    pub async fn login(&self, password: &str) -> AppResult<bool> {
        let expected = self.config.require_text(ConfigKey::SystemPassword).await?;
        Ok(password == expected)
    }

    pub async fn users(&self) -> Vec<String> {
        self.config.users().await
    }

    pub async fn list_projects(&self) -> AppResult<Vec<ProjectSummary>> {
        self.projects.list_with_stats().await
    }

    pub async fn project_by_slug(&self, slug: &str) -> AppResult<Project> {
        self.projects.get_by_slug(slug).await
    }

    pub async fn create_project(&self, payload: CreateProjectPayload) -> AppResult<Project> {
        self.projects.create(payload).await
    }

    pub async fn update_project(&self, id: &str, payload: UpdateProjectPayload) -> AppResult<Project> {
        self.projects.update(id, payload).await
    }

    pub async fn delete_project(&self, id: &str) -> AppResult<()> {
        self.projects.delete(id).await
    }

    pub async fn refine(&self, payload: RefinePayload) -> AppResult<String> {
        self.refiner.refine(&payload.text, payload.mode, payload.language).await
    }
}

#[cfg(test)]
mod tests {
    use super::{ServiceParts, WorklogService};
    use crate::adapters::{ModelClient, ModelRequest};
    use crate::assets::{AssetMeta, AssetUploader, NoopAssetRemover};
    use crate::config::{ConfigStore, EnvSnapshot};
    use crate::errors::{AppError, AppResult, RemoteFailure};
    use crate::models::{ConfigMap, ConfigValue};
    use crate::sheets::memory::MemorySheets;
    use crate::store::TabularStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl ModelClient for Offline {
        fn name(&self) -> &'static str {
            "offline"
        }

        async fn generate(&self, _request: ModelRequest) -> AppResult<String> {
            Err(AppError::remote("offline", RemoteFailure::Other, "offline"))
        }
    }

    #[async_trait]
    impl AssetUploader for Offline {
        async fn upload(&self, _bytes: &[u8], _meta: &AssetMeta) -> AppResult<String> {
            Err(AppError::remote("offline", RemoteFailure::Other, "offline"))
        }
    }

    fn service(env: &[(&str, &str)]) -> WorklogService {
        let store = Arc::new(TabularStore::new(Arc::new(MemorySheets::new()), Arc::new(NoopAssetRemover)));
        WorklogService::new(ServiceParts {
            store,
            config: Arc::new(ConfigStore::new(EnvSnapshot::from_pairs(env.iter().copied()))),
            vision_model: Arc::new(Offline),
            text_model: Arc::new(Offline),
            uploader: Arc::new(Offline),
        })
    }

    #[tokio::test]
    async fn missing_month_lists_empty() {
        let service = service(&[]);
        let (partition, records) = service
            .list_records(Some("4"), Some("2031"), Some("siteB"))
            .await
            .expect("list");
        assert_eq!(partition, "siteB_04-2031");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn login_needs_a_configured_password() {
        let service = service(&[]);
        let error = service.login("123456").await.expect_err("unset password");
        assert!(matches!(error, AppError::Configuration(_)));

        let mut update = ConfigMap::new();
        update.insert("systemPassword".to_string(), ConfigValue::Text("s3cret".to_string()));
        service.save_config(update).await.expect("save");
        assert!(service.login("s3cret").await.expect("login"));
        assert!(!service.login("guess").await.expect("login"));
        assert_eq!(
            service.config_masked().await.get("systemPassword"),
            Some(&ConfigValue::Text("********".to_string()))
        );
    }

    #[tokio::test]
    async fn record_mutations_require_a_partition() {
        let service = service(&[]);
        let error = service
            .update_status(" ", 2, crate::models::RecordStatus::Completed)
            .await
            .expect_err("blank partition");
        assert!(matches!(error, AppError::Validation(_)));
    }
}
