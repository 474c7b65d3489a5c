use crate::errors::{AppError, AppResult};
use crate::models::{CreateProjectPayload, Project, ProjectStats, ProjectSummary, RecordStatus, UpdateProjectPayload};
use crate::partition;
use crate::store::TabularStore;
use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const PROJECTS_PARTITION: &str = "_SYS_PROJECTS";
const PROJECTS_HEADER: [&str; 5] = ["id", "name", "slug", "createdAt", "color"];

pub const PROJECT_COLORS: [&str; 10] = [
    "#6366f1", "#8b5cf6", "#ec4899", "#f43f5e", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#06b6d4", "#3b82f6",
];

static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\u{0E00}-\u{0E7F}a-z0-9\s-]").expect("valid regex"));
static SLUG_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SLUG_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

/// Lowercases, keeps Thai letters, ASCII alphanumerics, spaces and dashes, then dash-joins.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let kept = SLUG_STRIP.replace_all(&lowered, "");
    let dashed = SLUG_SPACES.replace_all(&kept, "-");
    let collapsed = SLUG_DASHES.replace_all(&dashed, "-");
    let slug = collapsed.trim_matches('-');
    if slug.is_empty() {
        format!("project-{}", Utc::now().timestamp_millis())
    } else {
        slug.to_string()
    }
}

fn unique_slug(base: String, projects: &[Project]) -> String {
    let taken = |candidate: &str| projects.iter().any(|project| project.slug == candidate);
    let mut candidate = base.clone();
    let mut counter = 1;
    while taken(&candidate) {
        candidate = format!("{}-{}", base, counter);
        counter += 1;
    }
    candidate
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Projects persisted in the `_SYS_PROJECTS` metadata partition. Every mutation rewrites
/// the whole partition; writers inside this process are serialized.
pub struct ProjectRegistry {
    store: Arc<TabularStore>,
    write_lock: Mutex<()>,
}

impl ProjectRegistry {
    pub fn new(store: Arc<TabularStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> AppResult<Vec<Project>> {
        let rows = self.store.read_tab(PROJECTS_PARTITION).await?;
        Ok(rows
            .into_iter()
            .skip(1)
            .filter_map(|row| {
                let cell = |index: usize| row.get(index).map(|value| value.trim().to_string()).unwrap_or_default();
                let id = cell(0);
                if id.is_empty() {
                    return None;
                }
                Some(Project {
                    id,
                    name: cell(1),
                    slug: cell(2),
                    created_at: cell(3),
                    color: cell(4),
                })
            })
            .collect())
    }

    async fn persist(&self, projects: &[Project]) -> AppResult<()> {
        let mut rows = vec![PROJECTS_HEADER.iter().map(|label| label.to_string()).collect::<Vec<_>>()];
        rows.extend(projects.iter().map(|project| {
            vec![
                project.id.clone(),
                project.name.clone(),
                project.slug.clone(),
                project.created_at.clone(),
                project.color.clone(),
            ]
        }));
        self.store.write_tab(PROJECTS_PARTITION, rows).await
    }

    pub async fn create(&self, payload: CreateProjectPayload) -> AppResult<Project> {
        let name = payload.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Project name is required".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let mut projects = self.list().await?;
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: unique_slug(slugify(name), &projects),
            created_at: Local::now().date_naive().format("%Y-%m-%d").to_string(),
            color: non_empty(payload.color.as_deref())
                .unwrap_or(PROJECT_COLORS[projects.len() % PROJECT_COLORS.len()])
                .to_string(),
        };
        projects.push(project.clone());
        self.persist(&projects).await?;
        tracing::info!(project_id = %project.id, slug = %project.slug, "created project");
        Ok(project)
    }

    pub async fn get_by_slug(&self, slug: &str) -> AppResult<Project> {
        self.list()
            .await?
            .into_iter()
            .find(|project| project.slug == slug)
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", slug)))
    }

    /// Renames or recolours. The slug never changes, so existing partitions stay linked.
    pub async fn update(&self, id: &str, payload: UpdateProjectPayload) -> AppResult<Project> {
        let _guard = self.write_lock.lock().await;
        let mut projects = self.list().await?;
        let project = projects
            .iter_mut()
            .find(|project| project.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;
        if let Some(name) = non_empty(payload.name.as_deref()) {
            project.name = name.to_string();
        }
        if let Some(color) = non_empty(payload.color.as_deref()) {
            project.color = color.to_string();
        }
        let updated = project.clone();
        self.persist(&projects).await?;
        Ok(updated)
    }

    /// Drops the project entry only; its record partitions are left in place.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let projects = self.list().await?;
        let remaining: Vec<Project> = projects.iter().filter(|project| project.id != id).cloned().collect();
        if remaining.len() == projects.len() {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }
        self.persist(&remaining).await?;
        tracing::info!(project_id = %id, "deleted project");
        Ok(())
    }

    /// Projects with counts from their current-month partition.
    pub async fn list_with_stats(&self) -> AppResult<Vec<ProjectSummary>> {
        let today = Local::now().date_naive();
        let mut summaries = Vec::new();
        for project in self.list().await? {
            let partition = partition::resolve(&today, Some(&project.slug));
            let stats = match self.store.list(&partition).await {
                Ok(records) => ProjectStats {
                    total: records.len(),
                    completed: records
                        .iter()
                        .filter(|record| record.fields.status == RecordStatus::Completed)
                        .count(),
                    total_cost: records.iter().map(|record| record.fields.cost).sum(),
                },
                Err(AppError::NotFound(_)) => ProjectStats::default(),
                Err(error) => {
                    tracing::warn!(error = %error, partition = %partition, "project stats unavailable");
                    ProjectStats::default()
                }
            };
            summaries.push(ProjectSummary { project, stats });
        }
        Ok(summaries)
    }
}
