use crate::errors::AppError;
use crate::models::{
    ConfigMap, CreateProjectPayload, ImageUpload, IngestRequest, RecordStatus, RecordUpdate,
    RefinePayload, UpdateProjectPayload,
};
use crate::service::WorklogService;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// `{status, message, data}` envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: None,
            data: Some(data),
        })
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: Some(message.into()),
            data: Some(data),
        })
    }
}

fn ack(message: &str) -> Json<ApiResponse<Value>> {
    Json(ApiResponse {
        status: "success",
        message: Some(message.to_string()),
        data: None,
    })
}

fn error_body(status: StatusCode, message: String) -> Response {
    let body: ApiResponse<Value> = ApiResponse {
        status: "error",
        message: Some(message),
        data: None,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        error_body(status, self.to_string())
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// JSON body extractor whose rejections come back inside the error envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct ApiJson<T>(T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorklogService>,
}

pub fn router(service: Arc<WorklogService>) -> Router {
    let api = Router::new()
        .route(
            "/records",
            post(create_record)
                .get(list_records)
                .patch(update_record)
                .delete(delete_record),
        )
        .route("/records/status", patch(update_status))
        .route("/config", get(get_config).post(save_config))
        .route("/login", post(login))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id", patch(update_project).delete(delete_project))
        .route("/ai/refine", post(refine))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .nest("/api", api)
        .with_state(AppState { service })
}

fn text_field(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_status(raw: &str) -> Result<RecordStatus, AppError> {
    RecordStatus::parse(raw).ok_or_else(|| AppError::Validation(format!("Unknown status '{}'", raw)))
}

async fn read_ingest_form(mut multipart: Multipart) -> Result<IngestRequest, AppError> {
    let invalid = |error: axum::extract::multipart::MultipartError| AppError::Validation(error.body_text());
    let mut request = IngestRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let mime_type = field.content_type().unwrap_or("image/jpeg").to_string();
                let bytes = field.bytes().await.map_err(invalid)?;
                if !bytes.is_empty() {
                    request.image = Some(ImageUpload {
                        bytes: bytes.to_vec(),
                        mime_type,
                    });
                }
            }
            "note" => {
                let note = field.text().await.map_err(invalid)?;
                request.note = (!note.trim().is_empty()).then_some(note);
            }
            "assignee" => request.overrides.assignee = text_field(field.text().await.map_err(invalid)?),
            "taskName" => request.overrides.task_name = text_field(field.text().await.map_err(invalid)?),
            "scope" | "projectSlug" => request.scope = text_field(field.text().await.map_err(invalid)?),
            "status" => {
                if let Some(raw) = text_field(field.text().await.map_err(invalid)?) {
                    request.overrides.status = Some(parse_status(&raw)?);
                }
            }
            other => tracing::debug!(field = %other, "ignoring unknown form field"),
        }
    }
    Ok(request)
}

async fn create_record(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Value> {
    let request = read_ingest_form(multipart?).await?;
    let outcome = state.service.ingest(request).await?;
    Ok(ApiResponse::with_message("Record saved", serde_json::to_value(outcome)?))
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    month: Option<String>,
    year: Option<String>,
    #[serde(alias = "projectSlug")]
    scope: Option<String>,
}

async fn list_records(
    State(state): State<AppState>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    let scope = query.scope.and_then(text_field);
    let (_, records) = state
        .service
        .list_records(query.month.as_deref(), query.year.as_deref(), scope.as_deref())
        .await?;
    Ok(ApiResponse::data(serde_json::to_value(records)?))
}

/// Clients send the row id either as a number or as its decimal text.
fn record_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u32),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid record id '{}'", text))),
    }
}

#[derive(Debug, Deserialize)]
struct RecordRef {
    #[serde(deserialize_with = "record_id")]
    id: u32,
    #[serde(alias = "sheetName")]
    partition: String,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(flatten)]
    record: RecordRef,
    status: String,
}

async fn update_status(State(state): State<AppState>, ApiJson(payload): ApiJson<StatusPayload>) -> ApiResult<Value> {
    let status = parse_status(&payload.status)?;
    let last_updated = state
        .service
        .update_status(&payload.record.partition, payload.record.id, status)
        .await?;
    Ok(ApiResponse::with_message("Status updated", serde_json::json!({ "lastUpdated": last_updated })))
}

#[derive(Debug, Deserialize)]
struct UpdatePayload {
    #[serde(flatten)]
    record: RecordRef,
    #[serde(flatten)]
    update: RecordUpdate,
}

async fn update_record(State(state): State<AppState>, ApiJson(payload): ApiJson<UpdatePayload>) -> ApiResult<Value> {
    let last_updated = state
        .service
        .update_record(&payload.record.partition, payload.record.id, &payload.update)
        .await?;
    Ok(ApiResponse::with_message("Record updated", serde_json::json!({ "lastUpdated": last_updated })))
}

async fn delete_record(State(state): State<AppState>, ApiJson(payload): ApiJson<RecordRef>) -> ApiResult<Value> {
    let outcome = state.service.delete_record(&payload.partition, payload.id).await?;
    Ok(ApiResponse::with_message("Record deleted", serde_json::to_value(outcome)?))
}

async fn get_config(State(state): State<AppState>) -> ApiResult<ConfigMap> {
    Ok(ApiResponse::data(state.service.config_masked().await))
}

async fn save_config(State(state): State<AppState>, ApiJson(update): ApiJson<ConfigMap>) -> ApiResult<Value> {
    state.service.save_config(update).await?;
    Ok(ack("Configuration saved"))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    password: String,
}

async fn login(State(state): State<AppState>, ApiJson(payload): ApiJson<LoginPayload>) -> Result<Response, AppError> {
    if state.service.login(&payload.password).await? {
        let users = state.service.users().await;
        return Ok(ApiResponse::with_message("Authenticated", serde_json::json!({ "users": users })).into_response());
    }
    tracing::info!("rejected login attempt");
    Ok(error_body(StatusCode::UNAUTHORIZED, "Invalid password".to_string()))
}

#[derive(Debug, Deserialize)]
struct ProjectQuery {
    slug: Option<String>,
}

async fn list_projects(
    State(state): State<AppState>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    if let Some(slug) = query.slug.as_deref().filter(|slug| !slug.is_empty()) {
        let project = state.service.project_by_slug(slug).await?;
        return Ok(ApiResponse::data(serde_json::to_value(project)?));
    }
    let projects = state.service.list_projects().await?;
    Ok(ApiResponse::data(serde_json::to_value(projects)?))
}

async fn create_project(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateProjectPayload>,
) -> ApiResult<Value> {
    let project = state.service.create_project(payload).await?;
    Ok(ApiResponse::with_message("Project created", serde_json::to_value(project)?))
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateProjectPayload>,
) -> ApiResult<Value> {
    let project = state.service.update_project(&id, payload).await?;
    Ok(ApiResponse::data(serde_json::to_value(project)?))
}

async fn delete_project(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    state.service.delete_project(&id).await?;
    Ok(ack("Project deleted"))
}

async fn refine(State(state): State<AppState>, ApiJson(payload): ApiJson<RefinePayload>) -> ApiResult<String> {
    let mode = payload.mode;
    let refined = state.service.refine(payload).await?;
    tracing::info!(mode = ?mode, output_len = refined.len(), "refine request served");
    Ok(ApiResponse::data(refined))
}
