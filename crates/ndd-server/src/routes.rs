//! HTTP surface: REDCap data-entry triggers, record redirects and health.
//!
//! Every route answers GET and POST. Workflows call the blocking REDCap and
//! LabKey clients, so they run on the blocking pool.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Local;
use ndd_model::RedcapConfig;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::error::{ApiError, Result as WorkflowResult};
use crate::workflows::{
    DataOutcome, ReferralOutcome, Services, Trigger, check_duplicates, copy_contact_info,
    copy_parents_info, data_collection_referral_id, data_pipeline, family_f_number,
    referral_data_collection_id, referral_pipeline, sample_pipeline,
};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub redcap: Arc<RedcapConfig>,
    /// LabKey family page; the F-number is appended.
    pub family_page_url: Arc<str>,
}

impl AppState {
    pub fn new(services: Arc<Services>, redcap: RedcapConfig, family_page_url: &str) -> Self {
        Self {
            services,
            redcap: Arc::new(redcap),
            family_page_url: Arc::from(family_page_url),
        }
    }

    fn referral_url(&self, record: Option<&str>) -> String {
        self.redcap.record_url(&self.redcap.referral_pid, record)
    }

    fn data_url(&self, record: Option<&str>) -> String {
        self.redcap.record_url(&self.redcap.data_pid, record)
    }
}

/// `record` query or form parameter of the redirect routes.
#[derive(Debug, Default, Deserialize)]
pub struct RecordParams {
    #[serde(default)]
    pub record: Option<String>,
}

impl RecordParams {
    fn record(&self) -> Option<&str> {
        self.record.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }

    fn required(&self) -> Result<String, ApiError> {
        self.record()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("missing record parameter".to_string()))
    }
}

pub fn router(state: AppState, origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/dupe_check", get(dupe_check).post(dupe_check))
        .route("/copyContactInfo", get(copy_contact).post(copy_contact))
        .route(
            "/copyParentsInfoFromDC",
            get(copy_parents).post(copy_parents),
        )
        .route(
            "/referral_pipeline",
            get(referral_trigger).post(referral_trigger),
        )
        .route("/data_pipeline", get(data_trigger).post(data_trigger))
        .route("/sample_pipeline", get(sample_trigger).post(sample_trigger))
        .route(
            "/gotoDataCollectRC",
            get(goto_data_collection).post(goto_data_collection),
        )
        .route("/gotoReferralRC", get(goto_referral).post(goto_referral))
        .route("/viewSubjInLabKey", get(view_in_labkey).post(view_in_labkey))
        .layer(cors_layer(origins))
        .with_state(state)
}

/// Any origin when `origins` is empty; invalid entries are skipped.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Run a workflow on the blocking pool inside the caller's span.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> WorkflowResult<T> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|err| ApiError::Internal(format!("workflow task failed: {err}")))?
        .map_err(ApiError::from)
}

fn redirect(url: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[tracing::instrument(skip_all, fields(record = params.record()))]
async fn dupe_check(
    State(state): State<AppState>,
    Form(params): Form<RecordParams>,
) -> Result<Response, ApiError> {
    let record = params.record().map(str::to_string);
    let services = Arc::clone(&state.services);
    let target = record.clone();
    blocking(move || check_duplicates(&services, target.as_deref())).await?;
    Ok(redirect(state.referral_url(record.as_deref())))
}

#[tracing::instrument(skip_all, fields(record = params.record()))]
async fn copy_contact(
    State(state): State<AppState>,
    Form(params): Form<RecordParams>,
) -> Result<Response, ApiError> {
    let record = params.required()?;
    let services = Arc::clone(&state.services);
    let target = record.clone();
    blocking(move || copy_contact_info(&services, &target)).await?;
    Ok(redirect(state.data_url(Some(&record))))
}

#[tracing::instrument(skip_all, fields(record = params.record()))]
async fn copy_parents(
    State(state): State<AppState>,
    Form(params): Form<RecordParams>,
) -> Result<Response, ApiError> {
    let record = params.required()?;
    let services = Arc::clone(&state.services);
    let target = record.clone();
    blocking(move || copy_parents_info(&services, &target)).await?;
    Ok(redirect(state.referral_url(Some(&record))))
}

#[tracing::instrument(skip_all, fields(record = %trigger.record, instrument = %trigger.instrument))]
async fn referral_trigger(
    State(state): State<AppState>,
    Form(trigger): Form<Trigger>,
) -> Result<Json<ReferralOutcome>, ApiError> {
    let services = Arc::clone(&state.services);
    let today = Local::now().date_naive();
    blocking(move || referral_pipeline(&services, &trigger, today))
        .await
        .map(Json)
}

#[tracing::instrument(skip_all, fields(record = %trigger.record, instrument = %trigger.instrument))]
async fn data_trigger(
    State(state): State<AppState>,
    Form(trigger): Form<Trigger>,
) -> Result<Json<DataOutcome>, ApiError> {
    let services = Arc::clone(&state.services);
    blocking(move || data_pipeline(&services, &trigger))
        .await
        .map(Json)
}

#[tracing::instrument(skip_all, fields(record = %trigger.record, instrument = %trigger.instrument))]
async fn sample_trigger(
    State(state): State<AppState>,
    Form(trigger): Form<Trigger>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let services = Arc::clone(&state.services);
    let rows = blocking(move || sample_pipeline(&services, &trigger)).await?;
    Ok(Json(json!({ "rows": rows })))
}

#[tracing::instrument(skip_all, fields(record = params.record()))]
async fn goto_data_collection(
    State(state): State<AppState>,
    Form(params): Form<RecordParams>,
) -> Result<Response, ApiError> {
    let record = params.required()?;
    let services = Arc::clone(&state.services);
    let id = blocking(move || referral_data_collection_id(&services, &record)).await?;
    Ok(redirect(state.data_url(Some(&id))))
}

#[tracing::instrument(skip_all, fields(record = params.record()))]
async fn goto_referral(
    State(state): State<AppState>,
    Form(params): Form<RecordParams>,
) -> Result<Response, ApiError> {
    let record = params.required()?;
    let services = Arc::clone(&state.services);
    let id = blocking(move || data_collection_referral_id(&services, &record)).await?;
    Ok(redirect(state.referral_url(Some(&id))))
}

#[tracing::instrument(skip_all, fields(record = params.record()))]
async fn view_in_labkey(
    State(state): State<AppState>,
    Form(params): Form<RecordParams>,
) -> Result<Response, ApiError> {
    let record = params.required()?;
    let services = Arc::clone(&state.services);
    let fnum = blocking(move || family_f_number(&services, &record)).await?;
    Ok(redirect(format!("{}{fnum}", state.family_page_url)))
}
