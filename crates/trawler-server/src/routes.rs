use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use trawler_client::{GenericExtractor, HttpFetchClient, RobotsGate};
use trawler_core::dedup::DeduperConfig;
use trawler_core::error::CrawlError;
use trawler_core::extract::ExtractorRegistry;
use trawler_core::models::{CrawlStats, RunStatus};
use trawler_core::pipeline::{CrawlPipeline, PipelineConfig};
use trawler_core::scheduler::Scheduler;
use trawler_core::store::{PageStore, RunStore};

use crate::auth::require_api_key;
use crate::dto::{
    EnqueueRequest, EnqueueResponse, ErrorResponse, HealthResponse, ListRunsQuery,
    RunListResponse, RunResponse, ScheduleRequest, ScheduleResponse, StatsResponse,
    TriggerCrawlRequest, TriggerCrawlResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/crawl", post(trigger_crawl))
        .route("/v1/schedule", post(schedule))
        .route("/v1/sources/{id}/runs", post(enqueue_run))
        .route("/v1/runs", get(list_runs))
        .route("/v1/runs/{id}", get(get_run))
        .route("/v1/stats", get(stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Trigger crawl
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/crawl",
    request_body = TriggerCrawlRequest,
    responses(
        (status = 200, description = "Crawl result", body = TriggerCrawlResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Fetch or extraction failure", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "crawl"
)]
pub async fn trigger_crawl(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<TriggerCrawlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.url.trim().is_empty() {
        return Err(CrawlError::Normalization("url is required".into()).into());
    }

    let keywords = body.keywords.unwrap_or_default();

    // Build pipeline components per request; the rate limiter is the shared
    // piece, so politeness holds across concurrent triggers.
    let fetcher = HttpFetchClient::new(state.limiter.clone())?
        .with_robots_gate(RobotsGate::new("Trawler")?);
    let registry = ExtractorRegistry::new(Arc::new(GenericExtractor::new()));
    let pipeline = CrawlPipeline::new(
        fetcher,
        Arc::new(registry),
        state.db.page_repo(),
        DeduperConfig::default(),
        PipelineConfig::default(),
    );

    let result = pipeline.crawl_ad_hoc(body.url.trim(), &keywords).await?;

    Ok(axum::Json(TriggerCrawlResponse::from(result)))
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/schedule",
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Sources scheduled", body = ScheduleResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "runs"
)]
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<ScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = Scheduler::new(state.db.run_repo());
    let scheduled = scheduler
        .schedule_all_sources(body.sources.as_deref(), body.force)
        .await?;

    let response = ScheduleResponse {
        count: scheduled.len(),
        scheduled,
    };
    Ok(axum::Json(response))
}

#[utoipa::path(
    post,
    path = "/v1/sources/{id}/runs",
    request_body = EnqueueRequest,
    params(("id" = Uuid, Path, description = "Job source ID")),
    responses(
        (status = 202, description = "Run enqueued", body = EnqueueResponse),
        (status = 404, description = "Source not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "runs"
)]
pub async fn enqueue_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<EnqueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = Scheduler::new(state.db.run_repo());
    let run_id = scheduler
        .enqueue_scrape(id, body.idempotency_key.as_deref())
        .await?;

    let status = scheduler
        .get_run(run_id)
        .await?
        .map(|run| run.status.to_string())
        .unwrap_or_else(|| RunStatus::Pending.to_string());

    Ok((
        StatusCode::ACCEPTED,
        axum::Json(EnqueueResponse { run_id, status }),
    ))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/runs",
    params(ListRunsQuery),
    responses(
        (status = 200, description = "List of runs", body = RunListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter: Option<RunStatus> = query
        .status
        .map(|s| s.parse().map_err(CrawlError::Generic))
        .transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let runs = state.db.run_repo().list_runs(status_filter, limit).await?;
    let total = runs.len();

    let response = RunListResponse {
        runs: runs.into_iter().map(RunResponse::from).collect(),
        total,
    };
    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/runs/{id}",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run detail", body = RunResponse),
        (status = 404, description = "Run not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.run_repo().get_run(id).await? {
        Some(run) => Ok(axum::Json(RunResponse::from(run)).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            axum::Json(ErrorResponse {
                error: "not_found".to_string(),
                message: format!("no run with id {id}"),
            }),
        )
            .into_response()),
    }
}

// ---------------------------------------------------------------------------
// Stats & health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/stats",
    responses(
        (status = 200, description = "Crawl statistics", body = StatsResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "system"
)]
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let run_repo = state.db.run_repo();
    let stats = CrawlStats {
        source_count: run_repo.count_sources().await?,
        page_count: state.db.page_repo().count_pages().await?,
        crawled_count: run_repo.count_runs(RunStatus::Completed).await?,
    };

    Ok(axum::Json(StatsResponse::from(stats)))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.db.health_check().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "unreachable".to_string()
        }
    };

    let status = if database == "ok" { "ok" } else { "degraded" };
    axum::Json(HealthResponse {
        status: status.to_string(),
        database,
    })
}
