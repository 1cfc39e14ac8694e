//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/healthz` | Embedding model and dimension |
//! | `POST`   | `/api/search` | Snippets, candidate topics, and ranked experts |
//! | `POST`   | `/api/ingest` | Ingest a document from text or a URL |
//! | `POST`   | `/api/agent/match` | Experts for a problem statement |
//! | `POST`   | `/api/interview` | Record expertise from interview answers |
//! | `GET`    | `/api/expertise?personId=` | A person's scores |
//! | `GET`    | `/api/graph?topic=` | Expert graph for a topic |
//! | `GET`    | `/api/privacy/export?personId=` | Everything held about a person |
//! | `DELETE` | `/api/privacy/delete?personId=` | Erase a person's data |
//! | `POST`   | `/api/people` | Register a person's display name |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "topK must be between 1 and 20" } }
//! ```
//!
//! Only input errors (400) carry a specific message. Everything else is an
//! opaque per-route code such as `search_failed` (500) with a generic
//! message; the cause is logged by category only.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use expertise_graph_core::graph::TopicGraph;
use expertise_graph_core::models::{ExpertiseScore, Person};
use expertise_graph_core::search::{MatchFilter, MatchOutcome, SearchResponse};
use expertise_graph_core::store::{ErasureReport, PersonExport};
use expertise_graph_core::Error;

use crate::app::App;
use crate::expertise::{self, InterviewRequest, InterviewResult};
use crate::ingest::{self, IngestRequest, IngestResult};
use crate::privacy;

type AppState = Arc<App>;

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let router = router(Arc::new(app));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

/// Build the router with CORS and request tracing.
pub fn router(app: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(handle_health))
        .route("/api/search", post(handle_search))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/agent/match", post(handle_match))
        .route("/api/interview", post(handle_interview))
        .route("/api/expertise", get(handle_expertise))
        .route("/api/graph", get(handle_graph))
        .route("/api/privacy/export", get(handle_privacy_export))
        .route("/api/privacy/delete", delete(handle_privacy_delete))
        .route("/api/people", post(handle_people))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_input",
        message: message.into(),
    }
}

/// Map a core error to a response; `code` names the failed route.
fn failure(code: &'static str) -> impl Fn(Error) -> AppError {
    move |err| match err {
        Error::Input(message) => bad_request(message),
        Error::NotFound(_) => AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: "not found".to_string(),
        },
        other => {
            tracing::warn!(code, category = other.category(), "request failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code,
                message: "internal error".to_string(),
            }
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

// ============ GET /healthz ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    embed_model: String,
    dim: usize,
}

async fn handle_health(State(app): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        embed_model: app.embedder().model_name().to_string(),
        dim: app.embedder().dims(),
    })
}

// ============ POST /api/search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query_text: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_search(
    State(app): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let req = body(payload)?;
    let top_k = req.top_k.unwrap_or(app.config.retrieval.default_top_k);
    let response = app
        .engine
        .search_with_experts(&req.query_text, top_k)
        .await
        .map_err(failure("search_failed"))?;
    Ok(Json(response))
}

// ============ POST /api/ingest ============

async fn handle_ingest(
    State(app): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResult>, AppError> {
    let req = body(payload)?;
    let out = ingest::ingest_document(&app, req)
        .await
        .map_err(failure("ingest_failed"))?;
    Ok(Json(out))
}

// ============ POST /api/agent/match ============

#[derive(Deserialize)]
struct MatchRequest {
    problem: String,
    #[serde(flatten)]
    filter: MatchFilter,
}

async fn handle_match(
    State(app): State<AppState>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Result<Json<MatchOutcome>, AppError> {
    let req = body(payload)?;
    let out = app
        .engine
        .match_experts(&req.problem, &req.filter)
        .await
        .map_err(failure("match_failed"))?;
    Ok(Json(out))
}

// ============ POST /api/interview ============

async fn handle_interview(
    State(app): State<AppState>,
    payload: Result<Json<InterviewRequest>, JsonRejection>,
) -> Result<Json<InterviewResult>, AppError> {
    let req = body(payload)?;
    let out = expertise::ingest_interview(&app, req)
        .await
        .map_err(failure("interview_failed"))?;
    Ok(Json(out))
}

// ============ GET /api/expertise ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonQuery {
    person_id: String,
}

async fn handle_expertise(
    State(app): State<AppState>,
    params: Result<Query<PersonQuery>, QueryRejection>,
) -> Result<Json<Vec<ExpertiseScore>>, AppError> {
    let q = query(params)?;
    let scores = expertise::list_expertise(&app, &q.person_id)
        .await
        .map_err(failure("expertise_failed"))?;
    Ok(Json(scores))
}

// ============ GET /api/graph ============

#[derive(Deserialize)]
struct GraphQuery {
    topic: String,
}

async fn handle_graph(
    State(app): State<AppState>,
    params: Result<Query<GraphQuery>, QueryRejection>,
) -> Result<Json<TopicGraph>, AppError> {
    let q = query(params)?;
    let graph = expertise::topic_graph(&app, &q.topic)
        .await
        .map_err(failure("graph_failed"))?;
    Ok(Json(graph))
}

// ============ Privacy ============

async fn handle_privacy_export(
    State(app): State<AppState>,
    params: Result<Query<PersonQuery>, QueryRejection>,
) -> Result<Json<PersonExport>, AppError> {
    let q = query(params)?;
    let export = privacy::export_person(&app, &q.person_id)
        .await
        .map_err(failure("privacy_failed"))?;
    Ok(Json(export))
}

#[derive(Serialize)]
struct DeleteResponse {
    ok: bool,
    #[serde(flatten)]
    report: ErasureReport,
}

async fn handle_privacy_delete(
    State(app): State<AppState>,
    params: Result<Query<PersonQuery>, QueryRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let q = query(params)?;
    let report = privacy::erase_person(&app, &q.person_id)
        .await
        .map_err(failure("privacy_failed"))?;
    Ok(Json(DeleteResponse { ok: true, report }))
}

// ============ POST /api/people ============

async fn handle_people(
    State(app): State<AppState>,
    payload: Result<Json<Person>, JsonRejection>,
) -> Result<Json<Person>, AppError> {
    let person = body(payload)?;
    let person = expertise::add_person(&app, person)
        .await
        .map_err(failure("people_failed"))?;
    Ok(Json(person))
}
