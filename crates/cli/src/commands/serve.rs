//! Serve command handler: the HTTP API.
//!
//! Routes:
//! - `GET  /health`
//! - `GET  /api/search/?q=&limit=&source=`
//! - `POST /api/ask/` with `{q, limit?, source?}`
//! - `POST /api/ask/stream/` same body, answered as `application/x-ndjson`
//! - `GET  /api/history/?limit=`
//!
//! The caller is identified by the `X-User` header.

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Args;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tadabbur_core::{config::AppConfig, AppError};
use tadabbur_knowledge::{
    build_orchestrator, AskRequest, Orchestrator, SearchRequest, SourceFilter, StreamEvent,
    DEFAULT_SOURCE_LIMIT,
};

const USER_HEADER: &str = "x-user";
const ANONYMOUS: &str = "anonymous";
const DEFAULT_HISTORY_LIMIT: usize = 20;
const INTERNAL_ERROR_MESSAGE: &str = "Erreur interne du serveur.";

/// Start the HTTP API
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to listen on (overrides server.bind)
    #[arg(short, long)]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing serve command");

        let orchestrator = build_orchestrator(config).context("Failed to build pipeline")?;

        let stats = orchestrator
            .retrieval()
            .store()
            .warm_up()
            .await
            .context("Failed to load corpora")?;
        tracing::info!(quran = stats.quran, hadith = stats.hadith, "Corpora loaded");

        let bind = self.bind.clone().unwrap_or_else(|| config.server.bind.clone());
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("Failed to bind {}", bind))?;

        tracing::info!("Listening on http://{}", bind);

        axum::serve(listener, router(orchestrator))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down");
            })
            .await
            .context("Server error")?;

        Ok(())
    }
}

fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search/", get(search))
        .route("/api/ask/", post(ask))
        .route("/api/ask/stream/", post(ask_stream))
        .route("/api/history/", get(history))
        .with_state(orchestrator)
}

/// Maps pipeline errors onto status codes.
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_client_error() {
            tracing::debug!("Request rejected: {}", self.0);
        } else {
            tracing::error!("Request failed: {}", self.0);
        }

        match self.0 {
            AppError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            AppError::QuotaExceeded { reset_time } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": tadabbur_knowledge::quota::QUOTA_EXCEEDED_MESSAGE,
                    "error_code": "quota_exceeded",
                    "reset_time": reset_time,
                })),
            )
                .into_response(),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": INTERNAL_ERROR_MESSAGE, "error_code": other.code() })),
            )
                .into_response(),
        }
    }
}

fn user_from(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

fn parse_source(source: Option<&str>) -> Result<SourceFilter, ApiError> {
    source
        .map(SourceFilter::parse)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(ApiError)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AskBody {
    q: Option<String>,
    limit: Option<usize>,
    source: Option<String>,
}

impl AskBody {
    fn into_request(self) -> Result<AskRequest, ApiError> {
        let source = parse_source(self.source.as_deref())?;
        Ok(AskRequest::new(self.q.unwrap_or_default())
            .with_limit(self.limit.unwrap_or(DEFAULT_SOURCE_LIMIT))
            .with_source(source))
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn search(
    State(orchestrator): State<Orchestrator>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let request = SearchRequest {
        query: params.q.unwrap_or_default(),
        limit: params.limit.unwrap_or(DEFAULT_SOURCE_LIMIT),
        source: parse_source(params.source.as_deref())?,
    };

    let results = orchestrator.search(&request).await?;
    Ok(Json(results).into_response())
}

async fn ask(
    State(orchestrator): State<Orchestrator>,
    headers: HeaderMap,
    Json(body): Json<AskBody>,
) -> Result<Response, ApiError> {
    let request = body.into_request()?;
    let response = orchestrator.ask(&user_from(&headers), &request).await?;
    Ok(Json(response).into_response())
}

async fn ask_stream(
    State(orchestrator): State<Orchestrator>,
    headers: HeaderMap,
    Json(body): Json<AskBody>,
) -> Result<Response, ApiError> {
    let request = body.into_request()?;
    let events = orchestrator.ask_stream(&user_from(&headers), request)?;

    let lines = events.map(|event| {
        let line = event.to_ndjson_line().unwrap_or_else(|e| {
            tracing::error!("Failed to encode stream event: {}", e);
            fallback_error_line()
        });
        Ok::<_, Infallible>(line)
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

fn fallback_error_line() -> String {
    format!(
        "{}\n",
        json!({ "type": "error", "data": INTERNAL_ERROR_MESSAGE, "error_code": "internal_error" })
    )
}

async fn history(
    State(orchestrator): State<Orchestrator>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let entries = orchestrator
        .history()
        .recent(&user_from(&headers), params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;
    Ok(Json(entries).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (AppError::Validation("q".into()), StatusCode::BAD_REQUEST),
            (
                AppError::QuotaExceeded {
                    reset_time: "2026-10-17T00:00:00+00:00".into(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::Retrieval("faiss".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_user_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_from(&headers), "anonymous");

        headers.insert("X-User", HeaderValue::from_static("alice"));
        assert_eq!(user_from(&headers), "alice");
    }

    #[test]
    fn test_ask_body_defaults() {
        let body: AskBody = serde_json::from_str(r#"{"q": "patience"}"#).unwrap();
        let request = body.into_request().ok().unwrap();

        assert_eq!(request.question, "patience");
        assert_eq!(request.limit, DEFAULT_SOURCE_LIMIT);
        assert_eq!(request.source, SourceFilter::Both);
    }

    #[test]
    fn test_unknown_source_is_bad_request() {
        let body: AskBody = serde_json::from_str(r#"{"q": "x", "source": "tafsir"}"#).unwrap();
        let err = body.into_request().err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_fallback_line_is_ndjson() {
        let line = fallback_error_line();
        assert!(line.ends_with('\n'));
        let event: StreamEvent = serde_json::from_str(line.trim_end()).unwrap();
        assert!(event.is_terminal());
    }
}
