// RailCheck Exporter - HTTP handlers
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON endpoints over a persisted run.
//!
//! Every request re-opens the run file and streams it once per operation.
//! Parsing and reduction are blocking, so they run on the blocking pool.

use crate::metrics::{encode_metrics, update_anomaly_metrics, update_run_metrics};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use railcheck::analyzer::HeightAccumulator;
use railcheck::dataset::{open_run, Records};
use railcheck::{
    AnomalyGroups, HeightSummary, ProfilePoint, RailError, RunKpis, StreamAnalyzer,
};
use serde::{Deserialize, Serialize, Serializer};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

/// Application state shared across handlers.
pub struct AppState {
    pub csv_path: PathBuf,
    pub analyzer: StreamAnalyzer,
}

impl AppState {
    pub fn new(csv_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            analyzer: StreamAnalyzer::new(),
        }
    }
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rail(#[from] RailError),

    #[error("Analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Metrics encoding failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rail(RailError::EmptySeries { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rail(RailError::Io(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Rail(_) | ApiError::Task(_) | ApiError::Metrics(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Rail(RailError::Configuration(_)) => "configuration",
            ApiError::Rail(RailError::EmptySeries { .. }) => "empty_series",
            ApiError::Rail(RailError::MalformedRecord(_)) => "malformed_record",
            ApiError::Rail(RailError::Io(_)) => "io",
            ApiError::Task(_) | ApiError::Metrics(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Stream the run file through `op` on the blocking pool.
async fn with_run<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&StreamAnalyzer, Records<File>) -> railcheck::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let path = state.csv_path.clone();
    let analyzer = state.analyzer;
    let value = tokio::task::spawn_blocking(move || op(&analyzer, open_run(&path)?)).await??;
    Ok(value)
}

/// `/stats` payload.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_mesures: usize,
    pub distance_km: f64,
    pub anomalies: usize,
    pub conformite: f64,
}

impl From<RunKpis> for StatsResponse {
    fn from(kpis: RunKpis) -> Self {
        Self {
            total_mesures: kpis.total,
            distance_km: kpis.distance_km,
            anomalies: kpis.anomalies,
            conformite: kpis.conformity_pct,
        }
    }
}

/// `/hauteurs` payload.
#[derive(Debug, Serialize)]
pub struct HeightResponse {
    pub moyenne: f64,
    pub min: f64,
    pub max: f64,
    pub total_mesures: usize,
}

impl From<HeightSummary> for HeightResponse {
    fn from(summary: HeightSummary) -> Self {
        Self {
            moyenne: summary.mean,
            min: summary.min,
            max: summary.max,
            total_mesures: summary.sample_count,
        }
    }
}

/// `/hauteurs/apercu` payload.
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    #[serde(flatten)]
    pub summary: HeightResponse,
    pub profil: Vec<ProfilePoint>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub limite: Option<usize>,
}

/// Type → count, in first-seen order.
pub struct Histogram(pub AnomalyGroups);

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.histogram().serialize(serializer)
    }
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let kpis = with_run(&state, |analyzer, records| analyzer.compute_kpis(records)).await?;
    update_run_metrics(&kpis);
    Ok(Json(kpis.into()))
}

pub async fn anomalies_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Histogram>, ApiError> {
    let groups = with_run(&state, |analyzer, records| analyzer.group_anomalies(records)).await?;
    Ok(Json(Histogram(groups)))
}

pub async fn positions_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnomalyGroups>, ApiError> {
    let groups = with_run(&state, |analyzer, records| analyzer.group_anomalies(records)).await?;
    Ok(Json(groups))
}

pub async fn heights_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HeightResponse>, ApiError> {
    let summary =
        with_run(&state, |analyzer, records| analyzer.height_summary(records, None)).await?;
    Ok(Json(summary.into()))
}

pub async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let limit = params.limite.unwrap_or(state.analyzer.visualization_limit());
    let (summary, profil) = with_run(&state, move |_, records| {
        let mut heights = HeightAccumulator::new();
        let mut profile = Vec::new();
        for record in records.take(limit) {
            let record = record?;
            heights.observe(&record);
            profile.push(ProfilePoint {
                position_m: record.position_m,
                height_m: record.catenary_height_m,
            });
        }
        Ok((heights.finish()?, profile))
    })
    .await?;
    Ok(Json(PreviewResponse {
        summary: summary.into(),
        profil,
    }))
}

/// Refresh the run gauges, then encode the registry.
///
/// A failed refresh is logged and the previous values are served.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    match with_run(&state, |analyzer, records| analyzer.analyze(records)).await {
        Ok(report) => {
            update_run_metrics(&report.kpis);
            update_anomaly_metrics(&report.anomalies);
        }
        Err(e) => warn!("Metrics refresh failed: {}", e),
    }
    let body = encode_metrics()?;
    Ok((
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>RailCheck Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
    </style>
</head>
<body>
    <h1>RailCheck Exporter</h1>
    <p>Inspection KPIs of the recorded run.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/stats">/stats</a> - Run KPIs</div>
        <div class="endpoint"><a href="/anomalies">/anomalies</a> - Anomalies per defect type</div>
        <div class="endpoint"><a href="/anomalies/positions">/anomalies/positions</a> - Anomaly locations and severity</div>
        <div class="endpoint"><a href="/hauteurs">/hauteurs</a> - Catenary height statistics</div>
        <div class="endpoint"><a href="/hauteurs/apercu">/hauteurs/apercu</a> - Height preview and profile</div>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
    </div>
</body>
</html>"#,
    )
}
