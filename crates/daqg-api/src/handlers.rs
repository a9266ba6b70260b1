use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use daqg_buffer::{Buffer, BufferRecord};
use daqg_domain::{SourceId, SourceSpec};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let connectors = state.orchestrator.status_all().await;
    let by_status: HashMap<String, usize> =
        connectors.iter().fold(HashMap::new(), |mut acc, (_, snap)| {
            *acc.entry(format!("{:?}", snap.status).to_lowercase()).or_default() += 1;
            acc
        });
    Json(json!({
        "sourceCount": connectors.len(),
        "byStatus": by_status,
        "recentEvents": state.orchestrator.audit_log().recent(20),
    }))
}

// ── Sources ───────────────────────────────────────────────────────────────────

pub async fn list_sources(State(state): State<AppState>) -> Json<Value> {
    let connectors = state.orchestrator.status_all().await;
    let sources: Vec<Value> = connectors
        .into_iter()
        .map(|(id, snapshot)| json!({ "id": id.as_str(), "status": snapshot }))
        .collect();
    Json(json!({ "sources": sources }))
}

pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let source_id = SourceId::new(&id);
    let snapshot = state
        .orchestrator
        .status_of(&source_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("source '{id}' not found")))?;
    Ok(Json(json!({ "id": id, "status": snapshot })))
}

pub async fn get_source_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    get_source(State(state), Path(id)).await
}

pub async fn start_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let sources = daqg_config::load_source_document(&state.sources_path)?;
    let source_id = SourceId::new(&id);
    let spec = sources
        .into_iter()
        .find(|s| s.id == source_id)
        .ok_or_else(|| ApiError::not_found(format!("source '{id}' not found in config")))?;
    state.orchestrator.start_connector(spec).await;
    Ok(Json(json!({ "ack": true, "source": id })))
}

pub async fn stop_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.orchestrator.stop_connector(&SourceId::new(&id)).await;
    Ok(Json(json!({ "ack": true, "source": id })))
}

pub async fn restart_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.orchestrator.restart_connector(&SourceId::new(&id)).await?;
    Ok(Json(json!({ "ack": true, "source": id })))
}

pub async fn get_source_discovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let points = state
        .orchestrator
        .discovery_of(&SourceId::new(&id))
        .await
        .ok_or_else(|| ApiError::not_found(format!("no discovery catalog for '{id}'")))?;
    Ok(Json(json!({ "points": points })))
}

/// Promotes the cached discovery catalog into the source's live config and
/// restarts the connector (§6 "POST /sources/{id}/configure").
pub async fn configure_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let source_id = SourceId::new(&id);
    let points = state
        .orchestrator
        .discovery_of(&source_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("no discovery catalog for '{id}'")))?;

    let mut sources = daqg_config::load_source_document(&state.sources_path)?;
    let index = sources
        .iter()
        .position(|s| s.id == source_id)
        .ok_or_else(|| ApiError::not_found(format!("source '{id}' not found in config")))?;

    let promoted = daqg_engine::promote_discovery(&sources[index], &points)
        .ok_or_else(|| ApiError::bad_request("this driver has no promotable point list"))?;
    sources[index] = promoted.clone();

    daqg_config::write_source_document(&state.sources_path, &sources)?;
    state.orchestrator.stop_connector(&source_id).await;
    state.orchestrator.start_connector(promoted).await;

    Ok(Json(json!({ "ack": true, "source": id })))
}

// ── Config ────────────────────────────────────────────────────────────────────

pub async fn reload_sources_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sources = daqg_config::load_source_document(&state.sources_path)?;
    let report = state.orchestrator.reconcile(sources).await?;
    Ok(Json(json!(report)))
}

pub async fn configure_sources(
    State(state): State<AppState>,
    Json(sources): Json<Vec<SourceSpec>>,
) -> Result<Json<Value>, ApiError> {
    for spec in &sources {
        spec.validate().map_err(|e| ApiError::bad_request(e.to_string()))?;
    }
    daqg_config::write_source_document(&state.sources_path, &sources)?;
    let report = state.orchestrator.reconcile(sources).await?;
    Ok(Json(json!(report)))
}

pub async fn reload_storage_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let storage = daqg_config::load_storage_document(&state.storage_path)?;
    state.orchestrator.reload_sinks(storage.sinks).await?;
    Ok(Json(json!({ "ack": true })))
}

pub async fn configure_storage(
    State(state): State<AppState>,
    Json(doc): Json<daqg_config::RawStorageDocument>,
) -> Result<Json<Value>, ApiError> {
    daqg_config::write_storage_document(&state.storage_path, &doc)?;
    let storage = daqg_config::load_storage_document(&state.storage_path)?;
    state.orchestrator.reload_sinks(storage.sinks).await?;
    Ok(Json(json!({ "ack": true })))
}

// ── Data queries ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn default_limit(q: &LimitQuery) -> usize {
    q.limit.unwrap_or(100)
}

pub async fn data_latest(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let records = state.buffer.get_latest(default_limit(&q)).await?;
    Ok(Json(json!(records)))
}

pub async fn data_by_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let records = state.buffer.get_by_source(&id, default_limit(&q)).await?;
    Ok(Json(json!(records)))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub async fn data_range(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Value>, ApiError> {
    let records = state.buffer.get_by_time_range(q.start, q.end).await?;
    Ok(Json(json!(records)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn data_search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let records = state.buffer.search(&q.q).await?;
    Ok(Json(json!(records)))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub limit: Option<usize>,
}

pub async fn data_export(
    State(state): State<AppState>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let records = state.buffer.get_latest(q.limit.unwrap_or(1_000)).await?;
    match q.format.as_deref() {
        Some("csv") => {
            let csv = records_to_csv(&records);
            Ok((
                [(header::CONTENT_TYPE, "text/csv")],
                Body::from(csv),
            )
                .into_response())
        }
        _ => Ok(Json(json!(records)).into_response()),
    }
}

/// Minimal CSV writer over one flat measurement per row; no CSV crate is in
/// the dependency stack and this shape is too narrow to justify adding one.
fn records_to_csv(records: &[BufferRecord]) -> String {
    let mut out = String::from("source_id,source_type,timestamp,quality,measurement_id,value\n");
    for rec in records {
        let r = &rec.entry.record;
        if r.measurements.is_empty() {
            out.push_str(&csv_row(r, "", &Value::Null));
        }
        for m in &r.measurements {
            out.push_str(&csv_row(r, &m.id, &m.value));
        }
    }
    out
}

fn csv_row(record: &daqg_domain::CanonicalRecord, measurement_id: &str, value: &Value) -> String {
    format!(
        "{},{},{},{},{},{}\n",
        csv_escape(&record.metadata.source_id),
        csv_escape(&record.metadata.source_type),
        record.metadata.timestamp.to_rfc3339(),
        csv_escape(&record.metadata.quality),
        csv_escape(measurement_id),
        csv_escape(&value.to_string()),
    )
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
