use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        DefaultBodyLimit, MatchedPath, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{OracleError, OracleResult};
use crate::imaging::{self, ImageFetcher};
use crate::metrics::{self, MetricsCounters};
use crate::model::{self, Classifier};
use crate::scorer::{DeterministicScorer, ScoreInput, ScoreResult, Verdict};

const ENDPOINTS: [&str; 8] = [
    "/predict",
    "/predict_base64",
    "/predict_hash",
    "/predict_simple",
    "/health",
    "/stats",
    "/model_info",
    "/metrics",
];

/// Oracle HTTP server - the JSON surface Chainlink jobs poll
pub struct WebServer {
    state: AppState,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scorer: Arc<DeterministicScorer>,
    pub classifier: Arc<dyn Classifier>,
    pub fetcher: ImageFetcher,
    pub metrics: Arc<MetricsCounters>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let classifier: Arc<dyn Classifier> = Arc::from(model::load_classifier(&config.model));
        let fetcher = ImageFetcher::new(&config.fetch)?;
        Ok(Self {
            config,
            scorer: Arc::new(DeterministicScorer::new()),
            classifier,
            fetcher,
            metrics: Arc::new(MetricsCounters::new()),
        })
    }
}

#[derive(Deserialize)]
struct PredictRequest {
    image_base64: Option<String>,
    image_hash: Option<String>,
    image_url: Option<String>,
    request_id: Option<String>,
}

#[derive(Deserialize)]
struct Base64Request {
    image_data: Option<String>,
    request_id: Option<String>,
}

#[derive(Deserialize)]
struct HashParams {
    hash: Option<String>,
}

#[derive(Deserialize)]
struct ImageUrlParams {
    image_url: Option<String>,
}

/// Full prediction record returned by `/predict` and `/predict_hash`
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub damage_score: u8,
    pub prediction: Verdict,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotten_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
    pub timestamp: i64,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    pub request_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Minimal shape for oracle consumers
#[derive(Debug, Serialize)]
pub struct CompactResponse {
    pub damage_score: u8,
    pub prediction: Verdict,
    pub confidence: f64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompactResponse {
    fn from_score(result: &ScoreResult) -> Self {
        Self {
            damage_score: result.damage_score,
            prediction: result.verdict,
            confidence: round2(result.confidence_percent),
            timestamp: now_secs(),
            model: None,
        }
    }
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listen = &self.state.config.listen;
        let addr = format!("{}:{}", listen.address, listen.port);
        let app = build_router(self.state.clone());

        info!("🌐 Oracle API listening on http://{}", addr);
        for endpoint in ENDPOINTS {
            debug!("  endpoint {}", endpoint);
        }

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors_enabled = state.config.cors.enabled;
    let body_limit = body_limit(state.config.fetch.max_bytes);

    let app = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/model_info", get(model_info))
        .route("/metrics", get(metrics_text))
        .route("/predict", get(predict_url).post(predict))
        .route("/predict_base64", axum::routing::post(predict_base64))
        .route("/predict_hash", get(predict_hash_query).post(predict_hash_body))
        .route("/predict_simple", get(predict_simple))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    if cors_enabled {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Request body cap: a base64 image of `max_bytes` plus room for the JSON envelope
fn body_limit(max_bytes: usize) -> usize {
    max_bytes.saturating_add(2) / 3 * 4 + 64 * 1024
}

/// Per-route request and error accounting
async fn track_requests(
    State(state): State<AppState>,
    matched: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched
        .as_ref()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(req).await;
    state.metrics.inc_request(&route);
    state.metrics.record_status(response.status().as_u16());
    response
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model_loaded": true,
        "fallback_model": state.classifier.is_fallback(),
        "model_info": state.classifier.info(),
        "chainlink_compatible": true,
        "timestamp": now_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "model_file": state.config.model.path,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (w, h) = state.classifier.input_size();
    Json(serde_json::json!({
        "total_predictions": state.scorer.request_count(),
        "model_info": {
            "classes": model::CLASSES,
            "input_size": [w, h],
            "model_details": state.classifier.info(),
            "version": state.config.model.version,
        },
        "uptime_secs": state.metrics.uptime_secs(),
        "endpoints": ENDPOINTS,
    }))
}

async fn model_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (w, h) = state.classifier.input_size();
    Json(serde_json::json!({
        "model_file": state.config.model.path,
        "model_exists": Path::new(&state.config.model.path).exists(),
        "model_info": state.classifier.info(),
        "classes": model::CLASSES,
        "input_size": [w, h],
        "inference_backend_available": model::INFERENCE_BACKEND_AVAILABLE,
        "total_predictions": state.scorer.request_count(),
    }))
}

async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    let body = metrics::render_metrics(&state.metrics, state.scorer.request_count());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Main prediction endpoint: base64 image, hash, or image URL
async fn predict(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> OracleResult<Json<PredictionResponse>> {
    let req: PredictRequest = parse_json(&body_bytes(body)?)?;
    let request_id = req
        .request_id
        .unwrap_or_else(|| format!("req_{}", now_secs()));

    if let Some(b64) = req.image_base64 {
        let bytes = imaging::decode_base64_image(&b64)?;
        return classify(&state, bytes, Some(request_id)).await.map(Json);
    }
    if let Some(hash) = req.image_hash {
        return score_hash(&state, &hash).map(Json);
    }
    if let Some(url) = req.image_url {
        let bytes = state.fetcher.fetch(&url).await?;
        return classify(&state, bytes, Some(request_id)).await.map(Json);
    }

    Err(OracleError::invalid(
        "No valid image data provided. Use image_base64, image_hash or image_url",
    ))
}

/// Chainlink-style `GET /predict?image_url=...`
async fn predict_url(
    State(state): State<AppState>,
    params: Result<Query<ImageUrlParams>, QueryRejection>,
) -> OracleResult<Json<CompactResponse>> {
    let url = query_params(params)?
        .image_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| OracleError::invalid("image_url parameter required"))?;

    info!("Prediction request for: {}", url);
    let bytes = state.fetcher.fetch(&url).await?;
    let (result, _) = run_classifier(&state, bytes).await?;
    Ok(Json(CompactResponse::from_score(&result)))
}

async fn predict_base64(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> OracleResult<Json<CompactResponse>> {
    let req: Base64Request = parse_json(&body_bytes(body)?)?;
    let data = req
        .image_data
        .ok_or_else(|| OracleError::invalid("image_data field required"))?;
    if let Some(id) = &req.request_id {
        info!("🔍 Processing request {}", id);
    }

    let bytes = imaging::decode_base64_image(&data)?;
    let (result, _) = run_classifier(&state, bytes).await?;

    let mut compact = CompactResponse::from_score(&result);
    compact.model = Some(state.config.model.version.clone());
    Ok(Json(compact))
}

async fn predict_hash_query(
    State(state): State<AppState>,
    params: Result<Query<HashParams>, QueryRejection>,
) -> OracleResult<Json<PredictionResponse>> {
    let hash = required_hash(query_params(params)?.hash)?;
    score_hash(&state, &hash).map(Json)
}

async fn predict_hash_body(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> OracleResult<Json<PredictionResponse>> {
    let body = body_bytes(body)?;
    let hash = if body.is_empty() {
        None
    } else {
        parse_json::<HashParams>(&body)?.hash
    };
    let hash = required_hash(hash)?;
    score_hash(&state, &hash).map(Json)
}

async fn predict_simple(State(state): State<AppState>) -> Json<serde_json::Value> {
    let damage_score = state.scorer.score_simple(now_secs().max(0) as u64);
    Json(serde_json::json!({
        "damage_score": damage_score,
        "model": format!("{}_simple", state.config.model.version),
    }))
}

fn score_hash(state: &AppState, hash: &str) -> OracleResult<PredictionResponse> {
    let input = ScoreInput::HashSeed(hash.to_string());
    let result = state.scorer.score(&input).map_err(|e| {
        warn!("Hash-based prediction failed: {}", e);
        e
    })?;
    state.metrics.inc_verdict(result.verdict);

    Ok(PredictionResponse {
        damage_score: result.damage_score,
        prediction: result.verdict,
        confidence: round2(result.confidence_percent),
        fresh_probability: None,
        rotten_probability: None,
        processing_time_ms: None,
        timestamp: now_secs(),
        model_version: format!("{}_hash", state.config.model.version),
        model_file: None,
        request_id: None,
        image_hash: Some(hash.to_string()),
        request_count: state.scorer.request_count(),
        note: Some("Hash-based deterministic prediction".to_string()),
    })
}

async fn classify(
    state: &AppState,
    bytes: Vec<u8>,
    request_id: Option<String>,
) -> OracleResult<PredictionResponse> {
    let started = Instant::now();
    if let Some(id) = &request_id {
        info!("🔍 Processing request {}", id);
    }

    let (result, count) = run_classifier(state, bytes).await?;

    Ok(PredictionResponse {
        damage_score: result.damage_score,
        prediction: result.verdict,
        confidence: round2(result.confidence_percent),
        fresh_probability: result.fresh_probability_percent.map(round2),
        rotten_probability: result.rotten_probability_percent.map(round2),
        processing_time_ms: Some(round2(started.elapsed().as_secs_f64() * 1000.0)),
        timestamp: now_secs(),
        model_version: state.config.model.version.clone(),
        model_file: Some(state.config.model.path.clone()),
        request_id,
        image_hash: None,
        request_count: count,
        note: None,
    })
}

/// Decode + classify off the async workers, then score the probability pair
async fn run_classifier(state: &AppState, bytes: Vec<u8>) -> OracleResult<(ScoreResult, u64)> {
    let classifier = state.classifier.clone();
    let pair = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let tensor = imaging::preprocess(&bytes, classifier.input_size())?;
        debug!(
            "Image {}x{} brightness mean={:.3} std={:.3}",
            tensor.width,
            tensor.height,
            tensor.mean(),
            tensor.std_dev()
        );
        classifier.predict(&tensor)
    })
    .await
    .map_err(|e| OracleError::upstream(format!("prediction task failed: {}", e)))?
    .map_err(|e| {
        warn!("❌ Prediction failed: {:#}", e);
        OracleError::from(e.context("Prediction failed"))
    })?;

    let result = state.scorer.score(&ScoreInput::Probabilities(pair))?;
    state.metrics.inc_verdict(result.verdict);
    info!(
        "✅ Prediction: {} (damage: {}%, confidence: {:.1}%)",
        result.verdict.as_str(),
        result.damage_score,
        result.confidence_percent
    );
    Ok((result, state.scorer.request_count()))
}

/// Framework rejections still answer with the `damage_score: -1` body
fn body_bytes(body: Result<Bytes, BytesRejection>) -> OracleResult<Bytes> {
    body.map_err(|e| OracleError::invalid(e.body_text()))
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> OracleResult<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| OracleError::invalid(e.body_text()))
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> OracleResult<T> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(OracleError::invalid("No JSON data provided"));
    }
    serde_json::from_slice(body).map_err(|e| OracleError::invalid(format!("invalid JSON body: {}", e)))
}

fn required_hash(hash: Option<String>) -> OracleResult<String> {
    hash.filter(|h| !h.is_empty())
        .ok_or_else(|| OracleError::invalid("hash parameter required"))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
