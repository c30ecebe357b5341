//! HTTP gateway (spec §6): axum router, request validation, and the webhook
//! adapters for Telegram/WhatsApp. Grounded in the teacher's
//! `gateway::run_gateway` — `tower_http` layers for CORS/body-limit/timeout,
//! `AppState` injected via `State`, `Query`/`Json`/`Path` extractors.

mod webhooks;

use crate::catalog::CatalogIndex;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::{IntentKind, QueryPlan};
use crate::orchestrator::{Orchestrator, PipelineOutput, Request as PipelineRequest};
use crate::ratelimit::SlidingWindowRateLimiter;
use crate::render;
use crate::speech::{LanguageHint, SpeechGateway};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Request bodies larger than this are rejected before parsing (spec §5);
/// generous enough for the 25MB voice upload plus multipart overhead.
pub const MAX_BODY_BYTES: usize = 26 * 1024 * 1024;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub speech: Arc<dyn SpeechGateway>,
    pub catalog: Arc<CatalogIndex>,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<SlidingWindowRateLimiter>,
    pub voice_rate_limiter: Arc<SlidingWindowRateLimiter>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            speech: self.speech.clone(),
            catalog: self.catalog.clone(),
            config: self.config.clone(),
            rate_limiter: self.rate_limiter.clone(),
            voice_rate_limiter: self.voice_rate_limiter.clone(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/search", post(handle_search))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/search/voice", post(handle_search_voice))
        .route("/api/search/category/{category_id}", get(handle_search_category))
        .route("/api/webhooks/telegram", post(webhooks::handle_telegram))
        .route(
            "/api/webhooks/whatsapp",
            get(webhooks::handle_whatsapp_verify).post(webhooks::handle_whatsapp_message),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "kasioon search gateway listening");
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "kasioon-gateway",
        "capabilities": ["search", "analyze", "voice-search", "telegram", "whatsapp"],
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn default_language() -> String {
    "ar".to_string()
}

fn default_source() -> String {
    "api".to_string()
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchRequestBody {
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Accepted for forward compatibility with richer client-side filter
    /// UIs; the executor's own strategy ladder (spec §4.7.1) is what
    /// actually narrows results, not this field.
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
}

const VALID_LANGUAGES: &[&str] = &["ar", "en"];
const VALID_SOURCES: &[&str] = &["api", "telegram", "whatsapp", "website", "app"];

fn validate_search_request(body: &SearchRequestBody) -> AppResult<()> {
    if body.query.trim().is_empty() {
        return Err(AppError::Validation("query must not be empty".into()));
    }
    if body.query.chars().count() > 500 {
        return Err(AppError::Validation("query must be at most 500 characters".into()));
    }
    if !VALID_LANGUAGES.contains(&body.language.as_str()) {
        return Err(AppError::Validation("language must be 'ar' or 'en'".into()));
    }
    if !VALID_SOURCES.contains(&body.source.as_str()) {
        return Err(AppError::Validation(
            "source must be one of api, telegram, whatsapp, website, app".into(),
        ));
    }
    if !(1..=100).contains(&body.page) {
        return Err(AppError::Validation("page must be between 1 and 100".into()));
    }
    if !(1..=50).contains(&body.limit) {
        return Err(AppError::Validation("limit must be between 1 and 50".into()));
    }
    Ok(())
}

fn check_rate_limit(limiter: &SlidingWindowRateLimiter, key: &str) -> AppResult<()> {
    let result = limiter.check(key);
    if !result.allowed {
        return Err(AppError::RateLimited {
            retry_after_secs: result.retry_after_secs,
        });
    }
    Ok(())
}

fn client_key(headers: &HeaderMap, source: &str) -> String {
    let identity = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or("unknown")
        .trim();
    format!("{source}:{identity}")
}

/// Renders a [`PipelineOutput`] into the shared JSON envelope shape (spec
/// §4.9's HTTP renderer), regardless of which intent produced it.
fn render_pipeline_output(
    output: PipelineOutput,
    original_query: &str,
    language: &str,
    elapsed: Duration,
    catalog: &CatalogIndex,
) -> Json<serde_json::Value> {
    let elapsed_ms = elapsed.as_millis() as u64;
    let timestamp = chrono::Utc::now();

    match output {
        PipelineOutput::Search { outcome, plan } => Json(serde_json::to_value(render::http::render_search(
            &outcome,
            &plan,
            original_query,
            IntentKind::Search,
            elapsed_ms,
            timestamp,
            catalog,
            language,
        ))
        .unwrap_or(serde_json::Value::Null)),
        PipelineOutput::Listings { listings, pagination } => {
            Json(serde_json::to_value(render::http::render_listings(
                &listings,
                &pagination,
                IntentKind::MostViewed,
                elapsed_ms,
                timestamp,
                catalog,
                language,
            ))
            .unwrap_or(serde_json::Value::Null))
        }
        PipelineOutput::Offices(offices) => {
            Json(serde_json::to_value(render::http::render_offices(&offices)).unwrap_or(serde_json::Value::Null))
        }
        PipelineOutput::OfficeDetails(details) => Json(
            serde_json::to_value(render::http::render_office_details(&details)).unwrap_or(serde_json::Value::Null),
        ),
        PipelineOutput::Greeting => Json(
            serde_json::to_value(render::http::render_message(IntentKind::Greeting, language))
                .unwrap_or(serde_json::Value::Null),
        ),
        PipelineOutput::Help => Json(
            serde_json::to_value(render::http::render_message(IntentKind::Help, language))
                .unwrap_or(serde_json::Value::Null),
        ),
    }
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SearchRequestBody>,
) -> AppResult<impl IntoResponse> {
    validate_search_request(&body)?;
    check_rate_limit(&state.rate_limiter, &client_key(&headers, &body.source))?;

    let started = Instant::now();
    let request = PipelineRequest {
        query: body.query.clone(),
        language: body.language.clone(),
        page: body.page,
        limit: body.limit,
        office_id: None,
    };
    let output = state.orchestrator.handle(request).await?;
    Ok(render_pipeline_output(
        output,
        &body.query,
        &body.language,
        started.elapsed(),
        state.orchestrator.catalog(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequestBody {
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AnalyzeRequestBody>,
) -> AppResult<impl IntoResponse> {
    if body.query.trim().is_empty() || body.query.chars().count() > 500 {
        return Err(AppError::Validation(
            "query must be non-empty and at most 500 characters".into(),
        ));
    }
    if !VALID_LANGUAGES.contains(&body.language.as_str()) {
        return Err(AppError::Validation("language must be 'ar' or 'en'".into()));
    }
    check_rate_limit(&state.rate_limiter, &client_key(&headers, "api"))?;

    let (intent, plan) = state.orchestrator.analyze(&body.query, &body.language).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "intent": intent.kind,
            "plan": plan,
        },
    })))
}

async fn handle_search_voice(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    check_rate_limit(&state.voice_rate_limiter, &client_key(&headers, "voice"))?;

    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut filename = "audio.ogg".to_string();
    let mut language = default_language();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "audio" => {
                filename = field.file_name().unwrap_or("audio.ogg").to_string();
                audio_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(format!("failed to read audio field: {e}")))?
                        .to_vec(),
                );
            }
            "language" => {
                if let Ok(text) = field.text().await {
                    language = text;
                }
            }
            _ => {}
        }
    }

    let audio_bytes = audio_bytes.ok_or_else(|| AppError::Validation("missing 'audio' field".into()))?;
    crate::speech::validate_audio(&filename, audio_bytes.len())
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let lang_hint = LanguageHint::from_str_code(&language);
    let transcription = state
        .speech
        .transcribe(audio_bytes, &filename, lang_hint)
        .await
        .map_err(|e| AppError::ExternalUnavailable(e.to_string()))?;

    if transcription.trim().is_empty() {
        return Err(AppError::Validation("could not transcribe any speech from the audio".into()));
    }

    let started = Instant::now();
    let request = PipelineRequest {
        query: transcription.clone(),
        language: language.clone(),
        page: 1,
        limit: default_limit(),
        office_id: None,
    };
    let output = state.orchestrator.handle(request).await?;
    let rendered = render_pipeline_output(
        output,
        &transcription,
        &language,
        started.elapsed(),
        state.orchestrator.catalog(),
    );

    let mut value = rendered.0;
    if let Some(map) = value.as_object_mut() {
        map.insert("transcription".to_string(), serde_json::Value::String(transcription));
    }
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct CategorySearchQuery {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

async fn handle_search_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(category_id): Path<String>,
    Query(query): Query<CategorySearchQuery>,
) -> AppResult<impl IntoResponse> {
    if state.catalog.lookup_category(&category_id).is_none() {
        return Err(AppError::NotFound(format!("unknown category '{category_id}'")));
    }
    check_rate_limit(&state.rate_limiter, &client_key(&headers, "api"))?;

    let started = Instant::now();
    let plan = QueryPlan {
        main_keyword: category_id.clone(),
        expanded_keywords: vec![category_id.clone()],
        suggested_categories: vec![category_id.clone()],
        ..Default::default()
    };
    let outcome = state
        .orchestrator
        .search_category(&plan, query.page, query.limit)
        .await?;
    Ok(Json(serde_json::to_value(render::http::render_search(
        &outcome,
        &plan,
        &category_id,
        IntentKind::Search,
        started.elapsed().as_millis() as u64,
        chrono::Utc::now(),
        state.orchestrator.catalog(),
        &query.language,
    ))
    .unwrap_or(serde_json::Value::Null)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        let body = SearchRequestBody {
            query: "   ".into(),
            language: "ar".into(),
            source: "api".into(),
            user_id: None,
            page: 1,
            limit: 10,
            filters: None,
        };
        assert!(validate_search_request(&body).is_err());
    }

    #[test]
    fn rejects_unknown_language_and_source() {
        let mut body = SearchRequestBody {
            query: "شقة".into(),
            language: "fr".into(),
            source: "api".into(),
            user_id: None,
            page: 1,
            limit: 10,
            filters: None,
        };
        assert!(validate_search_request(&body).is_err());
        body.language = "ar".into();
        body.source = "carrier-pigeon".into();
        assert!(validate_search_request(&body).is_err());
    }

    #[test]
    fn rejects_page_and_limit_out_of_range() {
        let mut body = SearchRequestBody {
            query: "شقة".into(),
            language: "ar".into(),
            source: "api".into(),
            user_id: None,
            page: 0,
            limit: 10,
            filters: None,
        };
        assert!(validate_search_request(&body).is_err());
        body.page = 1;
        body.limit = 51;
        assert!(validate_search_request(&body).is_err());
    }

    #[test]
    fn accepts_a_well_formed_request() {
        let body = SearchRequestBody {
            query: "شقة للإيجار".into(),
            language: "ar".into(),
            source: "telegram".into(),
            user_id: Some("u1".into()),
            page: 1,
            limit: 10,
            filters: None,
        };
        assert!(validate_search_request(&body).is_ok());
    }
}
