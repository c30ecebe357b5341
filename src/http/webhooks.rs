//! Telegram/WhatsApp webhook adapters (spec §4.9, §6). Inbound updates are
//! parsed, run through the same orchestrator pipeline as `/api/search`, and
//! the reply is pushed back through the Telegram/WhatsApp renderer.

use super::AppState;
use crate::model::IntentKind;
use crate::orchestrator::{PipelineOutput, Request as PipelineRequest};
use crate::render;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;

/// Constant-time byte comparison to avoid leaking token length/contents via
/// response timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn verify_whatsapp_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    message: Option<TelegramMessageIn>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessageIn {
    text: Option<String>,
    chat: TelegramChat,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

/// POST /api/webhooks/telegram — runs the text through the pipeline and
/// returns the Telegram-formatted reply as the webhook response body
/// (spec's channel renderers are pure functions of the same result shape
/// used by `/api/search`).
pub async fn handle_telegram(
    State(state): State<AppState>,
    Json(update): Json<TelegramUpdate>,
) -> impl IntoResponse {
    let Some(message) = update.message else {
        return (StatusCode::OK, Json(serde_json::json!({"ok": true})));
    };
    let Some(text) = message.text else {
        return (StatusCode::OK, Json(serde_json::json!({"ok": true})));
    };

    let request = PipelineRequest {
        query: text.clone(),
        language: "ar".to_string(),
        page: 1,
        limit: 10,
        office_id: None,
    };

    let output = match state.orchestrator.handle(request).await {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!(error = %err, chat_id = message.chat.id, "telegram pipeline failed");
            return (StatusCode::OK, Json(serde_json::json!({"ok": true})));
        }
    };

    let telegram_message = match output {
        PipelineOutput::Search { outcome, plan } => {
            render::telegram::render_search(&outcome, &plan, state.orchestrator.catalog(), "ar")
        }
        PipelineOutput::Listings { listings, pagination } => {
            let outcome = crate::model::SearchOutcome {
                results: listings
                    .into_iter()
                    .map(crate::model::RankedResult::unscored)
                    .collect(),
                pagination,
                strategy: crate::model::StrategyTag::TextOnly,
                fallback_message: None,
            };
            render::telegram::render_search(&outcome, &crate::model::QueryPlan::default(), state.orchestrator.catalog(), "ar")
        }
        PipelineOutput::Offices(_) | PipelineOutput::OfficeDetails(_) => {
            render::telegram::TelegramMessage {
                text: "شو بدك تعرف عن المكتب؟".to_string(),
                parse_mode: "HTML",
                buttons: vec![],
                disable_web_page_preview: true,
            }
        }
        PipelineOutput::Greeting => render::telegram::TelegramMessage {
            text: render::http::render_message(IntentKind::Greeting, "ar").data.message,
            parse_mode: "HTML",
            buttons: vec![],
            disable_web_page_preview: true,
        },
        PipelineOutput::Help => render::telegram::TelegramMessage {
            text: render::http::render_message(IntentKind::Help, "ar").data.message,
            parse_mode: "HTML",
            buttons: vec![],
            disable_web_page_preview: true,
        },
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "ok": true,
            "chat_id": message.chat.id,
            "reply": telegram_message,
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /api/webhooks/whatsapp — Meta webhook verification handshake.
pub async fn handle_whatsapp_verify(
    State(state): State<AppState>,
    Query(params): Query<WhatsAppVerifyQuery>,
) -> impl IntoResponse {
    let Some(expected_token) = &state.config.channels.whatsapp_verify_token else {
        return (StatusCode::NOT_FOUND, "WhatsApp is not configured".to_string());
    };

    let token_matches = params
        .verify_token
        .as_deref()
        .is_some_and(|t| constant_time_eq(t.as_bytes(), expected_token.as_bytes()));

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        return match params.challenge {
            Some(challenge) => (StatusCode::OK, challenge),
            None => (StatusCode::BAD_REQUEST, "missing hub.challenge".to_string()),
        };
    }

    (StatusCode::FORBIDDEN, "forbidden".to_string())
}

#[derive(Debug, Deserialize)]
struct WhatsAppWebhookPayload {
    entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppEntry {
    changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppChange {
    value: WhatsAppValue,
}

#[derive(Debug, Deserialize)]
struct WhatsAppValue {
    #[serde(default)]
    messages: Vec<WhatsAppMessageIn>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppMessageIn {
    from: String,
    text: Option<WhatsAppText>,
}

#[derive(Debug, Deserialize)]
struct WhatsAppText {
    body: String,
}

/// POST /api/webhooks/whatsapp — inbound message webhook. Validates the
/// `X-Hub-Signature-256` header when an app secret is configured, then runs
/// each text message through the pipeline.
pub async fn handle_whatsapp_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(app_secret) = &state.config.channels.whatsapp_app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_whatsapp_signature(app_secret, &body, signature) {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "invalid signature"})));
        }
    }

    let Ok(payload) = serde_json::from_slice::<WhatsAppWebhookPayload>(&body) else {
        return (StatusCode::OK, Json(serde_json::json!({"status": "ignored"})));
    };

    let mut replies = Vec::new();
    for entry in &payload.entry {
        for change in &entry.changes {
            for message in &change.value.messages {
                let Some(text) = &message.text else { continue };
                let request = PipelineRequest {
                    query: text.body.clone(),
                    language: "ar".to_string(),
                    page: 1,
                    limit: 10,
                    office_id: None,
                };
                let output = match state.orchestrator.handle(request).await {
                    Ok(output) => output,
                    Err(err) => {
                        tracing::warn!(error = %err, from = %message.from, "whatsapp pipeline failed");
                        continue;
                    }
                };
                let rendered = match output {
                    PipelineOutput::Search { outcome, .. } => {
                        render::whatsapp::render_search(&outcome, state.orchestrator.catalog(), "ar")
                    }
                    PipelineOutput::Listings { listings, pagination } => {
                        let outcome = crate::model::SearchOutcome {
                            results: listings
                                .into_iter()
                                .map(crate::model::RankedResult::unscored)
                                .collect(),
                            pagination,
                            strategy: crate::model::StrategyTag::TextOnly,
                            fallback_message: None,
                        };
                        render::whatsapp::render_search(&outcome, state.orchestrator.catalog(), "ar")
                    }
                    PipelineOutput::Offices(_) | PipelineOutput::OfficeDetails(_) => {
                        "شو بدك تعرف عن المكتب؟".to_string()
                    }
                    PipelineOutput::Greeting => render::http::render_message(IntentKind::Greeting, "ar").data.message,
                    PipelineOutput::Help => render::http::render_message(IntentKind::Help, "ar").data.message,
                };
                replies.push(serde_json::json!({ "to": message.from, "text": rendered }));
            }
        }
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": "ok", "replies": replies })))
}
