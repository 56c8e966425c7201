//! HTTP surface: telephony webhook, artifact transport, health and attention admin.

use crate::twiml::VoiceResponse;
use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use callgod_voice::{AttentionState, CallStatus, Pipeline, TurnRequest, TurnResponse, VoiceError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Path the gateway posts gathered speech back to.
pub const VOICE_ACTION: &str = "/voice";

const SLOW_DOWN: &str = "You are making too many requests. Please slow down.";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// URL prefix under which `/static` is reachable from the telephony provider.
    pub public_base_url: String,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let public_base_url = pipeline.config().public_base_url.trim_end_matches('/').to_string();
        Self {
            pipeline,
            public_base_url,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let static_dir = ServeDir::new(state.pipeline.artifacts().dir());
    Router::new()
        .route("/voice", post(voice))
        .route("/health", get(health))
        .route("/attention", get(attention_status).post(set_attention))
        .nest_service("/static", static_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Webhook form fields we read. Everything else the provider sends is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct VoiceForm {
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

fn twiml(status: StatusCode, body: VoiceResponse) -> Response {
    (status, [(header::CONTENT_TYPE, "application/xml")], body.to_xml()).into_response()
}

fn render_turn(turn: &TurnResponse, base_url: &str) -> VoiceResponse {
    let mut doc = VoiceResponse::new();
    if let Some(audio) = &turn.audio {
        doc = doc.play(audio.public_url(base_url));
    } else if let Some(text) = &turn.say {
        doc = doc.say(text.as_str());
    }
    doc.gather(VOICE_ACTION, turn.listen.timeout.as_secs())
}

async fn voice(State(state): State<AppState>, Form(form): Form<VoiceForm>) -> Response {
    let status = CallStatus::from_gateway(form.call_status.as_deref());
    let text = form.speech_result.unwrap_or_default();
    info!(target: "callgod::gateway", user_said = %text.trim(), ?status, "received /voice request");

    match state.pipeline.handle_turn(TurnRequest::new(text, status)).await {
        Ok(turn) => twiml(StatusCode::OK, render_turn(&turn, &state.public_base_url)),
        Err(e) => failure_reply(&state, &e).await,
    }
}

/// Reply for a turn the pipeline refused or could not finish. The call keeps listening.
async fn failure_reply(state: &AppState, err: &VoiceError) -> Response {
    match err {
        VoiceError::CapacityExceeded { limit } => {
            warn!(target: "callgod::gateway", limit, "rate limit exceeded");
            let listen = state.pipeline.router().classifier().routing().listen_secs;
            twiml(
                StatusCode::TOO_MANY_REQUESTS,
                VoiceResponse::new().say(SLOW_DOWN).gather(VOICE_ACTION, listen),
            )
        }
        e => {
            error!(target: "callgod::gateway", "error in /voice route: {}", e);
            let turn = state.pipeline.router().fallback_response().await;
            twiml(StatusCode::OK, render_turn(&turn, &state.public_base_url))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttentionBody {
    pub state: AttentionState,
}

async fn attention_status(State(state): State<AppState>) -> Json<AttentionBody> {
    Json(AttentionBody {
        state: state.pipeline.attention().state(),
    })
}

async fn set_attention(State(state): State<AppState>, Json(body): Json<AttentionBody>) -> Json<AttentionBody> {
    let attention = state.pipeline.attention();
    match body.state {
        AttentionState::Idle => attention.go_idle(),
        AttentionState::Active => attention.wake(),
    }
    Json(AttentionBody {
        state: attention.state(),
    })
}
