use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::UpdateProfileRequest;
use crate::db::queries::{create_chat_session, create_message, ensure_profile, update_profile};
use crate::services::consultation::{
    ConsultationFlow, ConsultationService, FlowError, RoundError, UserInput,
};
use crate::utils::config::AppState;

#[derive(Debug, Deserialize)]
pub struct StartConsultationRequest {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsultationInputRequest {
    pub input: UserInput,
}

fn flow_status(e: &FlowError) -> StatusCode {
    match e {
        FlowError::UnexpectedInput(_) => StatusCode::BAD_REQUEST,
        FlowError::Finished | FlowError::AwaitingQuestions | FlowError::AwaitingReport => {
            StatusCode::CONFLICT
        }
    }
}

fn round_status(e: &RoundError) -> StatusCode {
    match e {
        RoundError::Flow(e) => flow_status(e),
        RoundError::Store(e) => e.status_code(),
    }
}

fn flow_json(flow: &ConsultationFlow) -> Value {
    json!({
        "session_id": flow.session_id,
        "stage": flow.stage,
        "profile": flow.profile,
        "prompt": flow.next_prompt(),
        "questions_total": flow.questions.len(),
        "questions_answered": flow.answers.len(),
        "transcript": flow.transcript,
        "report": flow.report,
    })
}

// Start a new consultation
pub async fn start_consultation_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<StartConsultationRequest>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Starting consultation for user: {}", payload.user_id);

    ensure_profile(&app_state.db, payload.user_id, payload.email).await.map_err(|e| {
        tracing::error!("❌ Failed to ensure profile: {}", e);
        e.status_code()
    })?;

    let title = payload.title.unwrap_or_else(|| "Consultation".to_string());
    let session = create_chat_session(&app_state.db, payload.user_id, title).await.map_err(|e| {
        tracing::error!("❌ Failed to create chat session: {}", e);
        e.status_code()
    })?;

    let flow = ConsultationFlow::new(session.id, payload.user_id);
    for message in &flow.transcript {
        create_message(&app_state.db, session.id, payload.user_id, message.role, &message.content)
            .await
            .map_err(|e| {
                tracing::error!("❌ Failed to store greeting: {}", e);
                e.status_code()
            })?;
    }

    let body = flow_json(&flow);
    app_state.flows.insert(flow).await;

    tracing::info!("✅ Consultation started: {}", session.id);
    Ok(Json(json!({
        "success": true,
        "message": "Consultation started",
        "data": body
    })))
}

// Submit one answer to a running consultation
pub async fn consultation_input_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ConsultationInputRequest>,
) -> Result<Json<Value>, StatusCode> {
    let active = app_state.flows.get(session_id).await.ok_or_else(|| {
        tracing::error!("Consultation not found: {}", session_id);
        StatusCode::NOT_FOUND
    })?;
    let mut active = active.lock().await;

    let service = ConsultationService::new(app_state.gemini.as_ref(), app_state.config.question_count);
    let (advance, report_id) = service
        .advance_and_store(app_state.db.as_ref(), &mut active.flow, payload.input)
        .await
        .map_err(|e| {
            match &e {
                RoundError::Flow(_) => {
                    tracing::warn!("⚠️ Rejected consultation input for {}: {}", session_id, e)
                }
                RoundError::Store(_) => {
                    tracing::error!("❌ Failed to store consultation round for {}: {}", session_id, e)
                }
            }
            round_status(&e)
        })?;
    active.touch();

    let flow = &active.flow;
    if let Some(report_id) = report_id {
        tracing::info!("✅ Report {} stored for session {}", report_id, session_id);

        // Carry what the patient told us into their profile
        let profile_update = UpdateProfileRequest {
            email: None,
            full_name: flow.profile.name.clone(),
            location: flow.profile.location.as_ref().map(|l| l.to_string()),
        };
        if let Err(e) = update_profile(&app_state.db, flow.user_id, profile_update).await {
            tracing::warn!("⚠️ Failed to update profile from consultation: {}", e);
        }
    }

    let body = flow_json(flow);
    let finished = flow.is_finished();
    drop(active);
    if finished {
        app_state.flows.remove(session_id).await;
    }

    Ok(Json(json!({
        "success": true,
        "message": "Input accepted",
        "data": {
            "replies": advance.replies,
            "report_id": report_id,
            "consultation": body
        }
    })))
}

// Current state of a running consultation
pub async fn get_consultation_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let active = app_state
        .flows
        .get(session_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let active = active.lock().await;
    Ok(Json(json!({
        "success": true,
        "message": "Consultation retrieved",
        "data": flow_json(&active.flow)
    })))
}

pub fn create_consultation_router() -> Router<AppState> {
    Router::new()
        .route("/consultations", post(start_consultation_handler))
        .route("/consultations/{session_id}", get(get_consultation_handler))
        .route("/consultations/{session_id}/input", post(consultation_input_handler))
}
