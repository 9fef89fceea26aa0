use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{MessageRole, UpdateSessionStatusRequest};
use crate::db::queries::{
    create_chat_session, create_message, ensure_profile, get_chat_session, list_chat_sessions,
    list_messages_by_session, update_session_status,
};
use crate::services::gemini::TextGenerator;
use crate::services::prompts::chat_prompt;
use crate::utils::config::AppState;

/// Number of earlier messages sent along with a chat prompt.
const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Uuid,
    pub message: String,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

// Free-text chat with the virtual doctor
pub async fn chat_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Processing chat message for user: {}", payload.user_id);

    if payload.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    ensure_profile(&app_state.db, payload.user_id, None).await.map_err(|e| {
        tracing::error!("❌ Failed to ensure profile: {}", e);
        e.status_code()
    })?;

    // Handle session_id - create new if not provided
    let session_id = match payload.session_id {
        Some(session_id) => match get_chat_session(&app_state.db, session_id).await {
            Ok(Some(session)) if session.user_id == payload.user_id => session.id,
            Ok(_) => {
                tracing::error!("Session not found: {}", session_id);
                return Err(StatusCode::NOT_FOUND);
            }
            Err(e) => {
                tracing::error!("Failed to get session: {}", e);
                return Err(e.status_code());
            }
        },
        None => {
            let title: String = payload.message.chars().take(60).collect();
            match create_chat_session(&app_state.db, payload.user_id, title).await {
                Ok(session) => {
                    tracing::info!("Created new session: {}", session.id);
                    session.id
                }
                Err(e) => {
                    tracing::error!("Failed to create session: {}", e);
                    return Err(e.status_code());
                }
            }
        }
    };

    let history = list_messages_by_session(&app_state.db, session_id).await.map_err(|e| {
        tracing::error!("Failed to get conversation history: {}", e);
        e.status_code()
    })?;

    let history_text = history
        .iter()
        .rev()
        .take(HISTORY_LIMIT)
        .rev()
        .map(|m| {
            let speaker = if m.role == MessageRole::User.as_str() { "Patient" } else { "Doctor" };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let user_message = create_message(
        &app_state.db,
        session_id,
        payload.user_id,
        MessageRole::User,
        &payload.message,
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to store message: {}", e);
        e.status_code()
    })?;

    let reply = app_state
        .gemini
        .generate(&chat_prompt(&history_text, &payload.message))
        .await
        .map_err(|e| {
            tracing::error!("Failed to generate response: {}", e);
            e.status_code()
        })?;

    let bot_message = create_message(&app_state.db, session_id, payload.user_id, MessageRole::Assistant, &reply)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store response: {}", e);
            e.status_code()
        })?;

    tracing::info!("✅ Chat message processed successfully");
    Ok(Json(json!({
        "success": true,
        "message": "Chat request processed successfully",
        "data": {
            "session_id": session_id,
            "user_message": user_message,
            "bot_message": bot_message
        }
    })))
}

// List chat sessions for a user
pub async fn list_sessions_handler(
    State(app_state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Listing sessions for user: {}", query.user_id);

    match list_chat_sessions(&app_state.db, query.user_id).await {
        Ok(sessions) => Ok(Json(json!({
            "success": true,
            "message": "Sessions retrieved successfully",
            "count": sessions.len(),
            "data": sessions
        }))),
        Err(e) => {
            tracing::error!("❌ Failed to list sessions: {}", e);
            Err(e.status_code())
        }
    }
}

// Change the status of a session (e.g. schedule a follow-up)
pub async fn update_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<UpdateSessionStatusRequest>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Setting session {} status to {}", session_id, payload.status);

    match update_session_status(&app_state.db, session_id, payload.status).await {
        Ok(Some(session)) => Ok(Json(json!({
            "success": true,
            "message": "Session updated successfully",
            "data": session
        }))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("❌ Failed to update session: {}", e);
            Err(e.status_code())
        }
    }
}

// Message history of a session
pub async fn get_messages_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Getting messages for session: {}", session_id);

    match list_messages_by_session(&app_state.db, session_id).await {
        Ok(messages) => {
            tracing::info!("✅ Retrieved {} messages", messages.len());
            Ok(Json(json!({
                "success": true,
                "message": "Messages retrieved successfully",
                "data": {
                    "session_id": session_id,
                    "messages": messages,
                    "count": messages.len()
                }
            })))
        }
        Err(e) => {
            tracing::error!("❌ Failed to get messages: {}", e);
            Err(e.status_code())
        }
    }
}

pub fn create_chat_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/{session_id}", patch(update_session_handler))
        .route("/sessions/{session_id}/messages", get(get_messages_handler))
}
