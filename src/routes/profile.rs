use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{UpdateProfileRequest, UpsertBasicInformationRequest};
use crate::db::queries::{
    ensure_profile, get_basic_information, get_profile, update_profile, upsert_basic_information,
};
use crate::utils::config::AppState;

pub async fn get_profile_handler(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    match get_profile(&app_state.db, user_id).await {
        Ok(Some(profile)) => Ok(Json(json!({
            "success": true,
            "message": "Profile retrieved successfully",
            "data": profile
        }))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("❌ Failed to get profile: {}", e);
            Err(e.status_code())
        }
    }
}

pub async fn update_profile_handler(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Updating profile: {}", user_id);

    match update_profile(&app_state.db, user_id, payload).await {
        Ok(profile) => {
            tracing::info!("✅ Profile updated: {}", profile.id);
            Ok(Json(json!({
                "success": true,
                "message": "Profile updated successfully",
                "data": profile
            })))
        }
        Err(e) => {
            tracing::error!("❌ Failed to update profile: {}", e);
            Err(e.status_code())
        }
    }
}

pub async fn get_basic_info_handler(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    match get_basic_information(&app_state.db, user_id).await {
        Ok(info) => Ok(Json(json!({
            "success": true,
            "message": "Basic information retrieved successfully",
            "data": info
        }))),
        Err(e) => {
            tracing::error!("❌ Failed to get basic information: {}", e);
            Err(e.status_code())
        }
    }
}

pub async fn upsert_basic_info_handler(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpsertBasicInformationRequest>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Saving basic information for user: {}", user_id);

    ensure_profile(&app_state.db, user_id, None).await.map_err(|e| {
        tracing::error!("❌ Failed to ensure profile: {}", e);
        e.status_code()
    })?;

    match upsert_basic_information(&app_state.db, user_id, payload).await {
        Ok(info) => {
            tracing::info!("✅ Basic information saved: {}", info.id);
            Ok(Json(json!({
                "success": true,
                "message": "Basic information saved successfully",
                "data": info
            })))
        }
        Err(e) => {
            tracing::error!("❌ Failed to save basic information: {}", e);
            Err(e.status_code())
        }
    }
}

pub fn create_profile_router() -> Router<AppState> {
    Router::new()
        .route("/profile/{user_id}", get(get_profile_handler).put(update_profile_handler))
        .route(
            "/profile/{user_id}/basic-info",
            get(get_basic_info_handler).put(upsert_basic_info_handler),
        )
}
