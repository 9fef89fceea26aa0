use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::Assessment;
use crate::db::queries::{create_assessment, ensure_profile, list_assessments};
use crate::errors::AppResult;
use crate::routes::chat::UserQuery;
use crate::services::assessment::{analyse_assessment, AssessmentType};
use crate::services::gemini::TextGenerator;
use crate::utils::config::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAssessmentRequest {
    pub user_id: Uuid,
    pub assessment_type: String,
    pub answers: Value,
}

/// Assessment row plus the render hints the dashboard uses.
fn assessment_json(assessment: &Assessment) -> Value {
    let kind = AssessmentType::from_discriminator(&assessment.assessment_type);
    json!({
        "id": assessment.id,
        "user_id": assessment.user_id,
        "assessment_type": assessment.assessment_type,
        "results": assessment.results,
        "created_at": assessment.created_at.to_rfc3339(),
        "icon": kind.icon(),
        "color": kind.color()
    })
}

/// Analyses the answers and returns the discriminator and results to store.
/// The discriminator is kept as sent; unknown types only fall back when rendered.
async fn analyse_request<G: TextGenerator>(
    generator: &G,
    assessment_type: String,
    answers: Value,
) -> AppResult<(String, Value)> {
    let kind = AssessmentType::from_discriminator(&assessment_type);
    let results = analyse_assessment(generator, kind, answers).await;
    Ok((assessment_type, serde_json::to_value(&results)?))
}

// Analyse and store a completed questionnaire
pub async fn create_assessment_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateAssessmentRequest>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!(
        "Creating {} assessment for user: {}",
        payload.assessment_type,
        payload.user_id
    );

    ensure_profile(&app_state.db, payload.user_id, None).await.map_err(|e| {
        tracing::error!("❌ Failed to ensure profile: {}", e);
        e.status_code()
    })?;

    let (assessment_type, results) = analyse_request(
        app_state.gemini.as_ref(),
        payload.assessment_type,
        payload.answers,
    )
    .await
    .map_err(|e| {
        tracing::error!("❌ Failed to serialize assessment: {}", e);
        e.status_code()
    })?;

    match create_assessment(&app_state.db, payload.user_id, &assessment_type, results).await {
        Ok(assessment) => {
            tracing::info!("✅ Assessment created successfully: {}", assessment.id);
            Ok(Json(json!({
                "success": true,
                "message": "Assessment created successfully",
                "data": assessment_json(&assessment)
            })))
        }
        Err(e) => {
            tracing::error!("❌ Failed to create assessment: {}", e);
            Err(e.status_code())
        }
    }
}

// List assessments for a user
pub async fn list_assessments_handler(
    State(app_state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, StatusCode> {
    match list_assessments(&app_state.db, query.user_id).await {
        Ok(assessments) => {
            let data: Vec<Value> = assessments.iter().map(assessment_json).collect();
            tracing::info!("✅ Retrieved {} assessments", data.len());
            Ok(Json(json!({
                "success": true,
                "message": "Assessments retrieved successfully",
                "count": data.len(),
                "data": data
            })))
        }
        Err(e) => {
            tracing::error!("❌ Failed to list assessments: {}", e);
            Err(e.status_code())
        }
    }
}

pub fn create_assessments_router() -> Router<AppState> {
    Router::new().route(
        "/assessments",
        post(create_assessment_handler).get(list_assessments_handler),
    )
}
