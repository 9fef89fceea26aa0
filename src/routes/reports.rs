use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::queries::{
    get_diet_plan_by_report, get_report, insert_diet_plan, list_diet_plans, list_reports_by_user,
};
use crate::routes::chat::UserQuery;
use crate::services::diet_plan::generate_diet_plan;
use crate::services::structured::MedicalReport;
use crate::utils::config::AppState;
use crate::utils::pdf::render_report_pdf;

// List reports for a user
pub async fn list_reports_handler(
    State(app_state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Listing reports for user: {}", query.user_id);

    match list_reports_by_user(&app_state.db, query.user_id).await {
        Ok(reports) => Ok(Json(json!({
            "success": true,
            "message": "Reports retrieved successfully",
            "count": reports.len(),
            "data": reports
        }))),
        Err(e) => {
            tracing::error!("❌ Failed to list reports: {}", e);
            Err(e.status_code())
        }
    }
}

// Get a single report
pub async fn get_report_handler(
    State(app_state): State<AppState>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    match get_report(&app_state.db, report_id).await {
        Ok(Some(report)) => Ok(Json(json!({
            "success": true,
            "message": "Report retrieved successfully",
            "data": report
        }))),
        Ok(None) => {
            tracing::error!("Report not found: {}", report_id);
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            tracing::error!("❌ Failed to get report: {}", e);
            Err(e.status_code())
        }
    }
}

// Download a report as PDF
pub async fn report_pdf_handler(
    State(app_state): State<AppState>,
    Path(report_id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    tracing::info!("Rendering PDF for report: {}", report_id);

    let report = get_report(&app_state.db, report_id)
        .await
        .map_err(|e| {
            tracing::error!("❌ Failed to get report: {}", e);
            e.status_code()
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let content = MedicalReport::from_value(report.content).map_err(|e| {
        tracing::error!("❌ Stored report {} is not readable: {}", report_id, e);
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let date = report.created_at.format("%Y-%m-%d").to_string();
    let bytes = render_report_pdf(&content, "Medical Consultation Report", &date).map_err(|e| {
        tracing::error!("❌ Failed to render PDF: {}", e);
        e.status_code()
    })?;

    let disposition = format!("attachment; filename=\"medical-report-{}.pdf\"", date);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// Get or create the diet plan for a report
pub async fn diet_plan_handler(
    State(app_state): State<AppState>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Diet plan requested for report: {}", report_id);

    match get_diet_plan_by_report(&app_state.db, report_id).await {
        Ok(Some(plan)) => {
            return Ok(Json(json!({
                "success": true,
                "message": "Diet plan retrieved successfully",
                "data": plan
            })));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("❌ Failed to look up diet plan: {}", e);
            return Err(e.status_code());
        }
    }

    let report = get_report(&app_state.db, report_id)
        .await
        .map_err(|e| {
            tracing::error!("❌ Failed to get report: {}", e);
            e.status_code()
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let content = MedicalReport::from_value(report.content).unwrap_or_else(|e| {
        tracing::warn!("⚠️ Report {} unreadable, planning from fallback: {}", report_id, e);
        MedicalReport::fallback()
    });

    let plan = generate_diet_plan(app_state.gemini.as_ref(), &content).await;
    let plan = serde_json::to_value(plan).map_err(|e| {
        tracing::error!("❌ Failed to serialize diet plan: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let stored = insert_diet_plan(&app_state.db, report_id, report.user_id, plan)
        .await
        .map_err(|e| {
            tracing::error!("❌ Failed to store diet plan: {}", e);
            e.status_code()
        })?;

    tracing::info!("✅ Diet plan {} created for report {}", stored.id, report_id);
    Ok(Json(json!({
        "success": true,
        "message": "Diet plan created successfully",
        "data": stored
    })))
}

// List diet plans for a user
pub async fn list_diet_plans_handler(
    State(app_state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, StatusCode> {
    match list_diet_plans(&app_state.db, query.user_id).await {
        Ok(plans) => Ok(Json(json!({
            "success": true,
            "message": "Diet plans retrieved successfully",
            "count": plans.len(),
            "data": plans
        }))),
        Err(e) => {
            tracing::error!("❌ Failed to list diet plans: {}", e);
            Err(e.status_code())
        }
    }
}

pub fn create_reports_router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports_handler))
        .route("/reports/{report_id}", get(get_report_handler))
        .route("/reports/{report_id}/pdf", get(report_pdf_handler))
        .route("/reports/{report_id}/diet-plan", post(diet_plan_handler))
        .route("/diet-plans", get(list_diet_plans_handler))
}
