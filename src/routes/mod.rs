use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::utils::config::AppState;

pub mod assessments;
pub mod chat;
pub mod consultation;
pub mod profile;
pub mod realtime;
pub mod reports;

// Health check handler
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "ConsultAI server is running",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .merge(consultation::create_consultation_router())
        .merge(chat::create_chat_router())
        .merge(reports::create_reports_router())
        .merge(assessments::create_assessments_router())
        .merge(profile::create_profile_router())
        .merge(realtime::create_realtime_router());

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::flow_registry::FlowRegistry;
    use crate::services::gemini::GeminiService;
    use crate::services::realtime::ChangeHub;
    use crate::utils::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            database_url: "postgres://localhost/consultai_test".to_string(),
            gemini_api_key: "test-key".to_string(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_connections: 1,
            question_count: 10,
            flow_idle_timeout: Duration::from_secs(3600),
        };
        // never connects unless a handler touches the database
        let pool = PgPoolOptions::new().connect_lazy(&config.database_url).unwrap();

        AppState {
            db: Arc::new(pool),
            gemini: Arc::new(GeminiService::new(&config.gemini_api_key).unwrap()),
            changes: ChangeHub::default(),
            flows: Arc::new(FlowRegistry::new(config.flow_idle_timeout)),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_consultation_is_not_found() {
        let app = create_router(test_state());
        let uri = format!("/api/consultations/{}", uuid::Uuid::new_v4());
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_session_id_rejected() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/consultations/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
