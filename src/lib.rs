pub mod action;
pub mod config;
pub mod error;
pub mod notifier;
pub mod reconciliation;
pub mod repository;
pub mod request;
pub mod templates;
pub mod webhook;

use std::sync::Arc;

use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use notifier::Notifier;
use repository::RequestRepository;

/// Shared server state handed to every handler.
pub struct AppState {
    pub repository: Arc<dyn RequestRepository>,
    pub notifier: Arc<dyn Notifier>,
    /// Staff address for intake notifications and pending digests.
    pub staff_email: String,
    /// Externally reachable base URL used to build action links.
    pub base_url: String,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "adopciones-api"
    }))
}

/// Assemble the full HTTP surface. Used by `main` and by handler tests.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/webhook/form", post(webhook::form_webhook_handler))
        .route("/action", get(action::action_handler))
        .route(
            "/cron/enviar-notificaciones",
            post(reconciliation::cron_notifications_handler),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::notifier::testing::RecordingNotifier;
    use crate::repository::InMemoryRepository;

    #[tokio::test]
    async fn test_health_check() {
        let state = Arc::new(AppState {
            repository: Arc::new(InMemoryRepository::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            staff_email: "refugio@example.com".to_string(),
            base_url: "https://adopciones.example.com".to_string(),
        });

        let response = app_router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["service"], json!("adopciones-api"));
    }
}
