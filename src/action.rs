//! Staff decision handler for the accept/reject links in notification
//! emails.
//!
//! The transition is guarded at the storage layer: only a `Pendiente`
//! request can move to a terminal state, so stale or repeated clicks on
//! an email button cannot flip an already-decided request.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::repository::ActionOutcome;
use crate::request::{RequestId, StaffAction};
use crate::templates;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActionParams {
    pub action: String,
    pub id: String,
}

/// `GET /action?action={aceptar|rechazar}&id={id}`.
///
/// Returns an HTML confirmation page. Never emails the applicant; that
/// is deferred to the scheduled notification sweep.
pub async fn action_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActionParams>,
) -> Result<Html<String>, ApiError> {
    let Some(action) = StaffAction::parse(&params.action) else {
        warn!("Rejected unrecognized action token '{}'", params.action);
        return Ok(Html(templates::invalid_action_page()));
    };

    let id = RequestId::from(params.id);
    let now = chrono::Utc::now();
    let outcome = state.repository.apply_action(&id, action, now).await?;

    let page = match outcome {
        ActionOutcome::Applied => {
            info!("Request {} marked {}", id, action.target_state());
            templates::action_confirmation_page(action, &id)
        }
        ActionOutcome::AlreadyDecided(current) => {
            info!(
                "Request {} already {}, ignoring '{}' click",
                id,
                current,
                action.token()
            );
            templates::action_already_decided_page(current, &id)
        }
        ActionOutcome::NotFound => {
            warn!("Action '{}' for unknown request {}", action.token(), id);
            templates::action_not_found_page(&id)
        }
    };

    Ok(Html(page))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::notifier::testing::RecordingNotifier;
    use crate::repository::{InMemoryRepository, RequestRepository};
    use crate::request::{AdoptionRequest, RequestState, Submission};
    use crate::{app_router, AppState};
    use std::sync::Arc;

    fn test_state() -> (Arc<AppState>, Arc<InMemoryRepository>) {
        let repository = Arc::new(InMemoryRepository::new());
        let state = Arc::new(AppState {
            repository: repository.clone(),
            notifier: Arc::new(RecordingNotifier::new()),
            staff_email: "refugio@example.com".to_string(),
            base_url: "https://adopciones.example.com".to_string(),
        });
        (state, repository)
    }

    async fn seed_pending(repository: &InMemoryRepository) -> AdoptionRequest {
        let payload = json!({ "Nombre y Apellido": "Ana García" });
        let submission = match payload {
            serde_json::Value::Object(map) => Submission::new(map),
            _ => unreachable!(),
        };
        let request = AdoptionRequest::from_submission(&submission, Utc::now());
        repository.insert(&request).await.unwrap();
        request
    }

    async fn get_action(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let app = app_router(state);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_accept_marks_request_and_confirms() {
        let (state, repository) = test_state();
        let request = seed_pending(&repository).await;

        let uri = format!("/action?action=aceptar&id={}", request.id);
        let (status, html) = get_action(state, &uri).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Aceptado"));
        assert!(html.contains(request.id.as_str()));

        let stored = repository.get(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.state, RequestState::Accepted);
        assert!(stored.accepted_at.is_some());
        assert_eq!(stored.rejected_at, None);
        assert!(!stored.follow_up_sent);
    }

    #[tokio::test]
    async fn test_repeated_click_does_not_flip_state() {
        let (state, repository) = test_state();
        let request = seed_pending(&repository).await;

        let accept = format!("/action?action=aceptar&id={}", request.id);
        get_action(state.clone(), &accept).await;

        let reject = format!("/action?action=rechazar&id={}", request.id);
        let (status, html) = get_action(state, &reject).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("ya procesada"));

        let stored = repository.get(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.state, RequestState::Accepted);
        assert_eq!(stored.rejected_at, None);
    }

    #[tokio::test]
    async fn test_invalid_action_touches_nothing() {
        let (state, repository) = test_state();
        let request = seed_pending(&repository).await;

        let uri = format!("/action?action=foo&id={}", request.id);
        let (status, html) = get_action(state, &uri).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Acción no válida"));

        let stored = repository.get(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.state, RequestState::Pending);
        assert_eq!(stored.updated_at, request.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_id_reports_not_found() {
        let (state, _repository) = test_state();
        let (status, html) = get_action(state, "/action?action=aceptar&id=SOL-DEADBEEF").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("no encontrada"));
        assert!(html.contains("SOL-DEADBEEF"));
    }
}
