//! Intake handler for form submissions relayed by the Apps Script webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::ApiError;
use crate::request::{AdoptionRequest, Submission};
use crate::templates;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub success: bool,
    pub id: String,
    pub message: String,
}

/// `POST /webhook/form`: validate and persist a new request, then notify
/// staff with the full submission and accept/reject links.
///
/// If the insert fails nothing is sent and the error propagates. If the
/// email fails after a successful insert, the error still propagates but
/// the row stays: a request can exist with no staff notification, and
/// the pending digest eventually surfaces it.
pub async fn form_webhook_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Json<IntakeResponse>, ApiError> {
    let submission = Submission::new(payload);
    let now = chrono::Utc::now();
    let request = AdoptionRequest::from_submission(&submission, now);

    info!(
        "Received form submission from '{}', assigned id {}",
        request.fields.full_name, request.id
    );

    state.repository.insert(&request).await?;

    let html = templates::staff_intake_email(&request.id, &submission, &state.base_url);
    let subject = templates::staff_intake_subject(&request.fields.full_name);
    state
        .notifier
        .send_html(&state.staff_email, &subject, &html)
        .await?;

    Ok(Json(IntakeResponse {
        success: true,
        id: request.id.to_string(),
        message: "Solicitud procesada correctamente".to_string(),
    }))
}
