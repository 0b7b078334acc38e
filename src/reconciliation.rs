//! Scheduled notification sweeps.
//!
//! `POST /cron/enviar-notificaciones` is invoked by an external scheduler
//! (there is no in-process timer). Each invocation performs three
//! independent sweeps:
//!
//! 1. accepted requests past the 24 h threshold get their applicant email;
//! 2. rejected requests past the 2 h threshold get theirs;
//! 3. staff get one digest of everything still pending (resent every run
//!    while items remain).
//!
//! Outcome rows are claimed with a single conditional flag update BEFORE
//! the send, so overlapping scheduler runs cannot double-email an
//! applicant. Rows are committed one at a time: a transport failure stops
//! the current sweep at the failing row and earlier rows stay sent. The
//! failing row's claim is released so the next run retries it.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::notifier::{Notifier, NotifyError};
use crate::repository::{RepositoryError, RequestRepository};
use crate::request::StaffAction;
use crate::templates;
use crate::AppState;

/// Accepted applicants are notified once their decision is this old.
pub const ACCEPTED_FOLLOW_UP_DELAY_HOURS: i64 = 24;
/// Rejected applicants are notified sooner.
pub const REJECTED_FOLLOW_UP_DELAY_HOURS: i64 = 2;

/// Failure inside a sweep; aborts the remainder of the invocation.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Emails sent per category during one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepCounts {
    pub aceptados: usize,
    pub rechazados: usize,
    pub pendientes: usize,
}

/// Run all three sweeps. Partial completion is acceptable: the external
/// scheduler retries by re-invoking the endpoint.
pub async fn run_notification_sweeps(
    repository: &dyn RequestRepository,
    notifier: &dyn Notifier,
    staff_email: &str,
    base_url: &str,
    now: DateTime<Utc>,
) -> Result<SweepCounts, SweepError> {
    let mut counts = SweepCounts::default();

    counts.aceptados = outcome_sweep(
        repository,
        notifier,
        StaffAction::Accept,
        ACCEPTED_FOLLOW_UP_DELAY_HOURS,
        now,
    )
    .await?;

    counts.rechazados = outcome_sweep(
        repository,
        notifier,
        StaffAction::Reject,
        REJECTED_FOLLOW_UP_DELAY_HOURS,
        now,
    )
    .await?;

    let pending = repository.pending().await?;
    if !pending.is_empty() {
        let html = templates::pending_digest_email(&pending, base_url);
        notifier
            .send_html(staff_email, &templates::digest_subject(pending.len()), &html)
            .await?;
        counts.pendientes = pending.len();
        info!("Sent pending digest covering {} request(s)", pending.len());
    }

    Ok(counts)
}

/// Sweep one terminal state: claim, send, count. Each row is committed
/// individually (at-least-once across the batch, never transactional).
async fn outcome_sweep(
    repository: &dyn RequestRepository,
    notifier: &dyn Notifier,
    action: StaffAction,
    delay_hours: i64,
    now: DateTime<Utc>,
) -> Result<usize, SweepError> {
    let cutoff = now - Duration::hours(delay_hours);
    let due = repository.due_follow_ups(action, cutoff).await?;

    let mut sent = 0;
    for request in due {
        if !repository.claim_follow_up(&request.id, action).await? {
            // Another sweep won this row between the query and the claim.
            info!("Follow-up for {} already claimed, skipping", request.id);
            continue;
        }

        let html = templates::applicant_outcome_email(
            action,
            &request.fields.full_name,
            &request.fields.animal_name,
        );
        if let Err(e) = notifier
            .send_html(&request.fields.email, templates::outcome_subject(action), &html)
            .await
        {
            // Give the claim back so the next invocation retries this row.
            if let Err(release_err) = repository.release_follow_up(&request.id).await {
                warn!(
                    "Failed to release follow-up claim for {}: {}",
                    request.id, release_err
                );
            }
            return Err(e.into());
        }

        sent += 1;
        info!(
            "Sent {} follow-up for {} to {}",
            action.target_state(),
            request.id,
            request.fields.email
        );
    }

    Ok(sent)
}

#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub success: bool,
    pub enviados: SweepCounts,
    pub timestamp: String,
}

/// `POST /cron/enviar-notificaciones`.
pub async fn cron_notifications_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CronResponse>, ApiError> {
    let now = Utc::now();
    let enviados = run_notification_sweeps(
        state.repository.as_ref(),
        state.notifier.as_ref(),
        &state.staff_email,
        &state.base_url,
        now,
    )
    .await?;

    info!(
        "Notification sweep complete: {} accepted, {} rejected, {} pending",
        enviados.aceptados, enviados.rechazados, enviados.pendientes
    );

    Ok(Json(CronResponse {
        success: true,
        enviados,
        timestamp: now.to_rfc3339(),
    }))
}
