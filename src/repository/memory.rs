//! In-memory implementation of `RequestRepository`.
//!
//! All records are held in memory and lost on restart. Used by handler
//! and reconciliation tests; the server itself runs on SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ActionOutcome, RepositoryError, RequestRepository};
use crate::request::{apply_action, AdoptionRequest, RequestId, RequestState, StaffAction};

/// In-memory request repository backed by a `HashMap` under a `RwLock`.
#[derive(Default)]
pub struct InMemoryRepository {
    requests: RwLock<HashMap<RequestId, AdoptionRequest>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRepository {
    async fn insert(&self, request: &AdoptionRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(RepositoryError::storage(
                "insert",
                format!("duplicate request id {}", request.id),
            ));
        }
        requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn get(&self, id: &RequestId) -> Result<Option<AdoptionRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(id).cloned())
    }

    async fn apply_action(
        &self,
        id: &RequestId,
        action: StaffAction,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(id) else {
            return Ok(ActionOutcome::NotFound);
        };

        match apply_action(request.state, action) {
            Some(new_state) => {
                request.state = new_state;
                request.updated_at = now;
                match new_state {
                    RequestState::Accepted => request.accepted_at = Some(now),
                    RequestState::Rejected => request.rejected_at = Some(now),
                    RequestState::Pending => unreachable!("actions only target terminal states"),
                }
                Ok(ActionOutcome::Applied)
            }
            None => Ok(ActionOutcome::AlreadyDecided(request.state)),
        }
    }

    async fn due_follow_ups(
        &self,
        action: StaffAction,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AdoptionRequest>, RepositoryError> {
        let target = action.target_state();
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| {
                r.state == target
                    && !r.follow_up_sent
                    && r.outcome_timestamp(target)
                        .is_some_and(|decided| decided <= cutoff)
            })
            .cloned()
            .collect())
    }

    async fn claim_follow_up(
        &self,
        id: &RequestId,
        action: StaffAction,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(id) else {
            return Ok(false);
        };
        if request.follow_up_sent || request.state != action.target_state() {
            return Ok(false);
        }
        request.follow_up_sent = true;
        Ok(true)
    }

    async fn release_follow_up(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if let Some(request) = requests.get_mut(id) {
            request.follow_up_sent = false;
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<AdoptionRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| {
                r.state == RequestState::Pending
                    && r.accepted_at.is_none()
                    && r.rejected_at.is_none()
            })
            .cloned()
            .collect())
    }
}
