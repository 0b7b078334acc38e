//! Repository abstraction for adoption-request persistence.
//!
//! This module defines the `RequestRepository` trait that abstracts
//! storage operations for request records. Implementations can provide
//! different backends (in-memory, SQLite).
//!
//! Two operations are deliberately conditional at the storage layer
//! rather than read-then-write in the handlers:
//!
//! - `apply_action` only moves a `Pendiente` row into a terminal state,
//!   so duplicate or crossed staff clicks are no-ops;
//! - `claim_follow_up` flips the unsent flag with a single conditional
//!   UPDATE, so two overlapping reconciliation sweeps cannot both win
//!   the same row and double-email an applicant.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::request::{AdoptionRequest, RequestId, StaffAction};

/// Errors surfaced by a repository backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The storage backend failed during an operation.
    #[error("storage failure during {operation}: {message}")]
    Storage { operation: String, message: String },
    /// A persisted row could not be interpreted.
    #[error("corrupt stored data: {what}")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

/// Result of applying a staff decision to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The request was `Pendiente` and is now in the action's terminal state.
    Applied,
    /// The request had already been decided; nothing was written.
    AlreadyDecided(crate::request::RequestState),
    /// No request exists with this id; nothing was written.
    NotFound,
}

/// Repository trait for persisting adoption requests.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Insert a freshly created request. Fails if the id already exists.
    async fn insert(&self, request: &AdoptionRequest) -> Result<(), RepositoryError>;

    /// Fetch a request by id.
    async fn get(&self, id: &RequestId) -> Result<Option<AdoptionRequest>, RepositoryError>;

    /// Apply a staff decision: a guarded `Pendiente -> terminal` update
    /// setting `fecha_actualizacion` and exactly the matching outcome
    /// timestamp to `now`. Terminal and missing rows are untouched.
    async fn apply_action(
        &self,
        id: &RequestId,
        action: StaffAction,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, RepositoryError>;

    /// All requests in the action's terminal state whose follow-up email
    /// is unsent and whose outcome timestamp is at or before `cutoff`.
    async fn due_follow_ups(
        &self,
        action: StaffAction,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AdoptionRequest>, RepositoryError>;

    /// Atomically claim the follow-up for a request: set the sent flag if
    /// and only if it is currently unset and the state matches the
    /// action's terminal state. Returns whether this call won the claim.
    async fn claim_follow_up(
        &self,
        id: &RequestId,
        action: StaffAction,
    ) -> Result<bool, RepositoryError>;

    /// Release a previously won claim (used when the send fails after
    /// claiming, so a later sweep retries the row).
    async fn release_follow_up(&self, id: &RequestId) -> Result<(), RepositoryError>;

    /// All requests still `Pendiente` with both outcome timestamps null.
    async fn pending(&self) -> Result<Vec<AdoptionRequest>, RepositoryError>;
}
