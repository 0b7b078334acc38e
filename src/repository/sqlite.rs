//! SQLite implementation of `RequestRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema
//! version. When the schema needs to change, increment
//! `CURRENT_SCHEMA_VERSION` and add a migration in `run_migrations()`.
//! Migrations run sequentially from the current version to the target
//! version.
//!
//! # Timestamps
//!
//! Timestamps are stored as RFC 3339 text with fixed microsecond
//! precision and a `Z` suffix, so lexicographic SQL comparison matches
//! chronological order. `fecha_solicitud` keeps the submission's own
//! declared time; the remaining columns are set by this service.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{ActionOutcome, RepositoryError, RequestRepository};
use crate::request::{AdoptionRequest, ApplicantFields, RequestId, RequestState, StaffAction};

/// Current schema version. Increment this when making schema changes and
/// add corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed request repository.
///
/// Stores adoption requests in a SQLite database for persistence across
/// restarts. Uses `tokio::task::spawn_blocking` to run synchronous
/// rusqlite operations without blocking the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

/// Serialize a timestamp for storage.
fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, mapping failure to a corruption error.
fn parse_ts(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RepositoryError::corruption(format!("timestamp in column {column}")))
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist. Runs any
    /// pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` for maximum durability
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();

        if path_str != ":memory:" && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Verify WAL mode was actually enabled - SQLite can silently keep
        // DELETE mode on filesystems without shared-memory support. For
        // in-memory databases SQLite reports "memory", which is fine since
        // they are ephemeral by design.
        let is_in_memory = path_str == ":memory:";
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     The database requires WAL mode for durability guarantees.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // Current version (0 if table is empty = fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS solicitudes_adopcion (
                    id TEXT PRIMARY KEY,
                    estado TEXT NOT NULL,
                    fecha_solicitud TEXT NOT NULL,
                    fecha_creacion TEXT NOT NULL,
                    fecha_actualizacion TEXT NOT NULL,
                    fecha_aceptado TEXT,
                    fecha_rechazado TEXT,
                    nombre_apellido TEXT NOT NULL DEFAULT '',
                    edad TEXT NOT NULL DEFAULT '',
                    ocupacion TEXT NOT NULL DEFAULT '',
                    email TEXT NOT NULL DEFAULT '',
                    instagram TEXT NOT NULL DEFAULT '',
                    celular TEXT NOT NULL DEFAULT '',
                    zona TEXT NOT NULL DEFAULT '',
                    tipo_vivienda TEXT NOT NULL DEFAULT '',
                    tenencia_vivienda TEXT NOT NULL DEFAULT '',
                    cerramientos_url TEXT NOT NULL DEFAULT '',
                    nombre_peludo TEXT NOT NULL DEFAULT '',
                    datos_completos TEXT NOT NULL,
                    email_respuesta_enviado INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_estado
                    ON solicitudes_adopcion(estado);
                CREATE INDEX IF NOT EXISTS idx_respuesta_pendiente
                    ON solicitudes_adopcion(email_respuesta_enviado)
                    WHERE email_respuesta_enviado = 0;
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Future migrations would go here:
        // if from_version < 2 { ... }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }
}

const SELECT_COLUMNS: &str = "id, estado, fecha_solicitud, fecha_creacion, fecha_actualizacion, \
     fecha_aceptado, fecha_rechazado, nombre_apellido, edad, ocupacion, email, instagram, \
     celular, zona, tipo_vivienda, tenencia_vivienda, cerramientos_url, nombre_peludo, \
     datos_completos, email_respuesta_enviado";

/// Build an `AdoptionRequest` from a row selected with `SELECT_COLUMNS`.
fn request_from_row(row: &Row<'_>) -> rusqlite::Result<Result<AdoptionRequest, RepositoryError>> {
    let id: String = row.get(0)?;
    let estado: String = row.get(1)?;
    let fecha_solicitud: String = row.get(2)?;
    let fecha_creacion: String = row.get(3)?;
    let fecha_actualizacion: String = row.get(4)?;
    let fecha_aceptado: Option<String> = row.get(5)?;
    let fecha_rechazado: Option<String> = row.get(6)?;
    let fields = ApplicantFields {
        full_name: row.get(7)?,
        age: row.get(8)?,
        occupation: row.get(9)?,
        email: row.get(10)?,
        instagram: row.get(11)?,
        phone: row.get(12)?,
        zone: row.get(13)?,
        housing_type: row.get(14)?,
        housing_tenure: row.get(15)?,
        enclosures_url: row.get(16)?,
        animal_name: row.get(17)?,
    };
    let datos_completos: String = row.get(18)?;
    let email_respuesta_enviado: bool = row.get(19)?;

    Ok(build_request(
        id,
        estado,
        fecha_solicitud,
        fecha_creacion,
        fecha_actualizacion,
        fecha_aceptado,
        fecha_rechazado,
        fields,
        datos_completos,
        email_respuesta_enviado,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_request(
    id: String,
    estado: String,
    fecha_solicitud: String,
    fecha_creacion: String,
    fecha_actualizacion: String,
    fecha_aceptado: Option<String>,
    fecha_rechazado: Option<String>,
    fields: ApplicantFields,
    datos_completos: String,
    email_respuesta_enviado: bool,
) -> Result<AdoptionRequest, RepositoryError> {
    let state = RequestState::from_db_value(&estado)
        .ok_or_else(|| RepositoryError::corruption(format!("unknown estado '{estado}'")))?;
    let raw_submission = serde_json::from_str(&datos_completos)
        .map_err(|_| RepositoryError::corruption("datos_completos JSON"))?;

    Ok(AdoptionRequest {
        id: RequestId(id),
        state,
        submitted_at: parse_ts(&fecha_solicitud, "fecha_solicitud")?,
        created_at: parse_ts(&fecha_creacion, "fecha_creacion")?,
        updated_at: parse_ts(&fecha_actualizacion, "fecha_actualizacion")?,
        accepted_at: fecha_aceptado
            .map(|t| parse_ts(&t, "fecha_aceptado"))
            .transpose()?,
        rejected_at: fecha_rechazado
            .map(|t| parse_ts(&t, "fecha_rechazado"))
            .transpose()?,
        fields,
        raw_submission,
        follow_up_sent: email_respuesta_enviado,
    })
}

#[async_trait]
impl RequestRepository for SqliteRepository {
    async fn insert(&self, request: &AdoptionRequest) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let r = request.clone();
        let raw = serde_json::to_string(&r.raw_submission)
            .map_err(|e| RepositoryError::storage("serialize submission", e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO solicitudes_adopcion (
                     id, estado, fecha_solicitud, fecha_creacion, fecha_actualizacion,
                     fecha_aceptado, fecha_rechazado, nombre_apellido, edad, ocupacion,
                     email, instagram, celular, zona, tipo_vivienda, tenencia_vivienda,
                     cerramientos_url, nombre_peludo, datos_completos, email_respuesta_enviado
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                           ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                params![
                    r.id.as_str(),
                    r.state.as_str(),
                    fmt_ts(r.submitted_at),
                    fmt_ts(r.created_at),
                    fmt_ts(r.updated_at),
                    r.accepted_at.map(fmt_ts),
                    r.rejected_at.map(fmt_ts),
                    r.fields.full_name,
                    r.fields.age,
                    r.fields.occupation,
                    r.fields.email,
                    r.fields.instagram,
                    r.fields.phone,
                    r.fields.zone,
                    r.fields.housing_type,
                    r.fields.housing_tenure,
                    r.fields.enclosures_url,
                    r.fields.animal_name,
                    raw,
                    r.follow_up_sent,
                ],
            )
            .map_err(|e| RepositoryError::storage("insert", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("insert", e.to_string()))?
    }

    async fn get(&self, id: &RequestId) -> Result<Option<AdoptionRequest>, RepositoryError> {
        let conn = self.conn.clone();
        let id = id.0.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let row = conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM solicitudes_adopcion WHERE id = ?1"),
                    params![id],
                    request_from_row,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;
            row.transpose()
        })
        .await
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?
    }

    async fn apply_action(
        &self,
        id: &RequestId,
        action: StaffAction,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, RepositoryError> {
        let conn = self.conn.clone();
        let id = id.0.clone();
        let now = fmt_ts(now);
        // Only one of the two outcome columns is ever touched, chosen by
        // the action; the WHERE clause supplies the Pendiente guard.
        let sql = match action {
            StaffAction::Accept => {
                "UPDATE solicitudes_adopcion
                    SET estado = ?2, fecha_actualizacion = ?3, fecha_aceptado = ?3
                  WHERE id = ?1 AND estado = 'Pendiente'"
            }
            StaffAction::Reject => {
                "UPDATE solicitudes_adopcion
                    SET estado = ?2, fecha_actualizacion = ?3, fecha_rechazado = ?3
                  WHERE id = ?1 AND estado = 'Pendiente'"
            }
        };
        let new_state = action.target_state();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let changed = conn
                .execute(sql, params![id, new_state.as_str(), now])
                .map_err(|e| RepositoryError::storage("apply_action", e.to_string()))?;

            if changed > 0 {
                return Ok(ActionOutcome::Applied);
            }

            // Guard lost: the row is terminal or missing. The connection
            // mutex is still held, so this read is consistent with the
            // UPDATE above.
            let estado: Option<String> = conn
                .query_row(
                    "SELECT estado FROM solicitudes_adopcion WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("apply_action", e.to_string()))?;

            match estado {
                None => Ok(ActionOutcome::NotFound),
                Some(estado) => {
                    let state = RequestState::from_db_value(&estado).ok_or_else(|| {
                        RepositoryError::corruption(format!("unknown estado '{estado}'"))
                    })?;
                    if state.is_terminal() {
                        Ok(ActionOutcome::AlreadyDecided(state))
                    } else {
                        Err(RepositoryError::storage(
                            "apply_action",
                            "pending row did not update",
                        ))
                    }
                }
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("apply_action", e.to_string()))?
    }

    async fn due_follow_ups(
        &self,
        action: StaffAction,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<AdoptionRequest>, RepositoryError> {
        let conn = self.conn.clone();
        let cutoff = fmt_ts(cutoff);
        let estado = action.target_state().as_str();
        let outcome_column = match action {
            StaffAction::Accept => "fecha_aceptado",
            StaffAction::Reject => "fecha_rechazado",
        };

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM solicitudes_adopcion
                      WHERE estado = ?1
                        AND email_respuesta_enviado = 0
                        AND {outcome_column} IS NOT NULL
                        AND {outcome_column} <= ?2"
                ))
                .map_err(|e| RepositoryError::storage("due_follow_ups", e.to_string()))?;

            let rows = stmt
                .query_map(params![estado, cutoff], request_from_row)
                .map_err(|e| RepositoryError::storage("due_follow_ups", e.to_string()))?;

            let mut results = Vec::new();
            for row in rows {
                let request =
                    row.map_err(|e| RepositoryError::storage("due_follow_ups", e.to_string()))??;
                results.push(request);
            }
            Ok(results)
        })
        .await
        .map_err(|e| RepositoryError::storage("due_follow_ups", e.to_string()))?
    }

    async fn claim_follow_up(
        &self,
        id: &RequestId,
        action: StaffAction,
    ) -> Result<bool, RepositoryError> {
        let conn = self.conn.clone();
        let id = id.0.clone();
        let estado = action.target_state().as_str();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            // Single conditional UPDATE: the caller wins the claim iff the
            // flag was still unset and the state still matches. A losing
            // concurrent sweep sees zero changed rows and skips the send.
            let changed = conn
                .execute(
                    "UPDATE solicitudes_adopcion
                        SET email_respuesta_enviado = 1
                      WHERE id = ?1 AND email_respuesta_enviado = 0 AND estado = ?2",
                    params![id, estado],
                )
                .map_err(|e| RepositoryError::storage("claim_follow_up", e.to_string()))?;
            Ok(changed > 0)
        })
        .await
        .map_err(|e| RepositoryError::storage("claim_follow_up", e.to_string()))?
    }

    async fn release_follow_up(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let id = id.0.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE solicitudes_adopcion SET email_respuesta_enviado = 0 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| RepositoryError::storage("release_follow_up", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("release_follow_up", e.to_string()))?
    }

    async fn pending(&self) -> Result<Vec<AdoptionRequest>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM solicitudes_adopcion
                      WHERE estado = 'Pendiente'
                        AND fecha_aceptado IS NULL
                        AND fecha_rechazado IS NULL"
                ))
                .map_err(|e| RepositoryError::storage("pending", e.to_string()))?;

            let rows = stmt
                .query_map([], request_from_row)
                .map_err(|e| RepositoryError::storage("pending", e.to_string()))?;

            let mut results = Vec::new();
            for row in rows {
                let request =
                    row.map_err(|e| RepositoryError::storage("pending", e.to_string()))??;
                results.push(request);
            }
            Ok(results)
        })
        .await
        .map_err(|e| RepositoryError::storage("pending", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::request::Submission;

    fn sample_request(now: DateTime<Utc>) -> AdoptionRequest {
        let payload = json!({
            "Timestamp": "2026-08-01T10:30:00Z",
            "Nombre y Apellido": "Ana García",
            "Edad": "34",
            "Email": ["ana@example.com"],
            "Zona normalizada": "Palermo",
            "Nombre del peludo en el que estas interesado/a.En caso de que no tenga un nombre asignado por nosotras, describir su aspecto.": "Luna",
        });
        let submission = match payload {
            serde_json::Value::Object(map) => Submission::new(map),
            _ => unreachable!(),
        };
        AdoptionRequest::from_submission(&submission, now)
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let now = Utc::now();
        let request = sample_request(now);

        repo.insert(&request).await.unwrap();
        let fetched = repo.get(&request.id).await.unwrap().unwrap();

        assert_eq!(fetched.id, request.id);
        assert_eq!(fetched.state, RequestState::Pending);
        assert_eq!(fetched.fields.full_name, "Ana García");
        assert_eq!(fetched.fields.email, "ana@example.com");
        assert_eq!(fetched.accepted_at, None);
        assert_eq!(fetched.rejected_at, None);
        assert!(!fetched.follow_up_sent);
        assert_eq!(fetched.raw_submission["Edad"], json!("34"));
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_fails() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let request = sample_request(Utc::now());
        repo.insert(&request).await.unwrap();
        assert!(repo.insert(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let missing = repo.get(&RequestId::from("SOL-DEADBEEF")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_accept_sets_state_and_timestamp() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let request = sample_request(Utc::now());
        repo.insert(&request).await.unwrap();

        let decided_at = Utc::now();
        let outcome = repo
            .apply_action(&request.id, StaffAction::Accept, decided_at)
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Applied);

        let fetched = repo.get(&request.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RequestState::Accepted);
        assert!(fetched.accepted_at.is_some());
        assert_eq!(fetched.rejected_at, None);
        assert!(!fetched.follow_up_sent);
    }

    #[tokio::test]
    async fn test_action_is_guarded_once_terminal() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let request = sample_request(Utc::now());
        repo.insert(&request).await.unwrap();

        let first = Utc::now();
        repo.apply_action(&request.id, StaffAction::Accept, first)
            .await
            .unwrap();

        // A later rejection must not flip the terminal state.
        let outcome = repo
            .apply_action(&request.id, StaffAction::Reject, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::AlreadyDecided(RequestState::Accepted));

        let fetched = repo.get(&request.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RequestState::Accepted);
        assert_eq!(fetched.rejected_at, None);
    }

    #[tokio::test]
    async fn test_action_on_missing_id_is_not_found() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let outcome = repo
            .apply_action(&RequestId::from("SOL-DEADBEEF"), StaffAction::Accept, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_due_follow_ups_respects_cutoff() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let now = Utc::now();

        let old = sample_request(now);
        repo.insert(&old).await.unwrap();
        repo.apply_action(&old.id, StaffAction::Accept, now - Duration::hours(25))
            .await
            .unwrap();

        let fresh = sample_request(now);
        repo.insert(&fresh).await.unwrap();
        repo.apply_action(&fresh.id, StaffAction::Accept, now - Duration::hours(1))
            .await
            .unwrap();

        let due = repo
            .due_follow_ups(StaffAction::Accept, now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, old.id);
    }

    #[tokio::test]
    async fn test_due_follow_ups_skips_already_sent() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let now = Utc::now();

        let request = sample_request(now);
        repo.insert(&request).await.unwrap();
        repo.apply_action(&request.id, StaffAction::Reject, now - Duration::hours(3))
            .await
            .unwrap();
        assert!(repo
            .claim_follow_up(&request.id, StaffAction::Reject)
            .await
            .unwrap());

        let due = repo
            .due_follow_ups(StaffAction::Reject, now - Duration::hours(2))
            .await
            .unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn test_claim_follow_up_wins_exactly_once() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let now = Utc::now();
        let request = sample_request(now);
        repo.insert(&request).await.unwrap();
        repo.apply_action(&request.id, StaffAction::Accept, now)
            .await
            .unwrap();

        assert!(repo
            .claim_follow_up(&request.id, StaffAction::Accept)
            .await
            .unwrap());
        // A second claim (another sweep racing us) must lose.
        assert!(!repo
            .claim_follow_up(&request.id, StaffAction::Accept)
            .await
            .unwrap());

        let fetched = repo.get(&request.id).await.unwrap().unwrap();
        assert!(fetched.follow_up_sent);
    }

    #[tokio::test]
    async fn test_claim_follow_up_requires_matching_state() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let request = sample_request(Utc::now());
        repo.insert(&request).await.unwrap();

        // Still pending: no claim possible in either direction.
        assert!(!repo
            .claim_follow_up(&request.id, StaffAction::Accept)
            .await
            .unwrap());
        assert!(!repo
            .claim_follow_up(&request.id, StaffAction::Reject)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_release_follow_up_reopens_claim() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let now = Utc::now();
        let request = sample_request(now);
        repo.insert(&request).await.unwrap();
        repo.apply_action(&request.id, StaffAction::Accept, now)
            .await
            .unwrap();

        assert!(repo
            .claim_follow_up(&request.id, StaffAction::Accept)
            .await
            .unwrap());
        repo.release_follow_up(&request.id).await.unwrap();
        assert!(repo
            .claim_follow_up(&request.id, StaffAction::Accept)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_pending_lists_only_undecided_rows() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let now = Utc::now();

        let pending = sample_request(now);
        repo.insert(&pending).await.unwrap();

        let decided = sample_request(now);
        repo.insert(&decided).await.unwrap();
        repo.apply_action(&decided.id, StaffAction::Accept, now)
            .await
            .unwrap();

        let rows = repo.pending().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_schema_version_is_recorded() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let conn = repo.conn.lock().unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }
}
