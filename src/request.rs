//! Domain types for adoption requests.
//!
//! A request moves through a small, monotonic lifecycle:
//! `Pending -> Accepted` or `Pending -> Rejected`, and never back.
//! The transition is guarded: a request that is already terminal cannot
//! be flipped by a second (or crossed) staff decision.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Newtype for the display-formatted request id (`SOL-XXXXXXXX`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a fresh id: `SOL-` followed by the first 8 hex characters
    /// of a v4 UUID, uppercased.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("SOL-{}", hex[..8].to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a request.
///
/// The database and all user-facing surfaces use the Spanish display
/// strings (`Pendiente`, `Aceptado`, `Rechazado`); the stored value is
/// exactly `as_str()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending,
    Accepted,
    Rejected,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Pending => "Pendiente",
            RequestState::Accepted => "Aceptado",
            RequestState::Rejected => "Rechazado",
        }
    }

    /// Parse the stored database value.
    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "Pendiente" => Some(RequestState::Pending),
            "Aceptado" => Some(RequestState::Accepted),
            "Rechazado" => Some(RequestState::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A staff decision, as carried in the action-link query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffAction {
    Accept,
    Reject,
}

impl StaffAction {
    /// Parse the `action` query parameter. The generated links use the
    /// Spanish tokens; the English aliases are accepted as well. Anything
    /// else is rejected before touching storage.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "aceptar" | "accept" => Some(StaffAction::Accept),
            "rechazar" | "reject" => Some(StaffAction::Reject),
            _ => None,
        }
    }

    /// The query-string token for building action links.
    pub fn token(self) -> &'static str {
        match self {
            StaffAction::Accept => "aceptar",
            StaffAction::Reject => "rechazar",
        }
    }

    /// The terminal state this action drives a pending request into.
    pub fn target_state(self) -> RequestState {
        match self {
            StaffAction::Accept => RequestState::Accepted,
            StaffAction::Reject => RequestState::Rejected,
        }
    }
}

/// Guarded transition function.
///
/// Returns the new state for `Pending` requests and `None` for requests
/// that are already terminal: repeated or crossed decisions are no-ops.
pub fn apply_action(state: RequestState, action: StaffAction) -> Option<RequestState> {
    match state {
        RequestState::Pending => Some(action.target_state()),
        RequestState::Accepted | RequestState::Rejected => None,
    }
}

/// Exact question titles of the Google Form, used both to extract the
/// normalized columns and to render the staff notification email.
pub mod form_fields {
    pub const TIMESTAMP: &str = "Timestamp";
    pub const FULL_NAME: &str = "Nombre y Apellido";
    pub const AGE: &str = "Edad";
    pub const OCCUPATION: &str = "Ocupación";
    pub const EMAIL: &str = "Email";
    pub const INSTAGRAM: &str = "Instagram";
    pub const PHONE: &str = "Celular de contacto";
    pub const ZONE: &str = "Zona normalizada";
    pub const HOUSING_TYPE: &str = "¿Vivís en casa o departamento?";
    pub const HOUSING_TENURE: &str = "Tipo de tenencia de la vivienda";
    pub const LANDLORD_CONSULTED: &str = "En caso de que sea alquilada, prestada o compartida: ¿consultaste previamente con los dueños?";
    pub const HAS_ENCLOSURES: &str =
        "¿Tenes cerramientos/protecciones en ventanas/balcón/patio/terraza?";
    pub const ENCLOSURES_MEDIA: &str =
        "En este espacio cargue las fotos o un video de los cerramientos. No mas de 100MB";
    pub const ENCLOSURES_PLAN: &str = "En caso de no tener, comentanos si estás dispuesto a ponerlos y cuándo, sino no podremos considerar su solicitud de adopción.";
    pub const HAS_OTHER_ANIMALS: &str = "¿Tenes otros animales?";
    pub const OTHER_ANIMALS_DETAIL: &str =
        "Contanos un poco más acerca de si son gatos o perros, cuantos y que edades tienen!";
    pub const VACCINATED: &str = "¿Están vacunados y/o castrados?";
    pub const NOT_VACCINATED_REASON: &str = "En caso de no estar vacunados y/o castrados, contanos los motivos que te llevaron a esa decisión.";
    pub const HAD_ANIMALS_BEFORE: &str = "¿Tuviste animales previamente?";
    pub const WHAT_HAPPENED: &str = "Contanos que ocurrió con ellos";
    pub const CURRENT_FOOD: &str =
        "¿Qué alimentación le/s das? (Detalle marca si es alimento balanceado)";
    pub const PREVIOUS_FOOD: &str = "¿Qué alimento le/s dabas?";
    pub const CHILDREN: &str = "¿Hay niños pequeños en el domicilio? Aclarar sus edades.";
    pub const TIME_ALONE: &str = "¿Cuánto tiempo estaría solo el peludo en su vida cotidiana?";
    pub const VACATION_PLAN: &str = "¿Qué harías con el peludo en caso de vacaciones?";
    pub const MOVING_PLAN: &str = "¿Qué harías con el peludo en caso de mudanza?";
    pub const ANIMAL_NAME: &str = "Nombre del peludo en el que estas interesado/a.En caso de que no tenga un nombre asignado por nosotras, describir su aspecto.";
}

/// A raw form submission as relayed by the Apps Script webhook.
///
/// Keys are the literal question titles; values are free-form answers,
/// sometimes wrapped in singleton arrays (checkbox questions). Lookup
/// normalizes by taking the first element and defaulting to the empty
/// string when the question is absent.
#[derive(Debug, Clone)]
pub struct Submission {
    raw: Map<String, Value>,
}

impl Submission {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self { raw }
    }

    /// Normalized answer for a question: first element of a list answer,
    /// the string itself for a scalar, `""` when absent or non-textual.
    pub fn value(&self, question: &str) -> String {
        match self.raw.get(question) {
            Some(Value::Array(items)) => items
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Like [`value`](Self::value) but substituting the display
    /// placeholder for empty answers, for email rendering.
    pub fn display_value(&self, question: &str) -> String {
        let value = self.value(question);
        if value.is_empty() {
            "No especificado".to_string()
        } else {
            value
        }
    }

    /// The submission's own declared timestamp, falling back to `now`
    /// when absent or unparseable.
    pub fn submitted_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let raw = self.value(form_fields::TIMESTAMP);
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// The verbatim payload, retained for audit/redisplay.
    pub fn raw_payload(&self) -> Value {
        Value::Object(self.raw.clone())
    }
}

/// Normalized columns extracted from a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicantFields {
    pub full_name: String,
    pub age: String,
    pub occupation: String,
    pub email: String,
    pub instagram: String,
    pub phone: String,
    pub zone: String,
    pub housing_type: String,
    pub housing_tenure: String,
    pub enclosures_url: String,
    pub animal_name: String,
}

impl ApplicantFields {
    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            full_name: submission.value(form_fields::FULL_NAME),
            age: submission.value(form_fields::AGE),
            occupation: submission.value(form_fields::OCCUPATION),
            email: submission.value(form_fields::EMAIL),
            instagram: submission.value(form_fields::INSTAGRAM),
            phone: submission.value(form_fields::PHONE),
            zone: submission.value(form_fields::ZONE),
            housing_type: submission.value(form_fields::HOUSING_TYPE),
            housing_tenure: submission.value(form_fields::HOUSING_TENURE),
            enclosures_url: submission.value(form_fields::ENCLOSURES_MEDIA),
            animal_name: submission.value(form_fields::ANIMAL_NAME),
        }
    }
}

/// One adoption application record with lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionRequest {
    pub id: RequestId,
    pub state: RequestState,
    /// Declared by the submission itself; immutable after creation.
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, only on the matching transition. At most one of
    /// `accepted_at`/`rejected_at` is ever non-null.
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub fields: ApplicantFields,
    /// The full original payload, verbatim.
    pub raw_submission: Value,
    /// True once the applicant-facing outcome email has been claimed for
    /// dispatch. Can only become true while the state is terminal.
    pub follow_up_sent: bool,
}

impl AdoptionRequest {
    /// Build a fresh `Pending` record from a submission.
    pub fn from_submission(submission: &Submission, now: DateTime<Utc>) -> Self {
        Self {
            id: RequestId::generate(),
            state: RequestState::Pending,
            submitted_at: submission.submitted_at(now),
            created_at: now,
            updated_at: now,
            accepted_at: None,
            rejected_at: None,
            fields: ApplicantFields::from_submission(submission),
            raw_submission: submission.raw_payload(),
            follow_up_sent: false,
        }
    }

    /// The timestamp of the transition into the given terminal state.
    pub fn outcome_timestamp(&self, state: RequestState) -> Option<DateTime<Utc>> {
        match state {
            RequestState::Accepted => self.accepted_at,
            RequestState::Rejected => self.rejected_at,
            RequestState::Pending => None,
        }
    }
}
