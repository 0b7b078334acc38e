//! HTML bodies for emails and action pages.
//!
//! Templates live next to this module as plain HTML files, embedded with
//! `include_str!` and filled in with `{placeholder}` replacement. All
//! applicant-supplied values are HTML-escaped before substitution.

use crate::request::{form_fields, AdoptionRequest, RequestId, RequestState, StaffAction,
    Submission};

const INTAKE_TEMPLATE: &str = include_str!("templates/intake.html");
const OUTCOME_ACCEPTED_TEMPLATE: &str = include_str!("templates/outcome_accepted.html");
const OUTCOME_REJECTED_TEMPLATE: &str = include_str!("templates/outcome_rejected.html");
const DIGEST_TEMPLATE: &str = include_str!("templates/digest.html");
const DIGEST_ITEM_TEMPLATE: &str = include_str!("templates/digest_item.html");
const ACTION_CONFIRMATION_TEMPLATE: &str = include_str!("templates/action_confirmation.html");
const ACTION_ALREADY_DECIDED_TEMPLATE: &str =
    include_str!("templates/action_already_decided.html");
const ACTION_NOT_FOUND_TEMPLATE: &str = include_str!("templates/action_not_found.html");
const ACTION_INVALID_TEMPLATE: &str = include_str!("templates/action_invalid.html");

/// Intake template placeholders and the form question each one carries.
const INTAKE_FIELDS: &[(&str, &str)] = &[
    ("{nombre_apellido}", form_fields::FULL_NAME),
    ("{edad}", form_fields::AGE),
    ("{ocupacion}", form_fields::OCCUPATION),
    ("{email}", form_fields::EMAIL),
    ("{instagram}", form_fields::INSTAGRAM),
    ("{celular}", form_fields::PHONE),
    ("{zona}", form_fields::ZONE),
    ("{tipo_vivienda}", form_fields::HOUSING_TYPE),
    ("{tenencia_vivienda}", form_fields::HOUSING_TENURE),
    ("{consulta_duenos}", form_fields::LANDLORD_CONSULTED),
    ("{tiene_cerramientos}", form_fields::HAS_ENCLOSURES),
    ("{cerramientos_url}", form_fields::ENCLOSURES_MEDIA),
    ("{plan_cerramientos}", form_fields::ENCLOSURES_PLAN),
    ("{otros_animales}", form_fields::HAS_OTHER_ANIMALS),
    ("{detalle_animales}", form_fields::OTHER_ANIMALS_DETAIL),
    ("{vacunados}", form_fields::VACCINATED),
    ("{motivo_no_vacunados}", form_fields::NOT_VACCINATED_REASON),
    ("{animales_previos}", form_fields::HAD_ANIMALS_BEFORE),
    ("{que_ocurrio}", form_fields::WHAT_HAPPENED),
    ("{alimentacion_actual}", form_fields::CURRENT_FOOD),
    ("{alimento_previo}", form_fields::PREVIOUS_FOOD),
    ("{ninos}", form_fields::CHILDREN),
    ("{tiempo_solo}", form_fields::TIME_ALONE),
    ("{vacaciones}", form_fields::VACATION_PLAN),
    ("{mudanza}", form_fields::MOVING_PLAN),
    ("{nombre_peludo}", form_fields::ANIMAL_NAME),
];

/// Minimal HTML escaping for values interpolated into templates.
fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Accept/reject action links for a request id.
fn action_urls(base_url: &str, id: &RequestId) -> (String, String) {
    (
        format!("{base_url}/action?action=aceptar&id={id}"),
        format!("{base_url}/action?action=rechazar&id={id}"),
    )
}

pub fn staff_intake_subject(full_name: &str) -> String {
    format!("🐾 Nueva Solicitud - {full_name}")
}

/// Staff notification email for a freshly received submission, with
/// every form field grouped into sections plus the two action links.
pub fn staff_intake_email(id: &RequestId, submission: &Submission, base_url: &str) -> String {
    let (url_aceptar, url_rechazar) = action_urls(base_url, id);

    let html = INTAKE_TEMPLATE
        .replace("{id}", &escape(id.as_str()))
        .replace("{url_aceptar}", &url_aceptar)
        .replace("{url_rechazar}", &url_rechazar);

    INTAKE_FIELDS.iter().fold(html, |html, (placeholder, question)| {
        html.replace(placeholder, &escape(&submission.display_value(question)))
    })
}

pub fn outcome_subject(action: StaffAction) -> &'static str {
    match action {
        StaffAction::Accept => "✅ Solicitud Aceptada",
        StaffAction::Reject => "Sobre tu solicitud de adopción",
    }
}

/// Applicant-facing outcome email. Empty name/animal fall back to the
/// generic greetings the original messages use.
pub fn applicant_outcome_email(action: StaffAction, full_name: &str, animal_name: &str) -> String {
    let nombre = if full_name.is_empty() {
        "Solicitante"
    } else {
        full_name
    };
    let peludo = if animal_name.is_empty() {
        "el peludo"
    } else {
        animal_name
    };

    let template = match action {
        StaffAction::Accept => OUTCOME_ACCEPTED_TEMPLATE,
        StaffAction::Reject => OUTCOME_REJECTED_TEMPLATE,
    };

    template
        .replace("{nombre}", &escape(nombre))
        .replace("{nombre_peludo}", &escape(peludo))
}

pub fn digest_subject(count: usize) -> String {
    format!("⏳ {count} Solicitud(es) Pendiente(s)")
}

/// Staff digest listing every pending request with its action links.
pub fn pending_digest_email(requests: &[AdoptionRequest], base_url: &str) -> String {
    let items: String = requests
        .iter()
        .map(|request| {
            let (url_aceptar, url_rechazar) = action_urls(base_url, &request.id);
            DIGEST_ITEM_TEMPLATE
                .replace("{nombre_apellido}", &escape(&request.fields.full_name))
                .replace("{email}", &escape(&request.fields.email))
                .replace("{nombre_peludo}", &escape(&request.fields.animal_name))
                .replace("{zona}", &escape(&request.fields.zone))
                .replace("{id}", &escape(request.id.as_str()))
                .replace("{url_aceptar}", &url_aceptar)
                .replace("{url_rechazar}", &url_rechazar)
        })
        .collect();

    DIGEST_TEMPLATE
        .replace("{count}", &requests.len().to_string())
        .replace("{items}", &items)
}

/// Confirmation page shown after a decision is applied.
pub fn action_confirmation_page(action: StaffAction, id: &RequestId) -> String {
    let (icono, titulo, color) = match action {
        StaffAction::Accept => ("✅", "ACEPTADA", "#34a853"),
        StaffAction::Reject => ("❌", "RECHAZADA", "#ea4335"),
    };

    ACTION_CONFIRMATION_TEMPLATE
        .replace("{icono}", icono)
        .replace("{titulo}", titulo)
        .replace("{color}", color)
        .replace("{estado}", action.target_state().as_str())
        .replace("{id}", &escape(id.as_str()))
}

/// Page shown when the request was already terminal; nothing changed.
pub fn action_already_decided_page(state: RequestState, id: &RequestId) -> String {
    ACTION_ALREADY_DECIDED_TEMPLATE
        .replace("{estado}", state.as_str())
        .replace("{id}", &escape(id.as_str()))
}

pub fn action_not_found_page(id: &RequestId) -> String {
    ACTION_NOT_FOUND_TEMPLATE.replace("{id}", &escape(id.as_str()))
}

pub fn invalid_action_page() -> String {
    ACTION_INVALID_TEMPLATE.to_string()
}
