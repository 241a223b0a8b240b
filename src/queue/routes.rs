//! The queue server's HTTP surface.
//!
//! All answers are JSON. Client-facing endpoints are open; every `worker_*`
//! endpoint requires the shared secret (query parameter on GETs, form field
//! on the poll POST). Protocol errors are reported in the body as
//! `status`/`response` fields — a wrong shared secret included, which is
//! answered `{"response": "bad_secret"}`. HTTP status codes are reserved
//! for unknown confirmation codes (404), submit validation (400), and
//! genuine server faults (500).

use std::collections::HashMap;
use std::sync::Mutex;

use actix_web::web;
use actix_web::HttpResponse;
use chrono::Utc;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::Task;
use crate::domain::ValidationError;
use crate::queue::state::ConfirmOutcome;
use crate::queue::state::PollOutcome;
use crate::queue::state::QueueState;
use crate::registry::ModelRegistry;
use crate::utils::error_400;

/// Wrapper for the shared request secret (a raw `Secret<String>` would
/// collide with other `Data`-mounted strings).
#[derive(Clone)]
pub struct RequestSecret(pub Secret<String>);

/// Like every other protocol error, a wrong secret is reported in the body,
/// not as an HTTP status code.
fn secret_mismatch(
    provided: Option<&str>,
    expected: &RequestSecret,
) -> Option<HttpResponse> {
    if provided == Some(expected.0.expose_secret().as_str()) {
        None
    } else {
        Some(HttpResponse::Ok().json(json!({"response": "bad_secret"})))
    }
}

#[derive(Deserialize)]
pub struct SecretQuery {
    secret: String,
}

#[derive(Deserialize)]
pub struct CreateForm {
    task_json: String,
}

/// `POST /client_model_create`
///
/// Accepts a serialized task from the web front-end, validates it against
/// the registry, and holds it unconfirmed. Responds with the confirmation
/// code and the task stamped with its assigned id.
#[tracing::instrument(name = "Creating task", skip_all)]
pub async fn client_model_create(
    form: web::Form<CreateForm>,
    state: web::Data<Mutex<QueueState>>,
    registry: web::Data<ModelRegistry>,
) -> Result<HttpResponse, actix_web::Error> {
    let task: Task = serde_json::from_str(&form.task_json).map_err(error_400)?;

    let spec = registry
        .get(&task.model_name, &task.model_version)
        .ok_or_else(|| match registry.get_latest(&task.model_name) {
            None => ValidationError::UnknownModel(task.model_name.clone()),
            Some(_) => ValidationError::UnknownVersion {
                model: task.model_name.clone(),
                version: task.model_version.clone(),
            },
        })
        .map_err(error_400)?;
    spec.validate_parameters(&task.model_parameters)
        .map_err(error_400)?;

    let (code, stamped) = state.lock().unwrap().submit(task, Utc::now());
    tracing::info!(task_id = %stamped.task_id, model = %stamped.model_name, "task created");
    Ok(HttpResponse::Ok().json(json!({"response": {"code": code, "task": stamped}})))
}

/// `GET /client_confirm/{code}`
///
/// Consumes the confirmation code. An unknown code is the one protocol
/// error that also carries an HTTP status (404).
#[tracing::instrument(name = "Confirming task", skip_all)]
pub async fn client_confirm(
    code: web::Path<String>,
    state: web::Data<Mutex<QueueState>>,
) -> HttpResponse {
    match state.lock().unwrap().confirm(&code, Utc::now()) {
        ConfirmOutcome::Okay => {
            tracing::info!("confirmation accepted");
            HttpResponse::Ok().json(json!({"response": "okay"}))
        }
        ConfirmOutcome::Expired => HttpResponse::Ok().json(json!({"response": "expired"})),
        ConfirmOutcome::NotFound => HttpResponse::NotFound().json(json!({"response": "notfound"})),
    }
}

/// `GET /client_queue_has_workers`
pub async fn client_queue_has_workers(state: web::Data<Mutex<QueueState>>) -> HttpResponse {
    let has_workers = state.lock().unwrap().has_workers(Utc::now());
    HttpResponse::Ok().json(json!({"response": {"has_workers": has_workers}}))
}

/// `GET /worker_info` — health probe for worker boot.
pub async fn worker_info(
    query: web::Query<SecretQuery>,
    secret: web::Data<RequestSecret>,
) -> HttpResponse {
    if let Some(denied) = secret_mismatch(Some(&query.secret), &secret) {
        return denied;
    }
    HttpResponse::Ok().json(json!({"response": "okay"}))
}

#[derive(Deserialize)]
pub struct WorkForm {
    secret: String,
    model_versions_json: String,
}

/// `POST /worker_work_task`
///
/// The body carries the worker's supported `{model -> [versions]}` map. The
/// two empty outcomes stay distinct so workers can log them differently.
#[tracing::instrument(name = "Handing out task", skip_all)]
pub async fn worker_work_task(
    form: web::Form<WorkForm>,
    state: web::Data<Mutex<QueueState>>,
    secret: web::Data<RequestSecret>,
) -> Result<HttpResponse, actix_web::Error> {
    if let Some(denied) = secret_mismatch(Some(&form.secret), &secret) {
        return Ok(denied);
    }
    let supported: HashMap<String, Vec<String>> =
        serde_json::from_str(&form.model_versions_json).map_err(error_400)?;

    let outcome = state.lock().unwrap().poll(&supported, Utc::now());
    Ok(match outcome {
        PollOutcome::Task(task) => {
            tracing::info!(task_id = %task.task_id, model = %task.model_name, "task handed out");
            HttpResponse::Ok().json(json!({"task": task}))
        }
        PollOutcome::NoVersion => HttpResponse::Ok().json(json!({"status": "no_version"})),
        PollOutcome::EmptyQueue => HttpResponse::Ok().json(json!({"status": "empty_queue"})),
    })
}

fn yes_no(still_ours: bool) -> HttpResponse {
    let answer = if still_ours { "yes" } else { "no" };
    HttpResponse::Ok().json(json!({"response": answer}))
}

/// `GET /worker_keep_alive_task/{taskId}`
pub async fn worker_keep_alive_task(
    task_id: web::Path<Uuid>,
    query: web::Query<SecretQuery>,
    state: web::Data<Mutex<QueueState>>,
    secret: web::Data<RequestSecret>,
) -> HttpResponse {
    if let Some(denied) = secret_mismatch(Some(&query.secret), &secret) {
        return denied;
    }
    yes_no(state.lock().unwrap().heartbeat(*task_id, Utc::now()))
}

/// `GET /worker_has_task/{taskId}` — ownership probe, no state change.
pub async fn worker_has_task(
    task_id: web::Path<Uuid>,
    query: web::Query<SecretQuery>,
    state: web::Data<Mutex<QueueState>>,
    secret: web::Data<RequestSecret>,
) -> HttpResponse {
    if let Some(denied) = secret_mismatch(Some(&query.secret), &secret) {
        return denied;
    }
    yes_no(state.lock().unwrap().has_task(*task_id))
}

/// `GET /worker_succeed_task/{taskId}` — idempotent; a late or duplicate
/// ack is accepted silently.
#[tracing::instrument(name = "Recording success", skip_all, fields(task_id = %*task_id))]
pub async fn worker_succeed_task(
    task_id: web::Path<Uuid>,
    query: web::Query<SecretQuery>,
    state: web::Data<Mutex<QueueState>>,
    secret: web::Data<RequestSecret>,
) -> HttpResponse {
    if let Some(denied) = secret_mismatch(Some(&query.secret), &secret) {
        return denied;
    }
    state.lock().unwrap().succeed(*task_id, Utc::now());
    HttpResponse::Ok().json(json!({"response": "okay"}))
}

/// `GET /worker_failed_task/{taskId}` — terminal; failed tasks are not
/// requeued (a failure here means the model itself rejected the input).
#[tracing::instrument(name = "Recording failure", skip_all, fields(task_id = %*task_id))]
pub async fn worker_failed_task(
    task_id: web::Path<Uuid>,
    query: web::Query<SecretQuery>,
    state: web::Data<Mutex<QueueState>>,
    secret: web::Data<RequestSecret>,
) -> HttpResponse {
    if let Some(denied) = secret_mismatch(Some(&query.secret), &secret) {
        return denied;
    }
    state.lock().unwrap().fail(*task_id, Utc::now());
    HttpResponse::Ok().json(json!({"response": "okay"}))
}
