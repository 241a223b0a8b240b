//! Front-end request handlers.
//!
//! Every handler is a thin translation layer: parse and validate the
//! browser's input, make at most two queue round trips, render a page.
//! Nothing here ever waits on a model execution.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use actix_web::http::header::ContentType;
use actix_web::web;
use actix_web::HttpResponse;
use chrono::DateTime;
use chrono::Utc;

use crate::configuration::WebSettings;
use crate::domain::EmailAddress;
use crate::domain::ParameterValue;
use crate::domain::Task;
use crate::domain::ValidationError;
use crate::email_client::EmailClient;
use crate::queue_client::ConfirmStatus;
use crate::queue_client::QueueClient;
use crate::queue_client::QueueClientError;
use crate::registry::ModelRegistry;
use crate::web::render;

/// Last instant a queue probe reported live workers. A simple cache so we
/// don't overload the queue just to see that it has workers.
pub struct WorkerCheckCache(pub Mutex<Option<DateTime<Utc>>>);

/// Wrapper for the front-end's public base URL (a raw `String` would
/// conflict with other `Data`-mounted strings).
pub struct AppBaseUrl(pub String);

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type(ContentType::html()).body(body)
}

const QUEUE_DOWN_TEXT: &str = "We are sorry. Our queuing server appears to be down at the \
                               moment, please try again later.";
const WORKERS_DOWN_TEXT: &str = "We are sorry, our model worker machines appear to be down at \
                                 the moment. Please try again later.";

/// `GET /`
pub async fn index(registry: web::Data<ModelRegistry>) -> HttpResponse {
    html(render::index_page(&registry.latest_models()))
}

/// `GET /models/{name}`
///
/// Before showing the form, make sure someone could actually run the model:
/// ask the queue whether any worker polled recently, trusting a positive
/// answer for `keep_alive_timeout` seconds.
#[tracing::instrument(name = "Rendering model form", skip_all, fields(model = %name.as_str()))]
pub async fn model_form(
    name: web::Path<String>,
    registry: web::Data<ModelRegistry>,
    queue: web::Data<QueueClient>,
    cache: web::Data<WorkerCheckCache>,
    web_cfg: web::Data<WebSettings>,
) -> HttpResponse {
    let Some(spec) = registry.get_latest(&name) else {
        return HttpResponse::NotFound()
            .content_type(ContentType::html())
            .body(render::message_page(
                "Unknown model",
                "No model by that name is registered.",
            ));
    };

    let fresh = cache
        .0
        .lock()
        .unwrap()
        .map(|at| Utc::now() - at <= web_cfg.keep_alive_timeout())
        .unwrap_or(false);
    if !fresh {
        match queue.has_workers().await {
            Ok(true) => *cache.0.lock().unwrap() = Some(Utc::now()),
            Ok(false) => return html(render::message_page("No workers", WORKERS_DOWN_TEXT)),
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, "workers pre-flight check failed");
                return html(render::message_page("Queue unavailable", QUEUE_DOWN_TEXT));
            }
        }
    }

    html(render::model_form_page(&spec, None))
}

/// Build a task from the submitted form fields, reporting the first
/// validation problem verbatim.
fn task_from_form(
    spec: &crate::domain::ModelSpec,
    form: &HashMap<String, String>,
) -> Result<Task, ValidationError> {
    let email = form
        .get("email")
        .cloned()
        .ok_or_else(|| ValidationError::BadEmail("An email address is required".to_string()))?;
    let email_address = EmailAddress::parse(email).map_err(ValidationError::BadEmail)?;

    let mut parameters: BTreeMap<String, ParameterValue> = BTreeMap::new();
    for parameter in &spec.parameters {
        let raw = form.get(&parameter.name).map(String::as_str);
        parameters.insert(parameter.name.clone(), parameter.parse_form_value(raw)?);
    }

    Ok(Task {
        task_id: uuid::Uuid::nil(), // assigned by the queue
        model_name: spec.short_name.clone(),
        model_version: spec.version.clone(),
        email_address,
        model_parameters: parameters,
    })
}

/// `POST /models/{name}`
///
/// Validation failures re-render the form with the message; they never
/// reach the queue. A successful submission triggers the confirmation
/// email with the link that releases the task.
#[tracing::instrument(name = "Submitting model run", skip_all, fields(model = %name.as_str()))]
pub async fn model_submit(
    name: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
    registry: web::Data<ModelRegistry>,
    queue: web::Data<QueueClient>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<AppBaseUrl>,
) -> HttpResponse {
    let Some(version) = form.get("modelVersion") else {
        return HttpResponse::BadRequest().finish();
    };
    let Some(spec) = registry.get(&name, version) else {
        return HttpResponse::NotFound()
            .content_type(ContentType::html())
            .body(render::message_page(
                "Unknown model",
                "No model by that name and version is registered.",
            ));
    };

    let task = match task_from_form(&spec, &form) {
        Ok(task) => task,
        Err(e) => return html(render::model_form_page(&spec, Some(&e.to_string()))),
    };

    let (code, stamped) = match queue.create_task(&task).await {
        Ok(created) => created,
        // the queue re-validates; its wording is shown to the submitter
        Err(QueueClientError::Rejected(message)) => {
            return html(render::model_form_page(&spec, Some(&message)));
        }
        Err(e) => {
            tracing::error!(error.cause_chain = ?e, "task submission to queue failed");
            return html(render::message_page("Queue unavailable", QUEUE_DOWN_TEXT));
        }
    };
    tracing::info!(task_id = %stamped.task_id, code, "task created, sending confirmation mail");

    let link = format!("{}/confirm_submission/{}", base_url.0, code);
    let mail_body = format!(
        "This email address was used to request a run of the model {} on our \
         batch service.\n\nVisit {} to confirm the request and queue the \
         run. The results will be mailed to this address when the run \
         completes.\n\nIf you did not request this, simply ignore this \
         message; the request expires on its own.",
        spec.full_name, link,
    );
    if let Err(e) = email_client
        .send_email(
            &stamped.email_address,
            "Confirm your model run",
            &mail_body,
            &[],
        )
        .await
    {
        tracing::error!(error.cause_chain = ?e, "could not send confirmation email");
        return html(render::message_page(
            "Mail failure",
            "We could not send the confirmation email. Please try again later.",
        ));
    }

    html(render::confirmation_sent_page(
        stamped.email_address.as_ref(),
    ))
}

/// `GET /confirm_submission/{code}`
#[tracing::instrument(name = "Confirming submission", skip_all)]
pub async fn confirm_submission(
    code: web::Path<String>,
    queue: web::Data<QueueClient>,
) -> HttpResponse {
    match queue.confirm(&code).await {
        Ok(ConfirmStatus::Okay) => html(render::message_page(
            "Model run confirmed",
            "Your model run has been queued. The results will be mailed to \
             you when it completes.",
        )),
        Ok(ConfirmStatus::Expired) => html(render::message_page(
            "Confirmation expired",
            "This confirmation link has expired. Please submit your model \
             run again.",
        )),
        Ok(ConfirmStatus::NotFound) => HttpResponse::NotFound()
            .content_type(ContentType::html())
            .body(render::message_page(
                "Unknown confirmation code",
                "We do not recognize this confirmation link. It may already \
                 have been used.",
            )),
        Err(e) => {
            tracing::error!(error.cause_chain = ?e, "confirmation round trip failed");
            html(render::message_page("Queue unavailable", QUEUE_DOWN_TEXT))
        }
    }
}
