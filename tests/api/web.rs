//! Black-box tests of the web front-end against wiremock stand-ins for the
//! queue server and the mail API.

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::spawn_web;

fn has_workers_response(has_workers: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"response": {"has_workers": has_workers}}))
}

fn created_response(
    code: &str,
    task_id: Uuid,
) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "response": {
            "code": code,
            "task": {
                "taskId": task_id,
                "modelName": "abmb_c",
                "modelVersion": "1",
                "emailAddress": "someone@example.org",
                "modelParameters": {
                    "nSamples": {"type": "integer", "value": 2000},
                    "wavelengths": {"type": "range", "value": {"start": 400.0, "end": 700.0}},
                    "sieveDetourEffects": {"type": "boolean", "value": false}
                }
            }
        }
    }))
}

const VALID_FORM: &[(&str, &str)] = &[
    ("modelVersion", "1"),
    ("email", "someone@example.org"),
    ("nSamples", "2000"),
    ("wavelengths", "400:700"),
];

#[tokio::test]
async fn model_form_renders_a_field_per_parameter() {
    let app = spawn_web().await;
    Mock::given(method("GET"))
        .and(path("/client_queue_has_workers"))
        .respond_with(has_workers_response(true))
        .mount(&app.queue_server)
        .await;

    let response = app.get("/models/abmb_c").await;
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains(r#"name="email""#));
    assert!(html.contains(r#"name="nSamples""#));
    assert!(html.contains(r#"name="wavelengths""#));
    assert!(html.contains(r#"name="sieveDetourEffects""#));
}

#[tokio::test]
async fn index_lists_registered_models() {
    let app = spawn_web().await;
    let response = app.get("/").await;
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("/models/abmb_c"));
    assert!(html.contains("/models/always_fails"));
}

#[tokio::test]
async fn no_workers_means_no_form() {
    let app = spawn_web().await;
    Mock::given(method("GET"))
        .and(path("/client_queue_has_workers"))
        .respond_with(has_workers_response(false))
        .mount(&app.queue_server)
        .await;

    let html = app.get("/models/abmb_c").await.text().await.unwrap();
    assert!(html.contains("worker machines"));
    assert!(!html.contains(r#"name="nSamples""#));
}

#[tokio::test]
async fn queue_outage_renders_an_apology() {
    let app = spawn_web().await;
    // nothing mounted: the workers probe comes back as an error

    let html = app.get("/models/abmb_c").await.text().await.unwrap();
    assert!(html.contains("queuing server"));
}

#[tokio::test]
async fn unknown_model_is_a_404() {
    let app = spawn_web().await;
    let response = app.get("/models/abxx_q").await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn submission_mails_a_confirmation_link() {
    let app = spawn_web().await;
    let task_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/client_model_create"))
        .respond_with(created_response("Xy12Ab34", task_id))
        .expect(1)
        .mount(&app.queue_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app.post_model("abmb_c", VALID_FORM).await;
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("someone@example.org"));

    let email_requests = app.email_server.received_requests().await.unwrap();
    let link = app.confirmation_link(&email_requests[0]);
    assert!(link.ends_with("/confirm_submission/Xy12Ab34"));
}

#[tokio::test]
async fn invalid_input_rerenders_the_form_without_queue_contact() {
    let app = spawn_web().await;
    Mock::given(method("POST"))
        .and(path("/client_model_create"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.queue_server)
        .await;

    // out of range
    let form = &[
        ("modelVersion", "1"),
        ("email", "someone@example.org"),
        ("nSamples", "-5"),
        ("wavelengths", "400:700"),
    ];
    let html = app.post_model("abmb_c", form).await.text().await.unwrap();
    assert!(html.contains("nSamples"));
    assert!(html.contains(r#"name="email""#), "the form should be shown again");

    // bad email
    let form = &[
        ("modelVersion", "1"),
        ("email", "not-an-email"),
        ("nSamples", "2000"),
        ("wavelengths", "400:700"),
    ];
    let html = app.post_model("abmb_c", form).await.text().await.unwrap();
    assert!(html.contains("Invalid email"));
}

#[tokio::test]
async fn queue_rejection_is_shown_to_the_submitter() {
    let app = spawn_web().await;
    Mock::given(method("POST"))
        .and(path("/client_model_create"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("parameter 'nSamples' exceeds the configured limit"),
        )
        .expect(1)
        .mount(&app.queue_server)
        .await;

    let html = app
        .post_model("abmb_c", VALID_FORM)
        .await
        .text()
        .await
        .unwrap();
    assert!(html.contains("exceeds the configured limit"));
}

#[tokio::test]
async fn confirmation_outcomes_render_distinct_pages() {
    let app = spawn_web().await;
    Mock::given(method("GET"))
        .and(path("/client_confirm/GOODCODE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "okay"})))
        .mount(&app.queue_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/client_confirm/OLDCODE1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "expired"})))
        .mount(&app.queue_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/client_confirm/NOCODE12"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"response": "notfound"})))
        .mount(&app.queue_server)
        .await;

    let html = app
        .get("/confirm_submission/GOODCODE")
        .await
        .text()
        .await
        .unwrap();
    assert!(html.contains("queued"));

    let html = app
        .get("/confirm_submission/OLDCODE1")
        .await
        .text()
        .await
        .unwrap();
    assert!(html.contains("expired"));

    let response = app.get("/confirm_submission/NOCODE12").await;
    assert_eq!(response.status().as_u16(), 404);
}
