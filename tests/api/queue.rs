//! Black-box tests of the queue server's HTTP API.

use serde_json::json;
use uuid::Uuid;

use crate::helpers::spawn_queue;
use crate::helpers::submission_json;

#[tokio::test]
async fn submit_confirm_execute_acknowledge() {
    let app = spawn_queue().await;

    // submit
    let response = app.create_task(submission_json(10000, "1")).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let code = body["response"]["code"].as_str().unwrap().to_string();
    let task_id = body["response"]["task"]["taskId"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!code.is_empty());
    assert_ne!(task_id, Uuid::nil().to_string());

    // confirm
    let response = app.confirm(&code).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["response"], "okay");

    // a matching worker gets exactly that task
    let work = app.work_task(json!({"abmb_c": ["1"]})).await;
    assert_eq!(work["task"]["taskId"].as_str().unwrap(), task_id);

    // the worker is the owner while it heartbeats
    let beat = app.worker_get("worker_keep_alive_task", &task_id).await;
    assert_eq!(beat["response"], "yes");
    let owns = app.worker_get("worker_has_task", &task_id).await;
    assert_eq!(owns["response"], "yes");

    // success ack drains the queue
    app.worker_get("worker_succeed_task", &task_id).await;
    let owns = app.worker_get("worker_has_task", &task_id).await;
    assert_eq!(owns["response"], "no");
    let work = app.work_task(json!({"abmb_c": ["1"]})).await;
    assert_eq!(work["status"], "empty_queue");

    // a duplicate ack is accepted silently
    app.worker_get("worker_succeed_task", &task_id).await;
    app.worker_get("worker_failed_task", &task_id).await;
}

#[tokio::test]
async fn version_mismatch_leaves_the_task_runnable() {
    let app = spawn_queue().await;

    let response = app.create_task(submission_json(10000, "2")).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let code = body["response"]["code"].as_str().unwrap().to_string();
    app.confirm(&code).await;

    // a v1-only worker is told the queue has tasks, just not for it
    let work = app.work_task(json!({"abmb_c": ["1"]})).await;
    assert_eq!(work["status"], "no_version");

    // the task is still there for a capable worker
    let work = app.work_task(json!({"abmb_c": ["1", "2"]})).await;
    assert_eq!(work["task"]["modelVersion"], "2");
}

#[tokio::test]
async fn invalid_parameters_never_enter_the_queue() {
    let app = spawn_queue().await;

    // nSamples = -5 is below the schema's range_start of 1000
    let response = app.create_task(submission_json(-5, "1")).await;
    assert_eq!(response.status().as_u16(), 400);
    let message = response.text().await.unwrap();
    assert!(message.contains("nSamples"));

    let work = app.work_task(json!({"abmb_c": ["1"]})).await;
    assert_eq!(work["status"], "empty_queue");
}

#[tokio::test]
async fn unknown_model_or_version_is_rejected() {
    let app = spawn_queue().await;

    let task = submission_json(10000, "1").replace("abmb_c", "abxx_q");
    let response = app.create_task(task).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.create_task(submission_json(10000, "9")).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn malformed_task_json_is_rejected() {
    let app = spawn_queue().await;
    let response = app.create_task("{not json".to_string()).await;
    assert_eq!(response.status().as_u16(), 400);

    let task = submission_json(10000, "1").replace("someone@example.org", "not-an-email");
    let response = app.create_task(task).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_confirmation_code_is_a_404() {
    let app = spawn_queue().await;
    let response = app.confirm("ZZZZZZZZ").await;
    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["response"], "notfound");
}

#[tokio::test]
async fn confirmation_code_is_single_use() {
    let app = spawn_queue().await;
    let response = app.create_task(submission_json(10000, "1")).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let code = body["response"]["code"].as_str().unwrap().to_string();

    let first: serde_json::Value = app.confirm(&code).await.json().await.unwrap();
    assert_eq!(first["response"], "okay");
    let second = app.confirm(&code).await;
    assert_eq!(second.status().as_u16(), 404);
}

#[tokio::test]
async fn has_workers_reflects_recent_polls() {
    let app = spawn_queue().await;

    // a confirmed task alone does not mean anyone can run it
    let response = app.create_task(submission_json(10000, "1")).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let code = body["response"]["code"].as_str().unwrap().to_string();
    app.confirm(&code).await;
    assert!(!app.has_workers().await);

    // any worker poll counts, even one that cannot take the task
    let work = app.work_task(json!({"abmu_c": ["1"]})).await;
    assert_eq!(work["status"], "no_version");
    assert!(app.has_workers().await);

    // and the task stayed runnable the whole time
    let work = app.work_task(json!({"abmb_c": ["1"]})).await;
    assert!(work["task"].is_object());
}

#[tokio::test]
async fn worker_endpoints_require_the_shared_secret() {
    let app = spawn_queue().await;

    // a wrong secret is reported in the body, like every protocol error
    let response = app.work_task_raw(json!({"abmb_c": ["1"]}), "wrong").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["response"], "bad_secret");

    let response = reqwest::Client::new()
        .get(format!(
            "{}/worker_has_task/{}",
            app.addr,
            Uuid::new_v4()
        ))
        .query(&[("secret", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["response"], "bad_secret");

    // and a bad-secret poll must not take a task off the queue
    let response = app.create_task(submission_json(10000, "1")).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let code = body["response"]["code"].as_str().unwrap().to_string();
    app.confirm(&code).await;
    app.work_task_raw(json!({"abmb_c": ["1"]}), "wrong").await;
    let work = app.work_task(json!({"abmb_c": ["1"]})).await;
    assert!(work["task"].is_object());

    // without any secret at all the request does not even parse
    let response = reqwest::Client::new()
        .get(format!("{}/worker_info", app.addr))
        .send()
        .await
        .unwrap();
    assert_ne!(response.status().as_u16(), 200);
}
