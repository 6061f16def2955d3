//! Integration tests for the queue endpoints.

#[path = "support/app.rs"]
mod app;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use queue_admin::domain::JobState;
use queue_admin::inbound::http::spa::SpaAssets;
use queue_admin::test_support::MemoryBackend;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.insert_queue("default");
    backend.insert_queue("urgent");
    backend
}

#[rstest]
#[actix_web::test]
async fn listing_returns_queues_by_name(backend: MemoryBackend) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(&app, TestRequest::get().uri("/api/queues").to_request()).await;

    assert_eq!(res.status(), StatusCode::OK);
    let body = app::json_body(res).await;
    let names: Vec<_> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|queue| queue["name"].as_str())
        .collect();
    assert_eq!(names, vec!["default", "urgent"]);
}

#[rstest]
#[actix_web::test]
async fn listing_honours_the_limit(backend: MemoryBackend) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::get().uri("/api/queues?limit=1").to_request(),
    )
    .await;

    let body = app::json_body(res).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[rstest]
#[actix_web::test]
async fn getting_a_queue_includes_live_counts(backend: MemoryBackend) {
    backend.insert_job("email", "default", JobState::Available);
    backend.insert_job("email", "default", JobState::Available);
    backend.insert_job("email", "default", JobState::Running);
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::get().uri("/api/queues/default").to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::OK);
    let body = app::json_body(res).await;
    assert_eq!(body["name"], json!("default"));
    assert_eq!(body["count_available"], json!(2));
    assert_eq!(body["count_running"], json!(1));
    assert_eq!(body["paused_at"], json!(null));
}

#[rstest]
#[actix_web::test]
async fn getting_a_missing_queue_is_not_found(backend: MemoryBackend) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::get().uri("/api/queues/missing").to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app::json_body(res).await,
        json!({ "message": "Queue not found: missing." })
    );
}

#[rstest]
#[actix_web::test]
async fn pausing_and_resuming_toggle_paused_at(backend: MemoryBackend) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::put()
            .uri("/api/queues/default/pause")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(app::json_body(res).await, json!({ "status": "ok" }));
    let paused_at = backend.queue("default").and_then(|q| q.paused_at);
    assert!(paused_at.is_some());

    let res = test::call_service(
        &app,
        TestRequest::put()
            .uri("/api/queues/default/pause")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(backend.queue("default").and_then(|q| q.paused_at), paused_at);

    let res = test::call_service(
        &app,
        TestRequest::put()
            .uri("/api/queues/default/resume")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(backend.queue("default").and_then(|q| q.paused_at).is_none());
}

#[rstest]
#[actix_web::test]
async fn pausing_a_missing_queue_is_not_found(backend: MemoryBackend) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::put()
            .uri("/api/queues/missing/pause")
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[rstest]
#[actix_web::test]
async fn updating_metadata_replaces_it(backend: MemoryBackend) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::patch()
            .uri("/api/queues/urgent")
            .set_json(json!({ "metadata": { "owner": "billing" } }))
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::OK);
    let body = app::json_body(res).await;
    assert_eq!(body["metadata"], json!({ "owner": "billing" }));
    assert_eq!(
        backend.queue("urgent").map(|q| q.metadata),
        Some(json!({ "owner": "billing" }))
    );
}

#[rstest]
#[case(json!({}), "Field `metadata` is required.")]
#[case(
    json!({ "metadata": [1, 2] }),
    "Validation on field `metadata` failed on the `object` tag."
)]
#[actix_web::test]
async fn updating_metadata_requires_an_object(
    backend: MemoryBackend,
    #[case] body: serde_json::Value,
    #[case] expected: &str,
) {
    let app = app::init_app(&backend, SpaAssets::disabled()).await;

    let res = test::call_service(
        &app,
        TestRequest::patch()
            .uri("/api/queues/urgent")
            .set_json(body)
            .to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app::json_body(res).await, json!({ "message": expected }));
}
