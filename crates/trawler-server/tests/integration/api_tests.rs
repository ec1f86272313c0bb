use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use crate::integration::common::{TEST_API_KEY, setup_test_app};

fn authed(request: Request<Body>) -> Request<Body> {
    let (mut parts, body) = request.into_parts();
    parts.headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {TEST_API_KEY}").parse().unwrap(),
    );
    Request::from_parts(parts, body)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_database_status() {
    let (app, _pool, _container) = setup_test_app().await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn api_routes_require_bearer_token() {
    let (app, _pool, _container) = setup_test_app().await;

    let response = app
        .oneshot(Request::get("/v1/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stats_start_at_zero() {
    let (app, _pool, _container) = setup_test_app().await;

    let response = app
        .oneshot(authed(Request::get("/v1/stats").body(Body::empty()).unwrap()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["source_count"], 0);
    assert_eq!(body["page_count"], 0);
    assert_eq!(body["crawled_count"], 0);
}

#[tokio::test]
async fn trigger_crawl_rejects_missing_url() {
    let (app, _pool, _container) = setup_test_app().await;

    let request = authed(
        Request::post("/v1/crawl")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"url": "  "}"#))
            .unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn enqueue_unknown_source_is_404() {
    let (app, _pool, _container) = setup_test_app().await;

    let request = authed(
        Request::post(format!("/v1/sources/{}/runs", Uuid::new_v4()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn schedule_and_inspect_runs() {
    let (app, pool, _container) = setup_test_app().await;

    sqlx::query(
        "INSERT INTO job_sources (name, base_url) VALUES ('acme', 'https://acme.test/')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let request = authed(
        Request::post("/v1/schedule")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"force": true}"#))
            .unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["count"], 1);

    let response = app
        .oneshot(authed(
            Request::get("/v1/runs?status=pending")
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["runs"][0]["status"], "pending");
}
