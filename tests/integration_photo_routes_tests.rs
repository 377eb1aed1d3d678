/*!
 * HTTP boundary tests for the photo routes.
 *
 * The router is driven in-process with tower's `oneshot`; records live in the
 * in-memory store and photos in a temporary upload root.
 */

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use personnel::{
    models::EmployeeId,
    routes::create_router,
    test_helpers::{create_test_app_state, jpeg_with_orientation, png_with_alpha, TestPhotoContext},
};

const BOUNDARY: &str = "----personnel-test-boundary";

struct Part<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    data: Vec<u8>,
}

fn text_part<'a>(name: &'a str, value: &str) -> Part<'a> {
    Part { name, filename: None, data: value.as_bytes().to_vec() }
}

fn file_part<'a>(name: &'a str, filename: &'a str, data: Vec<u8>) -> Part<'a> {
    Part { name, filename: Some(filename), data }
}

fn multipart_request(parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    part.name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
            ),
        }
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/photos")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body)
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder().method(Method::DELETE).uri(uri).body(Body::empty()).unwrap()
}

async fn setup() -> (tempfile::TempDir, Router, TestPhotoContext) {
    let dir = tempfile::tempdir().unwrap();
    let (state, ctx) = create_test_app_state(dir.path()).await;
    (dir, create_router(state), ctx)
}

fn employee(raw: &str) -> EmployeeId {
    EmployeeId::parse(raw).unwrap()
}

#[tokio::test]
async fn upload_query_fetch_delete_round() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("12345678"));

    let (status, body) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "12345678"),
            file_part("photo", "portrait.JPG", jpeg_with_orientation(40, 20, 6)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/fotos/12345678_"));

    let (status, body) = send_json(&app, get("/api/photos/12345678")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"employee_id": "12345678", "attached": true, "url": url}));

    let response = app.clone().oneshot(get("/api/photos/12345678/content")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (20, 40));

    // Static route serves the same file
    let (status, static_bytes) = send(&app, get(&url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(static_bytes, bytes.to_vec());

    let (status, body) = send_json(&app, delete("/api/photos/12345678")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, body) = send_json(&app, get("/api/photos/12345678")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attached"], json!(false));
    assert_eq!(body["url"], Value::Null);

    let (status, _) = send_json(&app, get("/api/photos/12345678/content")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn legacy_field_names_are_accepted() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("87654321"));

    let (status, body) = send_json(
        &app,
        multipart_request(vec![
            text_part("dpi", "87654321"),
            file_part("foto", "photo.png", png_with_alpha(10, 10)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["employee_id"], json!("87654321"));
}

#[tokio::test]
async fn upload_input_errors() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("1"));

    let (status, body) = send_json(
        &app,
        multipart_request(vec![file_part("photo", "a.jpg", jpeg_with_orientation(8, 8, 1))]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing employee identifier"));

    let (status, body) = send_json(&app, multipart_request(vec![text_part("employee_id", "1")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("missing photo file"));

    let (status, _) = send_json(
        &app,
        multipart_request(vec![text_part("employee_id", "1"), file_part("photo", "a.jpg", vec![])]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "1"),
            file_part("photo", "resume.pdf", b"%PDF-1.7".to_vec()),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].as_str().unwrap().starts_with("file type not allowed"));

    // Allowed extension, but the content is not an image
    let (status, _) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "1"),
            file_part("photo", "fake.jpg", b"just some text".to_vec()),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "../etc"),
            file_part("photo", "a.jpg", jpeg_with_orientation(8, 8, 1)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(ctx.backend.puts(), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("1"));
    let max = ctx.service.max_upload_bytes();

    let (status, _) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "1"),
            file_part("photo", "big.jpg", vec![0u8; max + 1]),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(ctx.backend.puts(), 0);
}

#[tokio::test]
async fn upload_for_unknown_employee_is_not_found() {
    let (_dir, app, _ctx) = setup().await;

    let (status, body) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "404"),
            file_part("photo", "a.jpg", jpeg_with_orientation(8, 8, 1)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("employee 404 not found"));
}

#[tokio::test]
async fn storage_outage_is_service_unavailable() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("1"));
    ctx.backend.fail_puts(true);

    let (status, body) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "1"),
            file_part("photo", "a.jpg", jpeg_with_orientation(8, 8, 1)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn rename_route_moves_photo() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("1"));
    ctx.store.insert_employee(&employee("3"));
    ctx.service
        .replace(&employee("1"), jpeg_with_orientation(8, 8, 1))
        .await
        .unwrap();
    let (_, before) = send_json(&app, get("/api/photos/1")).await;

    let rename = |from: &str, to: &str| {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/employees/{}/rename", from))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"new_id": to}).to_string()))
            .unwrap()
    };

    let (status, body) = send_json(&app, rename("1", "2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "employee_id": "2"}));

    let (_, after) = send_json(&app, get("/api/photos/2")).await;
    assert_eq!(after["url"], before["url"]);
    let (_, old) = send_json(&app, get("/api/photos/1")).await;
    assert_eq!(old["attached"], json!(false));

    let (status, _) = send_json(&app, rename("2", "3")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send_json(&app, rename("9", "10")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_openapi() {
    let (_dir, app, _ctx) = setup().await;

    let (status, body) = send_json(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, doc) = send_json(&app, get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/photos"].is_object());
    assert!(doc["paths"]["/api/photos/{employee_id}"]["delete"].is_object());
    assert!(doc["paths"]["/api/employees/{employee_id}/rename"].is_object());
}

#[tokio::test]
async fn rename_body_errors_are_json() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("1"));

    let rename = |body: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/employees/1/rename")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (status, body) = send_json(&app, rename(r#"{"new_id": "../etc"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid employee identifier"));

    let (status, body) = send_json(&app, rename("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Record untouched
    let (status, _) = send_json(&app, get("/api/photos/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ctx.store.pointer(&employee("1")).is_some());
}

#[tokio::test]
async fn upload_without_extension_is_rejected() {
    let (_dir, app, ctx) = setup().await;
    ctx.store.insert_employee(&employee("1"));

    let (status, body) = send_json(
        &app,
        multipart_request(vec![
            text_part("employee_id", "1"),
            file_part("photo", "portrait", jpeg_with_orientation(8, 8, 1)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].as_str().unwrap().starts_with("file type not allowed"));
    assert_eq!(ctx.backend.puts(), 0);
}
