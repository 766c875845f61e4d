use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use trailtag::api::{self, auth::ensure_bootstrap_admin, AppState};
use trailtag::config::Config;
use trailtag::db::{MemoryStore, Store};

const ADMIN_EMAIL: &str = "admin@trailtag.test";
const ADMIN_PASSWORD: &str = "admin-password";
const PASSWORD: &str = "correct-horse";

async fn build_app() -> anyhow::Result<Router> {
    let mut config = Config::for_memory("integration-test-secret");
    config.bootstrap_admin_email = Some(ADMIN_EMAIL.to_string());
    config.bootstrap_admin_password = Some(secrecy::Secret::new(ADMIN_PASSWORD.to_string()));

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    ensure_bootstrap_admin(store.as_ref(), &config).await?;

    Ok(api::router(AppState::new(store, config)))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => req.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn login(app: &Router, email: &str, password: &str) -> anyhow::Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    Ok(body["token"].as_str().unwrap_or_default().to_string())
}

async fn create_user(app: &Router, admin: &str, email: &str, role: &str) -> anyhow::Result<i64> {
    let (status, body) = send(
        app,
        "POST",
        "/api/users",
        Some(admin),
        Some(json!({
            "email": email,
            "display_name": email.split('@').next().unwrap_or(email),
            "role": role,
            "password": PASSWORD,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "create user failed: {}", body);
    Ok(body["id"].as_i64().unwrap_or_default())
}

/// Creates a program with a QR code and returns `(program_id, payload)`
async fn create_program_with_code(
    app: &Router,
    admin: &str,
    name: &str,
) -> anyhow::Result<(i64, String)> {
    let (status, program) = send(
        app,
        "POST",
        "/api/programs",
        Some(admin),
        Some(json!({ "name": name, "description": "after-school" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let program_id = program["id"].as_i64().unwrap_or_default();

    let (status, qr) = send(
        app,
        "POST",
        &format!("/api/programs/{}/qr-code", program_id),
        Some(admin),
        Some(json!({ "location": "Room 12" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "qr code failed: {}", qr);
    assert!(qr["image_data_url"]
        .as_str()
        .is_some_and(|u| u.starts_with("data:image/png;base64,")));

    Ok((program_id, qr["payload"].as_str().unwrap_or_default().to_string()))
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let app = build_app().await?;
    let (status, body) = send(&app, "GET", "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["kind"], "memory");
    Ok(())
}

#[tokio::test]
async fn test_login_and_me() -> anyhow::Result<()> {
    let app = build_app().await?;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-password" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let (status, me) = send(&app, "GET", "/api/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], ADMIN_EMAIL);
    assert_eq!(me["role"], "admin");
    assert!(me.get("password_hash").is_none());

    let (status, _) = send(&app, "GET", "/api/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, "GET", "/api/auth/me", Some("v1.1.0.bogus"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_check_in_flow() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    create_user(&app, &admin, "ana@trailtag.test", "student").await?;
    create_user(&app, &admin, "ben@trailtag.test", "student").await?;
    let (program_id, payload) = create_program_with_code(&app, &admin, "Robotics").await?;

    let ana = login(&app, "ana@trailtag.test", PASSWORD).await?;
    let ben = login(&app, "ben@trailtag.test", PASSWORD).await?;

    let (status, confirmation) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&ana),
        Some(json!({ "code": payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", confirmation);
    assert_eq!(confirmation["program_id"], program_id);
    assert_eq!(confirmation["program_name"], "Robotics");
    assert_eq!(confirmation["location"], "Room 12");

    // Same student, same program, seconds later
    let (status, body) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&ana),
        Some(json!({ "code": payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_check_in");
    assert!(body["retry_after_secs"].as_i64().is_some_and(|s| s > 0));

    // Another student is unaffected
    let (status, _) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&ben),
        Some(json!({ "code": payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&ana),
        Some(json!({ "code": "https://example.com/not-a-checkin" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformed_code");

    let (status, body) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&ana),
        Some(json!({ "code": "trailtag://checkin?program=9999&location=Gym" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_code");

    // Admins cannot scan
    let (status, _) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&admin),
        Some(json!({ "code": payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = send(&app, "GET", "/api/check-ins", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);

    let (status, page) = send(&app, "GET", "/api/check-ins", Some(&ana), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["student_name"], "ana");
    Ok(())
}

#[tokio::test]
async fn test_deactivated_code_is_unknown() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    create_user(&app, &admin, "cy@trailtag.test", "student").await?;
    let (program_id, payload) = create_program_with_code(&app, &admin, "Chess").await?;
    let student = login(&app, "cy@trailtag.test", PASSWORD).await?;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/programs/{}/qr-code", program_id),
        Some(&admin),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&student),
        Some(json!({ "code": payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_code");
    Ok(())
}

#[tokio::test]
async fn test_role_guards() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    create_user(&app, &admin, "dee@trailtag.test", "student").await?;
    let student = login(&app, "dee@trailtag.test", PASSWORD).await?;

    let (status, _) = send(&app, "GET", "/api/users", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = send(&app, "GET", "/api/users", Some(&student), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    let (status, _) = send(
        &app,
        "POST",
        "/api/programs",
        Some(&student),
        Some(json!({ "name": "Sneaky" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        "/api/users",
        Some(&admin),
        Some(json!({
            "email": "dee@trailtag.test",
            "display_name": "Dee again",
            "role": "student",
            "password": PASSWORD,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    Ok(())
}

#[tokio::test]
async fn test_parent_sees_only_linked_students() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let eve = create_user(&app, &admin, "eve@trailtag.test", "student").await?;
    let finn = create_user(&app, &admin, "finn@trailtag.test", "student").await?;
    let parent_id = create_user(&app, &admin, "gwen@trailtag.test", "parent").await?;
    let (_, payload) = create_program_with_code(&app, &admin, "Drama").await?;

    for email in ["eve@trailtag.test", "finn@trailtag.test"] {
        let token = login(&app, email, PASSWORD).await?;
        let (status, _) = send(
            &app,
            "POST",
            "/api/check-ins",
            Some(&token),
            Some(json!({ "code": payload })),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    // A student cannot be linked as a parent
    let (status, _) = send(
        &app,
        "POST",
        "/api/relationships",
        Some(&admin),
        Some(json!({ "parent_id": finn, "student_id": eve })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/relationships",
        Some(&admin),
        Some(json!({ "parent_id": parent_id, "student_id": eve })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let parent = login(&app, "gwen@trailtag.test", PASSWORD).await?;
    let (status, page) = send(&app, "GET", "/api/check-ins", Some(&parent), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["student_id"], eve);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/check-ins?student_id={}", finn),
        Some(&parent),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, students) = send(
        &app,
        "GET",
        &format!("/api/parents/{}/students", parent_id),
        Some(&parent),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(students.as_array().map(Vec::len), Some(1));

    let (status, dashboard) = send(&app, "GET", "/api/dashboard", Some(&parent), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["role"], "parent");
    assert_eq!(dashboard["students"][0]["total_check_ins"], 1);
    assert_eq!(dashboard["students"][0]["last_check_in"]["program_name"], "Drama");
    Ok(())
}

#[tokio::test]
async fn test_dashboards() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    create_user(&app, &admin, "hal@trailtag.test", "student").await?;
    let (program_id, payload) = create_program_with_code(&app, &admin, "Coding Club").await?;
    let student = login(&app, "hal@trailtag.test", PASSWORD).await?;

    let (status, _) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&student),
        Some(json!({ "code": payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, dashboard) = send(&app, "GET", "/api/dashboard", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["role"], "admin");
    assert_eq!(dashboard["admins"], 1);
    assert_eq!(dashboard["students"], 1);
    assert_eq!(dashboard["active_programs"], 1);
    assert_eq!(dashboard["check_ins_today"], 1);

    let (status, dashboard) = send(&app, "GET", "/api/dashboard", Some(&student), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["role"], "student");
    assert_eq!(dashboard["total_check_ins"], 1);
    assert_eq!(dashboard["by_program"][0]["program_id"], program_id);
    assert_eq!(dashboard["by_program"][0]["check_ins"], 1);
    Ok(())
}

#[tokio::test]
async fn test_regenerated_code_replaces_the_old_one() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    create_user(&app, &admin, "ivy@trailtag.test", "student").await?;
    let (program_id, old_payload) = create_program_with_code(&app, &admin, "Pottery").await?;
    let student = login(&app, "ivy@trailtag.test", PASSWORD).await?;

    let (status, qr) = send(
        &app,
        "POST",
        &format!("/api/programs/{}/qr-code", program_id),
        Some(&admin),
        Some(json!({ "location": "Art Studio" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let new_payload = qr["payload"].as_str().unwrap_or_default().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&student),
        Some(json!({ "code": old_payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_code");

    let forged = format!("trailtag://checkin?program={}&location=Home", program_id);
    let (status, _) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&student),
        Some(json!({ "code": forged })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, confirmation) = send(
        &app,
        "POST",
        "/api/check-ins",
        Some(&student),
        Some(json!({ "code": new_payload })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(confirmation["location"], "Art Studio");
    Ok(())
}

#[tokio::test]
async fn test_far_page_is_empty() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    let (status, page) = send(
        &app,
        "GET",
        &format!("/api/check-ins?page={}", i64::MAX),
        Some(&admin),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], i64::MAX);
    assert_eq!(page["items"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_role_change_refused_while_linked() -> anyhow::Result<()> {
    let app = build_app().await?;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;
    let student = create_user(&app, &admin, "jo@trailtag.test", "student").await?;
    let parent = create_user(&app, &admin, "kai@trailtag.test", "parent").await?;

    let (status, _) = send(
        &app,
        "POST",
        "/api/relationships",
        Some(&admin),
        Some(json!({ "parent_id": parent, "student_id": student })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/users/{}", parent),
        Some(&admin),
        Some(json!({ "role": "student" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/relationships/{}/{}", parent, student),
        Some(&admin),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, user) = send(
        &app,
        "PUT",
        &format!("/api/users/{}", parent),
        Some(&admin),
        Some(json!({ "role": "student" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "student");
    Ok(())
}
