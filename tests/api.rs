mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::*;
use community_admin::config::Settings;
use community_admin::{app, seed_defaults, AppState};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

const ADMIN: &str = "root";
const PASSWORD: &str = "root-pass-1";

async fn router(pool: &PgPool) -> anyhow::Result<Router> {
    let model = setup(pool).await?;
    let settings = Settings::from_lookup(|key| match key {
        "JWT_SECRET" => Some("api-test-secret".into()),
        "BCRYPT_COST" => Some("4".into()),
        "BOOTSTRAP_ADMIN_USERNAME" => Some(ADMIN.into()),
        "BOOTSTRAP_ADMIN_PASSWORD" => Some(PASSWORD.into()),
        _ => None,
    })?;
    seed_defaults(pool, &model, &settings).await?;
    Ok(app(AppState::new(pool.clone(), model, settings)))
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    match body {
        Some(b) => send(app, method, uri, token, Some("application/json"), serde_json::to_vec(&b)?).await,
        None => send(app, method, uri, token, None, Vec::new()).await,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    if let Some(ct) = content_type {
        req = req.header(header::CONTENT_TYPE, ct);
    }
    let req = req.body(Body::from(body))?;
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, body))
}

/// A logged-in admin holding the non-privileged role `普通用户`; returns its token.
async fn clerk(app: &Router, pool: &PgPool, root: &str) -> anyhow::Result<String> {
    let role_id = role(pool, &community_admin::resolve("public")?, "普通用户").await?;
    let (status, body) = call(
        app,
        Method::POST,
        "/api/admins",
        Some(root),
        Some(json!({
            "action": "add",
            "username": "clerk",
            "password": "clerk-pass",
            "real_name": "办事员",
            "phone_number": "13700000000",
            "role_id": role_id
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (_, body) = call(app, Method::POST, "/api/login", None, Some(json!({"username": "clerk", "password": "clerk-pass"}))).await?;
    Ok(body["data"]["token"].as_str().unwrap_or_default().to_string())
}

async fn login(app: &Router) -> anyhow::Result<String> {
    let (status, body) = call(app, Method::POST, "/api/login", None, Some(json!({"username": ADMIN, "password": PASSWORD}))).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "登录成功");
    Ok(body["data"]["token"].as_str().unwrap_or_default().to_string())
}

#[sqlx::test(migrations = false)]
async fn login_then_list_residents(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;
    let token = login(&app).await?;

    let (status, body) = call(&app, Method::GET, "/api/residents?page=1&page_size=5", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["page_size"], 5);

    let (status, body) = call(&app, Method::GET, "/api/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], ADMIN);
    assert!(body["data"].get("password_hash").is_none());
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn requests_without_a_valid_token_are_unauthorized(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;

    let (status, body) = call(&app, Method::GET, "/api/residents", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = call(&app, Method::GET, "/api/residents", Some("not.a.token"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::POST, "/api/login", None, Some(json!({"username": ADMIN, "password": "nope"}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "用户名或密码错误");

    let (status, body) = call(&app, Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn command_errors_map_to_statuses(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;
    let token = login(&app).await?;
    let t = Some(token.as_str());

    let (status, body) = call(&app, Method::POST, "/api/streets", t, Some(json!({"action": "explode"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app, Method::GET, "/api/spaceships", t, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let add = json!({"action": "add", "street_name": "东街"});
    let (status, body) = call(&app, Method::POST, "/api/streets", t, Some(add.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "添加成功");
    let id = body["data"]["id"].as_i64().unwrap_or_default();

    let (status, body) = call(&app, Method::POST, "/api/streets", t, Some(add)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_exists");

    let (status, body) = call(&app, Method::POST, "/api/streets", t, Some(json!({"action": "add", "street_name": null}))).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    // Streets do not import.
    let (status, _) = call(&app, Method::POST, "/api/streets", t, Some(json!({"action": "import", "rows": []}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::POST, "/api/streets", t, Some(json!({"action": "update", "id": id, "street_name": "西街"}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["street_name"], "西街");

    let (status, body) = call(&app, Method::GET, &format!("/api/streets?id={}", id), t, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["street_name"], "西街");

    let (status, _) = call(&app, Method::POST, "/api/streets", t, Some(json!({"action": "delete", "id": id}))).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::POST, "/api/streets", t, Some(json!({"action": "delete", "id": id}))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/api/streets?page=0", t, None).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn resident_commands_and_dashboard(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;
    let token = login(&app).await?;
    let t = Some(token.as_str());

    let (_, body) = call(&app, Method::POST, "/api/ethnicities", t, Some(json!({"action": "add", "name": "汉族"}))).await?;
    let eth = body["data"]["id"].clone();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/residents",
        t,
        Some(json!({
            "action": "add",
            "name": "赵六",
            "id_card": "110101199202021234",
            "birth_date": "1992-02-02",
            "ethnicity": eth
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = call(&app, Method::GET, "/api/residents?id_card=110101199202021234", t, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "赵六");

    let (_, body) = call(&app, Method::POST, "/api/residents", t, Some(json!({"action": "get_new_count", "time_range": "week"}))).await?;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = call(&app, Method::POST, "/api/residents", t, Some(json!({"action": "search", "keyword": "赵"}))).await?;
    assert_eq!(body["data"]["total"], 1);

    let (_, body) = call(&app, Method::POST, "/api/residents", t, Some(json!({"action": "get_special_stats"}))).await?;
    assert_eq!(body["data"]["low_income_count"], 0);

    let (status, body) = call(&app, Method::GET, "/api/dashboard?period=month", t, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_population"], 1);
    assert_eq!(body["data"]["new_population"], 1);
    assert_eq!(body["data"]["total_merchants"], 0);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn admin_management_requires_privilege(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;
    let root = login(&app).await?;
    let (_, body) = call(&app, Method::GET, "/api/admins", Some(&root), None).await?;
    assert_eq!(body["data"]["total"], 1);
    let root_id = body["data"]["data"][0]["id"].clone();

    let (status, body) = call(&app, Method::POST, "/api/admins", Some(&root), Some(json!({"action": "delete", "admin_id": root_id}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "不能删除当前登录的账号");

    let clerk = clerk(&app, &pool, &root).await?;

    let (status, _) = call(&app, Method::GET, "/api/admins", Some(&clerk), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::POST, "/api/admins", Some(&clerk), Some(json!({"action": "get_status_distribution"}))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/admins",
        Some(&clerk),
        Some(json!({"action": "change_password", "old_password": "clerk-pass", "new_password": "clerk-pass-2"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "密码修改成功");
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn roles_are_writable_only_by_privileged_admins(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;
    let root = login(&app).await?;
    let clerk = clerk(&app, &pool, &root).await?;

    let (status, body) = call(&app, Method::GET, "/api/roles?name=%E8%B6%85%E7%BA%A7%E7%AE%A1%E7%90%86%E5%91%98", Some(&clerk), None).await?;
    assert_eq!(status, StatusCode::OK);
    let super_role = body["data"]["id"].clone();

    for cmd in [
        json!({"action": "update", "id": super_role, "name": "old"}),
        json!({"action": "delete", "id": super_role}),
        json!({"action": "add", "name": "超级管理员2"}),
    ] {
        let (status, body) = call(&app, Method::POST, "/api/roles", Some(&clerk), Some(cmd)).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "forbidden");
    }

    // The super role and its admins are untouched.
    let (status, body) = call(&app, Method::GET, "/api/me", Some(&root), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role_name"], "超级管理员");
    let (status, _) = call(&app, Method::GET, "/api/admins", Some(&clerk), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, "/api/roles", Some(&root), Some(json!({"action": "add", "name": "访客"}))).await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn rejected_requests_keep_the_error_envelope(pool: PgPool) -> anyhow::Result<()> {
    let app = router(&pool).await?;
    let root = login(&app).await?;
    let t = Some(root.as_str());

    let bad_body = [
        (Some("application/json"), b"{not json".to_vec()),
        (None, br#"{"action": "search"}"#.to_vec()),
        (Some("application/json"), Vec::new()),
    ];
    for (ct, raw) in bad_body {
        for uri in ["/api/residents", "/api/admins"] {
            let (status, body) = send(&app, Method::POST, uri, t, ct, raw.clone()).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
            assert_eq!(body["success"], false);
            assert_eq!(body["code"], "bad_request");
        }
    }

    for uri in [
        "/api/admins?id=abc",
        "/api/residents?birth_date=garbage",
        "/api/residents?ethnicity_id=99999999999",
        "/api/residents?gender=x",
        "/api/residents?id=abc",
        "/api/residents?page=two",
    ] {
        let (status, body) = call(&app, Method::GET, uri, t, None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "bad_request");
    }

    // Well-formed filters still apply.
    let (status, body) = call(&app, Method::GET, "/api/residents?birth_date=1990-01-01&gender=1", t, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);
    Ok(())
}
