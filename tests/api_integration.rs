//! API integration tests: accounts, keys, shortening and link management

mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_create_user_validation_and_conflicts() {
    let app = spawn_app().await;

    let (user_id, key) = register(&app, "alice").await;
    assert!(user_id > 0);
    assert_eq!(key.len(), 43);

    let missing = app
        .send(json_request(Method::POST, "/users", json!({ "username": "bob" }), None))
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let duplicate = app
        .send(json_request(
            Method::POST,
            "/users",
            json!({ "username": "alice", "email": "other@example.com" }),
            None,
        ))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_public_shorten_then_redirect() {
    let app = spawn_app().await;

    let response = app
        .send(json_request(
            Method::POST,
            "/shorten",
            json!({ "long_url": "https://example.com/page" }),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let code = body_json(response).await["short_url"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(code.len(), 8);
    assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));

    let redirect = app.send(get(&format!("/{code}"))).await;
    assert_eq!(redirect.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(location(&redirect), "https://example.com/page");
}

#[tokio::test]
async fn test_shorten_rejects_bad_input() {
    let app = spawn_app().await;

    for long_url in ["", "ftp://example.com/file", "example.com"] {
        let response = app
            .send(json_request(
                Method::POST,
                "/shorten",
                json!({ "long_url": long_url }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{long_url:?}");
    }

    let custom_without_auth = app
        .send(json_request(
            Method::POST,
            "/shorten",
            json!({ "long_url": "https://example.com", "custom_id": "mine" }),
            None,
        ))
        .await;
    assert_eq!(custom_without_auth.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_authenticated_shorten_with_custom_id() {
    let app = spawn_app().await;
    let (_, key) = register(&app, "carol").await;

    let no_key = app
        .send(json_request(
            Method::POST,
            "/api/shorten",
            json!({ "long_url": "https://example.com" }),
            None,
        ))
        .await;
    assert_eq!(no_key.status(), StatusCode::UNAUTHORIZED);

    let created = app
        .send(json_request(
            Method::POST,
            "/api/shorten",
            json!({ "long_url": "https://example.com/promo", "custom_id": "promo" }),
            Some(&key),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::OK);
    assert_eq!(body_json(created).await["short_url"], "promo");

    let duplicate = app
        .send(json_request(
            Method::POST,
            "/api/shorten",
            json!({ "long_url": "https://example.com/other", "custom_id": "promo" }),
            Some(&key),
        ))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let reserved = app
        .send(json_request(
            Method::POST,
            "/api/shorten",
            json!({ "long_url": "https://example.com", "custom_id": "health" }),
            Some(&key),
        ))
        .await;
    assert_eq!(reserved.status(), StatusCode::BAD_REQUEST);

    let malformed = app
        .send(json_request(
            Method::POST,
            "/api/shorten",
            json!({ "long_url": "https://example.com", "custom_id": "no spaces" }),
            Some(&key),
        ))
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_link_management_is_scoped_to_owner() {
    let app = spawn_app().await;
    let (owner_id, owner_key) = register(&app, "dave").await;
    let (_, other_key) = register(&app, "erin").await;

    for id in ["first", "second"] {
        let response = app
            .send(json_request(
                Method::POST,
                "/api/shorten",
                json!({ "long_url": format!("https://example.com/{id}"), "custom_id": id }),
                Some(&owner_key),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let listed = body_json(app.send(authed(Method::GET, "/api/urls", &owner_key)).await).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|u| u["created_by"] == owner_id));

    let paged =
        body_json(app.send(authed(Method::GET, "/api/urls?limit=1&offset=1", &owner_key)).await)
            .await;
    assert_eq!(paged.as_array().unwrap().len(), 1);

    let others = body_json(app.send(authed(Method::GET, "/api/urls", &other_key)).await).await;
    assert!(others.as_array().unwrap().is_empty());

    let foreign_update = app
        .send(json_request(
            Method::PUT,
            "/api/urls/first",
            json!({ "long_url": "https://evil.example" }),
            Some(&other_key),
        ))
        .await;
    assert_eq!(foreign_update.status(), StatusCode::NOT_FOUND);

    let update = app
        .send(json_request(
            Method::PUT,
            "/api/urls/first",
            json!({ "click_limit": 5 }),
            Some(&owner_key),
        ))
        .await;
    assert_eq!(update.status(), StatusCode::OK);
    let updated = body_json(update).await;
    assert_eq!(updated["click_limit"], 5);
    assert_eq!(updated["original_url"], "https://example.com/first");

    let foreign_delete = app
        .send(authed(Method::DELETE, "/api/urls/second", &other_key))
        .await;
    assert_eq!(foreign_delete.status(), StatusCode::NOT_FOUND);

    let delete = app
        .send(authed(Method::DELETE, "/api/urls/second", &owner_key))
        .await;
    assert_eq!(delete.status(), StatusCode::OK);
    assert!(app
        .services
        .storage
        .get_url("second")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_api_key_lifecycle() {
    let app = spawn_app().await;
    let (user_id, first_key) = register(&app, "frank").await;

    let issued = app.send(authed(Method::POST, "/api/keys", &first_key)).await;
    assert_eq!(issued.status(), StatusCode::CREATED);
    let issued = body_json(issued).await;
    assert_eq!(issued["user_id"], user_id);
    let second_key = issued["api_key"].as_str().unwrap().to_string();
    assert!(second_key.starts_with(issued["prefix"].as_str().unwrap()));

    let listed = body_json(app.send(authed(Method::GET, "/api/keys", &second_key)).await).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|k| k.get("key_hash").is_none()));

    let revoke = app
        .send(json_request(
            Method::DELETE,
            "/api/keys",
            json!({ "api_key": first_key }),
            Some(&second_key),
        ))
        .await;
    assert_eq!(revoke.status(), StatusCode::OK);

    let revoked = app.send(authed(Method::GET, "/api/keys", &first_key)).await;
    assert_eq!(revoked.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .send(json_request(
            Method::DELETE,
            "/api/keys",
            json!({ "api_key": "never-issued" }),
            Some(&second_key),
        ))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analytics_report_for_owner() {
    let app = spawn_app().await;
    let (_, owner_key) = register(&app, "grace").await;
    let (_, other_key) = register(&app, "heidi").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/api/shorten",
            json!({ "long_url": "https://example.com", "custom_id": "report" }),
            Some(&owner_key),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    for client in [[203, 0, 113, 1], [203, 0, 113, 2], [203, 0, 113, 1]] {
        let redirect = app.send(get_from("/report", client)).await;
        assert_eq!(redirect.status(), StatusCode::MOVED_PERMANENTLY);
    }

    // Events are written in the background.
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.services.storage.list_clicks("report").await.unwrap().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("access events should be recorded");

    let report = app
        .send(authed(Method::GET, "/api/analytics/report", &owner_key))
        .await;
    assert_eq!(report.status(), StatusCode::OK);
    assert_eq!(body_json(report).await, json!({ "unknown": 3 }));

    let foreign = app
        .send(authed(Method::GET, "/api/analytics/report", &other_key))
        .await;
    assert_eq!(foreign.status(), StatusCode::UNAUTHORIZED);

    let missing = app
        .send(authed(Method::GET, "/api/analytics/nope", &owner_key))
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_and_stats() {
    let app = spawn_app().await;
    register(&app, "ivan").await;
    app.send(json_request(
        Method::POST,
        "/shorten",
        json!({ "long_url": "https://example.com" }),
        None,
    ))
    .await;

    let health = app.send(get("/health")).await;
    assert_eq!(health.status(), StatusCode::OK);
    let health = body_json(health).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["services"]["database"], "healthy");
    assert_eq!(health["services"]["cache"], "healthy");

    let stats = body_json(app.send(get("/stats")).await).await;
    assert_eq!(stats["total_urls"], 1);
    assert_eq!(stats["total_users"], 1);
    assert_eq!(stats["total_clicks"], 0);
    assert!(stats["timestamp"].as_i64().unwrap() > 0);
}
