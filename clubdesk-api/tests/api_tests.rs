/// Integration tests for the ClubDesk API
///
/// These tests verify the HTTP surface end-to-end: club and license
/// creation with idempotent replay, quota overflow with payment handoff,
/// owner edits, and error mapping.
///
/// They require a running PostgreSQL database and are ignored by default.
/// Run with: cargo test --test api_tests -- --ignored --test-threads=1

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestContext;
use serde_json::{json, Value};
use tower::Service as _;

/// Builds a JSON request with the identity header set
fn json_request(method: &str, uri: &str, user_id: i64, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn club_body(name: &str, quota: i64) -> Value {
    json!({
        "name": name,
        "region": "Brittany",
        "contact_email": "contact@example.org",
        "license_quota": quota,
    })
}

fn license_body(holder: &str) -> Value {
    json!({
        "holder_name": holder,
        "holder_email": format!("{}@example.org", holder.to_lowercase().replace(' ', ".")),
    })
}

#[tokio::test]
#[ignore]
async fn test_health_endpoint() {
    let mut ctx = TestContext::new().await.unwrap();

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert!(body["pool"]["total_connections"].as_u64().unwrap() >= 1);
}

#[tokio::test]
#[ignore]
async fn test_identity_header_is_required() {
    let mut ctx = TestContext::new().await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/clubs")
        .header("content-type", "application/json")
        .body(Body::from(club_body("AS Riviere", 5).to_string()))
        .unwrap();

    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
#[ignore]
async fn test_create_club_and_replay() {
    let mut ctx = TestContext::new().await.unwrap();

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 1, club_body("AS Riviere", 5)))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["replayed"], false);
    assert_eq!(body["club"]["name"], "AS Riviere");
    assert_eq!(body["club"]["status"], "pending");
    let club_id = body["club"]["id"].as_i64().unwrap();

    // Same request again replays the original club with 200.
    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 1, club_body("AS Riviere", 5)))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["replayed"], true);
    assert_eq!(body["club"]["id"].as_i64().unwrap(), club_id);

    // A different club for the same owner conflicts.
    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 1, club_body("Other Club", 5)))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
#[ignore]
async fn test_create_club_validation_errors() {
    let mut ctx = TestContext::new().await.unwrap();

    let body = json!({
        "name": "",
        "region": "Brittany",
        "contact_email": "not-an-address",
        "license_quota": 5,
    });

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 1, body))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["details"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
#[ignore]
async fn test_license_lifecycle_with_overflow() {
    let mut ctx = TestContext::new().await.unwrap();

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 2, club_body("AS Riviere", 1)))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let club_id = body["club"]["id"].as_i64().unwrap();

    // First license fits the allotment.
    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/clubs/{club_id}/licenses"),
            2,
            license_body("Ana Martin"),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["admission"], "admitted");
    assert_eq!(body["license"]["status"], "draft");
    assert_eq!(body["quota"]["remaining"], 0);

    // Second license overflows and gets a checkout URL.
    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/clubs/{club_id}/licenses"),
            2,
            license_body("Ben Okafor"),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["admission"], "overflow");
    assert_eq!(body["license"]["status"], "pending");
    assert!(body["payment_url"].as_str().unwrap().contains("/orders/"));
    let overflow_id = body["license"]["id"].as_i64().unwrap();
    assert_eq!(ctx.payments.orders.lock().unwrap().len(), 1);

    // Payment callback commits the license with a legacy spelling.
    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/licenses/{overflow_id}/commit"),
            2,
            json!({ "status": "payee" }),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "committed");
    assert_eq!(body["raw_status"], "payee");
    assert_eq!(body["editable"], false);

    // Owner edits are refused once committed.
    let response = ctx
        .app
        .call(json_request(
            "PATCH",
            &format!("/v1/licenses/{overflow_id}"),
            2,
            json!({ "holder_name": "Benjamin Okafor" }),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], false);
    assert_eq!(body["license"]["holder_name"], "Ben Okafor");
}

#[tokio::test]
#[ignore]
async fn test_license_access_is_scoped_to_responsible_user() {
    let mut ctx = TestContext::new().await.unwrap();

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 3, club_body("AS Riviere", 5)))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let club_id = body["club"]["id"].as_i64().unwrap();

    // Another user cannot create licenses for this club.
    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/clubs/{club_id}/licenses"),
            999,
            license_body("Ana Martin"),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    // Nor list them.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/clubs/{club_id}/licenses"))
        .header("x-user-id", "999")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    let (status, _) = response_json(response).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_soft_delete_frees_quota() {
    let mut ctx = TestContext::new().await.unwrap();

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 4, club_body("AS Riviere", 1)))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let club_id = body["club"]["id"].as_i64().unwrap();

    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/clubs/{club_id}/licenses"),
            4,
            license_body("Ana Martin"),
        ))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let license_id = body["license"]["id"].as_i64().unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/licenses/{license_id}"))
        .header("x-user-id", "4")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/clubs/{club_id}/quota"))
        .header("x-user-id", "4")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 0);
    assert_eq!(body["remaining"], 1);
}

#[tokio::test]
#[ignore]
async fn test_back_office_club_administration() {
    let mut ctx = TestContext::new().await.unwrap();

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 5, club_body("AS Riviere", 2)))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let club_id = body["club"]["id"].as_i64().unwrap();

    // The listing shows the new club.
    let request = Request::builder()
        .method("GET")
        .uri("/v1/clubs?limit=10")
        .header("x-user-id", "5")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    let clubs = body.as_array().unwrap();
    assert_eq!(clubs.len(), 1);
    assert_eq!(clubs[0]["id"].as_i64().unwrap(), club_id);

    // Status transition to committed.
    let response = ctx
        .app
        .call(json_request(
            "PATCH",
            &format!("/v1/clubs/{club_id}/status"),
            5,
            json!({ "status": "committed" }),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "committed");

    // Unknown status names are refused.
    let response = ctx
        .app
        .call(json_request(
            "PATCH",
            &format!("/v1/clubs/{club_id}/status"),
            5,
            json!({ "status": "frozen" }),
        ))
        .await
        .unwrap();
    let (status, _) = response_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Allotment adjustment.
    let response = ctx
        .app
        .call(json_request(
            "PATCH",
            &format!("/v1/clubs/{club_id}/quota"),
            5,
            json!({ "license_quota": 10 }),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["license_quota"], 10);

    // Negative allotments are refused.
    let response = ctx
        .app
        .call(json_request(
            "PATCH",
            &format!("/v1/clubs/{club_id}/quota"),
            5,
            json!({ "license_quota": -1 }),
        ))
        .await
        .unwrap();
    let (status, _) = response_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_quota_snapshot_breaks_down_statuses() {
    let mut ctx = TestContext::new().await.unwrap();

    let response = ctx
        .app
        .call(json_request("POST", "/v1/clubs", 6, club_body("AS Riviere", 1)))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let club_id = body["club"]["id"].as_i64().unwrap();

    // One admitted draft, one overflow pending.
    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/clubs/{club_id}/licenses"),
            6,
            license_body("Ana Martin"),
        ))
        .await
        .unwrap();
    let (_, _) = response_json(response).await;

    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/clubs/{club_id}/licenses"),
            6,
            license_body("Ben Okafor"),
        ))
        .await
        .unwrap();
    let (_, body) = response_json(response).await;
    let overflow_id = body["license"]["id"].as_i64().unwrap();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/clubs/{club_id}/quota"))
        .header("x-user-id", "6")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 2);
    assert_eq!(body["committed"], 0);
    assert_eq!(body["pending"], 1);

    // Committing the pending license moves it between buckets.
    let response = ctx
        .app
        .call(json_request(
            "POST",
            &format!("/v1/licenses/{overflow_id}/commit"),
            6,
            json!({ "status": "payee" }),
        ))
        .await
        .unwrap();
    let (status, _) = response_json(response).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/clubs/{club_id}/quota"))
        .header("x-user-id", "6")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["committed"], 1);
    assert_eq!(body["pending"], 0);
}

#[tokio::test]
#[ignore]
async fn test_unknown_resources_return_not_found() {
    let mut ctx = TestContext::new().await.unwrap();

    let request = Request::builder()
        .method("GET")
        .uri("/v1/clubs/424242/quota")
        .header("x-user-id", "1")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.call(request).await.unwrap();
    let (status, body) = response_json(response).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
