//! API integration tests
//!
//! Expect a server on localhost:8080 started with the in-memory backend
//! (`DARSHAN__DATABASE__BACKEND=memory`) and the default JWT secret. Slot
//! windows are fixed, so run them once per fresh server.

use chrono::{Duration, Local, Utc};
use darshan_server::models::{Role, UserClaims};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";
const JWT_SECRET: &str = "change-this-secret-in-production";
const TEMPLE_ID: i32 = 1;

fn token(user_id: i32, role: Role) -> String {
    let now = Utc::now().timestamp();
    UserClaims {
        sub: format!("user-{}", user_id),
        user_id,
        name: format!("User {}", user_id),
        email: format!("user{}@example.org", user_id),
        phone: "+91 90000 00000".to_string(),
        role,
        exp: now + 3600,
        iat: now,
    }
    .create_token(JWT_SECRET)
    .expect("Failed to sign token")
}

/// Creates a slot far enough ahead to be bookable and cancellable
async fn create_slot(client: &Client, admin: &str, capacity: i32, start: &str, end: &str) -> Value {
    let date = (Local::now().date_naive() + Duration::days(3)).to_string();
    let response = client
        .post(format!("{}/slots", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({
            "templeId": TEMPLE_ID,
            "date": date,
            "startTime": start,
            "endTime": end,
            "capacity": capacity,
            "price": "20"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["data"].clone()
}

fn booking_request(slot_id: i64, visitors: usize) -> Value {
    let visitors: Vec<Value> = (0..visitors)
        .map(|i| json!({ "name": format!("Visitor {}", i), "age": 30, "gender": "female" }))
        .collect();
    json!({
        "slotId": slot_id,
        "visitorsCount": visitors.len(),
        "visitors": visitors
    })
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_booking_requires_token() {
    let client = Client::new();

    let response = client
        .post(format!("{}/bookings", BASE_URL))
        .json(&booking_request(1, 1))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], false);
}

#[tokio::test]
#[ignore]
async fn test_slot_creation_requires_admin() {
    let client = Client::new();
    let pilgrim = token(101, Role::Pilgrim);

    let response = client
        .post(format!("{}/slots", BASE_URL))
        .bearer_auth(&pilgrim)
        .json(&json!({
            "templeId": TEMPLE_ID,
            "date": "2030-01-15",
            "startTime": "05:00",
            "endTime": "05:30"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_booking_fills_slot_and_cancel_frees_it() {
    let client = Client::new();
    let admin = token(1, Role::Admin);
    let pilgrim = token(102, Role::Pilgrim);

    let slot = create_slot(&client, &admin, 2, "06:00", "06:15").await;
    let slot_id = slot["id"].as_i64().expect("slot id");

    let response = client
        .post(format!("{}/bookings", BASE_URL))
        .bearer_auth(&pilgrim)
        .json(&booking_request(slot_id, 2))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    let booking_id = body["data"]["id"].as_i64().expect("booking id");
    assert_eq!(body["data"]["total_amount"], "40");

    // Slot is now full
    let response = client
        .post(format!("{}/bookings", BASE_URL))
        .bearer_auth(&pilgrim)
        .json(&booking_request(slot_id, 1))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "SlotUnavailable");

    let response = client
        .put(format!("{}/bookings/{}/cancel", BASE_URL, booking_id))
        .bearer_auth(&pilgrim)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/slots/{}/availability?visitors=2", BASE_URL, slot_id))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["available"], true);
    assert_eq!(body["data"]["booked_count"], 0);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_bookings_never_overbook() {
    let client = Client::new();
    let admin = token(1, Role::Admin);
    let slot = create_slot(&client, &admin, 5, "06:15", "06:30").await;
    let slot_id = slot["id"].as_i64().expect("slot id");

    let attempts = (0..12).map(|i| {
        let client = client.clone();
        let pilgrim = token(200 + i, Role::Pilgrim);
        async move {
            client
                .post(format!("{}/bookings", BASE_URL))
                .bearer_auth(&pilgrim)
                .json(&booking_request(slot_id, 1))
                .send()
                .await
                .expect("Failed to send request")
                .status()
        }
    });
    let statuses = futures_join(attempts).await;
    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    assert_eq!(created, 5);

    let response = client
        .get(format!("{}/slots/{}", BASE_URL, slot_id))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["booked_count"], 5);
    assert_eq!(body["data"]["status"], "full");
}

async fn futures_join<F>(futures: impl Iterator<Item = F>) -> Vec<StatusCode>
where
    F: std::future::Future<Output = StatusCode> + Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut statuses = Vec::with_capacity(handles.len());
    for handle in handles {
        statuses.push(handle.await.expect("Request task panicked"));
    }
    statuses
}

#[tokio::test]
#[ignore]
async fn test_simulation_update_raises_alert() {
    let client = Client::new();
    let admin = token(1, Role::Admin);
    let hour = Local::now().format("%H").to_string().parse::<u8>().expect("hour");

    let response = client
        .post(format!("{}/simulation/{}/update", BASE_URL, TEMPLE_ID))
        .bearer_auth(&admin)
        .json(&json!({
            "hour": hour,
            "expectedVisitors": 60,
            "actualVisitors": 120
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/simulation/{}", BASE_URL, TEMPLE_ID))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    let alerts = body["data"]["alerts"].as_array().expect("alerts");
    assert!(alerts.iter().any(|a| a["severity"] == "critical"));

    let alert_id = alerts[0]["id"].as_i64().expect("alert id");
    for _ in 0..2 {
        let response = client
            .put(format!(
                "{}/simulation/{}/alert/{}/resolve",
                BASE_URL, TEMPLE_ID, alert_id
            ))
            .bearer_auth(&admin)
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
    }
}

#[tokio::test]
#[ignore]
async fn test_waiting_time_estimate() {
    let client = Client::new();

    let response = client
        .post(format!("{}/waiting-times/estimate", BASE_URL))
        .json(&json!({ "currentVisitors": 600, "capacityPerSlot": 100 }))
        .send()
        .await
        .expect("Failed to send request");

    let body: Value = response.json().await.expect("Failed to parse response");
    // 100 / 30 * 2 visitors per minute
    assert_eq!(body["data"]["minutes"], 90);
    assert_eq!(body["data"]["level"], "medium");
}
