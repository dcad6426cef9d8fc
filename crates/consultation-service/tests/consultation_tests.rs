//! Consultation lifecycle integration tests.
//!
//! Exercises create, list, load and end over HTTP against an in-memory
//! `TestServer`, including the error envelope for each rejection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use consultation_test_utils::*;
use serde_json::{json, Value};

fn create_body(doctor_id: i64) -> Value {
    json!({
        "doctor_id": doctor_id,
        "patient_gender_id": 1,
        "patient_name": "Ana",
        "patient_birth_date": "1990-04-02"
    })
}

async fn create_consultation(
    server: &TestServer,
    client: &reqwest::Client,
) -> Result<Value, anyhow::Error> {
    let response = client
        .post(format!("{}/users/consultations", server.url()))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&create_body(TEST_DOCTOR_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    Ok(response.json().await?)
}

#[tokio::test]
async fn test_create_consultation_returns_pending_session() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    let body = create_consultation(&server, &client).await?;

    assert!(body["id"].as_i64().is_some_and(|id| id > 0));
    assert_eq!(body["doctor_id"], TEST_DOCTOR_ID);
    assert_eq!(body["user_id"], TEST_USER_ID);
    assert_eq!(body["patient_name"], "Ana");
    assert_eq!(body["patient_birth_date"], "1990-04-02");
    assert_eq!(body["status"], "pending");
    assert!(body["ended_at"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_load_fresh_consultation_has_empty_transcript() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?["id"]
        .as_i64()
        .unwrap();

    let response = client
        .get(format!("{}/doctors/consultations/{}", server.url(), id))
        .bearer_auth(server.doctor_token(TEST_DOCTOR_ID))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["consultation"]["id"], id);
    assert_eq!(body["messages"], json!([]));

    Ok(())
}

#[tokio::test]
async fn test_duplicate_open_session_is_conflict() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    create_consultation(&server, &client).await?;

    let response = client
        .post(format!("{}/users/consultations", server.url()))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&create_body(TEST_DOCTOR_ID))
        .send()
        .await?;

    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "ACTIVE_SESSION_EXISTS");

    Ok(())
}

#[tokio::test]
async fn test_create_rejections() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/users/consultations", server.url());

    // Unverified doctor
    let response = client
        .post(&url)
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&create_body(TEST_UNVERIFIED_DOCTOR_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "DOCTOR_NOT_VERIFIED");

    // Unknown doctor
    let response = client
        .post(&url)
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&create_body(999))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    // Malformed birth date
    let response = client
        .post(&url)
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&json!({
            "doctor_id": TEST_DOCTOR_ID,
            "patient_gender_id": 1,
            "patient_name": "Ana",
            "patient_birth_date": "02/04/1990"
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Missing field
    let response = client
        .post(&url)
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&json!({ "doctor_id": TEST_DOCTOR_ID }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    Ok(())
}

#[tokio::test]
async fn test_authentication_and_role_checks() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/users/consultations", server.url());

    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), 401);
    assert!(response.headers().get("www-authenticate").is_some());

    let expired = TestTokenBuilder::new()
        .for_user(TEST_USER_ID)
        .expires_in(-3600)
        .sign();
    let response = client.get(&url).bearer_auth(expired).send().await?;
    assert_eq!(response.status(), 401);

    let response = client
        .get(&url)
        .bearer_auth(server.doctor_token(TEST_DOCTOR_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    Ok(())
}

#[tokio::test]
async fn test_non_participant_cannot_load() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?["id"]
        .as_i64()
        .unwrap();

    let response = client
        .get(format!("{}/users/consultations/{}", server.url(), id))
        .bearer_auth(server.user_token(TEST_OTHER_USER_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 403);

    let response = client
        .get(format!("{}/users/consultations/{}", server.url(), id + 1000))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn test_invalid_path_id_is_validation_error() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    for id in ["abc", "0", "-4"] {
        let response = client
            .get(format!("{}/users/consultations/{}", server.url(), id))
            .bearer_auth(server.user_token(TEST_USER_ID))
            .send()
            .await?;
        assert_eq!(response.status(), 400, "id {id}");
        let body: Value = response.json().await?;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    Ok(())
}

#[tokio::test]
async fn test_messages_then_end_session() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?["id"]
        .as_i64()
        .unwrap();

    for (prefix, token, content) in [
        ("/users", server.user_token(TEST_USER_ID), "hello"),
        ("/doctors", server.doctor_token(TEST_DOCTOR_ID), "hi, how can I help?"),
    ] {
        let response = client
            .post(format!("{}{}/consultations/{}/chats", server.url(), prefix, id))
            .bearer_auth(token)
            .json(&json!({ "content": content, "type": "text" }))
            .send()
            .await?;
        assert_eq!(response.status(), 201);
    }

    let response = client
        .post(format!("{}/doctors/consultations/{}/end", server.url(), id))
        .bearer_auth(server.doctor_token(TEST_DOCTOR_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let ended: Value = response.json().await?;
    assert_eq!(ended["id"], id);

    // Ending again is idempotent and reports the original timestamp.
    let response = client
        .post(format!("{}/users/consultations/{}/end", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let again: Value = response.json().await?;
    assert_eq!(again["ended_at"], ended["ended_at"]);

    let response = client
        .post(format!("{}/users/consultations/{}/chats", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&json!({ "content": "one more thing", "type": "text" }))
        .send()
        .await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "SESSION_ENDED");

    let response = client
        .get(format!("{}/users/consultations/{}", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?;
    let transcript: Value = response.json().await?;
    assert_eq!(transcript["consultation"]["status"], "ended");

    let messages = transcript["messages"].as_array().unwrap();
    let contents: Vec<&str> = messages
        .iter()
        .filter_map(|m| m["content"].as_str())
        .collect();
    assert_eq!(contents, vec!["hello", "hi, how can I help?", "session-ended"]);
    let ordinals: Vec<i64> = messages.iter().filter_map(|m| m["ordinal"].as_i64()).collect();
    assert!(ordinals.windows(2).all(|w| w.first() < w.last()));

    Ok(())
}

#[tokio::test]
async fn test_message_validation() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?["id"]
        .as_i64()
        .unwrap();
    let url = format!("{}/users/consultations/{}/chats", server.url(), id);

    for body in [
        json!({ "content": "   ", "type": "text" }),
        json!({ "content": "x".repeat(4001), "type": "text" }),
        json!({ "content": "hello", "type": "system" }),
    ] {
        let response = client
            .post(&url)
            .bearer_auth(server.user_token(TEST_USER_ID))
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), 400);
    }

    Ok(())
}

#[tokio::test]
async fn test_list_filters_by_status() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?["id"]
        .as_i64()
        .unwrap();

    let list = |query: &'static str, token: String, prefix: &'static str| {
        let client = client.clone();
        let url = format!("{}{}/consultations{}", server.url(), prefix, query);
        async move {
            let response = client.get(url).bearer_auth(token).send().await?;
            assert_eq!(response.status(), 200);
            let body: Value = response.json().await?;
            Ok::<Value, anyhow::Error>(body)
        }
    };

    let page = list("", server.user_token(TEST_USER_ID), "/users").await?;
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 10);

    let page = list("?status=ended", server.doctor_token(TEST_DOCTOR_ID), "/doctors").await?;
    assert_eq!(page["total"], 0);

    client
        .post(format!("{}/users/consultations/{}/end", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?;

    let page = list("?status=ended", server.doctor_token(TEST_DOCTOR_ID), "/doctors").await?;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], id);

    let page = list("", server.user_token(TEST_OTHER_USER_ID), "/users").await?;
    assert_eq!(page["total"], 0);

    let response = client
        .get(format!("{}/users/consultations?status=archived", server.url()))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    Ok(())
}
