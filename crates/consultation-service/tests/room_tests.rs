//! Room socket integration tests.
//!
//! Real WebSocket clients against a `TestServer`: presence frames, live
//! delivery, session end, inactivity auto-end and reconnect.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use consultation_service::config::RoomSettings;
use consultation_test_utils::*;
use serde_json::{json, Value};
use std::time::Duration;

async fn create_consultation(
    server: &TestServer,
    client: &reqwest::Client,
) -> Result<i64, anyhow::Error> {
    let response = client
        .post(format!("{}/users/consultations", server.url()))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&json!({
            "doctor_id": TEST_DOCTOR_ID,
            "patient_gender_id": 1,
            "patient_name": "Ana",
            "patient_birth_date": "1990-04-02"
        }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    Ok(response.json::<Value>().await?["id"].as_i64().unwrap())
}

/// Connect both sides and wait until each has seen the other join.
async fn connect_both(
    server: &TestServer,
    id: i64,
) -> Result<(RoomClient, RoomClient), anyhow::Error> {
    let mut user =
        RoomClient::connect(server, "/users", id, &server.user_token(TEST_USER_ID)).await?;
    let mut doctor =
        RoomClient::connect(server, "/doctors", id, &server.doctor_token(TEST_DOCTOR_ID)).await?;

    assert!(user.next_event().await?.is_system("peer-joined"));
    assert!(doctor.next_event().await?.is_system("peer-joined"));
    Ok((user, doctor))
}

#[tokio::test]
async fn test_happy_path_over_sockets() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?;

    let (mut user, mut doctor) = connect_both(&server, id).await?;

    let response = client
        .post(format!("{}/users/consultations/{}/chats", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&json!({ "content": "hello", "type": "text" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);

    let frame = doctor.next_frame().await?;
    assert_eq!(frame["sender_side"], "user");
    assert_eq!(frame["content"], "hello");
    assert_eq!(frame["kind"], "text");
    // The sender's own socket sees the message too.
    assert_eq!(user.next_frame().await?["content"], "hello");

    // Inbound socket text is appended like a POST.
    doctor.send_text("drink plenty of water").await?;
    let frame = user.next_frame().await?;
    assert_eq!(frame["sender_side"], "doctor");
    assert_eq!(frame["content"], "drink plenty of water");
    assert_eq!(doctor.next_frame().await?["content"], "drink plenty of water");

    let response = client
        .post(format!("{}/doctors/consultations/{}/end", server.url(), id))
        .bearer_auth(server.doctor_token(TEST_DOCTOR_ID))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    for socket in [&mut user, &mut doctor] {
        assert!(socket.next_event().await?.is_system("session-ended"));
        assert_eq!(
            socket.next_event().await?,
            RoomEvent::Closed(Some("ended".to_string()))
        );
    }

    let response = client
        .post(format!("{}/users/consultations/{}/chats", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .json(&json!({ "content": "are you there?", "type": "text" }))
        .send()
        .await?;
    assert_eq!(response.status(), 409);

    Ok(())
}

#[tokio::test]
async fn test_join_refused_before_upgrade() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?;

    // Not a participant
    let status = RoomClient::connect_refused(
        &server,
        "/users",
        id,
        &server.user_token(TEST_OTHER_USER_ID),
    )
    .await?;
    assert_eq!(status, 403);

    // Bad token
    let status = RoomClient::connect_refused(&server, "/users", id, "not-a-token").await?;
    assert_eq!(status, 401);

    client
        .post(format!("{}/users/consultations/{}/end", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?;

    let status =
        RoomClient::connect_refused(&server, "/users", id, &server.user_token(TEST_USER_ID))
            .await?;
    assert_eq!(status, 409);

    Ok(())
}

#[tokio::test]
async fn test_joining_activates_pending_session() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?;

    let (_user, _doctor) = connect_both(&server, id).await?;

    let transcript: Value = client
        .get(format!("{}/users/consultations/{}", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(transcript["consultation"]["status"], "active");

    Ok(())
}

#[tokio::test]
async fn test_inactivity_auto_ends_session() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn_with_settings(RoomSettings {
        inactivity_deadline: Duration::from_millis(300),
        ..RoomSettings::default()
    })
    .await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?;

    let mut user =
        RoomClient::connect(&server, "/users", id, &server.user_token(TEST_USER_ID)).await?;

    assert!(user.next_event().await?.is_system("session-ended"));
    assert_eq!(
        user.next_event().await?,
        RoomEvent::Closed(Some("ended".to_string()))
    );

    let transcript: Value = client
        .get(format!("{}/users/consultations/{}", server.url(), id))
        .bearer_auth(server.user_token(TEST_USER_ID))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(transcript["consultation"]["status"], "auto_ended");
    assert!(!transcript["consultation"]["ended_at"].is_null());

    let last = transcript["messages"].as_array().unwrap().last().unwrap();
    assert_eq!(last["kind"], "system");
    assert_eq!(last["content"], "session-ended");
    assert!(last["sender_side"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_reconnect_notifies_peer() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();
    let id = create_consultation(&server, &client).await?;

    let (user, mut doctor) = connect_both(&server, id).await?;
    user.close().await?;

    let mut user =
        RoomClient::connect(&server, "/users", id, &server.user_token(TEST_USER_ID)).await?;

    assert!(doctor.next_event().await?.is_system("peer-left"));
    assert!(doctor.next_event().await?.is_system("peer-joined"));
    assert!(user.next_event().await?.is_system("peer-joined"));

    // The new socket is live.
    user.send_text("back again").await?;
    assert_eq!(doctor.next_frame().await?["content"], "back again");

    let transcript: Value = client
        .get(format!("{}/doctors/consultations/{}", server.url(), id))
        .bearer_auth(server.doctor_token(TEST_DOCTOR_ID))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(transcript["consultation"]["status"], "active");
    assert_eq!(transcript["messages"].as_array().unwrap().len(), 1);

    Ok(())
}
