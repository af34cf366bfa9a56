use conference_client_sdk::Client;
use conference_client_sdk::auth::Impersonation;
use conference_client_sdk::config::{ClientConfig, RawServiceConfig};
use conference_client_sdk::error::{Kind, Status};
use conference_client_sdk::types::{
    CreateRoomRequest, CreateTokenRequest, Page, PatchOperation, Room,
};
use httpmock::prelude::*;
use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde_json::json;
use url::Url;

fn init_tracing() {
    // Another test may already have installed the subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::from_raw(
        &server.base_url(),
        RawServiceConfig {
            service_id: "service-1".to_owned(),
            service_key: SecretString::from("secret-key".to_owned()),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn create_room_is_signed_and_sends_json() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/rooms")
                .header_exists("authorization")
                .header("content-type", "application/json")
                .json_body(json!({"name": "standup"}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"_id": "r1", "name": "standup", "participantLimit": 10}));
        })
        .await;

    let client = Client::new(config(&server))?;
    let room = client
        .create_room(&CreateRoomRequest::builder().name("standup").build())
        .await?;

    mock.assert_async().await;
    assert_eq!(room.id, "r1");
    assert_eq!(room.participant_limit, Some(10));
    Ok(())
}

#[tokio::test]
async fn list_rooms_passes_page_query() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/rooms")
                .query_param("page", "2")
                .query_param("per_page", "5");
            then.status(200)
                .json_body(json!([{"_id": "r1", "name": "a"}, {"_id": "r2", "name": "b"}]));
        })
        .await;

    let client = Client::new(config(&server))?;
    let rooms: Vec<Room> = client.rooms(Page::new(2, 5)).await?;

    mock.assert_async().await;
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[1].id, "r2");
    Ok(())
}

#[tokio::test]
async fn error_status_becomes_status_error() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/rooms/missing");
            then.status(404).body("Room not found");
        })
        .await;

    let client = Client::new(config(&server))?;
    let err = client.room("missing").await.unwrap_err();

    assert_eq!(err.kind(), Kind::Status);
    let status = err.downcast_ref::<Status>().unwrap();
    assert_eq!(status.status_code, StatusCode::NOT_FOUND);
    assert_eq!(status.method, Method::GET);
    assert_eq!(status.path, "/v1/rooms/missing");
    assert_eq!(status.message, "Room not found");
    Ok(())
}

#[tokio::test]
async fn reserved_characters_in_ids_stay_in_the_path() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let sibling = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/rooms/r1");
            then.status(200).json_body(json!({"_id": "r1", "name": "standup"}));
        })
        .await;

    let client = Client::new(config(&server))?;
    let err = client.room("r1?x=1").await.unwrap_err();

    sibling.assert_hits_async(0).await;
    assert_eq!(err.kind(), Kind::Status);
    let status = err.downcast_ref::<Status>().unwrap();
    assert_eq!(status.status_code, StatusCode::NOT_FOUND);
    assert_eq!(status.path, "/v1/rooms/r1%3Fx=1");
    Ok(())
}

#[tokio::test]
async fn empty_page_sends_no_query() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/rooms").query_param_missing("page");
            then.status(200).json_body(json!([]));
        })
        .await;

    let client = Client::new(config(&server))?;
    let rooms = client.rooms(Page::default()).await?;

    mock.assert_async().await;
    assert!(rooms.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_error_body_falls_back_to_status_text() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/v1/rooms/r1");
            then.status(403);
        })
        .await;

    let client = Client::new(config(&server))?;
    let err = client.delete_room("r1").await.unwrap_err();

    let status = err.downcast_ref::<Status>().unwrap();
    assert_eq!(status.status_code, StatusCode::FORBIDDEN);
    assert_eq!(status.message, "Forbidden");
    Ok(())
}

#[tokio::test]
async fn delete_room_ignores_response_body() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/v1/rooms/r1");
            then.status(200).body("Room deleted");
        })
        .await;

    let client = Client::new(config(&server))?;
    client.delete_room("r1").await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn patch_and_token_calls() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let patch = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/v1/rooms/r1/participants/p1")
                .json_body(json!([{"op": "replace", "path": "/permission/publish", "value": false}]));
            then.status(200)
                .json_body(json!({"id": "p1", "role": "viewer", "user": "alice"}));
        })
        .await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/rooms/r1/tokens")
                .json_body(json!({"user": "alice", "role": "viewer"}));
            then.status(200).body("dG9rZW4=");
        })
        .await;

    let client = Client::new(config(&server))?;
    let participant = client
        .update_participant(
            "r1",
            "p1",
            &[PatchOperation::replace("/permission/publish", json!(false))],
        )
        .await?;
    let issued = client
        .create_token(
            "r1",
            &CreateTokenRequest::builder().user("alice").role("viewer").build(),
        )
        .await?;

    patch.assert_async().await;
    token.assert_async().await;
    assert_eq!(participant.user, "alice");
    assert_eq!(issued, "dG9rZW4=");
    Ok(())
}

#[tokio::test]
async fn impersonated_calls_still_reach_the_service() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/rooms/r1").header_exists("authorization");
            then.status(200).json_body(json!({"_id": "r1", "name": "standup"}));
        })
        .await;

    let client = Client::new(
        config(&server).with_impersonation(Impersonation::new("alice", "presenter")),
    )?;
    let room = client.room("r1").await?;

    mock.assert_async().await;
    assert_eq!(room.name, "standup");
    Ok(())
}

#[tokio::test]
async fn missing_credentials_fail_before_sending() -> anyhow::Result<()> {
    let config = ClientConfig::new(Url::parse("http://127.0.0.1:9/")?, None)?;
    let client = Client::new(config)?;

    let err = client.room("r1").await.unwrap_err();

    assert_eq!(err.kind(), Kind::Unauthenticated);
    Ok(())
}

#[test]
fn send_blocking_goes_through_worker() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/rooms/r1").header_exists("authorization");
        then.status(200).json_body(json!({"_id": "r1", "name": "standup"}));
    });

    let client = Client::new(
        config(&server).with_sync_worker(env!("CARGO_BIN_EXE_conference-sync-worker")),
    )
    .unwrap();
    let room: Room = client
        .send_blocking(Method::GET, "v1/rooms/r1", None::<&()>)
        .unwrap();

    mock.assert();
    assert_eq!(room.id, "r1");
}

#[test]
fn send_blocking_without_worker_is_service_unavailable() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/rooms/r1");
        then.status(200).json_body(json!({"_id": "r1", "name": "standup"}));
    });
    let worker = std::env::temp_dir().join("no-such-conference-sync-worker");

    let client = Client::new(config(&server).with_sync_worker(worker)).unwrap();
    let err = client
        .send_blocking::<(), Room>(Method::GET, "v1/rooms/r1", None)
        .unwrap_err();

    mock.assert_hits(0);
    assert_eq!(err.kind(), Kind::Status);
    let status = err.downcast_ref::<Status>().unwrap();
    assert_eq!(status.status_code, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!status.message.is_empty(), "failure trace should be reported");
}
