//! End-to-end remote function calls over a real socket.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use remote_mux::codec::{Blob, RegExp, Value};
use remote_mux::config::ServerConfig;
use remote_mux::remote::ClientError;

mod common;

#[tokio::test]
async fn test_scalar_calls() {
    let server = common::start_server(ServerConfig::default()).await;
    let client = server.client();

    let sum = client.call("add", &[3.into(), 4.into()]).await.unwrap();
    assert_eq!(sum, Value::Number(7.0));

    assert_eq!(client.call("echo", &["false".into()]).await.unwrap(), Value::from("false"));
    assert_eq!(client.call("echo", &[true.into()]).await.unwrap(), Value::Bool(true));
    assert_eq!(client.call("echo", &[Value::Null]).await.unwrap(), Value::Null);
    assert_eq!(client.call("echo", &[]).await.unwrap(), Value::Undefined);

    server.stop().await;
}

#[tokio::test]
async fn test_rich_values_round_trip() {
    let server = common::start_server(ServerConfig::default()).await;
    let client = server.client();

    let at: DateTime<Utc> = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.678Z")
        .unwrap()
        .with_timezone(&Utc);
    let value = Value::object([
        ("when", Value::date(at)),
        ("pattern", RegExp::new("a+b", "gi").unwrap().into()),
        ("tags", Value::Set(vec!["x".into(), "y".into()])),
        ("scores", Value::Map(vec![(1.into(), "one".into()), ("two".into(), 2.into())])),
        ("ratio", Value::Number(1.5)),
        ("files", Value::Array(vec![
            Blob::file("a.bin", vec![0u8, 1, 2, 255]).into(),
            Blob::new(vec![9u8; 100]).into(),
        ])),
    ]);

    let echoed = client.call("echo", &[value.clone()]).await.unwrap();
    assert_eq!(echoed, value);

    server.stop().await;
}

#[tokio::test]
async fn test_root_binary_round_trip() {
    let server = common::start_server(ServerConfig::default()).await;
    let client = server.client();

    let photo = Value::from(Blob::file("photo.png", vec![137u8, 80, 78, 71]));
    assert_eq!(client.call("echo", &[photo.clone()]).await.unwrap(), photo);

    server.stop().await;
}

#[tokio::test]
async fn test_errors_carry_status_and_message() {
    let server = common::start_server(ServerConfig::default()).await;
    let client = server.client();

    match client.call("missing_fn", &[]).await {
        Err(ClientError::Remote { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.contains("missing_fn"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    match client.call("conflict", &[]).await {
        Err(ClientError::Remote { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "already exists");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_raw_protocol() {
    let server = common::start_server(ServerConfig::default()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(server.url("/remote"))
        .header("x-func-name", "add")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.text().await.unwrap(),
        "Content-type must be \"multipart/form-data\""
    );

    let form = reqwest::multipart::Form::new().text("0", "1");
    let response = http
        .post(server.url("/remote"))
        .header("x-func-name", "created")
        .header("x-func-param-datatypes", "[]")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = http
        .post(server.url("/remote"))
        .header("x-func-name", "created")
        .header("x-func-param-datatypes", "[]")
        .multipart(reqwest::multipart::Form::new())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["data-type"], "string");
    assert_eq!(response.text().await.unwrap(), "made");

    let response = http.get(server.url("/remote")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "Not found");

    let response = http.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_side_channel_headers_reach_client() {
    let server = common::start_server(ServerConfig::default()).await;

    let response = reqwest::Client::new()
        .post(server.url("/remote"))
        .header("x-func-name", "conflict")
        .header("x-func-param-datatypes", "[]")
        .multipart(reqwest::multipart::Form::new())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response.headers()["x-reason"], "duplicate");

    server.stop().await;
}

#[tokio::test]
async fn test_cookies_visible_to_functions() {
    let server = common::start_server(ServerConfig::default()).await;
    let client = server.client().header("cookie", "user=ada; theme=dark").unwrap();

    assert_eq!(client.call("whoami", &[]).await.unwrap(), Value::from("ada"));

    server.stop().await;
}

#[tokio::test]
async fn test_field_size_limit() {
    let mut config = ServerConfig::default();
    config.remote.max_field_size = 16;
    let server = common::start_server(config).await;
    let client = server.client();

    assert_eq!(client.call("echo", &["short".into()]).await.unwrap(), Value::from("short"));
    match client.call("echo", &["x".repeat(64).into()]).await {
        Err(ClientError::Remote { status, .. }) => assert_eq!(status, 400),
        other => panic!("unexpected result: {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_api_key_required() {
    let mut config = ServerConfig::default();
    config.security.api_key = Some("secret".into());
    let server = common::start_server(config).await;

    match server.client().call("add", &[1.into()]).await {
        Err(ClientError::Remote { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Unauthorized");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let client = server.client().header("x-api-key", "secret").unwrap();
    assert_eq!(client.call("add", &[1.into(), 2.into()]).await.unwrap(), Value::Number(3.0));

    server.stop().await;
}
