//! Requests through `HttpTransport` against a mock server.

use crate::integration::mock_server::MockServerFixture;
use discord_rest::types::File;
use discord_rest::{ErrorKind, Method, RequestDescriptor};
use mockito::Matcher;
use serde_json::json;

#[tokio::test]
async fn test_get_gateway_is_unauthenticated() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/gateway")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"url":"wss://gateway.discord.gg"}"#)
            .create_async()
            .await
    };

    let info = fixture.client().get_gateway().await.unwrap();
    assert_eq!(info.url, "wss://gateway.discord.gg");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_outbound_headers() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("DELETE", "/channels/111/messages/222")
            .match_header("authorization", "Bot mock-token")
            .match_header(
                "user-agent",
                Matcher::Regex(r"^DiscordBot \(discord-rest-rs, ".to_string()),
            )
            .match_header("x-audit-log-reason", "needs%20cleanup")
            .with_status(204)
            .create_async()
            .await
    };

    let request = RequestDescriptor::builder(Method::Delete, "/channels/111/messages/222")
        .reason("needs cleanup")
        .build()
        .unwrap();
    let resp = fixture.client().request(request).await.unwrap();
    assert!(resp.is_no_content());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_query_parameters_forwarded() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/channels/111/messages")
            .match_query(Matcher::UrlEncoded("limit".into(), "50".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await
    };

    let request = RequestDescriptor::builder(Method::Get, "/channels/111/messages")
        .query("limit", "50")
        .build()
        .unwrap();
    let resp = fixture.client().request(request).await.unwrap();
    assert_eq!(resp.as_json(), Some(&json!([])));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_json_body_sent() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/channels/111/messages")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"content": "hello"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"999","content":"hello"}"#)
            .create_async()
            .await
    };

    let resp = fixture
        .client()
        .post("/channels/111/messages", json!({"content": "hello"}))
        .await
        .unwrap();
    assert_eq!(resp.as_json().unwrap()["id"], "999");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_files_sent_as_multipart_with_payload_json() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/channels/111/messages")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="payload_json""#.to_string()),
                Matcher::Regex(r#"name="files\[0\]"; filename="notes.txt""#.to_string()),
                Matcher::Regex("file contents".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"1"}"#)
            .create_async()
            .await
    };

    let request = RequestDescriptor::builder(Method::Post, "/channels/111/messages")
        .json(json!({"content": "see attached"}))
        .file(File::new("notes.txt", b"file contents".to_vec()))
        .build()
        .unwrap();
    fixture.client().request(request).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_vendor_error_exposes_response() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json(
            "GET",
            "/guilds/1",
            403,
            r#"{"message":"Missing Access","code":50001}"#,
        )
        .await;

    let err = fixture.client().get("/guilds/1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
    match err {
        discord_rest::Error::Rest(rest) => {
            assert_eq!(rest.code, 50001);
            assert_eq!(rest.status().as_u16(), 403);
            assert_eq!(rest.message(), "Missing Access on GET /guilds/1");
            assert!(rest.headers().contains_key("content-type"));

            let snapshot = serde_json::to_value(rest.snapshot()).unwrap();
            assert_eq!(snapshot["name"], "RestError");
            assert_eq!(snapshot["code"], 50001);
            assert_eq!(snapshot["path"], "/guilds/1");
        }
        other => panic!("expected RestError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_retried_then_surfaced() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/users/@me")
            .with_status(502)
            .with_body("bad gateway")
            .expect(3)
            .create_async()
            .await
    };

    let err = fixture.client().get("/users/@me").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(err.to_string().starts_with("502 Bad Gateway on GET /users/@me"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bucket_state_learned_from_headers() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_limited("GET", "/channels/111/pins", "feedbeef", 5, 4)
        .await;
    let client = fixture.client();

    client.get("/channels/111/pins").await.unwrap();
    let signals = client.signals().await;
    assert_eq!(signals.buckets.len(), 1);
    assert_eq!(signals.buckets[0].limit, Some(5));
    assert_eq!(signals.buckets[0].remaining, 4);
    assert_eq!(signals.latency.samples, 1);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = discord_rest::RestClient::builder()
        .base_url("http://127.0.0.1:9")
        .token("Bot x")
        .retry(discord_rest::RetryOptions {
            max_attempts: 2,
            min_delay_ms: 1,
            max_delay_ms: 1,
            jitter: false,
        })
        .build()
        .unwrap();

    let err = client.get("/users/@me").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}
