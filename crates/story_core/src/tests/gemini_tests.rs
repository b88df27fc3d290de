use super::*;
use crate::{
    controller::{GenerationOutcome, StoryController},
    service::SYSTEM_INSTRUCTION,
};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct RecordedRequest {
    path: String,
    query: Option<String>,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
enum Reply {
    Sse(Vec<&'static str>),
    Status(StatusCode, &'static str),
}

#[derive(Clone)]
struct ServerState {
    reply: Reply,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn handle_generate(
    State(state): State<ServerState>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.recorded.lock().await.push(RecordedRequest {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });

    match state.reply {
        Reply::Sse(chunks) => {
            let body = Body::from_stream(futures::stream::iter(
                chunks.into_iter().map(Ok::<_, std::io::Error>),
            ));
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        Reply::Status(status, body) => {
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
    }
}

async fn spawn_gemini_server(
    reply: Reply,
) -> anyhow::Result<(String, Arc<Mutex<Vec<RecordedRequest>>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .fallback(handle_generate)
        .with_state(ServerState {
            reply,
            recorded: recorded.clone(),
        });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), recorded))
}

fn client_for(server_url: &str) -> GeminiClient {
    let http = Client::builder().no_proxy().build().expect("http client");
    GeminiClient::with_http_client(
        http,
        GeminiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            base_url: Url::parse(server_url).expect("server url"),
        },
    )
}

async fn collect(stream: FragmentStream) -> Vec<Result<String, GenerationError>> {
    stream.collect().await
}

fn chunk_event(text: &str) -> String {
    let chunk = json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]});
    format!("data: {chunk}\r\n\r\n")
}

fn leak(event: String) -> &'static str {
    Box::leak(event.into_boxed_str())
}

#[test]
fn endpoint_targets_sse_stream_and_tolerates_trailing_slash() {
    let client = GeminiClient::new(GeminiConfig {
        api_key: "k".to_string(),
        model: "gemini-2.5-flash".to_string(),
        base_url: Url::parse("https://example.com/").expect("url"),
    });

    assert_eq!(
        client.endpoint().expect("endpoint").as_str(),
        "https://example.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
    );
    assert_eq!(client.model(), "gemini-2.5-flash");
}

#[tokio::test]
async fn streams_fragments_and_sends_prompt_with_system_instruction() {
    let events = vec![
        leak(chunk_event("Once")),
        leak(chunk_event(" upon")),
        leak(chunk_event(" a time")),
    ];
    let (server_url, recorded) = spawn_gemini_server(Reply::Sse(events))
        .await
        .expect("spawn server");
    let client = client_for(&server_url);

    let stream = client
        .stream_generate(GenerationRequest::story("A shy dragon"))
        .await
        .expect("stream");
    let fragments: Vec<String> = collect(stream)
        .await
        .into_iter()
        .map(|item| item.expect("fragment"))
        .collect();
    assert_eq!(fragments, vec!["Once", " upon", " a time"]);

    let recorded = recorded.lock().await;
    assert_eq!(recorded.len(), 1);
    let request = &recorded[0];
    assert_eq!(
        request.path,
        "/v1beta/models/gemini-test:streamGenerateContent"
    );
    assert_eq!(request.query.as_deref(), Some("alt=sse"));
    assert_eq!(request.api_key.as_deref(), Some("test-key"));
    assert_eq!(
        request.body,
        json!({
            "contents": [{"role": "user", "parts": [{"text": "A shy dragon"}]}],
            "systemInstruction": {"parts": [{"text": SYSTEM_INSTRUCTION}]}
        })
    );
}

#[tokio::test]
async fn reassembles_events_split_across_body_chunks() {
    let (server_url, _) = spawn_gemini_server(Reply::Sse(vec![
        "data: {\"candidates\": [{\"content\": ",
        "{\"parts\": [{\"text\": \"Hel",
        "lo\"}]}}]}\n",
        "\n: keep-alive\n\n",
        "data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"!\"}]}}]}",
    ]))
    .await
    .expect("spawn server");

    let stream = client_for(&server_url)
        .stream_generate(GenerationRequest::story("hi"))
        .await
        .expect("stream");
    let fragments: Vec<String> = collect(stream)
        .await
        .into_iter()
        .map(|item| item.expect("fragment"))
        .collect();
    assert_eq!(fragments, vec!["Hello", "!"]);
}

fn chunk_json(text: &str) -> String {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
}

async fn fragments_from_body(chunks: Vec<String>) -> Vec<Result<String, GenerationError>> {
    let body = futures::stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok::<Vec<u8>, reqwest::Error>(chunk.into_bytes())),
    );
    collect(fragment_stream(body)).await
}

fn texts(items: Vec<Result<String, GenerationError>>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.expect("fragment"))
        .collect()
}

#[tokio::test]
async fn lone_carriage_returns_end_lines() {
    let body = format!("data: {}\r\rdata: {}\r\r", chunk_json("a"), chunk_json("b"));

    let items = fragments_from_body(vec![body]).await;

    assert_eq!(texts(items), vec!["a", "b"]);
}

#[tokio::test]
async fn crlf_event_split_inside_line_ending_is_reassembled() {
    let event = chunk_event("Hello");
    let (head, tail) = event.split_at(event.len() - 3);

    let items = fragments_from_body(vec![head.to_string(), tail.to_string()]).await;

    assert_eq!(texts(items), vec!["Hello"]);
}

#[tokio::test]
async fn multi_line_data_fields_form_one_payload() {
    let body = "data: {\"candidates\": [{\"content\":\ndata: {\"parts\": [{\"text\": \"joined\"}]}}]}\n\n";

    let items = fragments_from_body(vec![body.to_string()]).await;

    assert_eq!(texts(items), vec!["joined"]);
}

#[tokio::test]
async fn comments_and_other_fields_are_ignored() {
    let body = format!(
        ": ping\n\nevent: message\nid: 7\ndata: {}\n\n",
        chunk_json("kept")
    );

    let items = fragments_from_body(vec![body]).await;

    assert_eq!(texts(items), vec!["kept"]);
}

#[tokio::test]
async fn unterminated_final_event_is_flushed() {
    let body = format!("data: {}", chunk_json("last"));

    let items = fragments_from_body(vec![body]).await;

    assert_eq!(texts(items), vec!["last"]);
}

#[tokio::test]
async fn error_status_maps_to_api_exception() {
    let (server_url, _) = spawn_gemini_server(Reply::Status(
        StatusCode::TOO_MANY_REQUESTS,
        r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#,
    ))
    .await
    .expect("spawn server");

    let result = client_for(&server_url)
        .stream_generate(GenerationRequest::story("hi"))
        .await;
    let Err(err) = result else {
        panic!("expected request failure");
    };
    assert_eq!(err.code(), ErrorCode::ResourceExhausted);
    match err {
        GenerationError::Api(exception) => {
            assert_eq!(exception.code, 429);
            assert_eq!(exception.message, "Resource has been exhausted");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_body_falls_back_to_http_status() {
    let (server_url, _) =
        spawn_gemini_server(Reply::Status(StatusCode::FORBIDDEN, "  forbidden  "))
            .await
            .expect("spawn server");

    let result = client_for(&server_url)
        .stream_generate(GenerationRequest::story("hi"))
        .await;
    let Err(GenerationError::Api(exception)) = result else {
        panic!("expected api failure");
    };
    assert_eq!(exception.code, 403);
    assert_eq!(exception.status, ErrorCode::PermissionDenied);
    assert_eq!(exception.message, "forbidden");
}

#[tokio::test]
async fn blocked_prompt_ends_stream_with_blocked_error() {
    let (server_url, _) = spawn_gemini_server(Reply::Sse(vec![
        "data: {\"promptFeedback\": {\"blockReason\": \"SAFETY\"}}\n\n",
    ]))
    .await
    .expect("spawn server");

    let stream = client_for(&server_url)
        .stream_generate(GenerationRequest::story("hi"))
        .await
        .expect("stream");
    let items = collect(stream).await;
    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(GenerationError::Blocked(reason)) => assert_eq!(reason, "SAFETY"),
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn in_band_error_terminates_stream_after_earlier_fragments() {
    let events = vec![
        leak(chunk_event("The cat")),
        "data: {\"error\": {\"code\": 503, \"message\": \"overloaded\", \"status\": \"UNAVAILABLE\"}}\n\n",
        leak(chunk_event(" is never seen")),
    ];
    let (server_url, _) = spawn_gemini_server(Reply::Sse(events))
        .await
        .expect("spawn server");

    let stream = client_for(&server_url)
        .stream_generate(GenerationRequest::story("Cats in space"))
        .await
        .expect("stream");
    let items = collect(stream).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().expect("fragment"), "The cat");
    match &items[1] {
        Err(err @ GenerationError::Api(_)) => assert_eq!(err.code(), ErrorCode::Unavailable),
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let (server_url, _) = spawn_gemini_server(Reply::Sse(vec!["data: {not json\n\n"]))
        .await
        .expect("spawn server");

    let stream = client_for(&server_url)
        .stream_generate(GenerationRequest::story("hi"))
        .await
        .expect("stream");
    let items = collect(stream).await;
    assert!(matches!(items.as_slice(), [Err(GenerationError::Decode(_))]));
}

#[tokio::test]
async fn controller_streams_story_through_gemini_client() {
    let events = vec![
        leak(chunk_event("Once")),
        leak(chunk_event(" upon")),
        leak(chunk_event(" a time")),
    ];
    let (server_url, _) = spawn_gemini_server(Reply::Sse(events))
        .await
        .expect("spawn server");
    let client = client_for(&server_url);
    let controller = StoryController::new();
    controller.edit_prompt("A shy dragon");

    let outcome = controller.submit(&client).await.expect("accepted");

    assert_eq!(outcome, GenerationOutcome::Completed { fragments: 3 });
    let state = controller.snapshot();
    assert_eq!(state.story, "Once upon a time");
    assert_eq!(state.error, "");
    assert!(!state.is_loading);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result = client_for(&format!("http://{addr}"))
        .stream_generate(GenerationRequest::story("hi"))
        .await;
    assert!(matches!(result, Err(GenerationError::Transport(_))));
}
