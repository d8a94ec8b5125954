use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use dispatch_common::RequestError;
use dispatch_transport::{ChatMessage, ChatPayload, CompletionPayload, CompletionTransport, HttpTransport, Payload};
use serde_json::{json, Value};

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    format!("{}:{}", addr.ip(), addr.port())
}

fn completion(prompt: &str) -> Payload {
    Payload::Completion(CompletionPayload {
        model: "m".into(),
        prompt: prompt.into(),
        max_tokens: 16,
        temperature: 0.0,
        ignore_eos: false,
        stream: false,
        seed: Some(42),
        top_p: None,
        repetition_penalty: None,
        skip_special_tokens: true,
        stop: vec!["<|im_end|>".into()],
    })
}

#[tokio::test]
async fn completion_round_trip_hits_completions_path() {
    let app = Router::new().route(
        "/v1/completions",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["stream"], json!(false));
            assert_eq!(body["model"], json!("m"));
            let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
            Json(json!({"choices": [{"text": format!("ok-{prompt}")}]}))
        }),
    );
    let base = spawn(app).await;
    let transport = HttpTransport::new(&base, Duration::from_secs(5)).unwrap();
    let reply = transport.send(&completion("A")).await.unwrap();
    assert_eq!(reply["choices"][0]["text"], json!("ok-A"));
}

#[tokio::test]
async fn chat_payload_goes_to_chat_path() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            let content = body["messages"][1]["content"].clone();
            Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
        }),
    );
    let base = spawn(app).await;
    let transport = HttpTransport::new(&format!("http://{base}/"), Duration::from_secs(5)).unwrap();
    let payload = Payload::Chat(ChatPayload {
        model: "m".into(),
        messages: vec![ChatMessage::new("system", "be brief"), ChatMessage::new("user", "hi")],
        max_tokens: 8,
        temperature: 0.7,
        stream: false,
        seed: None,
        top_p: Some(0.8),
        repetition_penalty: Some(1.05),
        stop: Vec::new(),
    });
    let reply = transport.send(&payload).await.unwrap();
    assert_eq!(reply["choices"][0]["message"]["content"], json!("hi"));
}

#[tokio::test]
async fn non_success_status_is_request_error() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async { (StatusCode::BAD_REQUEST, "model not found") }),
    );
    let base = spawn(app).await;
    let transport = HttpTransport::new(&base, Duration::from_secs(5)).unwrap();
    let err = transport.send(&completion("A")).await.unwrap_err();
    assert_eq!(err, RequestError::Status { status: 400, body: "model not found".into() });
}

#[tokio::test]
async fn non_json_body_is_malformed_reply() {
    let app = Router::new().route("/v1/completions", post(|| async { "definitely not json" }));
    let base = spawn(app).await;
    let transport = HttpTransport::new(&base, Duration::from_secs(5)).unwrap();
    let err = transport.send(&completion("A")).await.unwrap_err();
    assert!(matches!(err, RequestError::MalformedReply(_)));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"choices": []}))
        }),
    );
    let base = spawn(app).await;
    let transport = HttpTransport::new(&base, Duration::from_millis(100)).unwrap();
    let err = transport.send(&completion("A")).await.unwrap_err();
    assert_eq!(err, RequestError::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let transport = HttpTransport::new(&addr.to_string(), Duration::from_secs(2)).unwrap();
    let err = transport.send(&completion("A")).await.unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)));
}
