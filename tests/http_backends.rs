//! Model clients and the liveness server against real local HTTP endpoints.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use codex20::config::LlmConfig;
use codex20::llm::{GeminiClient, GroqClient, LlmClient, LlmError, EMPTY_REPLY};
use codex20::prompt::Prompt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Seen {
    keys: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Gemini stand-in: keys listed in `exhausted` get a 429.
fn gemini_router(seen: Seen, exhausted: &'static [&'static str]) -> Router {
    Router::new()
        .route(
            "/models/{model}",
            post(
                move |State(seen): State<Seen>,
                      headers: HeaderMap,
                      uri: axum::http::Uri,
                      Json(body): Json<Value>| async move {
                    assert!(uri.query().is_none(), "key must not travel in the URL");
                    let key = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.keys.lock().unwrap().push(key.clone());
                    seen.bodies.lock().unwrap().push(body);
                    if exhausted.contains(&key.as_str()) {
                        return (
                            StatusCode::TOO_MANY_REQUESTS,
                            Json(json!({ "error": { "message": "Resource has been exhausted (e.g. check quota)." } })),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "candidates": [{ "content": { "parts": [{ "text": format!("risposta con {}", key) }] } }]
                        })),
                    )
                },
            ),
        )
        .with_state(seen)
}

fn gemini_config(keys: &[&str]) -> LlmConfig {
    LlmConfig {
        provider: "gemini".to_string(),
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        timeout_secs: 5,
        ..LlmConfig::default()
    }
}

fn prompt() -> Prompt {
    Prompt::compose("Sei Codex20.\n", String::new(), "Quanti PF ha un goblin?")
}

#[tokio::test]
async fn gemini_rotates_past_exhausted_key() {
    let seen = Seen::default();
    let base = spawn(gemini_router(seen.clone(), &["k1"])).await;
    let client = GeminiClient::new(&gemini_config(&["k1", "k2"]))
        .unwrap()
        .with_base_url(&base);

    let answer = client.generate(&prompt()).await.unwrap();
    assert_eq!(answer, "risposta con k2");
    assert_eq!(*seen.keys.lock().unwrap(), vec!["k1", "k2"]);

    // The ring stays on the working key for the next request.
    client.generate(&prompt()).await.unwrap();
    assert_eq!(seen.keys.lock().unwrap().last().unwrap(), "k2");

    let bodies = seen.bodies.lock().unwrap();
    let text = bodies[0]["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(text.ends_with("\n\nUtente: Quanti PF ha un goblin?"));
}

#[tokio::test]
async fn gemini_gives_up_after_every_key() {
    let seen = Seen::default();
    let base = spawn(gemini_router(seen.clone(), &["k1", "k2", "k3"])).await;
    let client = GeminiClient::new(&gemini_config(&["k1", "k2", "k3"]))
        .unwrap()
        .with_base_url(&base);

    let err = client.generate(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::QuotaExhausted { attempts: 3 }));
    assert_eq!(seen.keys.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn gemini_other_errors_are_not_retried() {
    let router = Router::new().route(
        "/models/{model}",
        post(|| async { (StatusCode::BAD_REQUEST, "bad prompt") }),
    );
    let base = spawn(router).await;
    let client = GeminiClient::new(&gemini_config(&["k1", "k2"]))
        .unwrap()
        .with_base_url(&base);

    match client.generate(&prompt()).await {
        Err(LlmError::Http { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad prompt");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(client.keys().current(), Some((0, "k1")));
}

#[tokio::test]
async fn gemini_transport_error_hides_api_key() {
    let client = GeminiClient::new(&gemini_config(&["SECRET-KEY-123"]))
        .unwrap()
        .with_base_url("http://127.0.0.1:1");

    let err = client.generate(&prompt()).await.unwrap_err();
    assert!(matches!(err, LlmError::Transport(_)));

    let mut chain = vec![err.to_string(), format!("{:?}", err)];
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    for text in chain {
        assert!(!text.contains("SECRET-KEY-123"), "key leaked: {}", text);
    }
}

#[tokio::test]
async fn groq_sends_system_and_user_messages() {
    let seen = Seen::default();
    let router = Router::new()
        .route(
            "/chat/completions",
            post(
                |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.keys.lock().unwrap().push(auth);
                    seen.bodies.lock().unwrap().push(body);
                    Json(json!({ "choices": [{ "message": { "content": "" } }] }))
                },
            ),
        )
        .with_state(seen.clone());
    let base = spawn(router).await;

    let config = LlmConfig {
        provider: "groq".to_string(),
        api_keys: vec!["gk".to_string()],
        ..LlmConfig::default()
    };
    let client = GroqClient::new(&config).unwrap().with_base_url(&base);

    let answer = client.generate(&prompt()).await.unwrap();
    assert_eq!(answer, EMPTY_REPLY);
    assert_eq!(seen.keys.lock().unwrap()[0], "Bearer gk");

    let bodies = seen.bodies.lock().unwrap();
    let body = &bodies[0];
    assert_eq!(body["model"], "llama-3.3-70b-versatile");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "Sei Codex20.\n");
    assert_eq!(body["messages"][1]["content"], "Quanti PF ha un goblin?");
    assert_eq!(body["max_tokens"], 2048);
}

#[tokio::test]
async fn liveness_endpoints() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        codex20::server::serve(listener).await.unwrap();
    });

    let client = reqwest::Client::new();
    let banner = client
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(banner.status(), 200);
    assert_eq!(banner.text().await.unwrap(), "Codex20 is alive!\n");

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert!(health["started_at"].is_string());
}
