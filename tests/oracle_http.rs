//! OpenRouter oracle against a local HTTP server.

use edgequake_svg2pdf::{OpenRouterOracle, OracleConfig, RepairOracle, RepairValidator, ValidationError};
use std::io::Read;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Response, Server, StatusCode};

struct Captured {
    method: String,
    url: String,
    authorization: Option<String>,
    body: serde_json::Value,
}

/// Serve exactly one request with `status` and `reply`, reporting what arrived.
fn serve_once(status: u16, reply: String) -> (String, mpsc::Receiver<Captured>, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let endpoint = format!("http://{}/api/v1/chat/completions", server.server_addr());
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut raw = String::new();
            request.as_reader().read_to_string(&mut raw).expect("read body");
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());
            tx.send(Captured {
                method: request.method().as_str().to_string(),
                url: request.url().to_string(),
                authorization,
                body: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            })
            .expect("send capture");
            let response = Response::from_string(reply)
                .with_status_code(StatusCode(status))
                .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
            request.respond(response).expect("respond");
        }
    });
    (endpoint, rx, handle)
}

fn envelope(content: &str) -> String {
    serde_json::json!({
        "id": "gen-1",
        "choices": [{ "message": { "role": "assistant", "content": content } }],
    })
    .to_string()
}

fn config(endpoint: String) -> OracleConfig {
    OracleConfig {
        endpoint,
        model: "test/model".into(),
        timeout_secs: 5,
        ..OracleConfig::default()
    }
}

#[tokio::test]
async fn request_carries_model_json_mode_and_bearer_key() {
    let (endpoint, rx, handle) = serve_once(200, envelope(r#"{"fixed":false}"#));
    let oracle = OpenRouterOracle::new(&config(endpoint), "sk-test").unwrap();

    let reply = oracle.complete("system prompt", "<svg/>").await.unwrap();
    assert_eq!(reply, r#"{"fixed":false}"#);

    let captured = rx.recv().unwrap();
    handle.join().unwrap();
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.url, "/api/v1/chat/completions");
    assert_eq!(captured.authorization.as_deref(), Some("Bearer sk-test"));

    let body = captured.body;
    assert_eq!(body["model"], "test/model");
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["max_tokens"], 4000);
    let temperature = body["temperature"].as_f64().unwrap();
    assert!((temperature - 0.7).abs() < 1e-6, "temperature {temperature}");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "system prompt");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "<svg/>");
}

#[tokio::test]
async fn unauthorised_answer_is_upstream_error_with_status() {
    let (endpoint, _rx, handle) = serve_once(401, r#"{"error":"bad key"}"#.into());
    let oracle = OpenRouterOracle::new(&config(endpoint), "sk-wrong").unwrap();

    let err = oracle.complete("s", "<svg/>").await.unwrap_err();
    handle.join().unwrap();
    assert_eq!(
        err,
        ValidationError::UpstreamError {
            detail: "401".into()
        }
    );
    assert_eq!(err.to_string(), "API request failed: 401");
}

#[tokio::test]
async fn envelope_without_choices_is_parse_error() {
    let (endpoint, _rx, handle) = serve_once(200, r#"{"id":"gen-2","choices":[]}"#.into());
    let oracle = OpenRouterOracle::new(&config(endpoint), "sk-test").unwrap();

    let err = oracle.complete("s", "<svg/>").await.unwrap_err();
    handle.join().unwrap();
    assert!(matches!(err, ValidationError::ResponseParseError { .. }));
}

#[tokio::test]
async fn validator_repairs_through_http_oracle() {
    let verdict = serde_json::json!({
        "fixed": true,
        "svg_content": "<svg xmlns=\"http://www.w3.org/2000/svg\"><rect/></svg>",
        "issues_found": ["unclosed rect"],
        "warnings": [],
    })
    .to_string();
    // Models often wrap JSON in a Markdown fence.
    let (endpoint, _rx, handle) = serve_once(200, envelope(&format!("```json\n{verdict}\n```")));
    let oracle = OpenRouterOracle::new(&config(endpoint), "sk-test").unwrap();
    let validator = RepairValidator::new(Arc::new(oracle));

    let report = validator
        .validate_and_repair(b"<svg xmlns=\"http://www.w3.org/2000/svg\"><rect></svg>")
        .await
        .unwrap();
    handle.join().unwrap();

    assert!(report.fixed);
    assert_eq!(report.content, "<svg xmlns=\"http://www.w3.org/2000/svg\"><rect/></svg>");
    assert_eq!(report.issues, vec!["unclosed rect".to_string()]);
}

#[tokio::test]
async fn missing_key_never_reaches_the_network() {
    let validator = RepairValidator::from_config(&OracleConfig::default());
    assert!(!validator.is_configured());
    let err = validator.validate_and_repair(b"<svg/>").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Repair oracle is not configured: OpenRouter API key not configured"
    );
}
