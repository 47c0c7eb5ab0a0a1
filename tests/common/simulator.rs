//! In-process stand-in for the simulator HTTP API

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::fixtures::TWO_REQUEST_TRACE;

/// Prompt that makes the stub answer with a 500
pub const FAILING_PROMPT: &str = "explode";

async fn simulate(Json(request): Json<Value>) -> Result<Json<Value>, (StatusCode, String)> {
    let prompt = request["prompt"].as_str().unwrap_or_default();
    if prompt == FAILING_PROMPT {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "simulator exploded".to_string(),
        ));
    }

    let mut trace: Value = serde_json::from_str(TWO_REQUEST_TRACE).expect("fixture trace");
    trace["tokens"] = json!(prompt.split_whitespace().collect::<Vec<_>>());
    // Echo the request so callers can see what was sent
    trace["token_timeline"] = json!({ "max_tokens": request["max_tokens"] });
    Ok(Json(trace))
}

fn router() -> Router {
    Router::new()
        .route("/simulate", post(simulate))
        .route("/health", get(|| async { "ok" }))
}

/// Serve the stub on an ephemeral port from a background thread; returns its base URL.
pub fn spawn_stub_simulator() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind stub");
    listener
        .set_nonblocking(true)
        .expect("Failed to set stub listener non-blocking");
    let addr = listener.local_addr().expect("Stub has no local addr");

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build stub runtime");
        runtime.block_on(async move {
            let listener =
                tokio::net::TcpListener::from_std(listener).expect("Failed to adopt listener");
            axum::serve(listener, router()).await.expect("Stub server failed");
        });
    });

    format!("http://{addr}")
}

/// Base URL of a port nothing listens on
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
