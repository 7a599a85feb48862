use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde_json::{Value, json};
use std::convert::Infallible;

pub const GREETING_REPLY: &str = "Hello! The gateway is up and auditing requests.";
const DEFAULT_MODEL: &str = "gateway";

pub fn greeting_response(model: Option<&str>, streaming: bool) -> Response {
    let model = model.unwrap_or(DEFAULT_MODEL);
    let created = chrono::Utc::now().timestamp();
    let id = format!("chatcmpl-local-{}", created);

    if streaming {
        return stream_response(&id, model, created);
    }

    let body = json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": GREETING_REPLY},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
    });
    (StatusCode::OK, Json(body)).into_response()
}

fn chunk(id: &str, model: &str, created: i64, delta: Value, finish: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
    })
}

pub fn sse_events(id: &str, model: &str, created: i64) -> Vec<String> {
    let first = chunk(
        id,
        model,
        created,
        json!({"role": "assistant", "content": GREETING_REPLY}),
        None,
    );
    let last = chunk(id, model, created, json!({}), Some("stop"));

    vec![
        format!("data: {}\n\n", first),
        format!("data: {}\n\n", last),
        "data: [DONE]\n\n".to_string(),
    ]
}

fn stream_response(id: &str, model: &str, created: i64) -> Response {
    let events = sse_events(id, model, created)
        .into_iter()
        .map(|e| Ok::<_, Infallible>(Bytes::from(e)));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream::iter(events)),
    )
        .into_response()
}
