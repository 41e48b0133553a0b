use axum::{
    Json,
    http::{HeaderMap, header},
};
use serde_json::{Value, json};

pub async fn health(headers: HeaderMap) -> Json<Value> {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info!(target: "audit", "ACCESS HEALTH {}", agent);

    Json(json!({ "status": "ok" }))
}
