use crate::services::schedule::SCHEDULES;
use axum::Json;
use serde_json::{json, Value};

pub async fn list_schedules() -> Json<Value> {
    Json(json!({ "ok": true, "schedules": SCHEDULES }))
}
