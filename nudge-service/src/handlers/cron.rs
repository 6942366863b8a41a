use crate::dtos::CronParams;
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::utils::secrets_match;

/// `GET /api/cron/reminders?secret=...`: runs the daily batch for today's
/// UTC date.
#[tracing::instrument(skip(state, params))]
pub async fn run_reminders(
    State(state): State<AppState>,
    Query(params): Query<CronParams>,
) -> Result<Json<Value>, AppError> {
    let presented = params.secret.unwrap_or_default();
    if !secrets_match(&state.cron_secret, &presented) {
        tracing::warn!("Rejected reminder batch trigger with a bad secret");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Unauthorized")));
    }

    let summary = state.scheduler.run(Utc::now()).await?;

    Ok(Json(json!({
        "ok": true,
        "processed": summary.processed,
        "sent": summary.sent,
        "skipped": summary.skipped,
        "failed": summary.failed,
        "abandoned": summary.abandoned,
        "date": summary.date,
    })))
}
