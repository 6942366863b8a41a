use crate::dtos::CreateFlowRequest;
use crate::handlers::invoices::load_invoice;
use crate::handlers::workspace::load_workspace;
use crate::middleware::UserId;
use crate::models::EmailFlow;
use crate::services::templates::{initialize_templates_for_schedule, normalize_templates};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

/// Saves a snapshot of an invoice's schedule and templates under a name.
#[tracing::instrument(skip(state, request))]
pub async fn create_flow(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    request.validate()?;

    let invoice = load_invoice(&state, &user_id.0, &request.invoice_id).await?;
    let default_tone = load_workspace(&state, &user_id.0).await?.default_tone;
    let templates = match invoice.templates {
        Some(templates) if !templates.is_empty() => normalize_templates(templates, default_tone),
        _ => initialize_templates_for_schedule(&invoice.reminder_schedule, default_tone),
    };

    let flow = EmailFlow {
        flow_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.0.clone(),
        name: request.name.trim().to_string(),
        schedule: invoice.reminder_schedule,
        templates,
        created_at: Some(Utc::now()),
    };
    state.store.insert_flow(&flow).await?;
    tracing::info!(flow_id = %flow.flow_id, "Email flow saved");

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "flow": flow }))))
}

#[tracing::instrument(skip(state))]
pub async fn list_flows(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<Value>, AppError> {
    let flows = state.store.list_flows(&user_id.0).await?;
    Ok(Json(json!({ "ok": true, "flows": flows })))
}

/// Invoices that applied the flow keep their own copy of the templates.
#[tracing::instrument(skip(state))]
pub async fn delete_flow(
    State(state): State<AppState>,
    user_id: UserId,
    Path(flow_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_flow(&user_id.0, &flow_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Flow not found")));
    }
    Ok(Json(json!({ "ok": true })))
}
