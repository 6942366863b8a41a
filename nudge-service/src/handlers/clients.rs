use crate::dtos::CreateClientRequest;
use crate::middleware::UserId;
use crate::models::Client;
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

#[tracing::instrument(skip(state, request))]
pub async fn create_client(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    request.validate()?;

    let company = request
        .company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let client = Client::new(
        user_id.0,
        request.name.trim(),
        request.email.trim(),
        company,
        Utc::now(),
    );
    state.store.insert_client(&client).await?;
    tracing::info!(client_id = %client.client_id, "Client created");

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "client": client }))))
}

#[tracing::instrument(skip(state))]
pub async fn list_clients(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<Value>, AppError> {
    let clients = state.store.list_clients(&user_id.0).await?;
    Ok(Json(json!({ "ok": true, "clients": clients })))
}

#[tracing::instrument(skip(state))]
pub async fn get_client(
    State(state): State<AppState>,
    user_id: UserId,
    Path(client_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let client = state
        .store
        .find_client(&user_id.0, &client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;
    Ok(Json(json!({ "ok": true, "client": client })))
}
