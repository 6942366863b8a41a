use crate::dtos::{parse_tone, UpdateWorkspaceRequest};
use crate::middleware::UserId;
use crate::models::Workspace;
use crate::startup::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::{Validate, ValidateEmail};

/// Stored workspace, or defaults for a user who never saved one.
pub async fn load_workspace(state: &AppState, user_id: &str) -> Result<Workspace, AppError> {
    Ok(state
        .store
        .find_workspace(user_id)
        .await?
        .unwrap_or_else(|| Workspace {
            user_id: user_id.to_string(),
            ..Default::default()
        }))
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[tracing::instrument(skip(state))]
pub async fn get_workspace(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<Value>, AppError> {
    let workspace = load_workspace(&state, &user_id.0).await?;
    Ok(Json(json!({ "ok": true, "workspace": workspace })))
}

#[tracing::instrument(skip(state, request))]
pub async fn update_workspace(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<UpdateWorkspaceRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let mut workspace = load_workspace(&state, &user_id.0).await?;
    if let Some(name) = request.display_name {
        workspace.display_name = blank_to_none(name);
    }
    if let Some(company) = request.company_name {
        workspace.company_name = blank_to_none(company);
    }
    if let Some(tone) = request.default_tone {
        workspace.default_tone = parse_tone(&tone)?;
    }
    if let Some(days) = request.default_payment_terms_days {
        workspace.default_payment_terms_days = Some(days);
    }
    if let Some(cc) = request.cc_email {
        let cc = blank_to_none(cc);
        if cc.as_deref().is_some_and(|address| !address.validate_email()) {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid cc email address")));
        }
        workspace.cc_email = cc;
    }
    workspace.updated_at = Some(Utc::now());

    state.store.upsert_workspace(&workspace).await?;
    Ok(Json(json!({ "ok": true, "workspace": workspace })))
}
