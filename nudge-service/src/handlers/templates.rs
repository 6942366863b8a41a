use crate::dtos::{parse_tone, PreviewParams, PreviewResponse, RevertTemplateRequest, UpdateTemplateRequest};
use crate::handlers::invoices::load_invoice;
use crate::handlers::workspace::load_workspace;
use crate::middleware::UserId;
use crate::models::{Invoice, TemplateInstance, Tone};
use crate::services::dispatch::{body_to_html, placeholder_context};
use crate::services::placeholders::{render_body, render_subject};
use crate::services::templates::{
    get_tone_variant, initialize_templates_for_schedule, normalize_templates,
    revert_tone_variant_to_defaults, update_tone_variant,
};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

/// Templates as the sender would see them. Invoices created before
/// templates existed get a fresh set in the workspace tone.
fn current_templates(invoice: &Invoice, default_tone: Tone) -> Vec<TemplateInstance> {
    match invoice.templates.clone() {
        Some(templates) if !templates.is_empty() => normalize_templates(templates, default_tone),
        _ => initialize_templates_for_schedule(&invoice.reminder_schedule, default_tone),
    }
}

fn template_not_found(template_id: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Template not found: {}", template_id))
}

/// Applies `edit` to one template and persists the whole array.
async fn mutate_template<F>(
    state: &AppState,
    user_id: &str,
    invoice_id: &str,
    template_id: &str,
    edit: F,
) -> Result<Invoice, AppError>
where
    F: FnOnce(&TemplateInstance) -> TemplateInstance,
{
    let _guard = state.locks.acquire(invoice_id).await;
    let mut invoice = load_invoice(state, user_id, invoice_id).await?;
    let default_tone = load_workspace(state, user_id).await?.default_tone;

    let mut templates = current_templates(&invoice, default_tone);
    let template = templates
        .iter_mut()
        .find(|t| t.id == template_id)
        .ok_or_else(|| template_not_found(template_id))?;
    *template = edit(&*template);

    invoice.templates = Some(templates);
    invoice.updated_at = Some(Utc::now());
    state.store.replace_invoice(&invoice).await?;

    load_invoice(state, user_id, invoice_id).await
}

#[tracing::instrument(skip(state, request))]
pub async fn update_template(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, template_id)): Path<(String, String)>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;
    let tone = parse_tone(&request.tone)?;

    let invoice = mutate_template(&state, &user_id.0, &invoice_id, &template_id, |template| {
        update_tone_variant(template, tone, &request.subject, &request.body)
    })
    .await?;
    tracing::info!(invoice_id = %invoice_id, template_id = %template_id, tone = %tone, "Template variant updated");

    Ok(Json(json!({
        "ok": true,
        "template": invoice.template(&template_id),
    })))
}

#[tracing::instrument(skip(state, request))]
pub async fn revert_template(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, template_id)): Path<(String, String)>,
    Json(request): Json<RevertTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    let tone = parse_tone(&request.tone)?;

    let invoice = mutate_template(&state, &user_id.0, &invoice_id, &template_id, |template| {
        revert_tone_variant_to_defaults(template, tone)
    })
    .await?;

    Ok(Json(json!({
        "ok": true,
        "template": invoice.template(&template_id),
    })))
}

/// Renders a template against the invoice without sending anything.
#[tracing::instrument(skip(state))]
pub async fn preview_template(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, template_id)): Path<(String, String)>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<PreviewResponse>, AppError> {
    let invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;
    let workspace = load_workspace(&state, &user_id.0).await?;

    let template = current_templates(&invoice, workspace.default_tone)
        .into_iter()
        .find(|t| t.id == template_id)
        .ok_or_else(|| template_not_found(&template_id))?;

    let (tone, subject, body) = match params.tone.as_deref() {
        Some(raw) => {
            let tone = parse_tone(raw)?;
            let variant = get_tone_variant(&template, tone);
            (tone, variant.subject, variant.body)
        }
        None => (
            template.tone.unwrap_or(workspace.default_tone),
            template.subject.clone(),
            template.body.clone(),
        ),
    };

    let client = match invoice.client_id.as_deref() {
        Some(client_id) => state.store.find_client(&user_id.0, client_id).await?,
        None => None,
    };
    let ctx = placeholder_context(&invoice, client.as_ref(), Some(&workspace));
    let subject = render_subject(&subject, &ctx);
    let body = render_body(&body, &ctx);
    let html = body_to_html(&body, invoice.payment_link.as_deref());

    Ok(Json(PreviewResponse {
        ok: true,
        template_id,
        tone: tone.to_string(),
        subject,
        body,
        html,
    }))
}
