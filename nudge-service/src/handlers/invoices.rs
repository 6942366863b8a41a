use crate::dtos::{ApplyFlowRequest, CreateInvoiceRequest, ResendRequest, UpdateInvoiceRequest};
use crate::handlers::workspace::load_workspace;
use crate::middleware::UserId;
use crate::models::{parse_calendar_date, Invoice, InvoiceStatus};
use crate::services::schedule::find_schedule;
use crate::services::templates::initialize_templates_for_schedule;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Duration, Utc};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(message.into()))
}

/// Loads an invoice owned by the caller; anything else is a 404.
pub async fn load_invoice(state: &AppState, user_id: &str, invoice_id: &str) -> Result<Invoice, AppError> {
    state
        .store
        .find_invoice_for_user(user_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
}

const DUE_DATE_YEARS: std::ops::RangeInclusive<i32> = 2000..=2100;

fn normalize_due_date(raw: &str) -> Result<String, AppError> {
    let date = parse_calendar_date(raw)
        .ok_or_else(|| bad_request("Invalid due date, expected YYYY-MM-DD"))?;
    if !DUE_DATE_YEARS.contains(&date.year()) {
        return Err(bad_request(format!(
            "Due date must fall between {} and {}",
            DUE_DATE_YEARS.start(),
            DUE_DATE_YEARS.end()
        )));
    }
    Ok(date.format("%Y-%m-%d").to_string())
}

fn validate_schedule(key: &str) -> Result<&'static str, AppError> {
    find_schedule(key)
        .map(|schedule| schedule.key)
        .ok_or_else(|| bad_request(format!("Unknown reminder schedule: {}", key)))
}

async fn ensure_client(state: &AppState, user_id: &str, client_id: &str) -> Result<(), AppError> {
    state
        .store
        .find_client(user_id, client_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))
}

/// Template sets may only be replaced while no reminder has gone out.
fn ensure_templates_replaceable(invoice: &Invoice) -> Result<(), AppError> {
    if invoice.status == InvoiceStatus::Paid {
        return Err(bad_request("Paid invoices cannot change their reminders"));
    }
    if invoice.scheduled_send_count() > 0 {
        return Err(bad_request(
            "Reminders cannot be changed after one has been sent",
        ));
    }
    Ok(())
}

#[tracing::instrument(skip(state, request))]
pub async fn create_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    request.validate()?;

    let now = Utc::now();
    let workspace = load_workspace(&state, &user_id.0).await?;
    let mut invoice = Invoice::new_draft(user_id.0.clone(), now);

    if let Some(client_id) = request.client_id {
        ensure_client(&state, &user_id.0, &client_id).await?;
        invoice.client_id = Some(client_id);
    }
    invoice.amount_cents = request.amount_cents;
    invoice.due_date = match request.due_date {
        Some(raw) => Some(normalize_due_date(&raw)?),
        None => workspace.default_payment_terms_days.map(|days| {
            (now.date_naive() + Duration::days(days))
                .format("%Y-%m-%d")
                .to_string()
        }),
    };
    invoice.payment_link = request.payment_link;
    if let Some(key) = request.reminder_schedule {
        invoice.reminder_schedule = validate_schedule(&key)?.to_string();
    }
    invoice.templates = Some(initialize_templates_for_schedule(
        &invoice.reminder_schedule,
        workspace.default_tone,
    ));

    state.store.insert_invoice(&invoice).await?;
    tracing::info!(invoice_id = %invoice.invoice_id, "Invoice created");

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "invoice": invoice }))))
}

#[tracing::instrument(skip(state))]
pub async fn list_invoices(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<Value>, AppError> {
    let invoices = state.store.list_invoices_for_user(&user_id.0).await?;
    Ok(Json(json!({ "ok": true, "invoices": invoices })))
}

#[tracing::instrument(skip(state))]
pub async fn get_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

#[tracing::instrument(skip(state, request))]
pub async fn update_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let _guard = state.locks.acquire(&invoice_id).await;
    let mut invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;

    if request.touches_commercial_fields() && invoice.is_locked() {
        return Err(bad_request(
            "Amount, due date, client and payment link cannot change once the invoice is sent",
        ));
    }

    if let Some(client_id) = request.client_id {
        ensure_client(&state, &user_id.0, &client_id).await?;
        invoice.client_id = Some(client_id);
    }
    if let Some(amount) = request.amount_cents {
        invoice.amount_cents = Some(amount);
    }
    if let Some(raw) = request.due_date {
        invoice.due_date = Some(normalize_due_date(&raw)?);
    }
    if let Some(link) = request.payment_link {
        invoice.payment_link = Some(link);
    }
    if let Some(key) = request.reminder_schedule {
        let key = validate_schedule(&key)?;
        if key != invoice.reminder_schedule {
            ensure_templates_replaceable(&invoice)?;
            let tone = load_workspace(&state, &user_id.0).await?.default_tone;
            invoice.reminder_schedule = key.to_string();
            invoice.templates = Some(initialize_templates_for_schedule(key, tone));
        }
    }

    invoice.updated_at = Some(Utc::now());
    state.store.replace_invoice(&invoice).await?;

    let invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

#[tracing::instrument(skip(state))]
pub async fn duplicate_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let original = load_invoice(&state, &user_id.0, &invoice_id).await?;
    let copy = original.duplicate(Utc::now());
    state.store.insert_invoice(&copy).await?;
    tracing::info!(source_id = %invoice_id, invoice_id = %copy.invoice_id, "Invoice duplicated");

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "invoice": copy }))))
}

#[tracing::instrument(skip(state))]
pub async fn mark_paid(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let _guard = state.locks.acquire(&invoice_id).await;
    let invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;

    match invoice.status {
        InvoiceStatus::Paid => {}
        InvoiceStatus::Draft => return Err(bad_request("Draft invoices cannot be marked paid")),
        InvoiceStatus::Sent | InvoiceStatus::Overdue => {
            state
                .store
                .update_status(&invoice_id, InvoiceStatus::Paid, Utc::now())
                .await?;
            tracing::info!(invoice_id = %invoice_id, "Invoice marked paid");
        }
    }

    let invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

#[tracing::instrument(skip(state))]
pub async fn send_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let invoice = state
        .sends
        .send_initial(&user_id.0, &invoice_id, Utc::now())
        .await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

#[tracing::instrument(skip(state))]
pub async fn send_next_reminder(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let sent = state
        .sends
        .send_next_reminder(&user_id.0, &invoice_id, Utc::now())
        .await?;
    Ok(Json(json!({
        "ok": true,
        "templateId": sent.slot_id,
        "invoice": sent.invoice,
    })))
}

#[tracing::instrument(skip(state, request))]
pub async fn resend(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
    Json(request): Json<ResendRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let invoice = state
        .sends
        .resend(&user_id.0, &invoice_id, &request.template_id, Utc::now())
        .await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}

/// Deep-copies a flow's schedule and templates into the invoice.
#[tracing::instrument(skip(state, request))]
pub async fn apply_flow(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<String>,
    Json(request): Json<ApplyFlowRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let flow = state
        .store
        .find_flow(&user_id.0, &request.flow_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Flow not found")))?;

    let _guard = state.locks.acquire(&invoice_id).await;
    let mut invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;
    ensure_templates_replaceable(&invoice)?;

    invoice.reminder_schedule = validate_schedule(&flow.schedule)?.to_string();
    invoice.templates = Some(flow.templates.clone());
    invoice.updated_at = Some(Utc::now());
    state.store.replace_invoice(&invoice).await?;
    tracing::info!(invoice_id = %invoice_id, flow_id = %flow.flow_id, "Flow applied to invoice");

    let invoice = load_invoice(&state, &user_id.0, &invoice_id).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}
