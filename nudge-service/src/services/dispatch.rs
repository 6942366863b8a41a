//! Turning an invoice slot into an outgoing email.
//!
//! Shared by the daily batch and the manual send paths. Nothing here writes
//! to the invoice; recording the outcome is up to the caller.

use crate::models::{Client, Invoice, Tone, Workspace};
use crate::services::identity::IdentityProvider;
use crate::services::names::{sender_display_name_or, sign_off_name};
use crate::services::placeholders::{escape_html, render_body, render_subject, PlaceholderContext};
use crate::services::providers::{EmailMessage, EmailProvider, ProviderError, ProviderResponse};
use crate::services::store::NudgeStore;
use crate::services::templates::normalize_templates;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invoice has no client")]
    MissingClient,

    #[error("Client not found")]
    ClientNotFound,

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error(transparent)]
    Store(#[from] AppError),

    #[error("{0}")]
    Delivery(#[from] ProviderError),
}

/// Values for `{{token}}` substitution. A missing client yields empty names,
/// which is what previews show before a client is picked.
pub fn placeholder_context(
    invoice: &Invoice,
    client: Option<&Client>,
    workspace: Option<&Workspace>,
) -> PlaceholderContext {
    PlaceholderContext {
        client_name: client.map(|c| c.name.clone()).unwrap_or_default(),
        amount_cents: invoice.amount_cents,
        due_date: invoice.due_date.clone(),
        payment_link: invoice.payment_link.clone().unwrap_or_default(),
        your_name: sign_off_name(workspace),
    }
}

/// Rendered body plus a pay button. The body is already escaped where it
/// needs to be; only line breaks are converted.
pub fn body_to_html(body: &str, payment_link: Option<&str>) -> String {
    let mut html = String::from("<div style=\"font-family: sans-serif; line-height: 1.5;\">");
    for line in body.lines() {
        html.push_str(line);
        html.push_str("<br>\n");
    }
    if let Some(link) = payment_link.filter(|l| !l.trim().is_empty()) {
        html.push_str(&format!(
            "<p><a href=\"{}\" style=\"display: inline-block; padding: 10px 16px; background: #2563eb; color: #ffffff; text-decoration: none; border-radius: 6px;\">Pay invoice</a></p>",
            escape_html(link)
        ));
    }
    html.push_str("</div>");
    html
}

pub struct ReminderDispatcher {
    store: Arc<dyn NudgeStore>,
    email: Arc<dyn EmailProvider>,
    identity: Arc<dyn IdentityProvider>,
    default_from_name: String,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn NudgeStore>,
        email: Arc<dyn EmailProvider>,
        identity: Arc<dyn IdentityProvider>,
        default_from_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            email,
            identity,
            default_from_name: default_from_name.into(),
        }
    }

    /// Builds the email for `slot_id` from the invoice's own templates.
    /// `subject_override` replaces the template subject before substitution.
    pub async fn compose(
        &self,
        invoice: &Invoice,
        slot_id: &str,
        subject_override: Option<&str>,
    ) -> Result<EmailMessage, DispatchError> {
        let client_id = invoice
            .client_id
            .as_deref()
            .ok_or(DispatchError::MissingClient)?;
        let client = self
            .store
            .find_client(&invoice.user_id, client_id)
            .await?
            .ok_or(DispatchError::ClientNotFound)?;
        let workspace = self.store.find_workspace(&invoice.user_id).await?;

        let default_tone = workspace
            .as_ref()
            .map(|w| w.default_tone)
            .unwrap_or(Tone::Friendly);
        let templates = normalize_templates(invoice.templates.clone().unwrap_or_default(), default_tone);
        let template = templates
            .into_iter()
            .find(|t| t.id == slot_id && t.has_canonical_content())
            .ok_or_else(|| DispatchError::TemplateNotFound(slot_id.to_string()))?;

        let ctx = placeholder_context(invoice, Some(&client), workspace.as_ref());
        let subject = render_subject(subject_override.unwrap_or(&template.subject), &ctx);
        let body = render_body(&template.body, &ctx);

        let cc = workspace
            .as_ref()
            .and_then(|w| w.cc_email.as_ref())
            .map(|cc| cc.trim().to_string())
            .filter(|cc| !cc.is_empty() && !cc.eq_ignore_ascii_case(&client.email));

        let reply_to = match self.identity.primary_email(&invoice.user_id).await {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(user_id = %invoice.user_id, error = %e, "Reply-to lookup failed, sending without it");
                None
            }
        };

        Ok(EmailMessage {
            from_name: sender_display_name_or(workspace.as_ref(), &self.default_from_name),
            to: client.email.clone(),
            cc,
            subject,
            html: body_to_html(&body, invoice.payment_link.as_deref()),
            reply_to,
        })
    }

    pub async fn deliver(&self, message: &EmailMessage) -> Result<ProviderResponse, DispatchError> {
        Ok(self.email.send(message).await?)
    }

    pub async fn send_slot(
        &self,
        invoice: &Invoice,
        slot_id: &str,
        subject_override: Option<&str>,
    ) -> Result<ProviderResponse, DispatchError> {
        let message = self.compose(invoice, slot_id, subject_override).await?;
        self.deliver(&message).await
    }
}
