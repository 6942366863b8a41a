//! On-demand sends: the initial invoice email, "send next reminder" and
//! resend. None of these look at dates.
//!
//! Provider failures never escape as generic errors. They are stamped on the
//! invoice as `lastEmailError*` and returned as [`AppError::EmailError`] with
//! a message saying what happened to the invoice.

use crate::models::{Invoice, InvoiceStatus, ReminderRecord, Tone};
use crate::services::dispatch::{DispatchError, ReminderDispatcher};
use crate::services::locks::InvoiceLocks;
use crate::services::metrics::record_reminder;
use crate::services::schedule::resolve_schedule;
use crate::services::store::NudgeStore;
use crate::services::templates::{initialize_templates_for_schedule, normalize_templates};
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;

pub const RESEND_SUBJECT: &str = "Friendly reminder about your invoice";

pub const CONTEXT_INITIAL_SEND: &str = "initial-send";
pub const CONTEXT_SEND_NEXT: &str = "send-next-reminder";
pub const CONTEXT_MANUAL_RESEND: &str = "manual-resend";

pub struct SendService {
    store: Arc<dyn NudgeStore>,
    dispatcher: Arc<ReminderDispatcher>,
    locks: InvoiceLocks,
}

/// What "send next" delivered.
#[derive(Debug, Clone)]
pub struct SentReminder {
    pub slot_id: String,
    pub invoice: Invoice,
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(message.into()))
}

fn invoice_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Invoice not found"))
}

impl SendService {
    pub fn new(store: Arc<dyn NudgeStore>, dispatcher: Arc<ReminderDispatcher>, locks: InvoiceLocks) -> Self {
        Self {
            store,
            dispatcher,
            locks,
        }
    }

    async fn load(&self, user_id: &str, invoice_id: &str) -> Result<Invoice, AppError> {
        self.store
            .find_invoice_for_user(user_id, invoice_id)
            .await?
            .ok_or_else(invoice_not_found)
    }

    async fn reload(&self, invoice_id: &str) -> Result<Invoice, AppError> {
        self.store
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(invoice_not_found)
    }

    /// Maps a dispatch failure. Delivery failures are recorded on the
    /// invoice under `context`; the rest are the caller's fault or ours.
    async fn dispatch_failure(
        &self,
        invoice_id: &str,
        error: DispatchError,
        context: &str,
        user_message: &str,
        now: DateTime<Utc>,
    ) -> AppError {
        match error {
            DispatchError::Delivery(provider_error) => {
                tracing::error!(invoice_id = %invoice_id, context = %context, error = %provider_error, "Email send failed");
                record_reminder(context, "failed");
                if let Err(e) = self
                    .store
                    .record_email_error(invoice_id, &provider_error.to_string(), context, now)
                    .await
                {
                    tracing::error!(invoice_id = %invoice_id, error = %e, "Failed to record email error");
                }
                AppError::EmailError(user_message.to_string())
            }
            DispatchError::MissingClient | DispatchError::ClientNotFound => {
                bad_request("A client with an email address is required before sending")
            }
            DispatchError::TemplateNotFound(slot) => {
                bad_request(format!("Template {} not found on this invoice", slot))
            }
            DispatchError::Store(e) => e,
        }
    }

    async fn clear_error_if_any(&self, invoice_id: &str, now: DateTime<Utc>) -> Result<Invoice, AppError> {
        let mut invoice = self.reload(invoice_id).await?;
        if invoice.last_email_error_message.is_some() || invoice.last_email_error_context.is_some() {
            invoice.clear_email_error();
            invoice.updated_at = Some(now);
            self.store.replace_invoice(&invoice).await?;
        }
        Ok(invoice)
    }

    /// Sends the `initial` email of a draft and moves it to `sent`.
    #[tracing::instrument(skip(self))]
    pub async fn send_initial(
        &self,
        user_id: &str,
        invoice_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Invoice, AppError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let mut invoice = self.load(user_id, invoice_id).await?;

        if invoice.status != InvoiceStatus::Draft {
            return Err(bad_request("Only draft invoices can be sent"));
        }
        if invoice.amount_cents.is_none() {
            return Err(bad_request("Amount is required"));
        }
        if invoice.due_date_parsed().is_none() {
            return Err(bad_request("A valid due date is required"));
        }
        if invoice
            .payment_link
            .as_deref()
            .map_or(true, |link| link.trim().is_empty())
        {
            return Err(bad_request("Payment link is required"));
        }

        let default_tone = self
            .store
            .find_workspace(user_id)
            .await?
            .map(|w| w.default_tone)
            .unwrap_or(Tone::Friendly);
        let templates = match invoice.templates.take() {
            Some(existing) if !existing.is_empty() => normalize_templates(existing, default_tone),
            _ => initialize_templates_for_schedule(&invoice.reminder_schedule, default_tone),
        };
        invoice.templates = Some(templates);

        if let Err(e) = self.dispatcher.send_slot(&invoice, "initial", None).await {
            return Err(self
                .dispatch_failure(
                    invoice_id,
                    e,
                    CONTEXT_INITIAL_SEND,
                    "The email could not be sent. The invoice was not changed and is still a draft.",
                    now,
                )
                .await);
        }

        invoice.status = InvoiceStatus::Sent;
        invoice.sent_at = Some(now);
        invoice.clear_email_error();
        invoice.updated_at = Some(now);
        self.store.replace_invoice(&invoice).await?;
        record_reminder(CONTEXT_INITIAL_SEND, "sent");
        tracing::info!(invoice_id = %invoice_id, "Invoice sent");

        self.reload(invoice_id).await
    }

    /// Sends the first reminder slot of the invoice's schedule that has no
    /// scheduled record yet.
    #[tracing::instrument(skip(self))]
    pub async fn send_next_reminder(
        &self,
        user_id: &str,
        invoice_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SentReminder, AppError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let invoice = self.load(user_id, invoice_id).await?;

        if !invoice.status.accepts_reminders() {
            return Err(bad_request(
                "Reminders can only be sent for invoices that are sent or overdue",
            ));
        }

        let schedule = resolve_schedule(&invoice.reminder_schedule);
        let slots = schedule.reminder_slots();
        let next = if invoice.scheduled_send_count() >= slots.len() {
            None
        } else {
            slots.into_iter().find(|slot| !invoice.has_scheduled_send(slot.id))
        };
        let Some(next) = next else {
            return Err(bad_request("All reminders have already been sent"));
        };
        if invoice.template(next.id).is_none() {
            return Err(bad_request(format!(
                "Template {} not found on this invoice",
                next.id
            )));
        }

        if let Err(e) = self.dispatcher.send_slot(&invoice, next.id, None).await {
            return Err(self
                .dispatch_failure(
                    invoice_id,
                    e,
                    CONTEXT_SEND_NEXT,
                    "The reminder could not be sent. The invoice was saved and no reminder was recorded.",
                    now,
                )
                .await);
        }

        let record = ReminderRecord::scheduled(next.id, now);
        if !self.store.append_reminder_if_absent(invoice_id, &record).await? {
            tracing::warn!(invoice_id = %invoice_id, slot_id = %next.id, "Reminder was already recorded by another writer");
        }
        record_reminder(CONTEXT_SEND_NEXT, "sent");
        tracing::info!(invoice_id = %invoice_id, slot_id = %next.id, "Next reminder sent");

        Ok(SentReminder {
            slot_id: next.id.to_string(),
            invoice: self.clear_error_if_any(invoice_id, now).await?,
        })
    }

    /// Re-sends a template's content under the fixed resend subject.
    #[tracing::instrument(skip(self))]
    pub async fn resend(
        &self,
        user_id: &str,
        invoice_id: &str,
        template_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Invoice, AppError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let invoice = self.load(user_id, invoice_id).await?;

        if !invoice.status.accepts_reminders() {
            return Err(bad_request(
                "Only invoices that are sent or overdue can be resent",
            ));
        }
        if invoice.template(template_id).is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Template not found")));
        }

        if let Err(e) = self
            .dispatcher
            .send_slot(&invoice, template_id, Some(RESEND_SUBJECT))
            .await
        {
            return Err(self
                .dispatch_failure(
                    invoice_id,
                    e,
                    CONTEXT_MANUAL_RESEND,
                    "The email could not be resent. The invoice was saved and nothing else changed.",
                    now,
                )
                .await);
        }

        self.store
            .push_reminder(invoice_id, &ReminderRecord::manual_resend(template_id, now))
            .await?;
        record_reminder(CONTEXT_MANUAL_RESEND, "sent");
        tracing::info!(invoice_id = %invoice_id, template_id = %template_id, "Invoice email resent");

        self.clear_error_if_any(invoice_id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Client, ReminderKind};
    use crate::services::identity::NoopIdentityProvider;
    use crate::services::providers::MockEmailProvider;
    use crate::services::store::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        email: Arc<MockEmailProvider>,
        sends: SendService,
        invoice_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let email = Arc::new(MockEmailProvider::new());
        let dispatcher = Arc::new(ReminderDispatcher::new(
            store.clone(),
            email.clone(),
            Arc::new(NoopIdentityProvider),
            "Nudge",
        ));

        let client = Client::new("user-1", "Ada Lovelace", "ada@example.com", None, Utc::now());
        store.insert_client(&client).await.unwrap();

        let mut invoice = Invoice::new_draft("user-1", Utc::now());
        invoice.client_id = Some(client.client_id.clone());
        invoice.amount_cents = Some(50_000);
        invoice.due_date = Some("2024-06-30".to_string());
        invoice.payment_link = Some("https://pay.example.com/1".to_string());
        store.insert_invoice(&invoice).await.unwrap();

        Fixture {
            sends: SendService::new(store.clone(), dispatcher, InvoiceLocks::new()),
            store,
            email,
            invoice_id: invoice.invoice_id,
        }
    }

    #[tokio::test]
    async fn test_initial_send_creates_templates_and_marks_sent() {
        let f = fixture().await;
        let invoice = f.sends.send_initial("user-1", &f.invoice_id, Utc::now()).await.unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert!(invoice.sent_at.is_some());
        assert_eq!(invoice.templates.as_ref().map(Vec::len), Some(4));
        assert_eq!(f.email.send_count(), 1);
    }

    #[tokio::test]
    async fn test_initial_send_failure_leaves_draft_and_records_error() {
        let f = fixture().await;
        f.email.set_failing(true);

        let err = f
            .sends
            .send_initial("user-1", &f.invoice_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmailError(ref msg) if msg.contains("still a draft")));

        let stored = f.store.find_invoice(&f.invoice_id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Draft);
        assert!(stored.templates.is_none());
        assert_eq!(stored.last_email_error_context.as_deref(), Some(CONTEXT_INITIAL_SEND));
    }

    #[tokio::test]
    async fn test_initial_send_requires_payment_link() {
        let f = fixture().await;
        let mut invoice = f.store.find_invoice(&f.invoice_id).await.unwrap().unwrap();
        invoice.payment_link = None;
        f.store.replace_invoice(&invoice).await.unwrap();

        let err = f
            .sends
            .send_initial("user-1", &f.invoice_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(f.email.send_count(), 0);
    }

    #[tokio::test]
    async fn test_send_next_walks_registry_then_stops() {
        let f = fixture().await;
        f.sends.send_initial("user-1", &f.invoice_id, Utc::now()).await.unwrap();

        for expected in ["reminder1", "reminder2", "reminder3"] {
            let sent = f
                .sends
                .send_next_reminder("user-1", &f.invoice_id, Utc::now())
                .await
                .unwrap();
            assert_eq!(sent.slot_id, expected);
        }

        let err = f
            .sends
            .send_next_reminder("user-1", &f.invoice_id, Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("All reminders have already been sent"));
    }

    #[tokio::test]
    async fn test_send_next_failure_records_error_not_ledger() {
        let f = fixture().await;
        f.sends.send_initial("user-1", &f.invoice_id, Utc::now()).await.unwrap();
        f.email.set_failing(true);

        let err = f
            .sends
            .send_next_reminder("user-1", &f.invoice_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmailError(_)));

        let stored = f.store.find_invoice(&f.invoice_id).await.unwrap().unwrap();
        assert!(stored.reminders_sent.is_empty());
        assert_eq!(stored.last_email_error_context.as_deref(), Some(CONTEXT_SEND_NEXT));

        f.email.set_failing(false);
        let sent = f
            .sends
            .send_next_reminder("user-1", &f.invoice_id, Utc::now())
            .await
            .unwrap();
        assert!(sent.invoice.last_email_error_message.is_none());
    }

    #[tokio::test]
    async fn test_resend_uses_fixed_subject_and_manual_record() {
        let f = fixture().await;
        f.sends.send_initial("user-1", &f.invoice_id, Utc::now()).await.unwrap();

        let invoice = f
            .sends
            .resend("user-1", &f.invoice_id, "reminder2", Utc::now())
            .await
            .unwrap();

        let last = f.email.sent_messages().pop().unwrap();
        assert_eq!(last.subject, RESEND_SUBJECT);
        assert_eq!(invoice.reminders_sent.len(), 1);
        assert_eq!(invoice.reminders_sent[0].kind, ReminderKind::ManualResend);
        assert!(!invoice.has_scheduled_send("reminder2"));
    }

    #[tokio::test]
    async fn test_other_users_invoice_is_not_found() {
        let f = fixture().await;
        let err = f
            .sends
            .send_initial("user-2", &f.invoice_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
