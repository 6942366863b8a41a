//! Invoice document.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::reminder::{ReminderKind, ReminderRecord};
use super::template::TemplateInstance;

pub const DEFAULT_SCHEDULE: &str = "standard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    /// Statuses the reminder paths operate on.
    pub fn accepts_reminders(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_status() -> InvoiceStatus {
    InvoiceStatus::Draft
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    /// Calendar date, `YYYY-MM-DD`, interpreted as UTC midnight.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::models::datetime::deserialize_calendar_date"
    )]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(default = "default_status")]
    pub status: InvoiceStatus,
    #[serde(default = "default_schedule")]
    pub reminder_schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<TemplateInstance>>,
    /// Append-only for the life of the invoice.
    #[serde(default, deserialize_with = "crate::models::reminder::deserialize_ledger")]
    pub reminders_sent: Vec<ReminderRecord>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_email_error_message: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub last_email_error_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_email_error_context: Option<String>,
    /// Set once the invoice crossed the staleness threshold; never cleared.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub reminders_abandoned_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Parses a stored due date. Accepts `YYYY-MM-DD` and full RFC 3339
/// timestamps (whose UTC date is taken).
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

impl Invoice {
    pub fn new_draft(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            invoice_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            client_id: None,
            amount_cents: None,
            due_date: None,
            payment_link: None,
            status: InvoiceStatus::Draft,
            reminder_schedule: default_schedule(),
            templates: None,
            reminders_sent: Vec::new(),
            sent_at: None,
            last_email_error_message: None,
            last_email_error_at: None,
            last_email_error_context: None,
            reminders_abandoned_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn due_date_parsed(&self) -> Option<NaiveDate> {
        self.due_date.as_deref().and_then(parse_calendar_date)
    }

    pub fn template(&self, template_id: &str) -> Option<&TemplateInstance> {
        self.templates
            .as_ref()
            .and_then(|templates| templates.iter().find(|t| t.id == template_id))
    }

    /// Whether the slot has been delivered by the batch or "send next".
    /// Manual resends do not count.
    pub fn has_scheduled_send(&self, slot_id: &str) -> bool {
        self.reminders_sent
            .iter()
            .any(|r| r.kind == ReminderKind::Scheduled && r.slot_id == slot_id)
    }

    pub fn scheduled_send_count(&self) -> usize {
        self.reminders_sent
            .iter()
            .filter(|r| r.kind == ReminderKind::Scheduled)
            .count()
    }

    /// Whether any email of any kind was recorded on the given UTC date.
    pub fn any_reminder_sent_on(&self, date: NaiveDate) -> bool {
        self.reminders_sent.iter().any(|r| r.sent_on(date))
    }

    /// Once sent, the commercial fields are frozen.
    pub fn is_locked(&self) -> bool {
        self.status != InvoiceStatus::Draft
    }

    pub fn clear_email_error(&mut self) {
        self.last_email_error_message = None;
        self.last_email_error_at = None;
        self.last_email_error_context = None;
    }

    /// A fresh draft carrying the same commercial fields and a deep copy of
    /// the templates, with send history and error bookkeeping cleared.
    pub fn duplicate(&self, now: DateTime<Utc>) -> Invoice {
        Invoice {
            invoice_id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            client_id: self.client_id.clone(),
            amount_cents: self.amount_cents,
            due_date: self.due_date.clone(),
            payment_link: self.payment_link.clone(),
            status: InvoiceStatus::Draft,
            reminder_schedule: self.reminder_schedule.clone(),
            templates: self.templates.clone(),
            reminders_sent: Vec::new(),
            sent_at: None,
            last_email_error_message: None,
            last_email_error_at: None,
            last_email_error_context: None,
            reminders_abandoned_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}
