//! Daily reminder batch.
//!
//! [`evaluate_invoice`] is the whole decision procedure and is pure: given an
//! invoice, the UTC date and the policy it says what to do. [`ReminderScheduler`]
//! applies that decision to every candidate invoice, one at a time, under the
//! invoice's lock.

use crate::config::ReminderConfig;
use crate::models::{Invoice, InvoiceStatus, ReminderRecord};
use crate::services::dispatch::{DispatchError, ReminderDispatcher};
use crate::services::locks::InvoiceLocks;
use crate::services::metrics::{record_batch_run, record_reminder};
use crate::services::schedule::resolve_schedule;
use crate::services::store::NudgeStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerPolicy {
    /// Invoices whose due date is more than this many days in the past are
    /// abandoned.
    pub stale_after_days: i64,
    /// A slot stays due for this many days after its target date. Zero means
    /// the target date only.
    pub grace_days: i64,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        ReminderConfig::default().into()
    }
}

impl From<ReminderConfig> for SchedulerPolicy {
    fn from(config: ReminderConfig) -> Self {
        Self {
            stale_after_days: config.stale_after_days,
            grace_days: config.grace_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotEligible,
    Abandoned,
    MissingTemplates,
    MissingDueDate,
    AlreadySentToday,
    NothingDue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceDecision {
    Skip(SkipReason),
    /// Crossed the staleness threshold on this run.
    Abandon,
    /// Due slots in ascending offset order.
    Send(Vec<&'static str>),
}

pub fn evaluate_invoice(invoice: &Invoice, today: NaiveDate, policy: &SchedulerPolicy) -> InvoiceDecision {
    if !invoice.status.accepts_reminders() {
        return InvoiceDecision::Skip(SkipReason::NotEligible);
    }
    if invoice.reminders_abandoned_at.is_some() {
        return InvoiceDecision::Skip(SkipReason::Abandoned);
    }
    if invoice.templates.as_ref().map_or(true, |t| t.is_empty()) {
        return InvoiceDecision::Skip(SkipReason::MissingTemplates);
    }
    let Some(due_date) = invoice.due_date_parsed() else {
        return InvoiceDecision::Skip(SkipReason::MissingDueDate);
    };

    if (today - due_date).num_days() > policy.stale_after_days {
        return InvoiceDecision::Abandon;
    }
    if invoice.any_reminder_sent_on(today) {
        return InvoiceDecision::Skip(SkipReason::AlreadySentToday);
    }

    let schedule = resolve_schedule(&invoice.reminder_schedule);
    let due: Vec<&'static str> = schedule
        .reminder_slots()
        .into_iter()
        .filter(|slot| invoice.template(slot.id).is_some())
        .filter(|slot| {
            let Some(offset) = slot.offset else {
                return false;
            };
            // Dates at the edge of chrono's range are never due.
            let Some(target) = due_date.checked_add_signed(Duration::days(offset)) else {
                return false;
            };
            let last_day = target
                .checked_add_signed(Duration::days(policy.grace_days))
                .unwrap_or(NaiveDate::MAX);
            target <= today && today <= last_day
        })
        .filter(|slot| !invoice.has_scheduled_send(slot.id))
        .map(|slot| slot.id)
        .collect();

    if due.is_empty() {
        InvoiceDecision::Skip(SkipReason::NothingDue)
    } else {
        InvoiceDecision::Send(due)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: u32,
    pub sent: u32,
    pub skipped: u32,
    pub failed: u32,
    pub abandoned: u32,
    pub date: String,
}

#[derive(Debug, Default)]
struct InvoiceOutcome {
    sent: u32,
    skipped: u32,
    failed: u32,
    abandoned: u32,
}

impl BatchSummary {
    fn absorb(&mut self, outcome: InvoiceOutcome) {
        self.sent += outcome.sent;
        self.skipped += outcome.skipped;
        self.failed += outcome.failed;
        self.abandoned += outcome.abandoned;
    }
}

pub struct ReminderScheduler {
    store: Arc<dyn NudgeStore>,
    dispatcher: Arc<ReminderDispatcher>,
    locks: InvoiceLocks,
    policy: SchedulerPolicy,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn NudgeStore>,
        dispatcher: Arc<ReminderDispatcher>,
        locks: InvoiceLocks,
        policy: SchedulerPolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            policy,
        }
    }

    /// One pass over every `sent`/`overdue` invoice for `now`'s UTC date.
    /// Only a failure to list candidate ids aborts the run; each invoice is
    /// read and decoded on its own.
    #[tracing::instrument(skip(self), fields(date = %now.date_naive()))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<BatchSummary, AppError> {
        let mut summary = BatchSummary {
            date: now.date_naive().format("%Y-%m-%d").to_string(),
            ..Default::default()
        };

        let candidates = match self.store.list_reminder_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                record_batch_run("error");
                return Err(e);
            }
        };

        for invoice_id in candidates {
            summary.processed += 1;
            match self.process_invoice(&invoice_id, now).await {
                Ok(outcome) => summary.absorb(outcome),
                Err(e) => {
                    tracing::error!(invoice_id = %invoice_id, error = %e, "Reminder batch failed for invoice");
                    summary.failed += 1;
                }
            }
        }

        self.locks.prune();
        record_batch_run("ok");
        tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "Reminder batch finished"
        );
        Ok(summary)
    }

    async fn process_invoice(&self, invoice_id: &str, now: DateTime<Utc>) -> Result<InvoiceOutcome, AppError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let mut outcome = InvoiceOutcome::default();
        let today = now.date_naive();

        // Re-read under the lock so a concurrent manual send is visible.
        let Some(invoice) = self.store.find_invoice(invoice_id).await? else {
            outcome.skipped += 1;
            return Ok(outcome);
        };

        if invoice.status == InvoiceStatus::Sent
            && invoice.due_date_parsed().is_some_and(|due| today > due)
        {
            self.store
                .update_status(invoice_id, InvoiceStatus::Overdue, now)
                .await?;
            tracing::info!(invoice_id = %invoice_id, "Invoice is past due, marked overdue");
        }

        match evaluate_invoice(&invoice, today, &self.policy) {
            InvoiceDecision::Skip(reason) => {
                tracing::debug!(invoice_id = %invoice_id, reason = ?reason, "Skipping invoice");
                outcome.skipped += 1;
            }
            InvoiceDecision::Abandon => {
                if self.store.mark_abandoned(invoice_id, now).await? {
                    tracing::info!(invoice_id = %invoice_id, "Invoice is stale, automatic reminders stopped");
                }
                outcome.abandoned += 1;
            }
            InvoiceDecision::Send(slots) => {
                for slot_id in slots {
                    match self.dispatcher.send_slot(&invoice, slot_id, None).await {
                        Ok(_) => {
                            let record = ReminderRecord::scheduled(slot_id, now);
                            if self.store.append_reminder_if_absent(invoice_id, &record).await? {
                                tracing::info!(invoice_id = %invoice_id, slot_id = %slot_id, "Reminder sent");
                            } else {
                                tracing::warn!(invoice_id = %invoice_id, slot_id = %slot_id, "Reminder was already recorded by another writer, duplicate email sent");
                            }
                            record_reminder("scheduled", "sent");
                            outcome.sent += 1;
                            // The invoice now has a send dated today; later
                            // slots wait for another run.
                            break;
                        }
                        Err(DispatchError::MissingClient) | Err(DispatchError::ClientNotFound) => {
                            tracing::warn!(invoice_id = %invoice_id, slot_id = %slot_id, "Client record missing, skipping reminder");
                            outcome.skipped += 1;
                        }
                        Err(e) => {
                            tracing::error!(invoice_id = %invoice_id, slot_id = %slot_id, error = %e, "Reminder send failed");
                            record_reminder("scheduled", "failed");
                            outcome.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Client, Tone};
    use crate::services::identity::NoopIdentityProvider;
    use crate::services::providers::MockEmailProvider;
    use crate::services::store::InMemoryStore;
    use crate::services::templates::initialize_templates_for_schedule;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn morning(raw: &str) -> DateTime<Utc> {
        date(raw).and_hms_opt(9, 0, 0).unwrap().and_utc()
    }

    fn invoice(schedule: &str, due: &str) -> Invoice {
        let mut invoice = Invoice::new_draft("user-1", morning("2024-06-01"));
        invoice.status = InvoiceStatus::Sent;
        invoice.due_date = Some(due.to_string());
        invoice.reminder_schedule = schedule.to_string();
        invoice.templates = Some(initialize_templates_for_schedule(schedule, Tone::Friendly));
        invoice
    }

    fn sent(mut invoice: Invoice, slot: &str, on: &str) -> Invoice {
        invoice
            .reminders_sent
            .push(ReminderRecord::scheduled(slot, morning(on)));
        invoice
    }

    #[test]
    fn test_standard_schedule_walkthrough() {
        let policy = SchedulerPolicy::default();
        let inv = invoice("standard", "2024-06-30");

        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-23"), &policy),
            InvoiceDecision::Send(vec!["reminder1"])
        );
        let inv = sent(inv, "reminder1", "2024-06-23");
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-23"), &policy),
            InvoiceDecision::Skip(SkipReason::AlreadySentToday)
        );
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-25"), &policy),
            InvoiceDecision::Skip(SkipReason::NothingDue)
        );
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-27"), &policy),
            InvoiceDecision::Send(vec!["reminder2"])
        );
        let inv = sent(inv, "reminder2", "2024-06-27");
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-30"), &policy),
            InvoiceDecision::Send(vec!["reminder3"])
        );
        let inv = sent(inv, "reminder3", "2024-06-30");
        assert_eq!(
            evaluate_invoice(&inv, date("2024-07-01"), &policy),
            InvoiceDecision::Skip(SkipReason::NothingDue)
        );
    }

    #[test]
    fn test_exact_match_never_retries_a_missed_day() {
        let policy = SchedulerPolicy::default();
        let inv = invoice("standard", "2024-06-30");
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-24"), &policy),
            InvoiceDecision::Skip(SkipReason::NothingDue)
        );
    }

    #[test]
    fn test_grace_window_keeps_slot_due_in_order() {
        let policy = SchedulerPolicy {
            grace_days: 5,
            ..Default::default()
        };
        let inv = invoice("standard", "2024-06-30");

        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-27"), &policy),
            InvoiceDecision::Send(vec!["reminder1", "reminder2"])
        );
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-29"), &policy),
            InvoiceDecision::Send(vec!["reminder2"])
        );
    }

    #[test]
    fn test_staleness_and_abandonment() {
        let policy = SchedulerPolicy::default();
        let inv = invoice("persistent", "2024-01-01");
        let today = date("2024-01-01") + Duration::days(200);

        assert_eq!(evaluate_invoice(&inv, today, &policy), InvoiceDecision::Abandon);

        let mut stamped = inv.clone();
        stamped.reminders_abandoned_at = Some(morning("2024-07-19"));
        stamped.due_date = Some(today.format("%Y-%m-%d").to_string());
        assert_eq!(
            evaluate_invoice(&stamped, today, &policy),
            InvoiceDecision::Skip(SkipReason::Abandoned)
        );
    }

    #[test]
    fn test_manual_resend_today_blocks_whole_invoice() {
        let policy = SchedulerPolicy::default();
        let mut inv = invoice("standard", "2024-06-30");
        inv.reminders_sent
            .push(ReminderRecord::manual_resend("initial", morning("2024-06-23")));

        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-23"), &policy),
            InvoiceDecision::Skip(SkipReason::AlreadySentToday)
        );
    }

    #[test]
    fn test_missing_fields_and_ineligible_status() {
        let policy = SchedulerPolicy::default();
        let today = date("2024-06-23");

        let mut no_templates = invoice("standard", "2024-06-30");
        no_templates.templates = None;
        assert_eq!(
            evaluate_invoice(&no_templates, today, &policy),
            InvoiceDecision::Skip(SkipReason::MissingTemplates)
        );

        let mut no_due = invoice("standard", "2024-06-30");
        no_due.due_date = None;
        assert_eq!(
            evaluate_invoice(&no_due, today, &policy),
            InvoiceDecision::Skip(SkipReason::MissingDueDate)
        );

        let mut paid = invoice("standard", "2024-06-30");
        paid.status = InvoiceStatus::Paid;
        assert_eq!(
            evaluate_invoice(&paid, today, &policy),
            InvoiceDecision::Skip(SkipReason::NotEligible)
        );
    }

    #[test]
    fn test_registry_offsets_win_over_stored_offsets() {
        let policy = SchedulerPolicy::default();
        let mut inv = invoice("standard", "2024-06-30");
        if let Some(templates) = inv.templates.as_mut() {
            for template in templates.iter_mut() {
                template.offset = Some(-20);
            }
        }
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-23"), &policy),
            InvoiceDecision::Send(vec!["reminder1"])
        );
    }

    #[test]
    fn test_slot_missing_from_invoice_templates_is_not_due() {
        let policy = SchedulerPolicy::default();
        let mut inv = invoice("standard", "2024-06-30");
        if let Some(templates) = inv.templates.as_mut() {
            templates.retain(|t| t.id != "reminder1");
        }
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-23"), &policy),
            InvoiceDecision::Skip(SkipReason::NothingDue)
        );
    }

    #[test]
    fn test_due_date_at_calendar_limit_never_overflows() {
        let policy = SchedulerPolicy {
            grace_days: 30,
            ..Default::default()
        };
        let inv = invoice("light", &NaiveDate::MAX.format("%Y-%m-%d").to_string());
        assert_eq!(inv.due_date_parsed(), Some(NaiveDate::MAX));

        // reminder2 sits past the last representable date.
        assert_eq!(
            evaluate_invoice(&inv, NaiveDate::MAX, &policy),
            InvoiceDecision::Send(vec!["reminder1"])
        );
        assert_eq!(
            evaluate_invoice(&inv, date("2024-06-30"), &policy),
            InvoiceDecision::Skip(SkipReason::NothingDue)
        );
    }

    async fn runner() -> (Arc<InMemoryStore>, Arc<MockEmailProvider>, ReminderScheduler, String) {
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
        let mut inv = invoice("standard", "2024-06-30");
        inv.client_id = Some(client.client_id.clone());
        store.insert_invoice(&inv).await.unwrap();

        let scheduler = ReminderScheduler::new(
            store.clone(),
            dispatcher,
            InvoiceLocks::new(),
            SchedulerPolicy::default(),
        );
        (store, email, scheduler, inv.invoice_id)
    }

    #[tokio::test]
    async fn test_run_records_send_and_is_idempotent() {
        let (store, email, scheduler, id) = runner().await;

        let first = scheduler.run(morning("2024-06-23")).await.unwrap();
        assert_eq!((first.processed, first.sent), (1, 1));
        assert_eq!(first.date, "2024-06-23");

        let second = scheduler.run(morning("2024-06-23")).await.unwrap();
        assert_eq!((second.sent, second.skipped), (0, 1));
        assert_eq!(email.send_count(), 1);

        let stored = store.find_invoice(&id).await.unwrap().unwrap();
        assert!(stored.has_scheduled_send("reminder1"));
    }

    #[tokio::test]
    async fn test_failed_send_is_not_recorded_on_invoice() {
        let (store, email, scheduler, id) = runner().await;
        email.set_failing(true);

        let summary = scheduler.run(morning("2024-06-23")).await.unwrap();
        assert_eq!((summary.sent, summary.failed), (0, 1));

        let stored = store.find_invoice(&id).await.unwrap().unwrap();
        assert!(stored.reminders_sent.is_empty());
        assert!(stored.last_email_error_message.is_none());
    }

    #[tokio::test]
    async fn test_past_due_invoice_becomes_overdue() {
        let (store, _, scheduler, id) = runner().await;
        scheduler.run(morning("2024-07-01")).await.unwrap();

        let stored = store.find_invoice(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Overdue);
    }

    #[tokio::test]
    async fn test_missing_client_and_extreme_due_date_leave_siblings_alone() {
        let (store, email, scheduler, id) = runner().await;

        let mut far_future = invoice("light", &NaiveDate::MAX.format("%Y-%m-%d").to_string());
        far_future.created_at = Some(morning("2024-06-02"));
        store.insert_invoice(&far_future).await.unwrap();

        let mut orphaned = invoice("standard", "2024-06-30");
        orphaned.created_at = Some(morning("2024-06-03"));
        orphaned.client_id = Some("deleted-client".to_string());
        store.insert_invoice(&orphaned).await.unwrap();

        let summary = scheduler.run(morning("2024-06-23")).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!((summary.sent, summary.skipped, summary.failed), (1, 2, 0));
        assert_eq!(email.send_count(), 1);

        let stored = store.find_invoice(&id).await.unwrap().unwrap();
        assert!(stored.has_scheduled_send("reminder1"));
        let stored = store.find_invoice(&orphaned.invoice_id).await.unwrap().unwrap();
        assert!(stored.reminders_sent.is_empty());
    }
}
