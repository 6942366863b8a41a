use super::NudgeStore;
use crate::models::{Client, EmailFlow, Invoice, InvoiceStatus, ReminderRecord, Workspace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use service_core::error::AppError;

/// Process-local store with the same write semantics as [`super::MongoStore`].
#[derive(Default)]
pub struct InMemoryStore {
    invoices: DashMap<String, Invoice>,
    clients: DashMap<String, Client>,
    workspaces: DashMap<String, Workspace>,
    flows: DashMap<String, EmailFlow>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(mut items: Vec<T>, created: impl Fn(&T) -> Option<DateTime<Utc>>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created(item)));
    items
}

#[async_trait]
impl NudgeStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        if self.invoices.contains_key(&invoice.invoice_id) {
            return Err(AppError::Conflict(anyhow::anyhow!("Invoice already exists")));
        }
        self.invoices
            .insert(invoice.invoice_id.clone(), invoice.clone());
        Ok(())
    }

    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, AppError> {
        Ok(self.invoices.get(invoice_id).map(|entry| entry.clone()))
    }

    async fn find_invoice_for_user(
        &self,
        user_id: &str,
        invoice_id: &str,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .invoices
            .get(invoice_id)
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone()))
    }

    async fn list_invoices_for_user(&self, user_id: &str) -> Result<Vec<Invoice>, AppError> {
        let invoices = self
            .invoices
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(newest_first(invoices, |i| i.created_at))
    }

    async fn list_reminder_candidates(&self) -> Result<Vec<String>, AppError> {
        let invoices = self
            .invoices
            .iter()
            .filter(|entry| entry.status.accepts_reminders())
            .map(|entry| entry.value().clone())
            .collect();
        Ok(newest_first(invoices, |i| i.created_at)
            .into_iter()
            .map(|invoice| invoice.invoice_id)
            .collect())
    }

    async fn replace_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        if let Some(mut entry) = self.invoices.get_mut(&invoice.invoice_id) {
            let reminders_sent = std::mem::take(&mut entry.reminders_sent);
            let abandoned_at = entry.reminders_abandoned_at;
            *entry = invoice.clone();
            entry.reminders_sent = reminders_sent;
            entry.reminders_abandoned_at = abandoned_at.or(invoice.reminders_abandoned_at);
        }
        Ok(())
    }

    async fn append_reminder_if_absent(
        &self,
        invoice_id: &str,
        record: &ReminderRecord,
    ) -> Result<bool, AppError> {
        let Some(mut entry) = self.invoices.get_mut(invoice_id) else {
            return Ok(false);
        };
        if entry.has_scheduled_send(&record.slot_id) {
            return Ok(false);
        }
        entry.reminders_sent.push(record.clone());
        entry.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn push_reminder(&self, invoice_id: &str, record: &ReminderRecord) -> Result<(), AppError> {
        if let Some(mut entry) = self.invoices.get_mut(invoice_id) {
            entry.reminders_sent.push(record.clone());
            entry.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_email_error(
        &self,
        invoice_id: &str,
        message: &str,
        context: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(mut entry) = self.invoices.get_mut(invoice_id) {
            entry.last_email_error_message = Some(message.to_string());
            entry.last_email_error_at = Some(at);
            entry.last_email_error_context = Some(context.to_string());
            entry.updated_at = Some(at);
        }
        Ok(())
    }

    async fn mark_abandoned(&self, invoice_id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        match self.invoices.get_mut(invoice_id) {
            Some(mut entry) if entry.reminders_abandoned_at.is_none() => {
                entry.reminders_abandoned_at = Some(at);
                entry.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        invoice_id: &str,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(mut entry) = self.invoices.get_mut(invoice_id) {
            entry.status = status;
            entry.updated_at = Some(at);
        }
        Ok(())
    }

    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        self.clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn find_client(&self, user_id: &str, client_id: &str) -> Result<Option<Client>, AppError> {
        Ok(self
            .clients
            .get(client_id)
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone()))
    }

    async fn list_clients(&self, user_id: &str) -> Result<Vec<Client>, AppError> {
        let clients = self
            .clients
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(newest_first(clients, |c| c.created_at))
    }

    async fn find_workspace(&self, user_id: &str) -> Result<Option<Workspace>, AppError> {
        Ok(self.workspaces.get(user_id).map(|entry| entry.clone()))
    }

    async fn upsert_workspace(&self, workspace: &Workspace) -> Result<(), AppError> {
        self.workspaces
            .insert(workspace.user_id.clone(), workspace.clone());
        Ok(())
    }

    async fn insert_flow(&self, flow: &EmailFlow) -> Result<(), AppError> {
        self.flows.insert(flow.flow_id.clone(), flow.clone());
        Ok(())
    }

    async fn find_flow(&self, user_id: &str, flow_id: &str) -> Result<Option<EmailFlow>, AppError> {
        Ok(self
            .flows
            .get(flow_id)
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone()))
    }

    async fn list_flows(&self, user_id: &str) -> Result<Vec<EmailFlow>, AppError> {
        let flows = self
            .flows
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(newest_first(flows, |f| f.created_at))
    }

    async fn delete_flow(&self, user_id: &str, flow_id: &str) -> Result<bool, AppError> {
        Ok(self
            .flows
            .remove_if(flow_id, |_, flow| flow.user_id == user_id)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReminderKind;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    async fn seeded() -> (InMemoryStore, String) {
        let store = InMemoryStore::new();
        let mut invoice = Invoice::new_draft("user-1", at("2024-06-01T00:00:00Z"));
        invoice.status = InvoiceStatus::Sent;
        let id = invoice.invoice_id.clone();
        store.insert_invoice(&invoice).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_conditional_append_is_idempotent_per_slot() {
        let (store, id) = seeded().await;
        let record = ReminderRecord::scheduled("reminder1", at("2024-06-23T09:00:00Z"));

        assert!(store.append_reminder_if_absent(&id, &record).await.unwrap());
        assert!(!store.append_reminder_if_absent(&id, &record).await.unwrap());

        let invoice = store.find_invoice(&id).await.unwrap().unwrap();
        assert_eq!(invoice.scheduled_send_count(), 1);
    }

    #[tokio::test]
    async fn test_manual_resend_does_not_block_scheduled_append() {
        let (store, id) = seeded().await;
        store
            .push_reminder(&id, &ReminderRecord::manual_resend("reminder1", at("2024-06-20T09:00:00Z")))
            .await
            .unwrap();

        let scheduled = ReminderRecord::scheduled("reminder1", at("2024-06-23T09:00:00Z"));
        assert!(store.append_reminder_if_absent(&id, &scheduled).await.unwrap());

        let invoice = store.find_invoice(&id).await.unwrap().unwrap();
        assert_eq!(invoice.reminders_sent[0].kind, ReminderKind::ManualResend);
        assert_eq!(invoice.reminders_sent.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_keeps_ledger_and_abandonment() {
        let (store, id) = seeded().await;
        let stale = store.find_invoice(&id).await.unwrap().unwrap();

        store
            .append_reminder_if_absent(&id, &ReminderRecord::scheduled("reminder1", at("2024-06-23T09:00:00Z")))
            .await
            .unwrap();
        assert!(store.mark_abandoned(&id, at("2025-01-01T00:00:00Z")).await.unwrap());
        assert!(!store.mark_abandoned(&id, at("2025-02-01T00:00:00Z")).await.unwrap());

        store.replace_invoice(&stale).await.unwrap();

        let invoice = store.find_invoice(&id).await.unwrap().unwrap();
        assert_eq!(invoice.reminders_sent.len(), 1);
        assert_eq!(invoice.reminders_abandoned_at, Some(at("2025-01-01T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_ownership_scoping() {
        let (store, id) = seeded().await;
        assert!(store.find_invoice_for_user("user-1", &id).await.unwrap().is_some());
        assert!(store.find_invoice_for_user("user-2", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candidates_exclude_drafts_and_paid() {
        let (store, id) = seeded().await;
        let draft = Invoice::new_draft("user-1", at("2024-06-02T00:00:00Z"));
        store.insert_invoice(&draft).await.unwrap();
        let mut paid = Invoice::new_draft("user-1", at("2024-06-03T00:00:00Z"));
        paid.status = InvoiceStatus::Paid;
        store.insert_invoice(&paid).await.unwrap();

        let candidates = store.list_reminder_candidates().await.unwrap();
        assert_eq!(candidates, vec![id]);
    }
}
