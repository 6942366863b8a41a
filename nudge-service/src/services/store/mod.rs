//! Document-store seam.
//!
//! Handlers and the scheduler only talk to [`NudgeStore`]. Production wires
//! [`MongoStore`]; tests and local runs without a database use
//! [`InMemoryStore`].

mod memory;
mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

use crate::models::{Client, EmailFlow, Invoice, InvoiceStatus, ReminderRecord, Workspace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

#[async_trait]
pub trait NudgeStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // invoices
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;
    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, AppError>;
    async fn find_invoice_for_user(
        &self,
        user_id: &str,
        invoice_id: &str,
    ) -> Result<Option<Invoice>, AppError>;
    async fn list_invoices_for_user(&self, user_id: &str) -> Result<Vec<Invoice>, AppError>;
    /// Ids of invoices whose status is `sent` or `overdue`. Ids only, so one
    /// undecodable document cannot fail the listing.
    async fn list_reminder_candidates(&self) -> Result<Vec<String>, AppError>;
    /// Whole-document write. Not for `remindersSent`, which only ever grows
    /// through the two append operations below.
    async fn replace_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;

    /// Appends a scheduled record unless one for the same slot is already
    /// stored. Returns `false` when the write lost.
    async fn append_reminder_if_absent(
        &self,
        invoice_id: &str,
        record: &ReminderRecord,
    ) -> Result<bool, AppError>;
    /// Unconditional append, used for manual resends.
    async fn push_reminder(&self, invoice_id: &str, record: &ReminderRecord) -> Result<(), AppError>;

    async fn record_email_error(
        &self,
        invoice_id: &str,
        message: &str,
        context: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    /// Stamps `remindersAbandonedAt` if it is not set yet.
    async fn mark_abandoned(&self, invoice_id: &str, at: DateTime<Utc>) -> Result<bool, AppError>;
    async fn update_status(
        &self,
        invoice_id: &str,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // clients
    async fn insert_client(&self, client: &Client) -> Result<(), AppError>;
    async fn find_client(&self, user_id: &str, client_id: &str) -> Result<Option<Client>, AppError>;
    async fn list_clients(&self, user_id: &str) -> Result<Vec<Client>, AppError>;

    // workspaces
    async fn find_workspace(&self, user_id: &str) -> Result<Option<Workspace>, AppError>;
    async fn upsert_workspace(&self, workspace: &Workspace) -> Result<(), AppError>;

    // flows
    async fn insert_flow(&self, flow: &EmailFlow) -> Result<(), AppError>;
    async fn find_flow(&self, user_id: &str, flow_id: &str) -> Result<Option<EmailFlow>, AppError>;
    async fn list_flows(&self, user_id: &str) -> Result<Vec<EmailFlow>, AppError>;
    async fn delete_flow(&self, user_id: &str, flow_id: &str) -> Result<bool, AppError>;
}
