pub mod catalog;
pub mod dispatch;
pub mod identity;
pub mod locks;
pub mod metrics;
pub mod names;
pub mod placeholders;
pub mod providers;
pub mod schedule;
pub mod scheduler;
pub mod sends;
pub mod store;
pub mod templates;

pub use dispatch::{DispatchError, ReminderDispatcher};
pub use identity::{HttpIdentityProvider, IdentityProvider, NoopIdentityProvider, StaticIdentityProvider};
pub use locks::InvoiceLocks;
pub use metrics::{get_metrics, init_metrics, record_batch_run, record_reminder};
pub use providers::{
    EmailMessage, EmailProvider, MockEmailProvider, ProviderError, ProviderResponse, SmtpProvider,
};
pub use scheduler::{BatchSummary, ReminderScheduler, SchedulerPolicy};
pub use sends::{SendService, SentReminder, RESEND_SUBJECT};
pub use store::{InMemoryStore, MongoStore, NudgeStore};
