pub mod client;
pub mod datetime;
pub mod flow;
pub mod invoice;
pub mod reminder;
pub mod template;
pub mod workspace;

pub use client::Client;
pub use flow::EmailFlow;
pub use invoice::{parse_calendar_date, Invoice, InvoiceStatus};
pub use reminder::{ReminderKind, ReminderRecord};
pub use template::{TemplateInstance, Tone, ToneVariant, ToneVariants};
pub use workspace::Workspace;
