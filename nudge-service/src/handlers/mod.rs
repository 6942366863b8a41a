//! HTTP handlers for nudge-service.
//!
//! Every `/api` route except the cron trigger is scoped to the caller's
//! `X-User-ID`; an id owned by someone else is reported as not found.

pub mod clients;
pub mod cron;
pub mod flows;
pub mod health;
pub mod invoices;
pub mod schedules;
pub mod templates;
pub mod workspace;

pub use health::{health_check, metrics_endpoint, readiness_check};
