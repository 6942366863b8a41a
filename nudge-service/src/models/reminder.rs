//! The `remindersSent` ledger.
//!
//! Three shapes exist in stored invoices:
//!
//! * `{ "id": "reminder1", "sentAt": ... }` written by the daily batch
//! * `{ "templateId": "reminder2", "sentAt": ..., "type": "manual-resend" }`
//!   written by the resend endpoint
//! * `"reminder1"` bare ids from the earliest data
//!
//! All of them are folded into [`ReminderRecord`] when a document is read;
//! entries matching none of them are dropped with a warning.
//! Writes always use the tagged `{ kind, slotId, sentAt }` shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderKind {
    Scheduled,
    ManualResend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawReminderRecord")]
pub struct ReminderRecord {
    pub kind: ReminderKind,
    pub slot_id: String,
    /// `None` only for bare-string records, whose send time was never stored.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ReminderRecord {
    pub fn scheduled(slot_id: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReminderKind::Scheduled,
            slot_id: slot_id.into(),
            sent_at: Some(sent_at),
        }
    }

    pub fn manual_resend(slot_id: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReminderKind::ManualResend,
            slot_id: slot_id.into(),
            sent_at: Some(sent_at),
        }
    }

    pub fn sent_on(&self, date: NaiveDate) -> bool {
        self.sent_at.map(|at| at.date_naive() == date).unwrap_or(false)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    kind: Option<ReminderKind>,
    #[serde(default)]
    slot_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    template_id: Option<String>,
    #[serde(default, rename = "type")]
    record_type: Option<String>,
    #[serde(default, with = "crate::models::datetime")]
    sent_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReminderRecord {
    Bare(String),
    Stored(StoredRecord),
}

impl TryFrom<RawReminderRecord> for ReminderRecord {
    type Error = String;

    fn try_from(raw: RawReminderRecord) -> Result<Self, Self::Error> {
        match raw {
            RawReminderRecord::Bare(slot_id) => Ok(ReminderRecord {
                kind: ReminderKind::Scheduled,
                slot_id,
                sent_at: None,
            }),
            RawReminderRecord::Stored(stored) => {
                let kind = stored.kind.unwrap_or_else(|| {
                    match (stored.record_type.as_deref(), &stored.template_id) {
                        (Some("manual-resend"), _) => ReminderKind::ManualResend,
                        (None, Some(_)) if stored.id.is_none() => ReminderKind::ManualResend,
                        _ => ReminderKind::Scheduled,
                    }
                });
                let slot_id = stored
                    .slot_id
                    .or(stored.id)
                    .or(stored.template_id)
                    .ok_or_else(|| "reminder record has no slot id".to_string())?;

                Ok(ReminderRecord {
                    kind,
                    slot_id,
                    sent_at: stored.sent_at,
                })
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerEntry {
    Readable(ReminderRecord),
    Unreadable(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLedger {
    List(Vec<LedgerEntry>),
    Other(IgnoredAny),
}

/// Reads a whole `remindersSent` array. One bad entry never fails the
/// invoice it belongs to.
pub fn deserialize_ledger<'de, D>(deserializer: D) -> Result<Vec<ReminderRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<RawLedger>::deserialize(deserializer)? {
        Some(RawLedger::List(entries)) => entries,
        Some(RawLedger::Other(_)) => {
            tracing::warn!("remindersSent is not an array, treating it as empty");
            return Ok(Vec::new());
        }
        None => return Ok(Vec::new()),
    };

    let total = entries.len();
    let records: Vec<ReminderRecord> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            LedgerEntry::Readable(record) => Some(record),
            LedgerEntry::Unreadable(_) => None,
        })
        .collect();
    if records.len() < total {
        tracing::warn!(dropped = total - records.len(), "Ignoring unreadable remindersSent entries");
    }
    Ok(records)
}
