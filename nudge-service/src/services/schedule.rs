//! Static registry of reminder schedules.
//!
//! A schedule is an ordered list of slots. `offset` is signed days relative to
//! the invoice due date; the `initial` slot has no offset because it goes out
//! when the user sends the invoice.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleSlot {
    pub id: &'static str,
    pub offset: Option<i64>,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub key: &'static str,
    pub name: &'static str,
    pub slots: &'static [ScheduleSlot],
}

const INITIAL: ScheduleSlot = ScheduleSlot {
    id: "initial",
    offset: None,
    label: "When you send the invoice",
};

pub const LIGHT: Schedule = Schedule {
    key: "light",
    name: "Light",
    slots: &[
        INITIAL,
        ScheduleSlot {
            id: "reminder1",
            offset: Some(0),
            label: "On the due date",
        },
        ScheduleSlot {
            id: "reminder2",
            offset: Some(7),
            label: "7 days after the due date",
        },
    ],
};

pub const STANDARD: Schedule = Schedule {
    key: "standard",
    name: "Standard",
    slots: &[
        INITIAL,
        ScheduleSlot {
            id: "reminder1",
            offset: Some(-7),
            label: "7 days before the due date",
        },
        ScheduleSlot {
            id: "reminder2",
            offset: Some(-3),
            label: "3 days before the due date",
        },
        ScheduleSlot {
            id: "reminder3",
            offset: Some(0),
            label: "On the due date",
        },
    ],
};

pub const PERSISTENT: Schedule = Schedule {
    key: "persistent",
    name: "Persistent",
    slots: &[
        INITIAL,
        ScheduleSlot {
            id: "reminder1",
            offset: Some(-7),
            label: "7 days before the due date",
        },
        ScheduleSlot {
            id: "reminder2",
            offset: Some(0),
            label: "On the due date",
        },
        ScheduleSlot {
            id: "reminder3",
            offset: Some(3),
            label: "3 days after the due date",
        },
        ScheduleSlot {
            id: "reminder4",
            offset: Some(7),
            label: "7 days after the due date",
        },
    ],
};

pub const SCHEDULES: [&Schedule; 3] = [&LIGHT, &STANDARD, &PERSISTENT];

/// Exact lookup; `None` for unknown keys.
pub fn find_schedule(key: &str) -> Option<&'static Schedule> {
    SCHEDULES.iter().copied().find(|s| s.key == key)
}

/// Lookup that never fails: unknown keys resolve to the standard schedule.
pub fn resolve_schedule(key: &str) -> &'static Schedule {
    find_schedule(key).unwrap_or_else(|| {
        tracing::warn!(schedule = %key, "Unknown reminder schedule, falling back to standard");
        &STANDARD
    })
}

impl Schedule {
    pub fn slot(&self, slot_id: &str) -> Option<&'static ScheduleSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    /// Reminder slots (those with an offset) in ascending offset order.
    pub fn reminder_slots(&self) -> Vec<&'static ScheduleSlot> {
        let mut slots: Vec<&'static ScheduleSlot> =
            self.slots.iter().filter(|s| s.offset.is_some()).collect();
        slots.sort_by_key(|s| s.offset);
        slots
    }
}
