//! Default subject/body copy per slot and tone.
//!
//! Placeholder tokens are substituted at send time by
//! [`crate::services::placeholders`].

use crate::models::{Tone, ToneVariant};

struct CatalogEntry {
    slot: &'static str,
    tone: Tone,
    subject: &'static str,
    body: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    // initial
    CatalogEntry {
        slot: "initial",
        tone: Tone::Friendly,
        subject: "Invoice for {{amount}} due {{dueDate}}",
        body: "Hi {{clientFirstName}},\n\nThanks again for working with me! Here's the invoice for {{amount}}, due on {{dueDate}}.\n\nYou can pay it here: {{paymentLink}}\n\nCheers,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "initial",
        tone: Tone::Professional,
        subject: "Invoice: {{amount}} due {{dueDate}}",
        body: "Hello {{clientName}},\n\nPlease find the invoice for {{amount}}, payable by {{dueDate}}.\n\nPayment can be made here: {{paymentLink}}\n\nKind regards,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "initial",
        tone: Tone::Firm,
        subject: "Invoice {{amount}} - payment due {{dueDate}}",
        body: "{{clientName}},\n\nThis invoice for {{amount}} is due on {{dueDate}} ({{dayOfWeek}}). Please arrange payment by then.\n\nPay here: {{paymentLink}}\n\n{{yourName}}",
    },
    // reminder1
    CatalogEntry {
        slot: "reminder1",
        tone: Tone::Friendly,
        subject: "Quick heads-up: invoice due {{dueDate}}",
        body: "Hi {{clientFirstName}},\n\nJust a friendly heads-up that the invoice for {{amount}} is due on {{dayOfWeek}}, {{dueDate}}.\n\nHere's the link whenever you're ready: {{paymentLink}}\n\nThanks!\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder1",
        tone: Tone::Professional,
        subject: "Reminder: invoice for {{amount}} due {{dueDate}}",
        body: "Hello {{clientName}},\n\nThis is a courtesy reminder that the invoice for {{amount}} is due on {{dueDate}}.\n\nPayment link: {{paymentLink}}\n\nKind regards,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder1",
        tone: Tone::Firm,
        subject: "Payment of {{amount}} due {{dueDate}}",
        body: "{{clientName}},\n\nThe invoice for {{amount}} is due on {{dueDate}}. Please make sure payment is made on time.\n\nPay here: {{paymentLink}}\n\n{{yourName}}",
    },
    // reminder2
    CatalogEntry {
        slot: "reminder2",
        tone: Tone::Friendly,
        subject: "Friendly reminder: {{amount}} due {{dueDate}}",
        body: "Hi {{clientFirstName}},\n\nHope all is well! Just circling back on the invoice for {{amount}} (due {{dueDate}}).\n\nYou can pay here: {{paymentLink}}\n\nThanks so much,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder2",
        tone: Tone::Professional,
        subject: "Second reminder: invoice for {{amount}}",
        body: "Hello {{clientName}},\n\nI'm following up on the invoice for {{amount}}, due {{dueDate}}. If payment has already been arranged, please disregard this message.\n\nPayment link: {{paymentLink}}\n\nKind regards,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder2",
        tone: Tone::Firm,
        subject: "Action required: {{amount}} due {{dueDate}}",
        body: "{{clientName}},\n\nPayment of {{amount}} (due {{dueDate}}) has not been received yet. Please pay promptly.\n\nPay here: {{paymentLink}}\n\n{{yourName}}",
    },
    // reminder3
    CatalogEntry {
        slot: "reminder3",
        tone: Tone::Friendly,
        subject: "Invoice for {{amount}} is due",
        body: "Hi {{clientFirstName}},\n\nA quick note that the invoice for {{amount}} is due {{dueDate}}.\n\nHere's the link: {{paymentLink}}\n\nThank you!\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder3",
        tone: Tone::Professional,
        subject: "Invoice for {{amount}} due {{dueDate}}",
        body: "Hello {{clientName}},\n\nThe invoice for {{amount}} is due {{dueDate}}. Please let me know if you have any questions.\n\nPayment link: {{paymentLink}}\n\nKind regards,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder3",
        tone: Tone::Firm,
        subject: "Payment due: {{amount}}",
        body: "{{clientName}},\n\nThe invoice for {{amount}} was due {{dueDate}}. Please pay it now.\n\nPay here: {{paymentLink}}\n\n{{yourName}}",
    },
    // reminder4
    CatalogEntry {
        slot: "reminder4",
        tone: Tone::Friendly,
        subject: "Following up on invoice for {{amount}}",
        body: "Hi {{clientFirstName}},\n\nI wanted to check in on the invoice for {{amount}} that was due {{dueDate}}. If anything's holding it up, just let me know.\n\nPayment link: {{paymentLink}}\n\nThanks,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder4",
        tone: Tone::Professional,
        subject: "Overdue invoice: {{amount}}",
        body: "Hello {{clientName}},\n\nOur records show the invoice for {{amount}}, due {{dueDate}}, remains unpaid. Please arrange payment at your earliest convenience.\n\nPayment link: {{paymentLink}}\n\nKind regards,\n{{yourName}}",
    },
    CatalogEntry {
        slot: "reminder4",
        tone: Tone::Firm,
        subject: "Final notice: {{amount}} overdue",
        body: "{{clientName}},\n\nThe invoice for {{amount}} is overdue since {{dueDate}}. This is a final reminder; please pay immediately.\n\nPay here: {{paymentLink}}\n\n{{yourName}}",
    },
];

/// Catalog copy for a slot and tone, or `None` if the slot is unknown.
pub fn default_variant(slot_id: &str, tone: Tone) -> Option<ToneVariant> {
    CATALOG
        .iter()
        .find(|entry| entry.slot == slot_id && entry.tone == tone)
        .map(|entry| ToneVariant::new(entry.subject, entry.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schedule::SCHEDULES;

    #[test]
    fn test_every_registry_slot_has_every_tone() {
        for schedule in SCHEDULES {
            for slot in schedule.slots {
                for tone in Tone::ALL {
                    let variant = default_variant(slot.id, tone);
                    assert!(
                        variant.is_some(),
                        "missing catalog entry for {} / {}",
                        slot.id,
                        tone
                    );
                    let variant = variant.unwrap();
                    assert!(!variant.subject.is_empty());
                    assert!(!variant.is_customized);
                }
            }
        }
    }

    #[test]
    fn test_unknown_slot_has_no_default() {
        assert!(default_variant("reminder9", Tone::Friendly).is_none());
    }
}
