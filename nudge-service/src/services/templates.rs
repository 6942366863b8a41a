//! Materialising and mutating an invoice's template array.
//!
//! Everything here is pure: functions take a template (or schedule key) and
//! return a new value. Persisting the result is the caller's job.

use crate::models::{TemplateInstance, Tone, ToneVariant, ToneVariants};
use crate::services::catalog::default_variant;
use crate::services::schedule::resolve_schedule;

/// One template per slot of the schedule, every tone pre-filled from the
/// catalog, canonical fields set to `tone`. Unknown keys use the standard
/// schedule.
pub fn initialize_templates_for_schedule(schedule_key: &str, tone: Tone) -> Vec<TemplateInstance> {
    let schedule = resolve_schedule(schedule_key);

    schedule
        .slots
        .iter()
        .map(|slot| {
            let mut variants = ToneVariants::default();
            for variant_tone in Tone::ALL {
                variants.set(
                    variant_tone,
                    default_variant(slot.id, variant_tone).unwrap_or_default(),
                );
            }
            let canonical = variants.get(tone).cloned().unwrap_or_default();

            TemplateInstance {
                id: slot.id.to_string(),
                offset: slot.offset,
                label: Some(slot.label.to_string()),
                tone_variants: Some(variants),
                subject: canonical.subject,
                body: canonical.body,
                tone: Some(tone),
            }
        })
        .collect()
}

/// Stores user-edited copy for one tone and makes it the canonical content.
/// Other tones are left exactly as they were.
pub fn update_tone_variant(
    template: &TemplateInstance,
    tone: Tone,
    subject: &str,
    body: &str,
) -> TemplateInstance {
    let mut updated = template.clone();
    let mut variants = updated.tone_variants.take().unwrap_or_default();
    variants.set(
        tone,
        ToneVariant {
            subject: subject.to_string(),
            body: body.to_string(),
            is_customized: true,
            is_dirty: false,
        },
    );
    updated.tone_variants = Some(variants);
    updated.subject = subject.to_string();
    updated.body = body.to_string();
    updated.tone = Some(tone);
    updated
}

/// Resets one tone to catalog copy. Canonical fields follow only when the
/// reverted tone is the canonical one.
pub fn revert_tone_variant_to_defaults(template: &TemplateInstance, tone: Tone) -> TemplateInstance {
    let Some(default) = default_variant(&template.id, tone) else {
        tracing::warn!(template_id = %template.id, tone = %tone, "No catalog default for template slot, leaving variant unchanged");
        return template.clone();
    };

    let mut reverted = template.clone();
    let mut variants = reverted.tone_variants.take().unwrap_or_default();
    variants.set(tone, default.clone());
    reverted.tone_variants = Some(variants);

    if reverted.tone == Some(tone) {
        reverted.subject = default.subject;
        reverted.body = default.body;
    }
    reverted
}

/// The stored variant, or an empty one. Never fails.
pub fn get_tone_variant(template: &TemplateInstance, tone: Tone) -> ToneVariant {
    template
        .tone_variants
        .as_ref()
        .and_then(|variants| variants.get(tone))
        .cloned()
        .unwrap_or_default()
}

/// Forces canonical fields to mirror the given tone's variant.
pub fn sync_canonical_fields(template: &TemplateInstance, tone: Tone) -> TemplateInstance {
    let variant = get_tone_variant(template, tone);
    let mut synced = template.clone();
    synced.subject = variant.subject;
    synced.body = variant.body;
    synced.tone = Some(tone);
    synced
}

/// Read-time migration for stored template arrays.
///
/// * non-empty canonical content: kept as is
/// * variants but no canonical content: canonical synced from the template's
///   own tone, else `default_tone`
/// * neither: passed through with a warning
pub fn normalize_templates(raw: Vec<TemplateInstance>, default_tone: Tone) -> Vec<TemplateInstance> {
    raw.into_iter()
        .map(|template| {
            if template.has_canonical_content() {
                template
            } else if template
                .tone_variants
                .as_ref()
                .map(|variants| !variants.is_empty())
                .unwrap_or(false)
            {
                let tone = template.tone.unwrap_or(default_tone);
                sync_canonical_fields(&template, tone)
            } else {
                tracing::warn!(template_id = %template.id, "Template has neither content nor tone variants, passing through");
                template
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schedule::SCHEDULES;

    fn sample() -> TemplateInstance {
        initialize_templates_for_schedule("standard", Tone::Friendly)
            .into_iter()
            .find(|t| t.id == "reminder1")
            .unwrap()
    }

    #[test]
    fn test_initialize_matches_registry_for_every_schedule_and_tone() {
        for schedule in SCHEDULES {
            for tone in Tone::ALL {
                let templates = initialize_templates_for_schedule(schedule.key, tone);
                assert_eq!(templates.len(), schedule.slots.len());

                for (template, slot) in templates.iter().zip(schedule.slots) {
                    assert_eq!(template.id, slot.id);
                    assert_eq!(template.offset, slot.offset);
                    assert_eq!(template.tone, Some(tone));
                    let variant = get_tone_variant(template, tone);
                    assert_eq!(template.subject, variant.subject);
                    assert_eq!(template.body, variant.body);
                }
            }
        }
    }

    #[test]
    fn test_initialize_unknown_schedule_uses_standard() {
        let templates = initialize_templates_for_schedule("nope", Tone::Firm);
        let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["initial", "reminder1", "reminder2", "reminder3"]);
    }

    #[test]
    fn test_update_leaves_other_tones_untouched() {
        let original = sample();
        for edited in Tone::ALL {
            let updated = update_tone_variant(&original, edited, "New subject", "New body");

            for other in Tone::ALL.into_iter().filter(|t| *t != edited) {
                assert_eq!(
                    get_tone_variant(&updated, other),
                    get_tone_variant(&original, other)
                );
            }

            let variant = get_tone_variant(&updated, edited);
            assert!(variant.is_customized);
            assert!(!variant.is_dirty);
            assert_eq!(updated.subject, "New subject");
            assert_eq!(updated.body, "New body");
            assert_eq!(updated.tone, Some(edited));
        }
    }

    #[test]
    fn test_revert_is_idempotent() {
        let edited = update_tone_variant(&sample(), Tone::Firm, "Custom", "Custom body");

        let once = revert_tone_variant_to_defaults(&edited, Tone::Firm);
        let twice = revert_tone_variant_to_defaults(&once, Tone::Firm);

        assert_eq!(once, twice);
        assert_eq!(
            get_tone_variant(&once, Tone::Firm),
            default_variant("reminder1", Tone::Firm).unwrap()
        );
    }

    #[test]
    fn test_revert_only_touches_canonical_when_tone_is_canonical() {
        let edited = update_tone_variant(&sample(), Tone::Firm, "Custom", "Custom body");
        let edited = update_tone_variant(&edited, Tone::Friendly, "Mine", "Mine body");

        let reverted = revert_tone_variant_to_defaults(&edited, Tone::Firm);
        assert_eq!(reverted.subject, "Mine");
        assert_eq!(reverted.tone, Some(Tone::Friendly));

        let reverted = revert_tone_variant_to_defaults(&edited, Tone::Friendly);
        let default = default_variant("reminder1", Tone::Friendly).unwrap();
        assert_eq!(reverted.subject, default.subject);
        assert_eq!(reverted.body, default.body);
    }

    #[test]
    fn test_get_missing_variant_is_empty() {
        let template = TemplateInstance {
            id: "reminder1".to_string(),
            ..Default::default()
        };
        let variant = get_tone_variant(&template, Tone::Professional);
        assert_eq!(variant, ToneVariant::default());
    }

    #[test]
    fn test_normalize_round_trips_synced_template() {
        let edited = update_tone_variant(&sample(), Tone::Professional, "Pro", "Pro body");
        for tone in Tone::ALL {
            let synced = sync_canonical_fields(&edited, tone);
            let normalized = normalize_templates(vec![synced.clone()], tone);
            assert_eq!(normalized, vec![synced]);
        }
    }

    #[test]
    fn test_normalize_fills_canonical_from_variants() {
        let mut template = sample();
        template.subject.clear();
        template.body.clear();
        template.tone = None;

        let normalized = normalize_templates(vec![template], Tone::Firm);
        let expected = default_variant("reminder1", Tone::Firm).unwrap();
        assert_eq!(normalized[0].subject, expected.subject);
        assert_eq!(normalized[0].tone, Some(Tone::Firm));
    }

    #[test]
    fn test_normalize_passes_unknown_shape_through() {
        let legacy = TemplateInstance {
            id: "reminder2".to_string(),
            ..Default::default()
        };
        let normalized = normalize_templates(vec![legacy.clone()], Tone::Friendly);
        assert_eq!(normalized, vec![legacy]);
    }
}
