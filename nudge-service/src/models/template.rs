//! Per-invoice email template model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content-variant axis, orthogonal to the schedule slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Friendly,
    Professional,
    Firm,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Friendly, Tone::Professional, Tone::Firm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Friendly => "friendly",
            Tone::Professional => "professional",
            Tone::Firm => "firm",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "friendly" => Ok(Tone::Friendly),
            "professional" => Ok(Tone::Professional),
            "firm" => Ok(Tone::Firm),
            other => Err(format!(
                "Invalid tone: {}. Must be one of: friendly, professional, firm",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneVariant {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_customized: bool,
    #[serde(default)]
    pub is_dirty: bool,
}

impl ToneVariant {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            is_customized: false,
            is_dirty: false,
        }
    }
}

/// One optional variant per tone. Stored as an object keyed by tone name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneVariants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly: Option<ToneVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professional: Option<ToneVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firm: Option<ToneVariant>,
}

impl ToneVariants {
    pub fn get(&self, tone: Tone) -> Option<&ToneVariant> {
        match tone {
            Tone::Friendly => self.friendly.as_ref(),
            Tone::Professional => self.professional.as_ref(),
            Tone::Firm => self.firm.as_ref(),
        }
    }

    pub fn set(&mut self, tone: Tone, variant: ToneVariant) {
        let slot = match tone {
            Tone::Friendly => &mut self.friendly,
            Tone::Professional => &mut self.professional,
            Tone::Firm => &mut self.firm,
        };
        *slot = Some(variant);
    }

    pub fn is_empty(&self) -> bool {
        self.friendly.is_none() && self.professional.is_none() && self.firm.is_none()
    }
}

/// A per-invoice, per-slot template.
///
/// `subject`, `body` and `tone` cache whichever variant is selected and are
/// what the sender reads. After any mutation through
/// [`crate::services::templates`] they equal `tone_variants[tone]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstance {
    pub id: String,
    /// Display copy of the slot offset at creation time. Scheduling decisions
    /// read the registry, not this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_variants: Option<ToneVariants>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
}

impl TemplateInstance {
    pub fn is_reminder(&self) -> bool {
        self.id.starts_with("reminder")
    }

    pub fn has_canonical_content(&self) -> bool {
        !self.subject.trim().is_empty() && !self.body.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_parses_case_insensitively() {
        assert_eq!("Firm".parse::<Tone>().unwrap(), Tone::Firm);
        assert_eq!(" professional ".parse::<Tone>().unwrap(), Tone::Professional);
        assert!("snarky".parse::<Tone>().is_err());
    }

    #[test]
    fn test_template_reads_legacy_document_without_variants() {
        let template: TemplateInstance = serde_json::from_str(
            r#"{"id":"reminder1","offset":-7,"subject":"Hi","body":"Please pay"}"#,
        )
        .unwrap();

        assert!(template.tone_variants.is_none());
        assert!(template.tone.is_none());
        assert!(template.is_reminder());
        assert!(template.has_canonical_content());
    }

    #[test]
    fn test_tone_variants_serialize_keyed_by_tone_name() {
        let mut variants = ToneVariants::default();
        variants.set(Tone::Firm, ToneVariant::new("Pay now", "Overdue"));

        let json = serde_json::to_value(&variants).unwrap();
        assert_eq!(json["firm"]["subject"], "Pay now");
        assert_eq!(json["firm"]["isCustomized"], false);
        assert!(json.get("friendly").is_none());
    }
}
