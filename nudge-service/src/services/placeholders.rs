//! `{{token}}` substitution for subjects and bodies.
//!
//! The recognised token set is shared with the AI rewrite collaborator, which
//! must hand back text containing exactly the same tokens.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeSet;

use crate::models::parse_calendar_date;

pub const TOKENS: [&str; 7] = [
    "clientName",
    "clientFirstName",
    "amount",
    "dueDate",
    "paymentLink",
    "yourName",
    "dayOfWeek",
];

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z][A-Za-z0-9_]*)\}\}").expect("placeholder pattern is valid"));

/// Raw values available for substitution.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext {
    pub client_name: String,
    pub amount_cents: Option<i64>,
    pub due_date: Option<String>,
    pub payment_link: String,
    pub your_name: String,
}

/// `$` + thousands-grouped amount with two decimals, e.g. `$1,234.56`.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();
    let fraction = abs % 100;

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{:02}", sign, grouped, fraction)
}

/// "Month D, YYYY".
pub fn format_due_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn first_name(full: &str) -> &str {
    full.split_whitespace().next().unwrap_or("")
}

impl PlaceholderContext {
    /// Value for a recognised token; `None` for anything else.
    fn value(&self, token: &str) -> Option<String> {
        let parsed = self.due_date.as_deref().and_then(parse_calendar_date);
        match token {
            "clientName" => Some(self.client_name.clone()),
            "clientFirstName" => Some(first_name(&self.client_name).to_string()),
            "amount" => Some(self.amount_cents.map(format_amount).unwrap_or_default()),
            "dueDate" => Some(match (parsed, &self.due_date) {
                (Some(date), _) => format_due_date(date),
                (None, Some(raw)) => raw.clone(),
                (None, None) => String::new(),
            }),
            "paymentLink" => Some(self.payment_link.clone()),
            "yourName" => Some(self.your_name.clone()),
            "dayOfWeek" => Some(
                parsed
                    .map(|date| date.format("%A").to_string())
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    fn substitute(&self, template: &str, escape: fn(&str) -> String) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match self.value(&caps[1]) {
                Some(value) => escape(&value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Drops CR, LF and other control characters so a value cannot inject
/// extra headers.
pub fn sanitize_header_value(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Subject substitution. Values are header-sanitised, and so is the result,
/// since a subject is always a single header line.
pub fn render_subject(template: &str, ctx: &PlaceholderContext) -> String {
    let rendered = ctx.substitute(template, sanitize_header_value);
    sanitize_header_value(&rendered)
}

/// Body substitution. Only substituted values are HTML-escaped; the template
/// text is the account owner's own and is kept verbatim.
pub fn render_body(template: &str, ctx: &PlaceholderContext) -> String {
    ctx.substitute(template, escape_html)
}

/// Every `{{token}}` occurrence in the text, recognised or not.
pub fn extract_placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// True when a rewrite kept exactly the same set of tokens.
pub fn preserves_placeholders(before: &str, after: &str) -> bool {
    extract_placeholders(before) == extract_placeholders(after)
}
