//! Display-name resolution for outgoing email.
//!
//! Two separate concerns with their own precedence:
//!
//! | concern                    | precedence                                  |
//! |----------------------------|---------------------------------------------|
//! | sender / reply-to display  | company name, display name, "Nudge"         |
//! | sign-off (`{{yourName}}`)  | display name, company name, "Nudge"         |
//!
//! Blank strings are treated as absent.

use crate::models::Workspace;

pub const FALLBACK_NAME: &str = "Nudge";

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

pub fn sender_display_name(workspace: Option<&Workspace>) -> String {
    sender_display_name_or(workspace, FALLBACK_NAME)
}

/// Same precedence with a configured last resort instead of "Nudge".
pub fn sender_display_name_or(workspace: Option<&Workspace>, fallback: &str) -> String {
    workspace
        .and_then(|w| non_blank(w.company_name.as_ref()).or(non_blank(w.display_name.as_ref())))
        .unwrap_or(fallback)
        .to_string()
}

pub fn sign_off_name(workspace: Option<&Workspace>) -> String {
    workspace
        .and_then(|w| non_blank(w.display_name.as_ref()).or(non_blank(w.company_name.as_ref())))
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}
