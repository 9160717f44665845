use serde::{Deserialize, Serialize};

use crate::modules::utils::glob_to_regex;

/// Structured conditions compiled once from a natural-language rule
/// (spec.md §4.10). Field set grounded on
/// `original_source/src/alerts.py::ParsedConditions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedConditions {
    pub event_types: Vec<String>,
    pub sender_patterns: Vec<String>,
    pub recipient_patterns: Vec<String>,
    pub subject_keywords: Vec<String>,
    pub body_keywords: Vec<String>,
    pub urgency_levels: Vec<String>,
    pub labels: Vec<String>,
    pub categories: Vec<String>,
    pub min_attendees: Option<u32>,
    pub organizer_patterns: Vec<String>,
    pub wm_types: Vec<String>,
    pub overdue_only: bool,
    pub match_mode: MatchMode,
    pub requires_semantic_match: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Any,
    All,
}

impl Default for MatchMode {
    fn default() -> Self {
        Self::Any
    }
}

/// Glob-with-`*` case-insensitive pattern match, grounded on
/// `original_source/src/alerts.py::_pattern_matches` (substring
/// containment when the pattern carries no wildcard, regex search
/// otherwise).
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    if pattern.is_empty() || value.is_empty() {
        return false;
    }
    if pattern.contains('*') {
        glob_to_regex(pattern).is_match(value)
    } else {
        value.to_lowercase().contains(&pattern.to_lowercase())
    }
}

/// Context for one email event (received or sent), decoupled from the
/// triage verdict's concrete type so this module has no dependency on
/// `modules::triage`.
#[derive(Debug, Clone, Default)]
pub struct EmailMatchContext {
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub to_emails: Vec<String>,
    pub labels: Vec<String>,
    pub urgency: String,
    pub outlook_categories: Vec<String>,
}

/// Fast boolean pre-filter for email events (spec.md §4.10 step 4).
/// Grounded on `original_source/src/alerts.py::_fast_match_email`.
pub fn fast_match_email(conditions: &ParsedConditions, ctx: &EmailMatchContext, is_sent: bool) -> (bool, String) {
    let mut matched = Vec::new();
    let mut reasons = Vec::new();
    let sender = ctx.sender.to_lowercase();
    let subject = ctx.subject.to_lowercase();
    let body = ctx.body.to_lowercase();

    for pattern in &conditions.sender_patterns {
        if pattern_matches(pattern, &sender) {
            matched.push(true);
            reasons.push(format!("sender matches '{pattern}'"));
        }
    }

    if is_sent {
        for pattern in &conditions.recipient_patterns {
            for recipient in &ctx.to_emails {
                if pattern_matches(pattern, &recipient.to_lowercase()) {
                    matched.push(true);
                    reasons.push(format!("recipient matches '{pattern}'"));
                }
            }
        }
    }

    for kw in &conditions.subject_keywords {
        if subject.contains(&kw.to_lowercase()) {
            matched.push(true);
            reasons.push(format!("subject contains '{kw}'"));
        }
    }

    for kw in &conditions.body_keywords {
        if body.contains(&kw.to_lowercase()) {
            matched.push(true);
            reasons.push(format!("body contains '{kw}'"));
        }
    }

    for label in &conditions.labels {
        if ctx.labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            matched.push(true);
            reasons.push(format!("has label '{label}'"));
        }
    }

    for level in &conditions.urgency_levels {
        if ctx.urgency.eq_ignore_ascii_case(level) {
            matched.push(true);
            reasons.push(format!("urgency is '{level}'"));
        }
    }

    for cat in &conditions.categories {
        if ctx.outlook_categories.iter().any(|c| c == cat) {
            matched.push(true);
            reasons.push(format!("has category '{cat}'"));
        }
    }

    if matched.is_empty() {
        return (false, "no conditions matched".to_string());
    }

    if conditions.match_mode == MatchMode::All {
        let expected = conditions.sender_patterns.len()
            + conditions.recipient_patterns.len()
            + conditions.subject_keywords.len()
            + conditions.body_keywords.len()
            + conditions.labels.len()
            + conditions.urgency_levels.len()
            + conditions.categories.len();
        if matched.len() >= expected {
            (true, reasons.join("; "))
        } else {
            (false, format!("only {}/{expected} conditions matched", matched.len()))
        }
    } else {
        (true, reasons.join("; "))
    }
}

/// Context for one working-memory event (thread/commitment/decision).
#[derive(Debug, Clone, Default)]
pub struct WmMatchContext {
    pub wm_type: String,
    pub urgency: String,
    pub is_overdue: bool,
}

/// Fast boolean pre-filter for working-memory events (spec.md §4.10).
/// Grounded on `original_source/src/alerts.py::_fast_match_wm`.
pub fn fast_match_wm(conditions: &ParsedConditions, ctx: &WmMatchContext) -> (bool, String) {
    let mut matched = Vec::new();
    let mut reasons = Vec::new();

    if !conditions.wm_types.is_empty() {
        let expected = conditions.wm_types.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>();
        if !expected.contains(&ctx.wm_type.to_lowercase()) {
            return (false, format!("wm type {} not in {:?}", ctx.wm_type, conditions.wm_types));
        }
        matched.push(true);
        reasons.push(format!("wm type is {}", ctx.wm_type));
    }

    if conditions.overdue_only {
        if ctx.is_overdue {
            matched.push(true);
            reasons.push("item is overdue".to_string());
        } else {
            return (false, "item is not overdue".to_string());
        }
    }

    if !conditions.urgency_levels.is_empty() {
        if conditions.urgency_levels.iter().any(|l| l.eq_ignore_ascii_case(&ctx.urgency)) {
            matched.push(true);
            reasons.push(format!("urgency is {}", ctx.urgency));
        }
    }

    if matched.is_empty() {
        return (true, format!("matches {} event", ctx.wm_type));
    }
    (true, reasons.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_with_wildcard_matches_case_insensitively() {
        assert!(pattern_matches("*cfo*", "CFO@acme.com"));
        assert!(!pattern_matches("*cfo*", "ceo@acme.com"));
    }

    #[test]
    fn pattern_without_wildcard_is_substring() {
        assert!(pattern_matches("legal@company.com", "mail from legal@company.com today"));
    }

    #[test]
    fn any_mode_matches_on_single_condition() {
        let conditions = ParsedConditions {
            sender_patterns: vec!["*cfo*".to_string()],
            subject_keywords: vec!["nonmatching".to_string()],
            ..Default::default()
        };
        let ctx = EmailMatchContext {
            sender: "cfo@acme.com".to_string(),
            subject: "Budget".to_string(),
            ..Default::default()
        };
        let (matched, _) = fast_match_email(&conditions, &ctx, false);
        assert!(matched);
    }

    #[test]
    fn all_mode_requires_every_condition() {
        let conditions = ParsedConditions {
            sender_patterns: vec!["*cfo*".to_string()],
            subject_keywords: vec!["budget".to_string()],
            match_mode: MatchMode::All,
            ..Default::default()
        };
        let mismatched = EmailMatchContext {
            sender: "cfo@acme.com".to_string(),
            subject: "Lunch plans".to_string(),
            ..Default::default()
        };
        let (matched, _) = fast_match_email(&conditions, &mismatched, false);
        assert!(!matched);

        let full = EmailMatchContext {
            sender: "cfo@acme.com".to_string(),
            subject: "Approve budget".to_string(),
            ..Default::default()
        };
        let (matched, _) = fast_match_email(&conditions, &full, false);
        assert!(matched);
    }

    #[test]
    fn overdue_only_rejects_non_overdue_items() {
        let conditions = ParsedConditions { overdue_only: true, ..Default::default() };
        let ctx = WmMatchContext { wm_type: "commitment".to_string(), is_overdue: false, ..Default::default() };
        let (matched, _) = fast_match_wm(&conditions, &ctx);
        assert!(!matched);
    }
}
