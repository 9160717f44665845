pub mod conditions;

use serde_json::json;

use crate::modules::alerts::conditions::{
    fast_match_email, fast_match_wm, EmailMatchContext, ParsedConditions, WmMatchContext,
};
use crate::modules::db::repo::alerts::{self, AlertRule};
use crate::modules::error::InboxResult;
use crate::modules::llm::{CompletionRequest, LlmClient};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::trigger;

/// Keys an alert's trigger payload is allowed to carry through from the
/// source event, grounded on
/// `original_source/src/alerts.py::emit_alert_trigger`.
const PAYLOAD_ALLOWLIST: &[&str] = &[
    "subject",
    "sender",
    "received_at",
    "web_link",
    "description",
    "to_whom",
    "due_by",
    "question",
];

/// One inbound occurrence an alert rule might fire on: either an email
/// event (received/sent) or a working-memory event (commitment/thread/
/// decision). `payload` carries the raw event fields; only the
/// `PAYLOAD_ALLOWLIST` subset survives into the emitted trigger.
pub struct AlertEvent {
    pub event_type: String,
    pub event_id: String,
    pub email_ctx: Option<EmailMatchContext>,
    pub is_sent: bool,
    pub wm_ctx: Option<WmMatchContext>,
    pub payload: serde_json::Value,
}

fn filtered_payload(payload: &serde_json::Value) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    if let Some(obj) = payload.as_object() {
        for key in PAYLOAD_ALLOWLIST {
            if let Some(v) = obj.get(*key) {
                out.insert((*key).to_string(), v.clone());
            }
        }
    }
    serde_json::Value::Object(out)
}

const RULE_PARSER_SYSTEM_PROMPT: &str = "\
You parse natural language email/calendar/working-memory alert rules into structured conditions.

## Event Types
Determine which event type(s) the rule applies to:
- message.received: Incoming emails (default if not specified).
- message.sent: Outgoing emails (\"when I send\", \"when I email\").
- calendar_event: Calendar events (\"meeting\", \"appointment\").
- wm_thread: Email thread tracking (\"thread is stale\", \"awaiting reply\").
- wm_commitment: User commitments (\"commitment overdue\", \"promised to\").
- wm_decision: Pending decisions (\"decision pending\", \"waiting for decision\").

## Parsing Rules

### Email patterns:
- \"from CFO\" -> sender_patterns: [\"*cfo*\"]
- \"from legal@company.com\" -> sender_patterns: [\"legal@company.com\"]
- \"to legal@\" -> recipient_patterns: [\"*legal@*\"] (for sent emails)

### Keywords:
- \"about budget\" -> subject_keywords: [\"budget\"], body_keywords: [\"budget\"]
- \"subject contains urgent\" -> subject_keywords: [\"urgent\"]

### Urgency:
- \"urgent emails\" -> urgency_levels: [\"immediate\", \"today\"]
- \"high priority\" -> urgency_levels: [\"immediate\"]

### Labels/Categories:
- \"VIP emails\" -> labels: [\"vip\"]
- \"action required\" -> categories: [\"Action Required\"]

### Calendar:
- \"meeting with >5 people\" -> min_attendees: 5, event_types: [\"calendar_event\"]
- \"meeting organized by john@\" -> organizer_patterns: [\"*john@*\"]

### Working Memory:
- \"commitment is overdue\" -> event_types: [\"wm_commitment\"], overdue_only: true
- \"thread awaiting reply for >3 days\" -> event_types: [\"wm_thread\"], overdue_only: true
- \"pending decision\" -> event_types: [\"wm_decision\"]

### Match mode:
- \"emails from CFO about budget\" -> match_mode: \"all\" (both must match)
- \"emails from CFO or about budget\" -> match_mode: \"any\" (either matches)

### Semantic matching:
- \"when someone sounds frustrated\" -> requires_semantic_match: true
- \"when email is complaining\" -> requires_semantic_match: true

Return a single structured JSON object for ParsedConditions. Be precise with
patterns, using wildcards (*) appropriately.";

/// Compiles a natural-language rule into structured conditions, per
/// spec.md §6 `parse_rule(text) → ParsedConditions`. Grounded on
/// `original_source/src/alerts.py::AlertRulesEngine.parse_rule` /
/// `_build_rule_parser_agent`.
///
/// No internal caller drives this: rule authoring is an external-input
/// operation spec.md's Non-goals leave outside this daemon's surface.
/// It is wired up for an external caller the way `modules::search`'s
/// query functions are.
pub async fn parse_rule(llm: &dyn LlmClient, natural_language_rule: &str) -> InboxResult<ParsedConditions> {
    let request = CompletionRequest {
        model: SETTINGS.rule_parser_model.clone(),
        system_prompt: RULE_PARSER_SYSTEM_PROMPT.to_string(),
        user_prompt: natural_language_rule.to_string(),
        json_schema_hint: Some("ParsedConditions".to_string()),
    };
    let response = llm.complete(request).await?;
    Ok(serde_json::from_str(&response.text).unwrap_or_default())
}

/// Parses a rule and stores it as an enabled `AlertRule`, ready for
/// `evaluate` to pick up on the next event. The natural-language text
/// is kept verbatim for `semantic_match_confirms`'s prompt and for
/// display.
pub async fn create_rule(
    llm: &dyn LlmClient,
    rule_text: &str,
    channel: Option<String>,
    target: Option<String>,
    cooldown_secs: i64,
    created_at: i64,
) -> InboxResult<AlertRule> {
    let conditions = parse_rule(llm, rule_text).await?;
    let event_types = if conditions.event_types.is_empty() {
        vec!["message.received".to_string()]
    } else {
        conditions.event_types.clone()
    };
    alerts::insert(AlertRule {
        id: String::new(),
        rule_text: rule_text.to_string(),
        conditions_json: serde_json::to_string(&conditions)?,
        event_types,
        channel,
        target,
        cooldown_secs,
        enabled: true,
        last_triggered_at: None,
        trigger_count: 0,
        created_at: Some(created_at),
    })
    .await
}

async fn semantic_match_confirms(llm: &dyn LlmClient, rule: &AlertRule, reason: &str) -> InboxResult<bool> {
    let request = CompletionRequest {
        model: SETTINGS.alert_model.clone(),
        system_prompt: "You confirm whether an email or working-memory event truly satisfies \
            an alert rule's intent, beyond its literal keyword/pattern match. Answer with a \
            single JSON object: {\"matches\": true|false}."
            .to_string(),
        user_prompt: format!(
            "Rule: \"{}\"\nFast-match reason: {}\nDoes this event genuinely satisfy the rule's intent?",
            rule.rule_text, reason
        ),
        json_schema_hint: Some(r#"{"matches": "boolean"}"#.to_string()),
    };
    let response = llm.complete(request).await?;
    let parsed: serde_json::Value = serde_json::from_str(&response.text).unwrap_or(json!({"matches": false}));
    Ok(parsed.get("matches").and_then(|v| v.as_bool()).unwrap_or(false))
}

/// Evaluates every enabled rule against one event, per spec.md §4.10's
/// ordered steps: event-type filter, cooldown, fast boolean match,
/// optional semantic confirmation, per-(rule,event) uniqueness, then
/// trigger emission. Returns the ids of rules that fired.
///
/// Grounded on `original_source/src/alerts.py::evaluate_email_rules` /
/// `evaluate_wm_rules` / `emit_alert_trigger`.
pub async fn evaluate(user: &str, llm: &dyn LlmClient, event: &AlertEvent) -> InboxResult<Vec<String>> {
    let mut triggered = Vec::new();
    let now = crate::utc_now!();

    for rule in alerts::enabled_rules().await? {
        if !rule.event_types.iter().any(|t| t == &event.event_type) {
            continue;
        }

        if let Some(last) = rule.last_triggered_at {
            if now - last < rule.cooldown_secs {
                continue;
            }
        }

        let conditions: ParsedConditions = match serde_json::from_str(&rule.conditions_json) {
            Ok(c) => c,
            Err(_) => continue,
        };

        let (matched, reason) = if let Some(ctx) = &event.email_ctx {
            fast_match_email(&conditions, ctx, event.is_sent)
        } else if let Some(ctx) = &event.wm_ctx {
            fast_match_wm(&conditions, ctx)
        } else {
            continue;
        };

        if !matched {
            continue;
        }

        if conditions.requires_semantic_match && !semantic_match_confirms(llm, &rule, &reason).await? {
            continue;
        }

        let newly_recorded = alerts::record_event_match(
            rule.id.clone(),
            event.event_type.clone(),
            event.event_id.clone(),
            Some(reason),
            now,
        )
        .await?;
        if !newly_recorded {
            continue;
        }

        let mut payload = filtered_payload(&event.payload);
        if let serde_json::Value::Object(ref mut obj) = payload {
            obj.insert("rule_id".to_string(), json!(rule.id));
            obj.insert("rule_text".to_string(), json!(rule.rule_text));
            obj.insert("event_type".to_string(), json!(event.event_type));
            obj.insert("event_id".to_string(), json!(event.event_id));
        }

        let mut routing = json!({ "channel": rule.channel.clone().unwrap_or_else(|| "teams".to_string()) });
        if let (Some(target), serde_json::Value::Object(ref mut obj)) = (rule.target.clone(), &mut routing) {
            obj.insert("target".to_string(), json!(target));
        }

        let dedupe_key =
            format!("alert_rule_triggered:{}:{}:{}:{}", user, rule.id, event.event_type, event.event_id);

        let emitted =
            trigger::write_trigger(user, "alert_rule_triggered", payload, dedupe_key, Some(routing)).await?;

        if emitted {
            alerts::mark_triggered(rule.id.clone(), now).await?;
            triggered.push(rule.id);
        }
    }

    Ok(triggered)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::modules::alerts::conditions::MatchMode;
    use crate::modules::error::InboxResult;
    use crate::modules::llm::CompletionResponse;
    use crate::modules::settings::dir::DATA_DIR_MANAGER;

    struct AlwaysYesLlm;

    #[async_trait]
    impl LlmClient for AlwaysYesLlm {
        async fn complete(&self, _request: CompletionRequest) -> InboxResult<CompletionResponse> {
            Ok(CompletionResponse { text: r#"{"matches": true}"#.to_string() })
        }
    }

    #[tokio::test]
    async fn matching_rule_emits_trigger_exactly_once_per_event() {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.outbox_dir).unwrap();
        let conditions = ParsedConditions {
            event_types: vec!["message.received".to_string()],
            sender_patterns: vec!["*cfo*".to_string()],
            match_mode: MatchMode::Any,
            ..Default::default()
        };
        let rule = alerts::insert(AlertRule {
            id: String::new(),
            rule_text: "notify when the CFO emails".to_string(),
            conditions_json: serde_json::to_string(&conditions).unwrap(),
            event_types: vec!["message.received".to_string()],
            channel: Some("teams".to_string()),
            target: None,
            cooldown_secs: 0,
            enabled: true,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: Some(1),
        })
        .await
        .unwrap();

        let event = AlertEvent {
            event_type: "message.received".to_string(),
            event_id: "alert-test-msg-1".to_string(),
            email_ctx: Some(EmailMatchContext { sender: "cfo@acme.com".to_string(), ..Default::default() }),
            is_sent: false,
            wm_ctx: None,
            payload: json!({"subject": "Budget approval", "sender": "cfo@acme.com"}),
        };

        let llm = AlwaysYesLlm;
        let first = evaluate("user@example.com", &llm, &event).await.unwrap();
        assert_eq!(first, vec![rule.id.clone()]);

        let second = evaluate("user@example.com", &llm, &event).await.unwrap();
        assert!(second.is_empty());
    }

    struct StubParserLlm;

    #[async_trait]
    impl LlmClient for StubParserLlm {
        async fn complete(&self, _request: CompletionRequest) -> InboxResult<CompletionResponse> {
            Ok(CompletionResponse {
                text: r#"{"sender_patterns": ["*cfo*"], "subject_keywords": ["budget"], "match_mode": "all"}"#
                    .to_string(),
            })
        }
    }

    #[tokio::test]
    async fn create_rule_compiles_and_persists_conditions() {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.outbox_dir).unwrap();
        let llm = StubParserLlm;
        let rule = create_rule(&llm, "notify when the CFO emails about budget", None, None, 3600, 1).await.unwrap();

        assert_eq!(rule.event_types, vec!["message.received".to_string()]);
        let conditions: ParsedConditions = serde_json::from_str(&rule.conditions_json).unwrap();
        assert_eq!(conditions.sender_patterns, vec!["*cfo*".to_string()]);
        assert_eq!(conditions.match_mode, MatchMode::All);
    }
}
