use rusqlite::{params, Row};
use uuid::Uuid;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// §4.10 `AlertRule`: a natural-language rule compiled once into
/// structured conditions and stored as JSON (the compiler output
/// shape lives in `modules::alerts::conditions`).
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: String,
    pub rule_text: String,
    pub conditions_json: String,
    pub event_types: Vec<String>,
    pub channel: Option<String>,
    pub target: Option<String>,
    pub cooldown_secs: i64,
    pub enabled: bool,
    pub last_triggered_at: Option<i64>,
    pub trigger_count: i64,
    pub created_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<AlertRule> {
    let event_types: String = row.get("event_types_json")?;
    Ok(AlertRule {
        id: row.get("id")?,
        rule_text: row.get("rule_text")?,
        conditions_json: row.get("conditions_json")?,
        event_types: serde_json::from_str(&event_types).unwrap_or_default(),
        channel: row.get("channel")?,
        target: row.get("target")?,
        cooldown_secs: row.get("cooldown_secs")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        last_triggered_at: row.get("last_triggered_at")?,
        trigger_count: row.get("trigger_count")?,
        created_at: row.get("created_at")?,
    })
}

pub async fn insert(mut rule: AlertRule) -> InboxResult<AlertRule> {
    if rule.id.is_empty() {
        rule.id = Uuid::new_v4().to_string();
    }
    let created = rule.clone();
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO alert_rules (
                    id, rule_text, conditions_json, event_types_json, channel, target,
                    cooldown_secs, enabled, created_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    rule.id,
                    rule.rule_text,
                    rule.conditions_json,
                    serde_json::to_string(&rule.event_types)?,
                    rule.channel,
                    rule.target,
                    rule.cooldown_secs,
                    rule.enabled as i64,
                    rule.created_at,
                ],
            )?;
            Ok(())
        })
        .await?;
    Ok(created)
}

pub async fn enabled_rules() -> InboxResult<Vec<AlertRule>> {
    DATABASE
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM alert_rules WHERE enabled = 1")?;
            let rows = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Marks a rule as having fired, advancing its cooldown clock (spec.md
/// §4.10, "cooldown").
pub async fn mark_triggered(id: String, at: i64) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE alert_rules SET last_triggered_at = ?2, trigger_count = trigger_count + 1
                 WHERE id = ?1",
                params![id, at],
            )?;
            Ok(())
        })
        .await
}

/// Atomically records a (rule, event) pair as fired, relying on the
/// table's UNIQUE constraint: returns `true` if this is a new match,
/// `false` if the pair was already recorded (per-event uniqueness,
/// spec.md §4.10 Open Question c — kept independent of cooldown).
pub async fn record_event_match(
    rule_id: String,
    event_type: String,
    event_id: String,
    match_reason: Option<String>,
    at: i64,
) -> InboxResult<bool> {
    DATABASE
        .with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO alert_triggers (id, rule_id, event_type, event_id, match_reason, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    rule_id,
                    event_type,
                    event_id,
                    match_reason,
                    at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_event_match_is_idempotent_per_rule_and_event() {
        let rule = insert(AlertRule {
            id: String::new(),
            rule_text: "notify me when the CFO emails".to_string(),
            conditions_json: "{}".to_string(),
            event_types: vec!["message.received".to_string()],
            channel: Some("push".to_string()),
            target: None,
            cooldown_secs: 3600,
            enabled: true,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: Some(1),
        })
        .await
        .unwrap();

        let first = record_event_match(
            rule.id.clone(),
            "message.received".to_string(),
            "msg-1".to_string(),
            Some("sender matched *cfo*".to_string()),
            100,
        )
        .await
        .unwrap();
        let second = record_event_match(
            rule.id.clone(),
            "message.received".to_string(),
            "msg-1".to_string(),
            Some("sender matched *cfo*".to_string()),
            200,
        )
        .await
        .unwrap();

        assert!(first);
        assert!(!second);
    }
}
