pub mod folder_mode;

use serde::{Deserialize, Serialize};
use time_tz::OffsetDateTimeExt;
use tracing::{info, warn};

use crate::modules::alerts::conditions::EmailMatchContext;
use crate::modules::alerts::{self, AlertEvent};
use crate::modules::db::repo::{labels, messages, reply_tracking, triage_log, weekly_digest};
use crate::modules::error::InboxResult;
use crate::modules::graph::{GraphClient, MessageFlag};
use crate::modules::llm::{CompletionRequest, LlmClient};
use crate::modules::settings::cli::{CleanupStrategy, SETTINGS};
use crate::modules::settings::preferences::{self, Preferences};
use crate::modules::trigger;
use crate::modules::working_memory;

/// Executive-assistant verdict returned by the triage classifier
/// collaborator, grounded on `original_source/src/organizer.py::EmailCategory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageVerdict {
    pub category: String,
    pub reason: String,
    pub action: String,
    pub destination_folder: Option<String>,
    pub outlook_categories: Vec<String>,
    pub urgency: String,
    pub labels: Vec<String>,
    pub confidence: f64,
    pub requires_reply: bool,
    pub reply_reason: Option<String>,
    pub availability_requested: bool,
    pub availability: Option<AvailabilityRequest>,
}

impl Default for TriageVerdict {
    fn default() -> Self {
        Self {
            category: String::new(),
            reason: String::new(),
            action: "none".to_string(),
            destination_folder: None,
            outlook_categories: Vec::new(),
            urgency: "someday".to_string(),
            labels: Vec::new(),
            confidence: 0.7,
            requires_reply: false,
            reply_reason: None,
            availability_requested: false,
            availability: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub time_window: Option<String>,
    pub duration_minutes: Option<i64>,
    pub timezone: Option<String>,
    pub constraints: Option<String>,
    #[serde(default)]
    pub proposed_slots: Vec<String>,
}

fn due_flag_for_urgency(urgency: &str) -> Option<MessageFlag> {
    match urgency {
        "immediate" | "today" => Some(MessageFlag::DueToday),
        "this_week" => Some(MessageFlag::DueThisWeek),
        _ => None,
    }
}

/// Per-level guidance for how readily the classifier should route
/// clutter to "Should Delete", per spec.md §6 `CLEANUP_STRATEGY` and
/// `original_source/src/organizer.py`'s `build_agent` system prompt
/// section 3 ("Cleanup Strategy").
fn cleanup_strategy_guidance() -> &'static str {
    match SETTINGS.cleanup_strategy {
        CleanupStrategy::Low => "Low: only move obvious spam/phishing/junk to Should Delete.",
        CleanupStrategy::Medium => {
            "Medium: move spam plus old/irrelevant newsletters (older than 3 months) to Should Delete."
        }
        CleanupStrategy::Aggressive => {
            "Aggressive: move spam plus any newsletter/promo older than 1 month, and cold outreach, to Should Delete."
        }
    }
}

async fn classify(llm: &dyn LlmClient, context: &str) -> InboxResult<TriageVerdict> {
    let request = CompletionRequest {
        model: SETTINGS.model_name.clone(),
        system_prompt: format!(
            "You are an expert executive assistant triaging one email. Return a JSON \
            object describing its category, urgency, required action, and whether it needs a \
            reply or scheduling response.\n\nCleanup strategy (current level: {:?}): {}",
            SETTINGS.cleanup_strategy,
            cleanup_strategy_guidance(),
        ),
        user_prompt: context.to_string(),
        json_schema_hint: Some("TriageVerdict".to_string()),
    };
    let response = llm.complete(request).await?;
    Ok(serde_json::from_str(&response.text).unwrap_or_default())
}

/// One pass over every message with `processed_at IS NULL` (spec.md
/// §4.7). A failure partway through a message's verdict application
/// surfaces as a warning and leaves `processed_at` unset so the next
/// pass retries it.
pub async fn process_pending(client: &dyn GraphClient, llm: &dyn LlmClient, user: &str, limit: i64) {
    let prefs = preferences::read();
    let categories_mode = preferences::categories_mode_enabled(&prefs);

    let pending = match messages::unprocessed(limit).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "failed to list unprocessed messages");
            return;
        }
    };

    for message in pending {
        if let Err(e) = process_one(client, llm, user, &message, categories_mode, &prefs).await {
            warn!(message_id = %message.id, error = %e, "triage failed for message, processed_at not advanced");
        }
    }
}

async fn process_one(
    client: &dyn GraphClient,
    llm: &dyn LlmClient,
    user: &str,
    message: &messages::Message,
    categories_mode: bool,
    prefs: &Preferences,
) -> InboxResult<()> {
    let is_vip = message
        .sender
        .as_deref()
        .map(|s| preferences::is_vip_sender(prefs, s))
        .unwrap_or(false);

    let context = format!(
        "VIP_SENDER: {}\nSubject: {}\nSender: {}\nPreview: {}",
        is_vip,
        message.subject.as_deref().unwrap_or(""),
        message.sender.as_deref().unwrap_or(""),
        message.body_preview.as_deref().unwrap_or(""),
    );

    let mut verdict = classify(llm, &context).await.unwrap_or_default();
    if is_vip && !verdict.labels.iter().any(|l| l == "vip") {
        verdict.labels.push("vip".to_string());
    }

    execute_action(client, message.id.clone(), categories_mode, &verdict).await?;

    let now = crate::utc_now!();

    triage_log::append(
        message.id.clone(),
        verdict.action.clone(),
        verdict.destination_folder.clone(),
        Some(verdict.reason.clone()),
        now,
    )
    .await?;

    let labeled: Vec<(String, f64)> = verdict.labels.iter().map(|l| (l.clone(), verdict.confidence)).collect();
    labels::replace(message.id.clone(), labeled, now).await?;

    if verdict.requires_reply {
        let reason = verdict.reply_reason.clone().or_else(|| Some(verdict.reason.clone()));
        reply_tracking::upsert(message.id.clone(), reason, message.received_at.or(Some(now))).await?;
    }

    if let Err(e) =
        working_memory::process_message(llm, user, message, Some(verdict.category.as_str()), verdict.requires_reply)
            .await
    {
        warn!(message_id = %message.id, error = %e, "working-memory update failed for message, triage still committed");
    }

    emit_triggers(user, message, &verdict, prefs).await?;

    let alert_event = AlertEvent {
        event_type: "message.received".to_string(),
        event_id: message.id.clone(),
        email_ctx: Some(EmailMatchContext {
            sender: message.sender.clone().unwrap_or_default(),
            subject: message.subject.clone().unwrap_or_default(),
            body: message.body_preview.clone().unwrap_or_default(),
            to_emails: message.to_emails.clone(),
            labels: verdict.labels.clone(),
            urgency: verdict.urgency.clone(),
            outlook_categories: verdict.outlook_categories.clone(),
        }),
        is_sent: false,
        wm_ctx: None,
        payload: serde_json::json!({
            "subject": message.subject,
            "sender": message.sender,
            "received_at": message.received_at,
            "web_link": message.web_link,
        }),
    };
    if let Err(e) = alerts::evaluate(user, llm, &alert_event).await {
        warn!(message_id = %message.id, error = %e, "alert rule evaluation failed for message");
    }

    messages::mark_processed(message.id.clone(), now, Some(verdict.category.clone())).await?;

    info!(message_id = %message.id, category = %verdict.category, action = %verdict.action, "message triaged");
    Ok(())
}

async fn execute_action(
    client: &dyn GraphClient,
    message_id: String,
    categories_mode: bool,
    verdict: &TriageVerdict,
) -> InboxResult<()> {
    if categories_mode {
        if !verdict.outlook_categories.is_empty() || verdict.urgency != "someday" {
            let flag = due_flag_for_urgency(&verdict.urgency);
            client
                .update_message_categories(&message_id, &verdict.outlook_categories, flag)
                .await?;
        }
        if verdict.action == "delete" {
            client.move_message(&message_id, "Should Delete").await?;
        }
        return Ok(());
    }

    folder_mode::execute(client, &message_id, verdict).await
}

async fn emit_triggers(
    user: &str,
    message: &messages::Message,
    verdict: &TriageVerdict,
    prefs: &Preferences,
) -> InboxResult<()> {
    let payload = |reason: String| {
        serde_json::json!({
            "message_id": message.id,
            "subject": message.subject,
            "sender": message.sender,
            "received_at": message.received_at,
            "reason": reason,
        })
    };

    if verdict.category.eq_ignore_ascii_case("urgent") || verdict.action == "mark_important" {
        trigger::write_trigger(
            user,
            "urgent_email",
            payload(verdict.reason.clone()),
            format!("urgent_email:{user}:{}", message.id),
            Some(serde_json::json!({ "channel": "teams" })),
        )
        .await?;
    }

    if verdict.requires_reply {
        let reason = verdict.reply_reason.clone().unwrap_or_else(|| verdict.reason.clone());
        trigger::write_trigger(
            user,
            "reply_needed",
            payload(reason),
            format!("reply_needed:{user}:{}", message.id),
            Some(serde_json::json!({ "channel": "teams" })),
        )
        .await?;
    }

    if verdict.availability_requested {
        let default_tz = prefs.timezone.clone().unwrap_or_else(|| SETTINGS.default_timezone.clone());
        let availability = verdict.availability.clone().unwrap_or_default();
        let availability_payload = serde_json::json!({
            "message_id": message.id,
            "subject": message.subject,
            "time_window": availability.time_window,
            "duration_minutes": availability.duration_minutes.unwrap_or(30),
            "timezone": availability.timezone.unwrap_or(default_tz),
            "constraints": availability.constraints,
            "proposed_slots": availability.proposed_slots,
            "requester": message.sender,
        });
        trigger::write_trigger(
            user,
            "availability_requested",
            availability_payload,
            format!("availability_requested:{user}:{}", message.id),
            Some(serde_json::json!({ "channel": "teams" })),
        )
        .await?;
    }

    Ok(())
}

/// Scans `reply_tracking` for rows stale by `followup_n_days` and
/// emits one `no_reply_after_n_days` trigger per row, per spec.md §4.7
/// / `organizer.py::_emit_followup_triggers`.
pub async fn emit_followup_triggers(user: &str) -> InboxResult<usize> {
    let now = crate::utc_now!();
    let threshold_secs = SETTINGS.followup_n_days * 86_400;
    let candidates = reply_tracking::awaiting_nudge(200).await?;
    let mut emitted = 0;

    for row in candidates {
        let Some(last_activity) = row.last_activity_at else { continue };
        if now - last_activity < threshold_secs {
            continue;
        }

        let message = match messages::get(row.message_id.clone()).await? {
            Some(m) => m,
            None => continue,
        };

        let fired = trigger::write_trigger(
            user,
            "no_reply_after_n_days",
            serde_json::json!({
                "message_id": row.message_id,
                "subject": message.subject,
                "sender": message.sender,
                "reason": row.reason,
                "days_waiting": (now - last_activity) / 86_400,
            }),
            format!("no_reply_after_n_days:{user}:{}", row.message_id),
            Some(serde_json::json!({ "channel": "teams" })),
        )
        .await?;

        if fired {
            reply_tracking::mark_nudge_scheduled(row.message_id, now).await?;
            emitted += 1;
        }
    }

    Ok(emitted)
}

/// Converts `now` into `SETTINGS.default_timezone` before comparing
/// against `digest_day`/`digest_time_local`, so "08:00" in the
/// configured timezone means what the operator expects rather than
/// 08:00 UTC. Falls back to UTC if the timezone name isn't recognized.
fn digest_due_now(now: chrono::DateTime<chrono::Utc>) -> bool {
    let timestamp_sec = now.timestamp();
    let Some(utc_odt) = time::OffsetDateTime::from_unix_timestamp(timestamp_sec).ok() else {
        return false;
    };
    let local = match time_tz::timezones::get_by_name(&SETTINGS.default_timezone) {
        Some(tz) => utc_odt.to_timezone(tz),
        None => utc_odt,
    };

    let weekday_matches = local.weekday().number_from_monday() as u32 == SETTINGS.digest_day;
    let Some((hour, minute)) = SETTINGS
        .digest_time_local
        .split_once(':')
        .and_then(|(h, m)| Some((h.parse::<u8>().ok()?, m.parse::<u8>().ok()?)))
    else {
        return weekday_matches;
    };
    weekday_matches && local.hour() == hour && local.minute() == minute
}

/// Emits at most one `weekly_digest_ready` trigger per ISO week once
/// `enable_weekly_digest` is set and the configured digest day/time
/// window is reached, per spec.md §4.7 /
/// `organizer.py::_emit_weekly_digest_trigger`.
pub async fn emit_weekly_digest_trigger(user: &str) -> InboxResult<bool> {
    if !SETTINGS.enable_weekly_digest {
        return Ok(false);
    }

    let now = chrono::Utc::now();
    if !digest_due_now(now) {
        return Ok(false);
    }

    let iso = now.iso_week();
    if !weekly_digest::record_if_new(iso.year(), iso.week(), now.timestamp()).await? {
        return Ok(false);
    }

    let week_start = now - chrono::Duration::days(7);
    let messages_this_week = messages::received_between(week_start.timestamp(), now.timestamp(), 500).await?;

    let urgent_count = messages_this_week
        .iter()
        .filter(|m| m.category.as_deref() == Some("urgent"))
        .count();

    trigger::write_trigger(
        user,
        "weekly_digest_ready",
        serde_json::json!({
            "iso_year": iso.year(),
            "iso_week": iso.week(),
            "total_messages": messages_this_week.len(),
            "urgent_count": urgent_count,
        }),
        format!("weekly_digest_ready:{user}:{}:{}", iso.year(), iso.week()),
        Some(serde_json::json!({ "channel": "teams" })),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_maps_to_due_flag_per_fixed_table() {
        assert_eq!(due_flag_for_urgency("immediate"), Some(MessageFlag::DueToday));
        assert_eq!(due_flag_for_urgency("today"), Some(MessageFlag::DueToday));
        assert_eq!(due_flag_for_urgency("this_week"), Some(MessageFlag::DueThisWeek));
        assert_eq!(due_flag_for_urgency("someday"), None);
    }

    #[test]
    fn digest_due_now_converts_to_configured_timezone() {
        // SETTINGS.digest_time_local is "08:00", digest_day is 5 (Friday),
        // default_timezone is "UTC" in the test config, so 08:00 UTC on a
        // Friday should match, and the same instant shifted an hour should
        // not.
        use chrono::TimeZone;
        let friday_0800_utc = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).unwrap();
        assert!(digest_due_now(friday_0800_utc));

        let friday_0900_utc = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap();
        assert!(!digest_due_now(friday_0900_utc));
    }
}
