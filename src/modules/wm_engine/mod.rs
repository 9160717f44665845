use serde::Serialize;
use tracing::{info, warn};

use crate::modules::alerts::conditions::WmMatchContext;
use crate::modules::alerts::{self, AlertEvent};
use crate::modules::db::repo::commitments;
use crate::modules::db::repo::observations;
use crate::modules::db::repo::threads::{self, ThreadStatus, Urgency};
use crate::modules::error::InboxResult;
use crate::modules::llm::LlmClient;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::trigger;
use crate::utc_now;

const SECS_PER_DAY: i64 = 86_400;

/// Per-cycle counters, mirroring `engine.py::run_cycle`'s returned stats dict.
#[derive(Debug, Default, Serialize)]
pub struct CycleStats {
    pub threads_marked_stale: usize,
    pub urgency_escalated: usize,
    pub observations_pruned: usize,
    pub nudges_emitted: usize,
}

/// One maintenance pass: mark stale threads, escalate overdue urgency,
/// prune old observations, then emit proactive nudges against the
/// post-mutation state (spec.md §4.9).
pub async fn run_cycle(user_email: &str, llm: &dyn LlmClient) -> InboxResult<CycleStats> {
    let now = utc_now!();
    let mut stats = CycleStats::default();

    stats.threads_marked_stale = mark_stale_threads(now).await?;
    stats.urgency_escalated = escalate_urgency(now).await?;
    stats.observations_pruned = prune_observations(now).await?;
    stats.nudges_emitted = emit_nudges(user_email, llm, now).await?;

    if stats.threads_marked_stale + stats.urgency_escalated + stats.observations_pruned + stats.nudges_emitted > 0 {
        info!(
            stale = stats.threads_marked_stale,
            escalated = stats.urgency_escalated,
            pruned = stats.observations_pruned,
            nudges = stats.nudges_emitted,
            "working memory engine cycle"
        );
    }

    Ok(stats)
}

async fn mark_stale_threads(now: i64) -> InboxResult<usize> {
    let cutoff = now - SETTINGS.wm_stale_threshold_days * SECS_PER_DAY;
    let candidates = threads::active_since(cutoff).await?;
    let count = candidates.len();
    for thread in candidates {
        threads::set_status(thread.id, ThreadStatus::Stale).await?;
    }
    Ok(count)
}

async fn escalate_urgency(now: i64) -> InboxResult<usize> {
    let cutoff = now - SETTINGS.wm_urgency_escalation_days * SECS_PER_DAY;
    let mut count = 0;

    for thread in threads::escalation_candidates(cutoff).await? {
        threads::set_urgency(thread.id, Urgency::Today).await?;
        count += 1;
    }

    for decision in commitments::escalatable_decisions(cutoff).await? {
        commitments::escalate_decision_urgency(decision.id, Urgency::Today).await?;
        count += 1;
    }

    Ok(count)
}

async fn prune_observations(now: i64) -> InboxResult<usize> {
    let cutoff = now - SETTINGS.wm_observation_retention_days * SECS_PER_DAY;
    let stale = observations::older_than(cutoff).await?;
    let count = stale.len();
    for obs in stale {
        observations::delete(obs.id).await?;
    }
    Ok(count)
}

struct Nudge {
    nudge_type: &'static str,
    wm_type: &'static str,
    urgency: String,
    is_overdue: bool,
    dedupe_id: String,
    payload: serde_json::Value,
}

/// Emits the deduplicated `working_memory_nudge` trigger for each
/// candidate, then separately feeds the same occurrence through the
/// alert-rules engine as a `wm_type`-keyed event (spec.md §4 data flow:
/// "Alert Rules evaluate on each event class"), mirroring
/// `original_source/src/alerts.py::evaluate_wm_rules`'s per-item call
/// sites in `engine.py`.
async fn emit_nudges(user_email: &str, llm: &dyn LlmClient, now: i64) -> InboxResult<usize> {
    let mut nudges = Vec::new();
    nudges.extend(overdue_reply_nudges(now).await?);
    nudges.extend(overdue_commitment_nudges(now).await?);
    nudges.extend(stale_urgent_thread_nudges(now).await?);
    nudges.extend(pending_decision_nudges(now).await?);

    let mut emitted = 0;
    for nudge in nudges {
        let dedupe_key = format!("wm_nudge_{}:{user_email}:{}", nudge.nudge_type, nudge.dedupe_id);
        let fired = trigger::write_trigger(
            user_email,
            "working_memory_nudge",
            nudge.payload.clone(),
            dedupe_key,
            Some(serde_json::json!({ "channel": "teams" })),
        )
        .await?;
        if fired {
            emitted += 1;
        }

        let event = AlertEvent {
            event_type: nudge.wm_type.to_string(),
            event_id: nudge.dedupe_id,
            email_ctx: None,
            is_sent: false,
            wm_ctx: Some(WmMatchContext {
                wm_type: nudge.wm_type.to_string(),
                urgency: nudge.urgency,
                is_overdue: nudge.is_overdue,
            }),
            payload: nudge.payload,
        };
        if let Err(e) = alerts::evaluate(user_email, llm, &event).await {
            warn!(error = %e, nudge_type = nudge.nudge_type, "alert rule evaluation failed for wm event");
        }
    }
    Ok(emitted)
}

async fn overdue_reply_nudges(now: i64) -> InboxResult<Vec<Nudge>> {
    let cutoff = now - SETTINGS.wm_reply_nudge_days * SECS_PER_DAY;
    let threads = threads::overdue_reply_candidates(cutoff, 5).await?;
    Ok(threads
        .into_iter()
        .map(|t| {
            let days_waiting = t.last_activity_at.map(|a| (now - a) / SECS_PER_DAY).unwrap_or(0);
            Nudge {
                nudge_type: "reply_overdue",
                wm_type: "thread",
                urgency: "today".to_string(),
                is_overdue: true,
                dedupe_id: t.id.clone(),
                payload: serde_json::json!({
                    "type": "reply_overdue",
                    "urgency": "today",
                    "subject": t.subject,
                    "thread_id": t.id,
                    "conversation_id": t.conversation_id,
                    "days_waiting": days_waiting,
                    "summary": t.summary.unwrap_or_default(),
                }),
            }
        })
        .collect())
}

async fn overdue_commitment_nudges(now: i64) -> InboxResult<Vec<Nudge>> {
    let open = commitments::open_commitments().await?;
    Ok(open
        .into_iter()
        .filter(|c| c.due_by.is_some_and(|d| d < now))
        .take(5)
        .map(|c| Nudge {
            nudge_type: "commitment_overdue",
            wm_type: "commitment",
            urgency: "immediate".to_string(),
            is_overdue: true,
            dedupe_id: c.id.clone(),
            payload: serde_json::json!({
                "type": "commitment_overdue",
                "urgency": "immediate",
                "commitment_id": c.id,
                "description": c.description,
                "to_whom": c.to_whom,
                "due_by": c.due_by,
            }),
        })
        .collect())
}

async fn stale_urgent_thread_nudges(now: i64) -> InboxResult<Vec<Nudge>> {
    let cutoff = now - 24 * 60 * 60;
    let threads = threads::stale_urgent_candidates(cutoff, 3).await?;
    Ok(threads
        .into_iter()
        .map(|t| Nudge {
            nudge_type: "urgent_thread_stale",
            wm_type: "thread",
            urgency: t.urgency.as_str().to_string(),
            is_overdue: false,
            dedupe_id: t.id.clone(),
            payload: serde_json::json!({
                "type": "urgent_thread_stale",
                "urgency": t.urgency.as_str(),
                "thread_id": t.id,
                "subject": t.subject,
            }),
        })
        .collect())
}

async fn pending_decision_nudges(now: i64) -> InboxResult<Vec<Nudge>> {
    let cutoff = now - SETTINGS.wm_decision_nudge_days * SECS_PER_DAY;
    let decisions = commitments::stale_unresolved_decisions(cutoff, 3).await?;
    Ok(decisions
        .into_iter()
        .map(|d| Nudge {
            nudge_type: "decision_pending",
            wm_type: "decision",
            urgency: "today".to_string(),
            is_overdue: false,
            dedupe_id: d.id.clone(),
            payload: serde_json::json!({
                "type": "decision_pending",
                "urgency": "today",
                "decision_id": d.id,
                "question": d.question,
                "requester": d.requester,
            }),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_threads_are_marked_and_counted() {
        let conv = "wm-engine-test-stale";
        threads::upsert(threads::Thread {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conv.to_string(),
            subject: Some("old thread".to_string()),
            participants: vec![],
            status: ThreadStatus::Active,
            urgency: Urgency::Someday,
            started_at: Some(1),
            last_activity_at: Some(1),
            message_count: 1,
            user_is_cc: false,
            needs_reply: false,
            reply_deadline: None,
            labels: vec![],
            project_refs: vec![],
            latest_message_id: None,
            latest_web_link: None,
            summary: None,
            key_points: vec![],
            pending_questions: vec![],
            updated_at: Some(1),
        })
        .await
        .unwrap();

        let very_future = 1 + SETTINGS.wm_stale_threshold_days * SECS_PER_DAY + SECS_PER_DAY;
        let marked = mark_stale_threads(very_future).await.unwrap();
        assert!(marked >= 1);

        let reloaded = threads::get_by_conversation(conv.to_string()).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ThreadStatus::Stale);
    }
}
