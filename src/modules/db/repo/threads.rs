use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// spec.md §3: `status ∈ {active, awaiting_reply, awaiting_action,
/// stale, resolved, archived}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    Active,
    AwaitingReply,
    AwaitingAction,
    Stale,
    Resolved,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AwaitingReply => "awaiting_reply",
            Self::AwaitingAction => "awaiting_action",
            Self::Stale => "stale",
            Self::Resolved => "resolved",
            Self::Archived => "archived",
        }
    }
    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_reply" => Self::AwaitingReply,
            "awaiting_action" => Self::AwaitingAction,
            "stale" => Self::Stale,
            "resolved" => Self::Resolved,
            "archived" => Self::Archived,
            _ => Self::Active,
        }
    }
}

/// spec.md §3/§6: `urgency ∈ {immediate, today, this_week, someday}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    Someday,
    ThisWeek,
    Today,
    Immediate,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Someday => "someday",
            Self::ThisWeek => "this_week",
            Self::Today => "today",
            Self::Immediate => "immediate",
        }
    }
    pub fn parse(s: &str) -> Self {
        match s {
            "this_week" => Self::ThisWeek,
            "today" => Self::Today,
            "immediate" => Self::Immediate,
            _ => Self::Someday,
        }
    }
    /// Used by the WM maintenance engine's escalation step (spec.md
    /// §4.9): one step toward `immediate`, never past it.
    pub fn escalate(self) -> Self {
        match self {
            Self::Someday => Self::ThisWeek,
            Self::ThisWeek => Self::Today,
            Self::Today | Self::Immediate => Self::Immediate,
        }
    }
}

/// §3 `Thread` working-memory entity, keyed on the Graph conversation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub conversation_id: String,
    pub subject: Option<String>,
    pub participants: Vec<String>,
    pub status: ThreadStatus,
    pub urgency: Urgency,
    pub started_at: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub message_count: i64,
    pub user_is_cc: bool,
    pub needs_reply: bool,
    pub reply_deadline: Option<i64>,
    pub labels: Vec<String>,
    pub project_refs: Vec<String>,
    pub latest_message_id: Option<String>,
    pub latest_web_link: Option<String>,
    pub summary: Option<String>,
    pub key_points: Vec<String>,
    pub pending_questions: Vec<String>,
    pub updated_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Thread> {
    let participants: String = row.get("participants_json")?;
    let labels: String = row.get("labels_json")?;
    let project_refs: String = row.get("project_refs_json")?;
    let key_points: String = row.get("key_points_json")?;
    let pending_questions: String = row.get("pending_questions_json")?;
    let status: String = row.get("status")?;
    let urgency: String = row.get("urgency")?;
    Ok(Thread {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        subject: row.get("subject")?,
        participants: serde_json::from_str(&participants).unwrap_or_default(),
        status: ThreadStatus::parse(&status),
        urgency: Urgency::parse(&urgency),
        started_at: row.get("started_at")?,
        last_activity_at: row.get("last_activity_at")?,
        message_count: row.get("message_count")?,
        user_is_cc: row.get::<_, i64>("user_is_cc")? != 0,
        needs_reply: row.get::<_, i64>("needs_reply")? != 0,
        reply_deadline: row.get("reply_deadline")?,
        labels: serde_json::from_str(&labels).unwrap_or_default(),
        project_refs: serde_json::from_str(&project_refs).unwrap_or_default(),
        latest_message_id: row.get("latest_message_id")?,
        latest_web_link: row.get("latest_web_link")?,
        summary: row.get("summary")?,
        key_points: serde_json::from_str(&key_points).unwrap_or_default(),
        pending_questions: serde_json::from_str(&pending_questions).unwrap_or_default(),
        updated_at: row.get("updated_at")?,
    })
}

pub async fn get_by_conversation(conversation_id: String) -> InboxResult<Option<Thread>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM threads WHERE conversation_id = ?1",
                    params![conversation_id],
                    from_row,
                )
                .optional()?)
        })
        .await
}

pub async fn upsert(thread: Thread) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO threads (
                    id, conversation_id, subject, participants_json, status, urgency,
                    started_at, last_activity_at, message_count, user_is_cc, needs_reply,
                    reply_deadline, labels_json, project_refs_json, latest_message_id,
                    latest_web_link, summary, key_points_json, pending_questions_json, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)
                ON CONFLICT(conversation_id) DO UPDATE SET
                    subject=excluded.subject,
                    participants_json=excluded.participants_json,
                    status=excluded.status,
                    urgency=excluded.urgency,
                    last_activity_at=excluded.last_activity_at,
                    message_count=excluded.message_count,
                    user_is_cc=excluded.user_is_cc,
                    needs_reply=excluded.needs_reply,
                    reply_deadline=excluded.reply_deadline,
                    labels_json=excluded.labels_json,
                    project_refs_json=excluded.project_refs_json,
                    latest_message_id=excluded.latest_message_id,
                    latest_web_link=excluded.latest_web_link,
                    summary=excluded.summary,
                    key_points_json=excluded.key_points_json,
                    pending_questions_json=excluded.pending_questions_json,
                    updated_at=excluded.updated_at",
                params![
                    thread.id,
                    thread.conversation_id,
                    thread.subject,
                    serde_json::to_string(&thread.participants)?,
                    thread.status.as_str(),
                    thread.urgency.as_str(),
                    thread.started_at,
                    thread.last_activity_at,
                    thread.message_count,
                    thread.user_is_cc as i64,
                    thread.needs_reply as i64,
                    thread.reply_deadline,
                    serde_json::to_string(&thread.labels)?,
                    serde_json::to_string(&thread.project_refs)?,
                    thread.latest_message_id,
                    thread.latest_web_link,
                    thread.summary,
                    serde_json::to_string(&thread.key_points)?,
                    serde_json::to_string(&thread.pending_questions)?,
                    thread.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
}

pub async fn needing_reply() -> InboxResult<Vec<Thread>> {
    DATABASE
        .with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM threads WHERE needs_reply = 1 AND status != 'archived' ORDER BY reply_deadline ASC",
            )?;
            let rows = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn active_since(cutoff_ms: i64) -> InboxResult<Vec<Thread>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM threads WHERE status = 'active' AND last_activity_at < ?1",
            )?;
            let rows = stmt
                .query_map(params![cutoff_ms], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Threads needing a reply whose urgency hasn't yet been escalated and
/// have gone quiet past `cutoff_ms`, per the WM maintenance engine's
/// escalation step (spec.md §4.9).
pub async fn escalation_candidates(cutoff_ms: i64) -> InboxResult<Vec<Thread>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM threads
                 WHERE needs_reply = 1
                   AND status NOT IN ('resolved', 'stale')
                   AND urgency IN ('this_week', 'someday')
                   AND last_activity_at < ?1",
            )?;
            let rows = stmt
                .query_map(params![cutoff_ms], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Threads awaiting a reply, gone quiet past `cutoff_ms`, oldest first
/// (spec.md §4.9 "overdue reply" nudge).
pub async fn overdue_reply_candidates(cutoff_ms: i64, limit: i64) -> InboxResult<Vec<Thread>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM threads
                 WHERE needs_reply = 1
                   AND status NOT IN ('resolved', 'stale')
                   AND last_activity_at < ?1
                 ORDER BY last_activity_at ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cutoff_ms, limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Active threads at urgency today/immediate that have gone quiet past
/// `cutoff_ms` (spec.md §4.9 "urgent thread stale" nudge).
pub async fn stale_urgent_candidates(cutoff_ms: i64, limit: i64) -> InboxResult<Vec<Thread>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM threads
                 WHERE urgency IN ('today', 'immediate')
                   AND status = 'active'
                   AND last_activity_at < ?1
                 ORDER BY last_activity_at ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cutoff_ms, limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn set_status(id: String, status: ThreadStatus) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE threads SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
            Ok(())
        })
        .await
}

pub async fn set_urgency(id: String, urgency: Urgency) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE threads SET urgency = ?2 WHERE id = ?1",
                params![id, urgency.as_str()],
            )?;
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(conv: &str) -> Thread {
        Thread {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conv.to_string(),
            subject: Some("Budget review".to_string()),
            participants: vec!["a@example.com".to_string()],
            status: ThreadStatus::Active,
            urgency: Urgency::Someday,
            started_at: Some(1),
            last_activity_at: Some(1),
            message_count: 1,
            user_is_cc: false,
            needs_reply: true,
            reply_deadline: Some(100),
            labels: vec![],
            project_refs: vec![],
            latest_message_id: None,
            latest_web_link: None,
            summary: None,
            key_points: vec![],
            pending_questions: vec![],
            updated_at: Some(1),
        }
    }

    #[tokio::test]
    async fn upsert_then_escalate_urgency() {
        let conv = "thread-repo-test-1";
        upsert(sample(conv)).await.unwrap();
        let thread = get_by_conversation(conv.to_string()).await.unwrap().unwrap();
        assert_eq!(thread.urgency, Urgency::Someday);

        set_urgency(thread.id.clone(), thread.urgency.escalate()).await.unwrap();
        let reloaded = get_by_conversation(conv.to_string()).await.unwrap().unwrap();
        assert_eq!(reloaded.urgency, Urgency::ThisWeek);
    }

    #[tokio::test]
    async fn needing_reply_excludes_archived() {
        let conv = "thread-repo-test-2";
        let mut t = sample(conv);
        t.needs_reply = true;
        upsert(t).await.unwrap();
        let thread = get_by_conversation(conv.to_string()).await.unwrap().unwrap();
        set_status(thread.id, ThreadStatus::Archived).await.unwrap();

        let results = needing_reply().await.unwrap();
        assert!(results.iter().all(|t| t.conversation_id != conv));
    }
}
