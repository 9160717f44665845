use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::modules::db::manager::DATABASE;
use crate::modules::db::repo::threads::Urgency;
use crate::modules::error::InboxResult;

/// §3 `PendingDecision` entity.
#[derive(Debug, Clone)]
pub struct PendingDecision {
    pub id: String,
    pub question: Option<String>,
    pub context: Option<String>,
    pub options: Vec<String>,
    pub source: Option<String>,
    pub requester: Option<String>,
    pub urgency: Urgency,
    pub deadline: Option<i64>,
    pub is_resolved: bool,
    pub updated_at: Option<i64>,
}

fn decision_from_row(row: &Row) -> rusqlite::Result<PendingDecision> {
    let options: String = row.get("options_json")?;
    let urgency: String = row.get("urgency")?;
    Ok(PendingDecision {
        id: row.get("id")?,
        question: row.get("question")?,
        context: row.get("context")?,
        options: serde_json::from_str(&options).unwrap_or_default(),
        source: row.get("source")?,
        requester: row.get("requester")?,
        urgency: Urgency::parse(&urgency),
        deadline: row.get("deadline")?,
        is_resolved: row.get::<_, i64>("is_resolved")? != 0,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn insert_decision(mut d: PendingDecision) -> InboxResult<PendingDecision> {
    if d.id.is_empty() {
        d.id = Uuid::new_v4().to_string();
    }
    let created = d.clone();
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO pending_decisions (
                    id, question, context, options_json, source, requester,
                    urgency, deadline, is_resolved, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    d.id,
                    d.question,
                    d.context,
                    serde_json::to_string(&d.options)?,
                    d.source,
                    d.requester,
                    d.urgency.as_str(),
                    d.deadline,
                    d.is_resolved as i64,
                    d.updated_at,
                ],
            )?;
            Ok(())
        })
        .await?;
    Ok(created)
}

pub async fn unresolved_decisions() -> InboxResult<Vec<PendingDecision>> {
    DATABASE
        .with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM pending_decisions WHERE is_resolved = 0
                 ORDER BY CASE urgency WHEN 'immediate' THEN 0 WHEN 'today' THEN 1 WHEN 'this_week' THEN 2 ELSE 3 END",
            )?;
            let rows = stmt.query_map([], decision_from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Unresolved decisions still at `this_week`/`someday` urgency, created
/// (via `updated_at`, set at insert time and untouched until resolution
/// or escalation) before `cutoff_ms` — the WM maintenance engine's
/// decision-escalation step (spec.md §4.9).
pub async fn escalatable_decisions(cutoff_ms: i64) -> InboxResult<Vec<PendingDecision>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM pending_decisions
                 WHERE is_resolved = 0
                   AND urgency IN ('this_week', 'someday')
                   AND updated_at < ?1",
            )?;
            let rows = stmt
                .query_map(params![cutoff_ms], decision_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Unresolved decisions older (by `updated_at`) than `cutoff_ms`,
/// limited — the "decision pending" nudge (spec.md §4.9).
pub async fn stale_unresolved_decisions(cutoff_ms: i64, limit: i64) -> InboxResult<Vec<PendingDecision>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM pending_decisions
                 WHERE is_resolved = 0 AND updated_at < ?1
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cutoff_ms, limit], decision_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn resolve_decision(id: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE pending_decisions SET is_resolved = 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
}

pub async fn escalate_decision_urgency(id: String, urgency: Urgency) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE pending_decisions SET urgency = ?2 WHERE id = ?1",
                params![id, urgency.as_str()],
            )?;
            Ok(())
        })
        .await
}

/// §3 `Commitment` entity.
#[derive(Debug, Clone)]
pub struct Commitment {
    pub id: String,
    pub description: Option<String>,
    pub to_whom: Option<String>,
    pub source: Option<String>,
    pub committed_at: Option<i64>,
    pub due_by: Option<i64>,
    pub is_completed: bool,
    pub updated_at: Option<i64>,
}

fn commitment_from_row(row: &Row) -> rusqlite::Result<Commitment> {
    Ok(Commitment {
        id: row.get("id")?,
        description: row.get("description")?,
        to_whom: row.get("to_whom")?,
        source: row.get("source")?,
        committed_at: row.get("committed_at")?,
        due_by: row.get("due_by")?,
        is_completed: row.get::<_, i64>("is_completed")? != 0,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn insert_commitment(mut c: Commitment) -> InboxResult<Commitment> {
    if c.id.is_empty() {
        c.id = Uuid::new_v4().to_string();
    }
    let created = c.clone();
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO commitments (
                    id, description, to_whom, source, committed_at, due_by,
                    is_completed, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                params![
                    c.id,
                    c.description,
                    c.to_whom,
                    c.source,
                    c.committed_at,
                    c.due_by,
                    c.is_completed as i64,
                    c.updated_at,
                ],
            )?;
            Ok(())
        })
        .await?;
    Ok(created)
}

pub async fn open_commitments() -> InboxResult<Vec<Commitment>> {
    DATABASE
        .with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM commitments WHERE is_completed = 0 ORDER BY due_by ASC")?;
            let rows = stmt
                .query_map([], commitment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn get_commitment(id: String) -> InboxResult<Option<Commitment>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM commitments WHERE id = ?1",
                    params![id],
                    commitment_from_row,
                )
                .optional()?)
        })
        .await
}

pub async fn complete_commitment(id: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute("UPDATE commitments SET is_completed = 1 WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolved_decisions_drop_from_unresolved_listing() {
        let d = insert_decision(PendingDecision {
            id: String::new(),
            question: Some("Which vendor?".to_string()),
            context: None,
            options: vec!["A".to_string(), "B".to_string()],
            source: None,
            requester: None,
            urgency: Urgency::ThisWeek,
            deadline: Some(1000),
            is_resolved: false,
            updated_at: Some(1),
        })
        .await
        .unwrap();

        resolve_decision(d.id.clone()).await.unwrap();
        let remaining = unresolved_decisions().await.unwrap();
        assert!(remaining.iter().all(|r| r.id != d.id));
    }

    #[tokio::test]
    async fn completed_commitments_drop_from_open_listing() {
        let c = insert_commitment(Commitment {
            id: String::new(),
            description: Some("send the report".to_string()),
            to_whom: Some("boss@example.com".to_string()),
            source: None,
            committed_at: Some(1),
            due_by: Some(1000),
            is_completed: false,
            updated_at: Some(1),
        })
        .await
        .unwrap();

        complete_commitment(c.id.clone()).await.unwrap();
        let remaining = open_commitments().await.unwrap();
        assert!(remaining.iter().all(|r| r.id != c.id));
    }
}
