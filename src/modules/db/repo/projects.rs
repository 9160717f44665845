use rusqlite::{params, OptionalExtension, Row};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// §3 `Project` working-memory entity. `related_threads` is capped at
/// 20 entries (spec.md §4.8, oldest dropped first).
const MAX_RELATED_THREADS: usize = 20;

#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub related_threads: Vec<String>,
    pub confidence: f64,
    pub first_mentioned_at: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub updated_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Project> {
    let related: String = row.get("related_threads_json")?;
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        related_threads: serde_json::from_str(&related).unwrap_or_default(),
        confidence: row.get("confidence")?,
        first_mentioned_at: row.get("first_mentioned_at")?,
        last_activity_at: row.get("last_activity_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn get_by_name(name: String) -> InboxResult<Option<Project>> {
    let name_lower = name.to_lowercase();
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM projects WHERE name_lower = ?1",
                    params![name_lower],
                    from_row,
                )
                .optional()?)
        })
        .await
}

/// Links a thread to a project, creating the project on first mention
/// and nudging confidence upward per reference (spec.md §4.8: repeated
/// mentions raise confidence, capped at 1.0).
pub async fn mention(name: String, thread_id: String, at: i64, confidence_step: f64) -> InboxResult<()> {
    let name_lower = name.to_lowercase();
    DATABASE
        .with_conn(move |conn| {
            let existing: Option<(String, String, f64)> = conn
                .query_row(
                    "SELECT id, related_threads_json, confidence FROM projects WHERE name_lower = ?1",
                    params![name_lower],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            match existing {
                Some((id, related_json, confidence)) => {
                    let mut related: Vec<String> = serde_json::from_str(&related_json).unwrap_or_default();
                    if !related.contains(&thread_id) {
                        related.push(thread_id);
                        if related.len() > MAX_RELATED_THREADS {
                            related.remove(0);
                        }
                    }
                    let new_confidence = (confidence + confidence_step).min(1.0);
                    conn.execute(
                        "UPDATE projects SET related_threads_json = ?2, confidence = ?3,
                         last_activity_at = ?4, updated_at = ?4 WHERE id = ?1",
                        params![id, serde_json::to_string(&related)?, new_confidence, at],
                    )?;
                }
                None => {
                    let initial_confidence: f64 = (0.3 + confidence_step).min(1.0);
                    conn.execute(
                        "INSERT INTO projects (
                            id, name, name_lower, related_threads_json, confidence,
                            first_mentioned_at, last_activity_at, updated_at
                        ) VALUES (?1,?2,?3,?4,?5,?6,?6,?6)",
                        params![
                            uuid::Uuid::new_v4().to_string(),
                            name,
                            name_lower,
                            serde_json::to_string(&[thread_id])?,
                            initial_confidence,
                            at,
                        ],
                    )?;
                }
            }
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mention_creates_then_raises_confidence_and_caps_threads() {
        let name = "Project Repo Test Alpha".to_string();
        mention(name.clone(), "thread-1".to_string(), 1, 0.1).await.unwrap();
        let first = get_by_name(name.clone()).await.unwrap().unwrap();
        assert_eq!(first.confidence, 0.4);

        for i in 2..30 {
            mention(name.clone(), format!("thread-{i}"), i as i64, 0.1).await.unwrap();
        }
        let grown = get_by_name(name).await.unwrap().unwrap();
        assert!(grown.related_threads.len() <= 20);
        assert_eq!(grown.confidence, 1.0);
    }
}
