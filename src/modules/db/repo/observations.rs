use rusqlite::{params, Row};
use uuid::Uuid;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// §3 `Observation` — a freeform fact surfaced from a message, pruned
/// by the WM maintenance engine once past its retention window
/// (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct Observation {
    pub id: String,
    pub observation_type: String,
    pub content: Option<String>,
    pub source_message_id: Option<String>,
    pub confidence: Option<f64>,
    pub observed_at: Option<i64>,
    pub updated_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get("id")?,
        observation_type: row.get("observation_type")?,
        content: row.get("content")?,
        source_message_id: row.get("source_message_id")?,
        confidence: row.get("confidence")?,
        observed_at: row.get("observed_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn insert(mut obs: Observation) -> InboxResult<Observation> {
    if obs.id.is_empty() {
        obs.id = Uuid::new_v4().to_string();
    }
    let created = obs.clone();
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO observations (
                    id, observation_type, content, source_message_id, confidence,
                    observed_at, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    obs.id,
                    obs.observation_type,
                    obs.content,
                    obs.source_message_id,
                    obs.confidence,
                    obs.observed_at,
                    obs.updated_at,
                ],
            )?;
            Ok(())
        })
        .await?;
    Ok(created)
}

pub async fn older_than(cutoff_ms: i64) -> InboxResult<Vec<Observation>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM observations WHERE observed_at < ?1 ORDER BY observed_at ASC")?;
            let rows = stmt
                .query_map(params![cutoff_ms], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn delete(id: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute("DELETE FROM observations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prunes_only_observations_older_than_cutoff() {
        insert(Observation {
            id: String::new(),
            observation_type: "preference".to_string(),
            content: Some("prefers async updates".to_string()),
            source_message_id: None,
            confidence: Some(0.7),
            observed_at: Some(100),
            updated_at: Some(100),
        })
        .await
        .unwrap();
        let recent = insert(Observation {
            id: String::new(),
            observation_type: "preference".to_string(),
            content: Some("recent".to_string()),
            source_message_id: None,
            confidence: Some(0.7),
            observed_at: Some(1_000_000),
            updated_at: Some(1_000_000),
        })
        .await
        .unwrap();

        let stale = older_than(500).await.unwrap();
        assert!(stale.iter().all(|o| o.id != recent.id));
        for o in stale {
            delete(o.id).await.unwrap();
        }
    }
}
