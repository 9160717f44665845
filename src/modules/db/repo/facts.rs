use rusqlite::{params, Row};
use uuid::Uuid;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;
use crate::modules::facts::{ExtractedFact, FactType};

/// §3 `Fact`: a flat, polymorphic store for anything the facts
/// extractor pulls out of an email or attachment (spec.md §3, §6
/// `extract_facts`). `source_type` is `"email"` or `"attachment"`.
#[derive(Debug, Clone)]
pub struct Fact {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub fact_type: FactType,
    pub fact_value: Option<String>,
    pub context: Option<String>,
    pub confidence: Option<f64>,
    pub entity_normalized: Option<String>,
    pub due_date: Option<i64>,
    pub status: String,
    pub created_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Fact> {
    let fact_type: String = row.get("fact_type")?;
    Ok(Fact {
        id: row.get("id")?,
        source_type: row.get("source_type")?,
        source_id: row.get("source_id")?,
        fact_type: FactType::parse(&fact_type),
        fact_value: row.get("fact_value")?,
        context: row.get("context")?,
        confidence: row.get("confidence")?,
        entity_normalized: row.get("entity_normalized")?,
        due_date: row.get("due_date")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
    })
}

pub async fn insert(mut fact: Fact) -> InboxResult<Fact> {
    if fact.id.is_empty() {
        fact.id = Uuid::new_v4().to_string();
    }
    let created = fact.clone();
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO facts (
                    id, source_type, source_id, fact_type, fact_value, context,
                    confidence, entity_normalized, due_date, status, created_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    fact.id,
                    fact.source_type,
                    fact.source_id,
                    fact.fact_type.as_str(),
                    fact.fact_value,
                    fact.context,
                    fact.confidence,
                    fact.entity_normalized,
                    fact.due_date,
                    fact.status,
                    fact.created_at,
                ],
            )?;
            Ok(())
        })
        .await?;
    Ok(created)
}

/// Persists one extraction batch in a single connection checkout.
/// Grounded on `original_source/src/facts.py::FactsExtractor.store_facts`.
pub async fn store_batch(
    source_type: String,
    source_id: String,
    facts: Vec<ExtractedFact>,
    created_at: i64,
) -> InboxResult<usize> {
    let mut stored = 0;
    for extracted in facts {
        insert(Fact {
            id: String::new(),
            source_type: source_type.clone(),
            source_id: source_id.clone(),
            fact_type: extracted.fact_type,
            fact_value: Some(extracted.fact_value),
            context: Some(extracted.context),
            confidence: Some(extracted.confidence),
            entity_normalized: extracted.entity_normalized,
            due_date: extracted.due_date,
            status: "active".to_string(),
            created_at: Some(created_at),
        })
        .await?;
        stored += 1;
    }
    Ok(stored)
}

pub async fn for_source(source_type: String, source_id: String) -> InboxResult<Vec<Fact>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM facts WHERE source_type = ?1 AND source_id = ?2 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![source_type, source_id], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Pending decisions/commitments/action-items, due-soonest first, per
/// `original_source/src/facts.py::get_pending_action_items`.
pub async fn pending_action_items(limit: i64) -> InboxResult<Vec<Fact>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM facts
                 WHERE fact_type IN ('decision','commitment','action_item') AND status = 'active'
                 ORDER BY (due_date IS NULL), due_date ASC, created_at DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn resolve(id: String) -> InboxResult<bool> {
    DATABASE
        .with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE facts SET status = 'resolved' WHERE id = ?1 AND status = 'active'",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_batch_persists_every_extracted_fact() {
        let stored = store_batch(
            "email".to_string(),
            "facts-test-msg-1".to_string(),
            vec![
                ExtractedFact {
                    fact_type: FactType::Amount,
                    fact_value: "1234.56".to_string(),
                    context: "Invoice total".to_string(),
                    confidence: 0.9,
                    entity_normalized: None,
                    due_date: None,
                },
                ExtractedFact {
                    fact_type: FactType::Deadline,
                    fact_value: "2026-08-01".to_string(),
                    context: "Payment due".to_string(),
                    confidence: 0.8,
                    entity_normalized: Some("2026-08-01".to_string()),
                    due_date: Some(1_785_000_000),
                },
            ],
            100,
        )
        .await
        .unwrap();
        assert_eq!(stored, 2);

        let loaded = for_source("email".to_string(), "facts-test-msg-1".to_string()).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|f| f.fact_type == FactType::Amount));
    }

    #[tokio::test]
    async fn resolve_flips_status_exactly_once() {
        let fact = insert(Fact {
            id: String::new(),
            source_type: "email".to_string(),
            source_id: "facts-test-msg-2".to_string(),
            fact_type: FactType::Commitment,
            fact_value: Some("send the report".to_string()),
            context: Some("I'll send it Friday".to_string()),
            confidence: Some(0.85),
            entity_normalized: None,
            due_date: Some(200),
            status: "active".to_string(),
            created_at: Some(100),
        })
        .await
        .unwrap();

        assert!(resolve(fact.id.clone()).await.unwrap());
        assert!(!resolve(fact.id).await.unwrap());
    }
}
