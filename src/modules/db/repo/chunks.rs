use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;
use crate::modules::utils::{pack_embedding, unpack_embedding};

/// §3 `Chunk` entity. `source_type` is `"email"`, `"virtual_email"`, or
/// `"attachment"`; `source_id` points at the owning row (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub char_offset_start: Option<i64>,
    pub char_offset_end: Option<i64>,
    pub metadata_json: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Chunk> {
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
    Ok(Chunk {
        id: row.get("id")?,
        source_type: row.get("source_type")?,
        source_id: row.get("source_id")?,
        chunk_index: row.get("chunk_index")?,
        content: row.get("content")?,
        char_offset_start: row.get("char_offset_start")?,
        char_offset_end: row.get("char_offset_end")?,
        metadata_json: row.get("metadata_json")?,
        embedding: embedding_blob.map(|b| unpack_embedding(&b)),
        created_at: row.get("created_at")?,
    })
}

/// Insert-or-replace keyed on `(source_type, source_id, chunk_index)`,
/// per spec.md §4.4 ("re-chunking a message replaces its prior chunk
/// set deterministically by index").
pub async fn upsert(chunk: Chunk) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            let embedding_blob = chunk.embedding.as_deref().map(pack_embedding);
            conn.execute(
                "INSERT INTO chunks (
                    id, source_type, source_id, chunk_index, content,
                    char_offset_start, char_offset_end, metadata_json, embedding, created_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                ON CONFLICT(source_type, source_id, chunk_index) DO UPDATE SET
                    id=excluded.id,
                    content=excluded.content,
                    char_offset_start=excluded.char_offset_start,
                    char_offset_end=excluded.char_offset_end,
                    metadata_json=excluded.metadata_json,
                    embedding=excluded.embedding,
                    created_at=excluded.created_at",
                params![
                    chunk.id,
                    chunk.source_type,
                    chunk.source_id,
                    chunk.chunk_index,
                    chunk.content,
                    chunk.char_offset_start,
                    chunk.char_offset_end,
                    chunk.metadata_json,
                    embedding_blob,
                    chunk.created_at,
                ],
            )?;
            Ok(())
        })
        .await
}

pub async fn get(id: String) -> InboxResult<Option<Chunk>> {
    DATABASE
        .with_conn(move |conn| {
            use rusqlite::OptionalExtension;
            Ok(conn
                .query_row("SELECT * FROM chunks WHERE id = ?1", params![id], from_row)
                .optional()?)
        })
        .await
}

pub async fn delete_for_source(source_type: String, source_id: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "DELETE FROM chunks WHERE source_type = ?1 AND source_id = ?2",
                params![source_type, source_id],
            )?;
            Ok(())
        })
        .await
}

pub async fn pending_embedding(limit: i64) -> InboxResult<Vec<Chunk>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM chunks WHERE embedding IS NULL ORDER BY created_at ASC LIMIT ?1")?;
            let rows = stmt
                .query_map(params![limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn set_embedding(id: String, embedding: Vec<f32>) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE chunks SET embedding = ?2 WHERE id = ?1",
                params![id, pack_embedding(&embedding)],
            )?;
            Ok(())
        })
        .await
}

pub async fn all_embedded() -> InboxResult<Vec<Chunk>> {
    DATABASE
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM chunks WHERE embedding IS NOT NULL")?;
            let rows = stmt.query_map([], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// FTS5 BM25 search over chunk content, the lexical leg of the hybrid
/// searcher (spec.md §4.6).
pub async fn fts_search(query: String, limit: i64) -> InboxResult<Vec<(String, f64)>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, bm25(chunks_fts) AS rank FROM chunks_fts
                 WHERE chunks_fts MATCH ?1 ORDER BY rank LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![query, limit], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_fetch_embedding_roundtrips() {
        upsert(Chunk {
            id: "chunk-test-1".to_string(),
            source_type: "email".to_string(),
            source_id: "chunk-test-msg".to_string(),
            chunk_index: 0,
            content: "quarterly budget numbers".to_string(),
            char_offset_start: Some(0),
            char_offset_end: Some(24),
            metadata_json: None,
            embedding: Some(vec![0.1, 0.2, 0.3]),
            created_at: Some(1),
        })
        .await
        .unwrap();

        let pending = pending_embedding(10).await.unwrap();
        assert!(pending.iter().all(|c| c.id != "chunk-test-1"));

        let all = all_embedded().await.unwrap();
        let found = all.iter().find(|c| c.id == "chunk-test-1").unwrap();
        assert_eq!(found.embedding.as_ref().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn re_upsert_same_index_replaces_row() {
        for i in 0..2 {
            upsert(Chunk {
                id: format!("chunk-test-replace-{i}"),
                source_type: "email".to_string(),
                source_id: "chunk-test-replace-msg".to_string(),
                chunk_index: 0,
                content: format!("version {i}"),
                char_offset_start: None,
                char_offset_end: None,
                metadata_json: None,
                embedding: None,
                created_at: Some(i),
            })
            .await
            .unwrap();
        }
        let remaining = DATABASE
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE source_id = 'chunk-test-replace-msg'",
                    [],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
