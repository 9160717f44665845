//! Query-side library surface for the chunk index (spec.md §4.6). No
//! query-input channel is wired to it in this process — spec.md's
//! Non-goals exclude a webhook/admin surface, so these functions exist
//! for an external caller to invoke directly rather than being driven
//! by a periodic task.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::modules::db::repo::attachments;
use crate::modules::db::repo::chunks::{self, Chunk};
use crate::modules::db::repo::messages;
use crate::modules::embedding::EmbeddingModel;
use crate::modules::error::InboxResult;
use crate::modules::utils::cosine_similarity;

/// RRF constant; higher weights later ranks more (spec.md §4.6).
const RRF_K: f64 = 60.0;
const DEFAULT_MIN_SCORE: f32 = 0.25;
const CONTENT_PREVIEW_LEN: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub source_type: String,
    pub source_id: String,
    pub content_preview: String,
    pub score: f64,
    pub fts_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    pub source_details: serde_json::Value,
}

fn preview(content: &str) -> String {
    content.chars().take(CONTENT_PREVIEW_LEN).collect()
}

fn to_result(chunk: &Chunk, score: f64, fts_rank: Option<usize>, vector_rank: Option<usize>) -> SearchResult {
    SearchResult {
        chunk_id: chunk.id.clone(),
        source_type: chunk.source_type.clone(),
        source_id: chunk.source_id.clone(),
        content_preview: preview(&chunk.content),
        score,
        fts_rank,
        vector_rank,
        metadata: chunk
            .metadata_json
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok()),
    }
}

/// BM25-ordered lexical search; ranks are positive integers starting at
/// 1 (spec.md §4.6). `bm25()` returns negative scores in SQLite's FTS5,
/// so the magnitude is reported as the result score.
pub async fn fts(query: String, limit: i64) -> InboxResult<Vec<SearchResult>> {
    let rows = chunks::fts_search(query, limit).await?;
    let mut results = Vec::with_capacity(rows.len());
    for (rank, (chunk_id, bm25_rank)) in rows.into_iter().enumerate() {
        let Some(chunk) = chunks::get(chunk_id).await? else {
            continue;
        };
        results.push(to_result(&chunk, bm25_rank.abs(), Some(rank + 1), None));
    }
    Ok(results)
}

/// Cosine-ranked semantic search over embedded chunks, filtering below
/// `min_score` (spec.md §4.6).
pub async fn vector(
    embedder: &dyn EmbeddingModel,
    query: String,
    limit: i64,
    min_score: Option<f32>,
) -> InboxResult<Vec<SearchResult>> {
    let min_score = min_score.unwrap_or(DEFAULT_MIN_SCORE);
    let query_embedding = embedder
        .embed_batch(&[query])
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

    let candidates = chunks::all_embedded().await?;
    let mut scored: Vec<(Chunk, f32)> = candidates
        .into_iter()
        .filter_map(|c| {
            let score = cosine_similarity(&query_embedding, c.embedding.as_deref().unwrap_or(&[]));
            (score >= min_score).then_some((c, score))
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(limit.max(0) as usize)
        .enumerate()
        .map(|(rank, (chunk, score))| to_result(&chunk, score as f64, None, Some(rank + 1)))
        .collect())
}

/// Reciprocal Rank Fusion over the two result lists (spec.md §4.6):
/// `score = Σ 1/(k + rank)` across each list the chunk appears in.
/// Ties are broken by insertion order (FTS results inserted first).
fn rrf_merge(fts_results: Vec<SearchResult>, vector_results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut merged: HashMap<String, SearchResult> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for r in fts_results {
        let rank = r.fts_rank.unwrap_or(1);
        let entry = merged.entry(r.chunk_id.clone()).or_insert_with(|| {
            order.push(r.chunk_id.clone());
            SearchResult { score: 0.0, ..r.clone() }
        });
        entry.fts_rank = Some(rank);
        entry.score += 1.0 / (RRF_K + rank as f64);
    }

    for r in vector_results {
        let rank = r.vector_rank.unwrap_or(1);
        let entry = merged.entry(r.chunk_id.clone()).or_insert_with(|| {
            order.push(r.chunk_id.clone());
            SearchResult { score: 0.0, ..r.clone() }
        });
        entry.vector_rank = Some(rank);
        entry.score += 1.0 / (RRF_K + rank as f64);
    }

    let mut results: Vec<SearchResult> = order.into_iter().filter_map(|id| merged.remove(&id)).collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Hybrid mode: gathers `2*limit` from each leg, fuses with RRF, and
/// truncates to `limit` (spec.md §4.6).
pub async fn hybrid(
    embedder: &dyn EmbeddingModel,
    query: String,
    limit: i64,
) -> InboxResult<Vec<SearchResult>> {
    let oversample = limit.saturating_mul(2);
    let fts_results = fts(query.clone(), oversample).await?;
    let vector_results = vector(embedder, query, oversample, None).await?;
    let merged = rrf_merge(fts_results, vector_results);
    Ok(merged.into_iter().take(limit.max(0) as usize).collect())
}

/// Enriches results with source details: email metadata for
/// email/virtual_email chunks, filename + parent email for attachment
/// chunks (spec.md §4.6).
pub async fn enrich(results: Vec<SearchResult>) -> InboxResult<Vec<EnrichedResult>> {
    let mut enriched = Vec::with_capacity(results.len());
    for result in results {
        let details = match result.source_type.as_str() {
            "email" | "virtual_email" => {
                if let Some(msg) = messages::get(result.source_id.clone()).await? {
                    serde_json::json!({
                        "email_subject": msg.subject,
                        "email_sender": msg.sender,
                        "email_date": msg.received_at,
                        "conversation_id": msg.conversation_id,
                    })
                } else {
                    serde_json::Value::Null
                }
            }
            "attachment" => {
                if let Some(att) = attachments::get(result.source_id.clone()).await? {
                    let parent = messages::get(att.email_id.clone()).await?;
                    serde_json::json!({
                        "filename": att.filename,
                        "content_type": att.content_type,
                        "email_subject": parent.as_ref().and_then(|m| m.subject.clone()),
                        "email_sender": parent.as_ref().and_then(|m| m.sender.clone()),
                    })
                } else {
                    serde_json::Value::Null
                }
            }
            _ => serde_json::Value::Null,
        };
        enriched.push(EnrichedResult { result, source_details: details });
    }
    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, fts_rank: Option<usize>, vector_rank: Option<usize>) -> SearchResult {
        SearchResult {
            chunk_id: id.to_string(),
            source_type: "email".to_string(),
            source_id: "msg-1".to_string(),
            content_preview: "preview".to_string(),
            score: 0.0,
            fts_rank,
            vector_rank,
            metadata: None,
        }
    }

    #[test]
    fn rrf_favors_chunks_ranked_well_in_both_lists() {
        let fts_results = vec![result("a", Some(1), None), result("b", Some(2), None)];
        let vector_results = vec![result("b", None, Some(1)), result("a", None, Some(3))];

        let merged = rrf_merge(fts_results, vector_results);
        assert_eq!(merged[0].chunk_id, "b");
        let b = merged.iter().find(|r| r.chunk_id == "b").unwrap();
        assert!((b.score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-9);
    }

    #[test]
    fn rrf_keeps_fts_only_and_vector_only_chunks() {
        let fts_results = vec![result("fts-only", Some(1), None)];
        let vector_results = vec![result("vec-only", None, Some(1))];

        let merged = rrf_merge(fts_results, vector_results);
        let ids: Vec<_> = merged.iter().map(|r| r.chunk_id.as_str()).collect();
        assert!(ids.contains(&"fts-only"));
        assert!(ids.contains(&"vec-only"));
    }
}
