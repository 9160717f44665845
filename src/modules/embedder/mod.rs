use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::modules::chunker::VirtualEmailMeta;
use crate::modules::db::repo::attachments;
use crate::modules::db::repo::chunks;
use crate::modules::db::repo::messages;
use crate::modules::embedding::EmbeddingModel;
use crate::modules::error::InboxResult;
use crate::modules::settings::cli::SETTINGS;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbeddingReport {
    pub processed: usize,
    pub failed: usize,
    pub total_pending: usize,
}

/// Enriches chunk content with searchable context before encoding
/// (spec.md §4.5: "joins context ... and prepends it to the chunk text
/// before encoding"). Grounded on
/// `original_source/src/embeddings.py::prepare_email_text_for_embedding`
/// / `prepare_attachment_text_for_embedding`.
async fn build_context_prefix(chunk: &chunks::Chunk) -> InboxResult<String> {
    let mut parts = Vec::new();
    match chunk.source_type.as_str() {
        "email" => {
            if let Some(msg) = messages::get(chunk.source_id.clone()).await? {
                if let Some(subject) = &msg.subject {
                    parts.push(format!("Subject: {subject}"));
                }
                if let Some(sender) = &msg.sender {
                    parts.push(format!("From: {}", display_name(sender)));
                }
                if let Some(received_at) = msg.received_at {
                    parts.push(format!("Date: {}", chrono::DateTime::from_timestamp_millis(received_at).map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()));
                }
            }
        }
        "attachment" => {
            if let Some(att) = attachments::get(chunk.source_id.clone()).await? {
                if let Some(filename) = &att.filename {
                    parts.push(format!("Attachment: {filename}"));
                }
                if let Some(msg) = messages::get(att.email_id.clone()).await? {
                    if let Some(subject) = &msg.subject {
                        parts.push(format!("From email: {subject}"));
                    }
                    if let Some(sender) = &msg.sender {
                        parts.push(format!("Sender: {}", display_name(sender)));
                    }
                }
            }
        }
        "virtual_email" => {
            if let Some(meta_json) = &chunk.metadata_json {
                if let Ok(meta) = serde_json::from_str::<VirtualEmailMeta>(meta_json) {
                    parts.push(format!("Subject: {}", meta.extracted_subject));
                    parts.push(format!("From: {}", display_name(&meta.extracted_sender)));
                    parts.push(format!("Date: {}", meta.extracted_date));
                }
            }
        }
        _ => {}
    }

    if !parts.is_empty() {
        parts.push(String::new());
    }
    parts.push(chunk.content.clone());
    Ok(parts.join("\n"))
}

fn display_name(sender: &str) -> String {
    sender
        .split('<')
        .next()
        .unwrap_or(sender)
        .trim()
        .to_string()
}

/// Drains the embedding backlog in batches of `SETTINGS.embedding_batch_size`,
/// invoking `progress` after each batch (spec.md §4.5).
pub async fn embed_pending_chunks(
    model: &dyn EmbeddingModel,
    limit: i64,
    mut progress: impl FnMut(usize, usize),
) -> InboxResult<EmbeddingReport> {
    let pending = chunks::pending_embedding(limit).await?;
    let total_to_process = pending.len();
    if total_to_process == 0 {
        return Ok(EmbeddingReport::default());
    }

    let batch_size = SETTINGS.embedding_batch_size.max(1);
    let mut processed = 0usize;
    let mut failed = 0usize;

    for batch in pending.chunks(batch_size) {
        let mut texts = Vec::with_capacity(batch.len());
        for chunk in batch {
            texts.push(build_context_prefix(chunk).await?);
        }

        match model.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (chunk, vector) in batch.iter().zip(vectors) {
                    if let Err(e) = chunks::set_embedding(chunk.id.clone(), vector).await {
                        error!(chunk_id = %chunk.id, error = %e, "failed to persist embedding");
                        failed += 1;
                    } else {
                        processed += 1;
                    }
                }
            }
            Ok(_) => {
                error!("embedding model returned a vector count mismatched with the batch size");
                failed += batch.len();
            }
            Err(e) => {
                error!(error = %e, "batch embedding failed");
                failed += batch.len();
            }
        }

        progress(processed + failed, total_to_process);
    }

    info!(processed, failed, "embedding pass complete");
    Ok(EmbeddingReport {
        processed,
        failed,
        total_pending: total_to_process.saturating_sub(processed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_angle_bracket_address() {
        assert_eq!(display_name("Alice Smith <alice@example.com>"), "Alice Smith");
        assert_eq!(display_name("alice@example.com"), "alice@example.com");
    }
}
