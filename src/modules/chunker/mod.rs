use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::info;

use crate::modules::db::repo::attachments::{self, Attachment};
use crate::modules::db::repo::chunks::{self, Chunk};
use crate::modules::db::repo::messages::{self, Message};
use crate::modules::error::InboxResult;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexingReport {
    pub processed: usize,
    pub chunks_created: usize,
}

/// Content too small to be worth chunking on its own (spec.md §4.4:
/// "only if extracted text length > 2000 characters").
const ATTACHMENT_CHUNK_THRESHOLD: usize = 2000;
const ATTACHMENT_CHUNK_TARGET: usize = 1536;
const ATTACHMENT_CHUNK_OVERLAP: usize = 150;

static REPLY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^On .{0,120} wrote:\s*$").expect("valid regex")
});

static BLOCKQUOTE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*>").expect("valid regex"));

static FORWARD_HEADER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^-{2,}\s*Forwarded [Mm]essage\s*-{2,}\s*$").expect("valid regex")
});

static VIRTUAL_EMAIL_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^From:\s*(?P<from>.+)$\n(?:^.*$\n)*?^Date:\s*(?P<date>.+)$\n(?:^.*$\n)*?^Subject:\s*(?P<subject>.+)$")
        .expect("valid regex")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualEmailMeta {
    pub extracted_sender: String,
    pub extracted_subject: String,
    pub extracted_date: String,
    pub source_email_id: String,
    pub position_in_chain: usize,
}

/// Strips the quoted tail of a reply: everything from the first reply
/// marker, blockquote run, or forwarded-header block onward (spec.md
/// §4.4). If none is found, the body is returned unchanged — it isn't
/// necessarily a reply.
fn strip_quoted_region(body: &str) -> &str {
    let mut cut = body.len();
    if let Some(m) = REPLY_MARKER.find(body) {
        cut = cut.min(m.start());
    }
    if let Some(m) = FORWARD_HEADER_BLOCK.find(body) {
        cut = cut.min(m.start());
    }
    for line in body.lines() {
        if BLOCKQUOTE_LINE.is_match(line) {
            if let Some(offset) = line_offset(body, line) {
                cut = cut.min(offset);
            }
            break;
        }
    }
    &body[..cut]
}

fn line_offset(haystack: &str, line: &str) -> Option<usize> {
    let base = haystack.as_ptr() as usize;
    let line_ptr = line.as_ptr() as usize;
    if line_ptr >= base && line_ptr <= base + haystack.len() {
        Some(line_ptr - base)
    } else {
        None
    }
}

/// Splits a forwarded chain into virtual-email segments, one per
/// embedded `From:/Date:/Subject:` header block (spec.md §4.4).
fn split_forward_chain(body: &str) -> Vec<(VirtualEmailMeta, String)> {
    let matches: Vec<_> = VIRTUAL_EMAIL_HEADER.captures_iter(body).collect();
    let mut segments = Vec::with_capacity(matches.len());
    for (idx, cap) in matches.iter().enumerate() {
        let header_end = cap.get(0).unwrap().end();
        let segment_end = matches.get(idx + 1).map(|n| n.get(0).unwrap().start()).unwrap_or(body.len());
        let content = body[header_end..segment_end].trim().to_string();
        segments.push((
            VirtualEmailMeta {
                extracted_sender: cap.name("from").unwrap().as_str().trim().to_string(),
                extracted_subject: cap.name("subject").unwrap().as_str().trim().to_string(),
                extracted_date: cap.name("date").unwrap().as_str().trim().to_string(),
                source_email_id: String::new(),
                position_in_chain: idx,
            },
            content,
        ));
    }
    segments
}

/// Splits text on blank-line paragraph boundaries into ~`target`-sized
/// chunks with a small trailing overlap carried into the next chunk
/// (spec.md §4.4 attachment chunking).
fn chunk_by_paragraph(text: &str, target: usize, overlap: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect();
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in paragraphs {
        if !current.is_empty() && current.len() + para.len() + 2 > target {
            chunks.push(current.clone());
            let tail_start = current.len().saturating_sub(overlap);
            current = current[tail_start..].to_string();
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() && !text.trim().is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

/// Chunks a single message: the plain body, or virtual-email segments
/// when it is a forward chain.
pub async fn chunk_message(message: &Message) -> InboxResult<usize> {
    let body = message
        .body_markdown
        .as_deref()
        .or(message.body_preview.as_deref())
        .unwrap_or("");
    if body.trim().is_empty() {
        return Ok(0);
    }

    chunks::delete_for_source("email".to_string(), message.id.clone()).await?;

    let forward_segments = split_forward_chain(body);
    if !forward_segments.is_empty() {
        let mut index = 0i64;
        for (mut meta, content) in forward_segments {
            if content.trim().is_empty() {
                continue;
            }
            meta.source_email_id = message.id.clone();
            chunks::upsert(Chunk {
                id: uuid::Uuid::new_v4().to_string(),
                source_type: "virtual_email".to_string(),
                source_id: message.id.clone(),
                chunk_index: index,
                content,
                char_offset_start: None,
                char_offset_end: None,
                metadata_json: Some(serde_json::to_string(&meta)?),
                embedding: None,
                created_at: Some(crate::utc_now!()),
            })
            .await?;
            index += 1;
        }
        return Ok(index as usize);
    }

    let stripped = strip_quoted_region(body);
    if stripped.trim().is_empty() {
        return Ok(0);
    }
    chunks::upsert(Chunk {
        id: uuid::Uuid::new_v4().to_string(),
        source_type: "email".to_string(),
        source_id: message.id.clone(),
        chunk_index: 0,
        content: stripped.trim().to_string(),
        char_offset_start: None,
        char_offset_end: None,
        metadata_json: None,
        embedding: None,
        created_at: Some(crate::utc_now!()),
    })
    .await?;
    Ok(1)
}

/// Chunks an attachment's extracted text, only when long enough to be
/// worth splitting (spec.md §4.4).
pub async fn chunk_attachment(attachment: &Attachment) -> InboxResult<usize> {
    let Some(text) = attachment.extracted_text.as_deref() else {
        return Ok(0);
    };
    if text.trim().is_empty() {
        return Ok(0);
    }

    chunks::delete_for_source("attachment".to_string(), attachment.id.clone()).await?;

    if text.len() <= ATTACHMENT_CHUNK_THRESHOLD {
        return Ok(0);
    }

    let pieces = chunk_by_paragraph(text, ATTACHMENT_CHUNK_TARGET, ATTACHMENT_CHUNK_OVERLAP);
    for (index, piece) in pieces.iter().enumerate() {
        chunks::upsert(Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_type: "attachment".to_string(),
            source_id: attachment.id.clone(),
            chunk_index: index as i64,
            content: piece.clone(),
            char_offset_start: None,
            char_offset_end: None,
            metadata_json: None,
            embedding: None,
            created_at: Some(crate::utc_now!()),
        })
        .await?;
    }
    Ok(pieces.len())
}

/// Step 5 of the pipeline (spec.md §4.4): chunks every message with no
/// existing `chunks` row, bounded by `limit`. Grounded on
/// `original_source/scripts/full_pipeline.py::step_create_chunks`'s
/// `process_unindexed_emails`.
pub async fn process_unindexed_messages(limit: i64) -> InboxResult<IndexingReport> {
    let pending = messages::unchunked(limit).await?;
    let mut report = IndexingReport::default();
    for message in &pending {
        report.chunks_created += chunk_message(message).await?;
        report.processed += 1;
    }
    if report.processed > 0 {
        info!(processed = report.processed, chunks = report.chunks_created, "indexed pending messages");
    }
    Ok(report)
}

/// Step 5 of the pipeline, attachment half: chunks every successfully
/// extracted attachment with no existing `chunks` row. Grounded on
/// `process_unindexed_attachments`.
pub async fn process_unindexed_attachments(limit: i64) -> InboxResult<IndexingReport> {
    let pending = attachments::unchunked(limit).await?;
    let mut report = IndexingReport::default();
    for attachment in &pending {
        report.chunks_created += chunk_attachment(attachment).await?;
        report.processed += 1;
    }
    if report.processed > 0 {
        info!(processed = report.processed, chunks = report.chunks_created, "indexed pending attachments");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_on_wrote_reply_marker() {
        let body = "Sounds good, thanks!\n\nOn Mon, Jan 5, 2026 at 9:00 AM, Alice wrote:\n> original message";
        let stripped = strip_quoted_region(body);
        assert_eq!(stripped.trim(), "Sounds good, thanks!");
    }

    #[test]
    fn strips_blockquote_prefixed_lines() {
        let body = "My reply here.\n\n> quoted line one\n> quoted line two";
        let stripped = strip_quoted_region(body);
        assert_eq!(stripped.trim(), "My reply here.");
    }

    #[test]
    fn leaves_non_reply_body_untouched() {
        let body = "Just a normal standalone message with no quotes.";
        assert_eq!(strip_quoted_region(body), body);
    }

    #[test]
    fn splits_forward_chain_into_ordered_virtual_emails() {
        let body = "From: alice@example.com\nDate: Jan 1, 2026\nSubject: Budget\n\nFirst message body.\n\nFrom: bob@example.com\nDate: Jan 2, 2026\nSubject: Re: Budget\n\nSecond message body.";
        let segments = split_forward_chain(body);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].0.extracted_sender, "alice@example.com");
        assert_eq!(segments[0].0.position_in_chain, 0);
        assert!(segments[0].1.contains("First message body."));
        assert_eq!(segments[1].0.extracted_sender, "bob@example.com");
        assert_eq!(segments[1].0.position_in_chain, 1);
        assert!(segments[1].1.contains("Second message body."));
    }

    #[test]
    fn paragraph_chunking_respects_target_and_overlap() {
        let para = "x".repeat(800);
        let text = vec![para.clone(), para.clone(), para.clone()].join("\n\n");
        let pieces = chunk_by_paragraph(&text, 1536, 150);
        assert!(pieces.len() >= 2);
        for p in &pieces {
            assert!(p.len() <= 1536 + 150 + 4);
        }
    }

    fn sample_message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: None,
            internet_message_id: None,
            subject: Some("Status update".to_string()),
            sender: Some("alice@example.com".to_string()),
            to_emails: vec![],
            cc_emails: vec![],
            received_at: Some(1),
            body_preview: Some("Everything is on track for Friday.".to_string()),
            body_html: None,
            body_markdown: None,
            extracted_signature: None,
            thread_summary: None,
            suggested_action: None,
            has_attachments: false,
            is_read: false,
            folder_id: None,
            etag: None,
            body_hash: None,
            category: None,
            processed_at: None,
            web_link: None,
            synced_at: Some(1),
        }
    }

    #[tokio::test]
    async fn process_unindexed_messages_drains_backlog_exactly_once() {
        let msg = sample_message("chunker-unindexed-test-1");
        messages::upsert(msg.clone()).await.unwrap();

        let report = process_unindexed_messages(1000).await.unwrap();
        assert!(report.processed >= 1);
        assert!(report.chunks_created >= 1);

        let remaining = messages::unchunked(1000).await.unwrap();
        assert!(remaining.iter().all(|m| m.id != msg.id));
    }

    fn sample_attachment(id: &str, extracted_text: Option<String>) -> Attachment {
        Attachment {
            id: id.to_string(),
            email_id: "chunker-attachment-test-msg".to_string(),
            filename: Some("notes.txt".to_string()),
            content_type: Some("text/plain".to_string()),
            size_bytes: Some(10),
            content_hash: Some(id.to_string()),
            extracted_text,
            extraction_status: attachments::ExtractionStatus::Success,
            extraction_error: None,
            downloaded_at: Some(1),
            extracted_at: Some(1),
        }
    }

    #[tokio::test]
    async fn attachment_text_at_or_under_threshold_produces_no_chunk() {
        use crate::modules::db::manager::DATABASE;

        let short = "short extracted text, well under the threshold".to_string();
        assert!(short.len() <= ATTACHMENT_CHUNK_THRESHOLD);
        let attachment = sample_attachment("chunker-attachment-short", Some(short));
        let created = chunk_attachment(&attachment).await.unwrap();
        assert_eq!(created, 0);

        let source_id = attachment.id.clone();
        let stored_count = DATABASE
            .with_conn(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE source_type = 'attachment' AND source_id = ?1",
                    rusqlite::params![source_id],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(stored_count, 0);
    }

    #[tokio::test]
    async fn attachment_text_over_threshold_is_chunked() {
        let long = "x".repeat(ATTACHMENT_CHUNK_THRESHOLD + 1);
        let attachment = sample_attachment("chunker-attachment-long", Some(long));
        let created = chunk_attachment(&attachment).await.unwrap();
        assert!(created >= 1);
    }
}
