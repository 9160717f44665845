use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// §3 `Attachment` entity and its extraction state machine
/// (pending/success/failed/unsupported/skipped, spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    Pending,
    Success,
    Failed,
    Unsupported,
    Skipped,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unsupported => "unsupported",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "unsupported" => Self::Unsupported,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub email_id: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub content_hash: Option<String>,
    pub extracted_text: Option<String>,
    pub extraction_status: ExtractionStatus,
    pub extraction_error: Option<String>,
    pub downloaded_at: Option<i64>,
    pub extracted_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Attachment> {
    let status: String = row.get("extraction_status")?;
    Ok(Attachment {
        id: row.get("id")?,
        email_id: row.get("email_id")?,
        filename: row.get("filename")?,
        content_type: row.get("content_type")?,
        size_bytes: row.get("size_bytes")?,
        content_hash: row.get("content_hash")?,
        extracted_text: row.get("extracted_text")?,
        extraction_status: ExtractionStatus::parse(&status),
        extraction_error: row.get("extraction_error")?,
        downloaded_at: row.get("downloaded_at")?,
        extracted_at: row.get("extracted_at")?,
    })
}

pub async fn insert(att: Attachment) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO attachments (
                    id, email_id, filename, content_type, size_bytes, content_hash,
                    extraction_status, downloaded_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                ON CONFLICT(id) DO NOTHING",
                params![
                    att.id,
                    att.email_id,
                    att.filename,
                    att.content_type,
                    att.size_bytes,
                    att.content_hash,
                    att.extraction_status.as_str(),
                    att.downloaded_at,
                ],
            )?;
            Ok(())
        })
        .await
}

/// Persists the content hash as soon as it's known, ahead of (and
/// independent from) the status transition that finalizes extraction —
/// spec.md §3 invariant: "`content_hash` is set before extraction
/// finalization so duplicates can reuse prior extraction".
pub async fn set_content_hash(id: String, content_hash: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute("UPDATE attachments SET content_hash = ?2 WHERE id = ?1", params![id, content_hash])?;
            Ok(())
        })
        .await
}

pub async fn set_status(
    id: String,
    status: ExtractionStatus,
    extracted_text: Option<String>,
    error: Option<String>,
    extracted_at: Option<i64>,
) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE attachments SET extraction_status = ?2, extracted_text = ?3,
                 extraction_error = ?4, extracted_at = ?5 WHERE id = ?1",
                params![id, status.as_str(), extracted_text, error, extracted_at],
            )?;
            Ok(())
        })
        .await
}

/// Content-hash lookup used by the dedup check (spec.md §4.3: "a
/// byte-identical attachment already extracted elsewhere is reused
/// rather than re-extracted").
pub async fn find_by_hash(content_hash: String) -> InboxResult<Option<Attachment>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM attachments WHERE content_hash = ?1 AND extraction_status = 'success' LIMIT 1",
                    params![content_hash],
                    from_row,
                )
                .optional()?)
        })
        .await
}

pub async fn pending(limit: i64) -> InboxResult<Vec<Attachment>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM attachments WHERE extraction_status = 'pending' ORDER BY downloaded_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn get(id: String) -> InboxResult<Option<Attachment>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row("SELECT * FROM attachments WHERE id = ?1", params![id], from_row)
                .optional()?)
        })
        .await
}

/// Successfully-extracted attachments with no `chunks` row yet, bounded
/// by `limit` — the chunking pipeline's own backlog query (spec.md
/// §4.4), mirroring `repo::messages::unchunked`.
pub async fn unchunked(limit: i64) -> InboxResult<Vec<Attachment>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM attachments a WHERE extraction_status = 'success' AND NOT EXISTS (
                    SELECT 1 FROM chunks c WHERE c.source_id = a.id AND c.source_type = 'attachment'
                 ) ORDER BY extracted_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn by_email(email_id: String) -> InboxResult<Vec<Attachment>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM attachments WHERE email_id = ?1")?;
            let rows = stmt
                .query_map(params![email_id], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::db::repo::messages::{self, Message};

    async fn seed_message(id: &str) {
        messages::upsert(Message {
            id: id.to_string(),
            conversation_id: None,
            internet_message_id: None,
            subject: None,
            sender: None,
            to_emails: vec![],
            cc_emails: vec![],
            received_at: None,
            body_preview: None,
            body_html: None,
            body_markdown: None,
            extracted_signature: None,
            thread_summary: None,
            suggested_action: None,
            has_attachments: true,
            is_read: false,
            folder_id: None,
            etag: None,
            body_hash: None,
            category: None,
            processed_at: None,
            web_link: None,
            synced_at: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dedup_lookup_only_returns_successful_extractions() {
        seed_message("att-test-msg-1").await;
        insert(Attachment {
            id: "att-1".to_string(),
            email_id: "att-test-msg-1".to_string(),
            filename: Some("a.pdf".to_string()),
            content_type: Some("application/pdf".to_string()),
            size_bytes: Some(10),
            content_hash: Some("hash-xyz".to_string()),
            extracted_text: None,
            extraction_status: ExtractionStatus::Pending,
            extraction_error: None,
            downloaded_at: Some(1),
            extracted_at: None,
        })
        .await
        .unwrap();

        assert!(find_by_hash("hash-xyz".to_string()).await.unwrap().is_none());

        set_status(
            "att-1".to_string(),
            ExtractionStatus::Success,
            Some("extracted text".to_string()),
            None,
            Some(2),
        )
        .await
        .unwrap();

        let found = find_by_hash("hash-xyz".to_string()).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().extracted_text.as_deref(), Some("extracted text"));
    }

    #[tokio::test]
    async fn set_content_hash_persists_independently_of_status() {
        seed_message("att-test-msg-2").await;
        insert(Attachment {
            id: "att-2".to_string(),
            email_id: "att-test-msg-2".to_string(),
            filename: Some("b.pdf".to_string()),
            content_type: Some("application/pdf".to_string()),
            size_bytes: Some(20),
            content_hash: None,
            extracted_text: None,
            extraction_status: ExtractionStatus::Pending,
            extraction_error: None,
            downloaded_at: Some(1),
            extracted_at: None,
        })
        .await
        .unwrap();

        set_content_hash("att-2".to_string(), "hash-abc".to_string()).await.unwrap();
        assert!(find_by_hash("hash-abc".to_string()).await.unwrap().is_none());

        set_status("att-2".to_string(), ExtractionStatus::Success, Some("text".to_string()), None, Some(2))
            .await
            .unwrap();

        let found = find_by_hash("hash-abc".to_string()).await.unwrap().unwrap();
        assert_eq!(found.id, "att-2");
    }
}
