use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// §3 `Message` entity. Field set mirrors the Graph message shape after
/// normalization, plus the derived/enriched columns the pipeline adds
/// downstream (`thread_summary`, `suggested_action`, `category`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: Option<String>,
    pub internet_message_id: Option<String>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub to_emails: Vec<String>,
    pub cc_emails: Vec<String>,
    pub received_at: Option<i64>,
    pub body_preview: Option<String>,
    pub body_html: Option<String>,
    pub body_markdown: Option<String>,
    pub extracted_signature: Option<String>,
    pub thread_summary: Option<String>,
    pub suggested_action: Option<String>,
    pub has_attachments: bool,
    pub is_read: bool,
    pub folder_id: Option<String>,
    pub etag: Option<String>,
    pub body_hash: Option<String>,
    pub category: Option<String>,
    pub processed_at: Option<i64>,
    pub web_link: Option<String>,
    pub synced_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Message> {
    let to_json: String = row.get("to_emails")?;
    let cc_json: String = row.get("cc_emails")?;
    Ok(Message {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        internet_message_id: row.get("internet_message_id")?,
        subject: row.get("subject")?,
        sender: row.get("sender")?,
        to_emails: serde_json::from_str(&to_json).unwrap_or_default(),
        cc_emails: serde_json::from_str(&cc_json).unwrap_or_default(),
        received_at: row.get("received_at")?,
        body_preview: row.get("body_preview")?,
        body_html: row.get("body_html")?,
        body_markdown: row.get("body_markdown")?,
        extracted_signature: row.get("extracted_signature")?,
        thread_summary: row.get("thread_summary")?,
        suggested_action: row.get("suggested_action")?,
        has_attachments: row.get::<_, i64>("has_attachments")? != 0,
        is_read: row.get::<_, i64>("is_read")? != 0,
        folder_id: row.get("folder_id")?,
        etag: row.get("etag")?,
        body_hash: row.get("body_hash")?,
        category: row.get("category")?,
        processed_at: row.get("processed_at")?,
        web_link: row.get("web_link")?,
        synced_at: row.get("synced_at")?,
    })
}

/// Idempotent upsert keyed on Graph message id, per spec.md §4.2
/// ("re-syncing an unchanged message is a no-op write; a changed
/// `etag` replaces body/metadata columns in place").
pub async fn upsert(msg: Message) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO emails (
                    id, conversation_id, internet_message_id, subject, sender,
                    to_emails, cc_emails, received_at, body_preview, body_html,
                    body_markdown, has_attachments, is_read, folder_id, etag,
                    body_hash, web_link, synced_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
                ON CONFLICT(id) DO UPDATE SET
                    conversation_id=excluded.conversation_id,
                    subject=excluded.subject,
                    sender=excluded.sender,
                    to_emails=excluded.to_emails,
                    cc_emails=excluded.cc_emails,
                    received_at=excluded.received_at,
                    body_preview=excluded.body_preview,
                    body_html=excluded.body_html,
                    body_markdown=excluded.body_markdown,
                    has_attachments=excluded.has_attachments,
                    is_read=excluded.is_read,
                    folder_id=excluded.folder_id,
                    etag=excluded.etag,
                    body_hash=excluded.body_hash,
                    web_link=excluded.web_link,
                    synced_at=excluded.synced_at
                WHERE emails.etag IS NOT excluded.etag",
                params![
                    msg.id,
                    msg.conversation_id,
                    msg.internet_message_id,
                    msg.subject,
                    msg.sender,
                    serde_json::to_string(&msg.to_emails)?,
                    serde_json::to_string(&msg.cc_emails)?,
                    msg.received_at,
                    msg.body_preview,
                    msg.body_html,
                    msg.body_markdown,
                    msg.has_attachments as i64,
                    msg.is_read as i64,
                    msg.folder_id,
                    msg.etag,
                    msg.body_hash,
                    msg.web_link,
                    msg.synced_at,
                ],
            )?;
            Ok(())
        })
        .await
}

pub async fn delete(id: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute("DELETE FROM emails WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
}

pub async fn get(id: String) -> InboxResult<Option<Message>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row("SELECT * FROM emails WHERE id = ?1", params![id], from_row)
                .optional()?)
        })
        .await
}

pub async fn unprocessed(limit: i64) -> InboxResult<Vec<Message>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM emails WHERE processed_at IS NULL ORDER BY received_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn mark_processed(id: String, processed_at: i64, category: Option<String>) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE emails SET processed_at = ?2, category = ?3 WHERE id = ?1",
                params![id, processed_at, category],
            )?;
            Ok(())
        })
        .await
}

pub async fn by_conversation(conversation_id: String) -> InboxResult<Vec<Message>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM emails WHERE conversation_id = ?1 ORDER BY received_at ASC",
            )?;
            let rows = stmt
                .query_map(params![conversation_id], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Stores the working-memory updater's per-message LLM extraction
/// output (spec.md §4.8): cleaned body content, thread summary,
/// signature block, and suggested inbox-cleanup action.
pub async fn set_extracted_content(
    id: String,
    body_markdown: Option<String>,
    thread_summary: Option<String>,
    extracted_signature: Option<String>,
    suggested_action: Option<String>,
) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE emails SET
                    body_markdown = COALESCE(?2, body_markdown),
                    thread_summary = ?3,
                    extracted_signature = COALESCE(?4, extracted_signature),
                    suggested_action = ?5
                 WHERE id = ?1",
                params![id, body_markdown, thread_summary, extracted_signature, suggested_action],
            )?;
            Ok(())
        })
        .await
}

/// Messages received within `[start, end)`, used to build the weekly
/// digest summary (spec.md §4.7).
/// Messages with no `chunks` row yet (neither an `email` nor a
/// `virtual_email` chunk), bounded by `limit` — the chunking pipeline's
/// own backlog query (spec.md §4.4).
pub async fn unchunked(limit: i64) -> InboxResult<Vec<Message>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM emails e WHERE NOT EXISTS (
                    SELECT 1 FROM chunks c
                    WHERE c.source_id = e.id AND c.source_type IN ('email', 'virtual_email')
                 ) ORDER BY received_at ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn received_between(start: i64, end: i64, limit: i64) -> InboxResult<Vec<Message>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM emails WHERE received_at >= ?1 AND received_at < ?2
                 ORDER BY received_at ASC LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![start, end, limit], from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, etag: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: Some("conv-1".to_string()),
            internet_message_id: None,
            subject: Some("Hello".to_string()),
            sender: Some("a@example.com".to_string()),
            to_emails: vec!["b@example.com".to_string()],
            cc_emails: vec![],
            received_at: Some(1000),
            body_preview: Some("preview".to_string()),
            body_html: None,
            body_markdown: Some("hello there".to_string()),
            extracted_signature: None,
            thread_summary: None,
            suggested_action: None,
            has_attachments: false,
            is_read: false,
            folder_id: Some("inbox".to_string()),
            etag: Some(etag.to_string()),
            body_hash: None,
            category: None,
            processed_at: None,
            web_link: None,
            synced_at: Some(1000),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_unchanged_etag() {
        upsert(sample("m1", "etag-1")).await.unwrap();
        let mut changed = sample("m1", "etag-1");
        changed.subject = Some("should not apply".to_string());
        upsert(changed).await.unwrap();

        let stored = get("m1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.subject.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn upsert_replaces_fields_on_changed_etag() {
        upsert(sample("m2", "etag-1")).await.unwrap();
        let mut changed = sample("m2", "etag-2");
        changed.subject = Some("Updated".to_string());
        upsert(changed).await.unwrap();

        let stored = get("m2".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.subject.as_deref(), Some("Updated"));
    }
}
