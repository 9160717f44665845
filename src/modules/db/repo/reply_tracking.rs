use rusqlite::{params, OptionalExtension, Row};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

#[derive(Debug, Clone)]
pub struct ReplyTracking {
    pub message_id: String,
    pub requires_reply: bool,
    pub reason: Option<String>,
    pub last_activity_at: Option<i64>,
    pub nudge_scheduled_at: Option<i64>,
    pub follow_up_sent_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<ReplyTracking> {
    Ok(ReplyTracking {
        message_id: row.get("message_id")?,
        requires_reply: row.get::<_, i64>("requires_reply")? != 0,
        reason: row.get("reason")?,
        last_activity_at: row.get("last_activity_at")?,
        nudge_scheduled_at: row.get("nudge_scheduled_at")?,
        follow_up_sent_at: row.get("follow_up_sent_at")?,
    })
}

/// Upsert keyed on `message_id`, per spec.md §4.7 ("upsert a
/// reply-tracking row if requires_reply").
pub async fn upsert(message_id: String, reason: Option<String>, last_activity_at: Option<i64>) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO reply_tracking (message_id, requires_reply, reason, last_activity_at)
                 VALUES (?1, 1, ?2, ?3)
                 ON CONFLICT(message_id) DO UPDATE SET
                    requires_reply = 1,
                    reason = excluded.reason,
                    last_activity_at = excluded.last_activity_at",
                params![message_id, reason, last_activity_at],
            )?;
            Ok(())
        })
        .await
}

/// Rows eligible for a follow-up nudge: reply required, not yet
/// followed up or nudged, with a known last-activity timestamp
/// (spec.md §4.7 follow-up trigger).
pub async fn awaiting_nudge(limit: i64) -> InboxResult<Vec<ReplyTracking>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM reply_tracking
                 WHERE requires_reply = 1
                   AND follow_up_sent_at IS NULL
                   AND nudge_scheduled_at IS NULL
                   AND last_activity_at IS NOT NULL
                 ORDER BY last_activity_at ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], from_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

pub async fn mark_nudge_scheduled(message_id: String, at: i64) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE reply_tracking SET nudge_scheduled_at = ?2 WHERE message_id = ?1",
                params![message_id, at],
            )?;
            Ok(())
        })
        .await
}

pub async fn get(message_id: String) -> InboxResult<Option<ReplyTracking>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM reply_tracking WHERE message_id = ?1",
                    params![message_id],
                    from_row,
                )
                .optional()?)
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
            has_attachments: false,
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
    async fn awaiting_nudge_excludes_already_scheduled_rows() {
        seed_message("reply-test-1").await;
        seed_message("reply-test-2").await;
        upsert("reply-test-1".to_string(), Some("direct question".to_string()), Some(100))
            .await
            .unwrap();
        upsert("reply-test-2".to_string(), Some("direct question".to_string()), Some(200))
            .await
            .unwrap();
        mark_nudge_scheduled("reply-test-2".to_string(), 9999).await.unwrap();

        let rows = awaiting_nudge(50).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.message_id.as_str()).collect();
        assert!(ids.contains(&"reply-test-1"));
        assert!(!ids.contains(&"reply-test-2"));
    }
}
