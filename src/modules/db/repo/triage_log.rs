use rusqlite::params;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// Append-only decision audit trail, per spec.md §4.7 ("append a
/// triage_log row").
pub async fn append(
    email_id: String,
    action: String,
    destination_folder: Option<String>,
    reason: Option<String>,
    at: i64,
) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO triage_log (email_id, action, destination_folder, reason, timestamp)
                 VALUES (?1,?2,?3,?4,?5)",
                params![email_id, action, destination_folder, reason, at],
            )?;
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::db::manager::DATABASE;
    use crate::modules::db::repo::messages::{self, Message};

    #[tokio::test]
    async fn append_records_one_row_per_call() {
        messages::upsert(Message {
            id: "triage-log-test".to_string(),
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

        append(
            "triage-log-test".to_string(),
            "move".to_string(),
            Some("Work".to_string()),
            Some("work request".to_string()),
            1,
        )
        .await
        .unwrap();

        let count: i64 = DATABASE
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM triage_log WHERE email_id = 'triage-log-test'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
