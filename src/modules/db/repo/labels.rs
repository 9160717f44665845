use rusqlite::params;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// Replaces a message's label set, per spec.md §4.7 ("persist labels,
/// replacing any previous").
pub async fn replace(message_id: String, labels: Vec<(String, f64)>, at: i64) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute("DELETE FROM labels WHERE message_id = ?1", params![message_id])?;
            for (label, confidence) in &labels {
                if label.trim().is_empty() {
                    continue;
                }
                conn.execute(
                    "INSERT OR REPLACE INTO labels (message_id, label, confidence, created_at)
                     VALUES (?1,?2,?3,?4)",
                    params![message_id, label, confidence, at],
                )?;
            }
            Ok(())
        })
        .await
}

pub async fn for_message(message_id: String) -> InboxResult<Vec<String>> {
    DATABASE
        .with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT label FROM labels WHERE message_id = ?1")?;
            let rows = stmt
                .query_map(params![message_id], |row| row.get::<_, String>(0))?
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
    async fn replace_clears_prior_labels() {
        seed_message("label-test-msg").await;
        replace(
            "label-test-msg".to_string(),
            vec![("vip".to_string(), 0.9), ("billing".to_string(), 0.8)],
            1,
        )
        .await
        .unwrap();
        replace("label-test-msg".to_string(), vec![("marketing".to_string(), 0.5)], 2)
            .await
            .unwrap();

        let labels = for_message("label-test-msg".to_string()).await.unwrap();
        assert_eq!(labels, vec!["marketing".to_string()]);
    }
}
