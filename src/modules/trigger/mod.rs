use serde::Serialize;
use tracing::info;

use crate::modules::db::repo::triggers;
use crate::modules::error::InboxResult;
use crate::modules::metrics::TRIGGERS_EMITTED;
use crate::modules::settings::dir::DATA_DIR_MANAGER;

#[derive(Debug, Serialize)]
struct TriggerRecord<'a> {
    id: String,
    user: &'a str,
    #[serde(rename = "type")]
    trigger_type: &'a str,
    created_at: String,
    payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing: Option<serde_json::Value>,
}

/// Appends a trigger to the durable outbox at most once per
/// `dedupe_key` (spec.md §4.11). Returns `true` if a new trigger file
/// was written, `false` if `dedupe_key` had already fired.
pub async fn write_trigger(
    user: &str,
    trigger_type: &str,
    payload: serde_json::Value,
    dedupe_key: String,
    routing: Option<serde_json::Value>,
) -> InboxResult<bool> {
    let id = uuid::Uuid::new_v4().to_string();
    let emitted = triggers::record_emission(dedupe_key.clone(), id.clone(), crate::utc_now!()).await?;
    if !emitted {
        return Ok(false);
    }

    let record = TriggerRecord {
        id: id.clone(),
        user,
        trigger_type,
        created_at: chrono::Utc::now().to_rfc3339(),
        payload,
        routing,
    };

    write_atomically(&record).await?;
    TRIGGERS_EMITTED.with_label_values(&[trigger_type]).inc();
    info!(trigger_type, dedupe_key, "trigger emitted");
    Ok(true)
}

async fn write_atomically(record: &TriggerRecord<'_>) -> InboxResult<()> {
    let final_path = DATA_DIR_MANAGER.outbox_dir.join(format!("{}.json", record.id));
    let tmp_path = DATA_DIR_MANAGER.outbox_dir.join(format!("{}.json.tmp", record.id));
    let body = serde_json::to_vec_pretty(record)?;

    let tmp_path_write = tmp_path.clone();
    let final_path_write = final_path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        std::fs::write(&tmp_path_write, &body)?;
        std::fs::rename(&tmp_path_write, &final_path_write)
    })
    .await
    .expect("blocking write task panicked")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_dedupe_key_emits_exactly_once() {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.outbox_dir).unwrap();
        let key = "trigger-test-dedupe-1".to_string();
        let first = write_trigger(
            "user@example.com",
            "urgent_email",
            serde_json::json!({"message_id": "m1"}),
            key.clone(),
            None,
        )
        .await
        .unwrap();
        let second = write_trigger(
            "user@example.com",
            "urgent_email",
            serde_json::json!({"message_id": "m1"}),
            key,
            None,
        )
        .await
        .unwrap();

        assert!(first);
        assert!(!second);
    }
}
