use rusqlite::params;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// §6 trigger-emitter dedupe ledger: a `(dedupe_key)` has been emitted
/// at most once, across process restarts, per spec.md §4.11 ("at-most-
/// once emission keyed by a caller-supplied dedupe key").
pub async fn already_emitted(dedupe_key: String) -> InboxResult<bool> {
    DATABASE
        .with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM trigger_ledger WHERE dedupe_key = ?1",
                params![dedupe_key],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
}

/// Records emission. Returns `false` (no-op) if the key was already
/// present, mirroring `INSERT OR IGNORE`'s atomicity so a concurrent
/// caller can't double-emit the same key.
pub async fn record_emission(dedupe_key: String, trigger_id: String, at: i64) -> InboxResult<bool> {
    DATABASE
        .with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO trigger_ledger (dedupe_key, trigger_id, created_at) VALUES (?1,?2,?3)",
                params![dedupe_key, trigger_id, at],
            )?;
            Ok(inserted > 0)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_emission_is_at_most_once() {
        let key = "trigger-repo-test-dedupe-1".to_string();
        let first = record_emission(key.clone(), "trig-1".to_string(), 1).await.unwrap();
        let second = record_emission(key.clone(), "trig-2".to_string(), 2).await.unwrap();

        assert!(first);
        assert!(!second);
        assert!(already_emitted(key).await.unwrap());
    }
}
