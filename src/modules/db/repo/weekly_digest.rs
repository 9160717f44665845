use rusqlite::params;

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

/// Records that a weekly digest fired for `(iso_year, iso_week)`.
/// Returns `false` (no-op) if one was already recorded, giving the
/// digest trigger its "exactly once per ISO week" guarantee (spec.md
/// §4.7) independent of the generic trigger-ledger dedupe.
pub async fn record_if_new(iso_year: i32, iso_week: u32, at: i64) -> InboxResult<bool> {
    DATABASE
        .with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO weekly_digest_log (iso_year, iso_week, emitted_at) VALUES (?1,?2,?3)",
                params![iso_year, iso_week, at],
            )?;
            Ok(inserted > 0)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_if_new_fires_once_per_week() {
        let first = record_if_new(2026, 5, 100).await.unwrap();
        let second = record_if_new(2026, 5, 200).await.unwrap();
        assert!(first);
        assert!(!second);
    }
}
