use rusqlite::{params, OptionalExtension};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

#[derive(Debug, Clone)]
pub struct Folder {
    pub id: String,
    pub display_name: Option<String>,
    pub total_item_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SyncState {
    pub folder_id: String,
    pub delta_link: Option<String>,
    pub last_sync_at: Option<i64>,
    pub sync_kind: Option<String>,
    pub messages_synced: i64,
}

pub async fn upsert_folder(folder: Folder) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO folders (id, display_name, total_item_count) VALUES (?1,?2,?3)
                 ON CONFLICT(id) DO UPDATE SET display_name=excluded.display_name,
                 total_item_count=excluded.total_item_count",
                params![folder.id, folder.display_name, folder.total_item_count],
            )?;
            Ok(())
        })
        .await
}

pub async fn list_folders() -> InboxResult<Vec<Folder>> {
    DATABASE
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, display_name, total_item_count FROM folders")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Folder {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        total_item_count: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

/// Case-insensitive lookup used by the organizer's legacy folder mode to
/// resolve a normalized destination name to its Graph folder id.
pub async fn find_by_display_name(display_name: String) -> InboxResult<Option<Folder>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, display_name, total_item_count FROM folders WHERE LOWER(display_name) = LOWER(?1)",
                    params![display_name],
                    |row| {
                        Ok(Folder {
                            id: row.get(0)?,
                            display_name: row.get(1)?,
                            total_item_count: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
}

/// Per-folder delta-token bookkeeping, per spec.md §4.1 ("sync state
/// keyed by folder id; a 410 Gone on the stored delta link forces a
/// full resync and a replaced token").
pub async fn get_sync_state(folder_id: String) -> InboxResult<Option<SyncState>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT folder_id, delta_link, last_sync_at, sync_kind, messages_synced
                     FROM sync_state WHERE folder_id = ?1",
                    params![folder_id],
                    |row| {
                        Ok(SyncState {
                            folder_id: row.get(0)?,
                            delta_link: row.get(1)?,
                            last_sync_at: row.get(2)?,
                            sync_kind: row.get(3)?,
                            messages_synced: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
}

pub async fn put_sync_state(state: SyncState) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_state (folder_id, delta_link, last_sync_at, sync_kind, messages_synced)
                 VALUES (?1,?2,?3,?4,?5)
                 ON CONFLICT(folder_id) DO UPDATE SET
                    delta_link=excluded.delta_link,
                    last_sync_at=excluded.last_sync_at,
                    sync_kind=excluded.sync_kind,
                    messages_synced=sync_state.messages_synced + excluded.messages_synced",
                params![
                    state.folder_id,
                    state.delta_link,
                    state.last_sync_at,
                    state.sync_kind,
                    state.messages_synced,
                ],
            )?;
            Ok(())
        })
        .await
}

/// Clears the stored delta token, forcing the next sync to fall back
/// to a full resync (spec.md §4.1, delta-token-expired path).
pub async fn invalidate_delta_link(folder_id: String) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE sync_state SET delta_link = NULL WHERE folder_id = ?1",
                params![folder_id],
            )?;
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_state_roundtrip_and_accumulates_message_count() {
        upsert_folder(Folder {
            id: "folder-repo-test-1".to_string(),
            display_name: Some("Inbox".to_string()),
            total_item_count: Some(10),
        })
        .await
        .unwrap();

        put_sync_state(SyncState {
            folder_id: "folder-repo-test-1".to_string(),
            delta_link: Some("token-a".to_string()),
            last_sync_at: Some(100),
            sync_kind: Some("delta".to_string()),
            messages_synced: 3,
        })
        .await
        .unwrap();
        put_sync_state(SyncState {
            folder_id: "folder-repo-test-1".to_string(),
            delta_link: Some("token-b".to_string()),
            last_sync_at: Some(200),
            sync_kind: Some("delta".to_string()),
            messages_synced: 2,
        })
        .await
        .unwrap();

        let state = get_sync_state("folder-repo-test-1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.delta_link.as_deref(), Some("token-b"));
        assert_eq!(state.messages_synced, 5);
    }

    #[tokio::test]
    async fn invalidate_delta_link_clears_token() {
        upsert_folder(Folder {
            id: "folder-repo-test-2".to_string(),
            display_name: None,
            total_item_count: None,
        })
        .await
        .unwrap();
        put_sync_state(SyncState {
            folder_id: "folder-repo-test-2".to_string(),
            delta_link: Some("stale-token".to_string()),
            last_sync_at: Some(1),
            sync_kind: Some("delta".to_string()),
            messages_synced: 0,
        })
        .await
        .unwrap();

        invalidate_delta_link("folder-repo-test-2".to_string())
            .await
            .unwrap();

        let state = get_sync_state("folder-repo-test-2".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(state.delta_link.is_none());
    }
}
