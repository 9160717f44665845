use tracing::{info, warn};

use crate::modules::db::repo::attachments::{self, Attachment, ExtractionStatus};
use crate::modules::db::repo::folders::{self, Folder, SyncState};
use crate::modules::db::repo::messages::{self, Message};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::InboxResult;
use crate::modules::graph::model::{DeltaPage, GraphAttachment, GraphDeltaItem, GraphFolder, GraphMessage};
use crate::modules::graph::GraphClient;
use crate::raise_error;
use crate::utc_now;

const FULL_SYNC_PAGE_SIZE: usize = 50;

/// Mirrors one Graph mailbox (spec.md §4.2). One process manages
/// exactly one delegated mailbox (`DELEGATED_USER`), so there is no
/// per-account loop here — only per-folder.
pub async fn sync_all_folders(client: &dyn GraphClient) -> InboxResult<()> {
    let remote_folders = client.list_folders().await?;
    for remote in &remote_folders {
        folders::upsert_folder(Folder {
            id: remote.id.clone(),
            display_name: Some(remote.display_name.clone()),
            total_item_count: Some(remote.total_item_count),
        })
        .await?;
        sync_folder(client, remote).await?;
    }
    Ok(())
}

pub async fn sync_folder(client: &dyn GraphClient, folder: &GraphFolder) -> InboxResult<()> {
    let state = folders::get_sync_state(folder.id.clone()).await?;
    match state.as_ref().and_then(|s| s.delta_link.clone()) {
        Some(delta_link) => match delta_sync_folder(client, folder, &delta_link).await {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::DeltaTokenExpired => {
                warn!(folder = %folder.id, "delta token expired, falling back to full sync");
                folders::invalidate_delta_link(folder.id.clone()).await?;
                full_sync_folder(client, folder).await
            }
            Err(e) => Err(e),
        },
        None => full_sync_folder(client, folder).await,
    }
}

/// Pages through the entire folder via `$skip`/`$top`, upserting every
/// message, then captures the delta link the final page returns to
/// seed future incremental syncs (spec.md §4.2 "Full sync").
pub async fn full_sync_folder(client: &dyn GraphClient, folder: &GraphFolder) -> InboxResult<()> {
    let mut skip = 0usize;
    let mut synced = 0i64;
    let mut final_delta_link = None;
    loop {
        let page = client
            .full_sync_page(&folder.id, skip, FULL_SYNC_PAGE_SIZE)
            .await?;
        synced += apply_page(&page, &folder.id).await?;
        if page.next_link.is_some() {
            skip += FULL_SYNC_PAGE_SIZE;
            continue;
        }
        final_delta_link = page.delta_link;
        break;
    }
    folders::put_sync_state(SyncState {
        folder_id: folder.id.clone(),
        delta_link: final_delta_link,
        last_sync_at: Some(utc_now!()),
        sync_kind: Some("full".to_string()),
        messages_synced: synced,
    })
    .await?;
    info!(folder = %folder.id, synced, "full sync complete");
    Ok(())
}

/// Follows a stored delta link until Graph reports a fresh
/// `@odata.deltaLink`, applying upserts/removals as it goes
/// (spec.md §4.2 "Delta sync").
pub async fn delta_sync_folder(
    client: &dyn GraphClient,
    folder: &GraphFolder,
    delta_link: &str,
) -> InboxResult<()> {
    let mut url = delta_link.to_string();
    let mut synced = 0i64;
    let mut final_delta_link = None;
    loop {
        let page = client.delta_sync_page(&url).await?;
        synced += apply_page(&page, &folder.id).await?;
        match (&page.next_link, &page.delta_link) {
            (Some(next), _) => url = next.clone(),
            (None, Some(delta)) => {
                final_delta_link = Some(delta.clone());
                break;
            }
            (None, None) => {
                return Err(raise_error!(
                    format!("neither nextLink nor deltaLink present for folder {}", folder.id),
                    ErrorCode::InternalError
                ))
            }
        }
    }
    folders::put_sync_state(SyncState {
        folder_id: folder.id.clone(),
        delta_link: final_delta_link,
        last_sync_at: Some(utc_now!()),
        sync_kind: Some("delta".to_string()),
        messages_synced: synced,
    })
    .await?;
    info!(folder = %folder.id, synced, "delta sync complete");
    Ok(())
}

async fn apply_page(page: &DeltaPage, folder_id: &str) -> InboxResult<i64> {
    let mut count = 0i64;
    for item in &page.items {
        match item {
            GraphDeltaItem::Upserted(msg) => {
                messages::upsert(to_message(msg, folder_id)).await?;
                for attachment in &msg.attachments {
                    attachments::insert(to_attachment(attachment, &msg.id)).await?;
                }
                count += 1;
            }
            GraphDeltaItem::Removed { id, .. } => {
                messages::delete(id.clone()).await?;
            }
        }
    }
    Ok(count)
}

/// Stores attachment metadata with `extraction_status = pending` as
/// soon as its owning message is synced (spec.md §4.2 Full sync:
/// "Store attachment metadata (status=pending)"), so C3's extraction
/// worker has a backlog to drain. `insert`'s `ON CONFLICT(id) DO
/// NOTHING` makes re-syncing an already-known attachment a no-op.
fn to_attachment(attachment: &GraphAttachment, email_id: &str) -> Attachment {
    Attachment {
        id: attachment.id.clone(),
        email_id: email_id.to_string(),
        filename: Some(attachment.name.clone()),
        content_type: Some(attachment.content_type.clone()),
        size_bytes: Some(attachment.size),
        content_hash: None,
        extracted_text: None,
        extraction_status: ExtractionStatus::Pending,
        extraction_error: None,
        downloaded_at: Some(utc_now!()),
        extracted_at: None,
    }
}

/// Idempotent translation from the wire shape into the stored row. The
/// `etag`-gated `ON CONFLICT` clause in `repo::messages::upsert` is
/// what actually makes re-syncing an unchanged message a no-op; this
/// function just maps fields (spec.md §4.2 "idempotent upsert,
/// preserving derived columns across re-sync").
fn to_message(msg: &GraphMessage, folder_id: &str) -> Message {
    Message {
        id: msg.id.clone(),
        conversation_id: msg.conversation_id.clone(),
        internet_message_id: msg.internet_message_id.clone(),
        subject: msg.subject.clone(),
        sender: msg.sender.clone(),
        to_emails: msg.to_recipients.clone(),
        cc_emails: msg.cc_recipients.clone(),
        received_at: msg.received_date_time,
        body_preview: msg.body_preview.clone(),
        body_html: msg.body_html.clone(),
        body_markdown: None,
        extracted_signature: None,
        thread_summary: None,
        suggested_action: None,
        has_attachments: msg.has_attachments,
        is_read: msg.is_read,
        folder_id: Some(folder_id.to_string()),
        etag: msg.etag.clone(),
        body_hash: msg.body_html.as_deref().map(|h| {
            use sha2::{Digest, Sha256};
            hex::encode(Sha256::digest(h.as_bytes()))
        }),
        category: None,
        processed_at: None,
        web_link: msg.web_link.clone(),
        synced_at: Some(utc_now!()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::graph::model::GraphFolder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeClient {
        folders: Vec<GraphFolder>,
        full_pages: Mutex<Vec<DeltaPage>>,
    }

    #[async_trait]
    impl GraphClient for FakeClient {
        async fn list_folders(&self) -> InboxResult<Vec<GraphFolder>> {
            Ok(self.folders.clone())
        }
        async fn full_sync_page(&self, _folder_id: &str, _skip: usize, _top: usize) -> InboxResult<DeltaPage> {
            let mut pages = self.full_pages.lock().unwrap();
            Ok(pages.pop().unwrap_or(DeltaPage {
                items: vec![],
                next_link: None,
                delta_link: Some("final-delta-token".to_string()),
            }))
        }
        async fn delta_sync_page(&self, _url: &str) -> InboxResult<DeltaPage> {
            Ok(DeltaPage {
                items: vec![],
                next_link: None,
                delta_link: Some("refreshed-delta-token".to_string()),
            })
        }
        async fn get_message(&self, _message_id: &str) -> InboxResult<GraphMessage> {
            unreachable!("not exercised by this fake")
        }
        async fn download_attachment(&self, _message_id: &str, _attachment_id: &str) -> InboxResult<Vec<u8>> {
            unreachable!("not exercised by this fake")
        }
    }

    fn sample_message(id: &str) -> GraphMessage {
        GraphMessage {
            id: id.to_string(),
            conversation_id: Some("conv-x".to_string()),
            internet_message_id: None,
            subject: Some("Hi".to_string()),
            sender: Some("a@example.com".to_string()),
            to_recipients: vec![],
            cc_recipients: vec![],
            received_date_time: Some(1),
            body_preview: Some("hi".to_string()),
            body_html: None,
            has_attachments: false,
            is_read: false,
            etag: Some("etag-1".to_string()),
            web_link: None,
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn full_sync_seeds_delta_link_for_next_run() {
        let folder = GraphFolder {
            id: "folder-replicator-test".to_string(),
            display_name: "Inbox".to_string(),
            total_item_count: 1,
        };
        let client = FakeClient {
            folders: vec![folder.clone()],
            full_pages: Mutex::new(vec![DeltaPage {
                items: vec![GraphDeltaItem::Upserted(sample_message("repl-msg-1"))],
                next_link: None,
                delta_link: Some("final-delta-token".to_string()),
            }]),
        };

        full_sync_folder(&client, &folder).await.unwrap();

        let state = folders::get_sync_state(folder.id.clone()).await.unwrap().unwrap();
        assert_eq!(state.delta_link.as_deref(), Some("final-delta-token"));
        assert_eq!(state.messages_synced, 1);

        let stored = messages::get("repl-msg-1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.subject.as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn full_sync_stores_attachment_metadata_as_pending() {
        let folder = GraphFolder {
            id: "folder-replicator-test-attachments".to_string(),
            display_name: "Inbox".to_string(),
            total_item_count: 1,
        };
        let mut message = sample_message("repl-msg-2");
        message.has_attachments = true;
        message.attachments = vec![GraphAttachment {
            id: "att-repl-1".to_string(),
            name: "invoice.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 2048,
            content_bytes: None,
        }];
        let client = FakeClient {
            folders: vec![folder.clone()],
            full_pages: Mutex::new(vec![DeltaPage {
                items: vec![GraphDeltaItem::Upserted(message)],
                next_link: None,
                delta_link: Some("final-delta-token".to_string()),
            }]),
        };

        full_sync_folder(&client, &folder).await.unwrap();

        let pending = attachments::pending(10).await.unwrap();
        let stored = pending.iter().find(|a| a.id == "att-repl-1").expect("attachment row was not stored");
        assert_eq!(stored.email_id, "repl-msg-2");
        assert_eq!(stored.extraction_status, ExtractionStatus::Pending);
        assert_eq!(stored.filename.as_deref(), Some("invoice.pdf"));
        assert_eq!(stored.size_bytes, Some(2048));
    }
}
