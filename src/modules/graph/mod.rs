pub mod client;
pub mod model;
pub mod token;

use async_trait::async_trait;

use crate::modules::error::InboxResult;
use crate::modules::graph::model::{DeltaPage, GraphFolder, GraphMessage};

/// Collaborator seam (spec.md §6): the Graph mailbox transport is an
/// external system this engine talks to, not something it reimplements.
/// A concrete client sits behind this trait in `modules::graph::client`.
/// `#[async_trait]` is needed (unlike `modules::context::Initialize`)
/// because the replicator dispatches through `&dyn GraphClient` rather
/// than a concrete singleton type, and native `async fn` in traits is
/// not object-safe.
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn list_folders(&self) -> InboxResult<Vec<GraphFolder>>;

    async fn full_sync_page(&self, folder_id: &str, skip: usize, top: usize) -> InboxResult<DeltaPage>;

    /// Follows `@odata.nextLink`/`@odata.deltaLink`. On a 410 Gone
    /// (expired token), returns `Err` with
    /// `ErrorCode::DeltaTokenExpired` so the caller can fall back to a
    /// full resync (spec.md §4.2).
    async fn delta_sync_page(&self, url: &str) -> InboxResult<DeltaPage>;

    async fn get_message(&self, message_id: &str) -> InboxResult<GraphMessage>;

    async fn download_attachment(&self, message_id: &str, attachment_id: &str) -> InboxResult<Vec<u8>>;

    /// Moves a message into `destination_folder_id` (spec.md §4.7, legacy
    /// folder mode).
    async fn move_message(&self, message_id: &str, destination_folder_id: &str) -> InboxResult<()>;

    /// Soft-deletes a message (spec.md §4.7, legacy folder mode `delete`
    /// action). Never a hard/permanent delete.
    async fn delete_message(&self, message_id: &str) -> InboxResult<()>;

    /// Applies Outlook categories and a due-date flag without moving the
    /// message out of the inbox (spec.md §4.7, categories mode).
    async fn update_message_categories(
        &self,
        message_id: &str,
        categories: &[String],
        flag: Option<MessageFlag>,
    ) -> InboxResult<()>;
}

/// Flag settings derived from urgency via the fixed mapping in spec.md
/// §4.7 ({immediate,today}→today, this_week→this-week, someday→none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFlag {
    DueToday,
    DueThisWeek,
}
