use serde::{Deserialize, Serialize};

/// Normalized Graph folder, stripped of vendor envelope fields the
/// replicator doesn't need. Grounded on
/// `sparklive-rustmailer/src/modules/cache/vendor/outlook/sync/folders.rs`'s
/// `OutlookFolder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFolder {
    pub id: String,
    pub display_name: String,
    pub total_item_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAttachment {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub content_bytes: Option<String>,
}

/// Normalized Graph message, grounded on
/// `sparklive-rustmailer/src/modules/cache/vendor/outlook/sync/envelope.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMessage {
    pub id: String,
    pub conversation_id: Option<String>,
    pub internet_message_id: Option<String>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub to_recipients: Vec<String>,
    pub cc_recipients: Vec<String>,
    pub received_date_time: Option<i64>,
    pub body_preview: Option<String>,
    pub body_html: Option<String>,
    pub has_attachments: bool,
    pub is_read: bool,
    pub etag: Option<String>,
    pub web_link: Option<String>,
    pub attachments: Vec<GraphAttachment>,
}

/// Per spec.md §9 Open Question (a): Graph's removed-marker payload
/// shape is ambiguous across Graph API versions ("reason" may be
/// `"deleted"` or `"changed"` or absent). Modeled loosely as an
/// optional string rather than a closed enum, since the replicator only
/// branches on "is this a removal", not on the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphDeltaItem {
    Upserted(GraphMessage),
    Removed { id: String, reason: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DeltaPage {
    pub items: Vec<GraphDeltaItem>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
}
