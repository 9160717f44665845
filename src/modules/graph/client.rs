use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::InboxResult;
use crate::modules::graph::model::{
    DeltaPage, GraphAttachment, GraphDeltaItem, GraphFolder, GraphMessage,
};
use crate::modules::graph::token::GraphTokenProvider;
use crate::modules::graph::{GraphClient, MessageFlag};
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// `graph-rs-sdk`-token-backed HTTP client, grounded on
/// `sparklive-rustmailer/src/modules/hook/http.rs`'s thin
/// reqwest-wrapper pattern (the teacher calls Graph endpoints the same
/// way: bearer token + raw JSON `Value` decoding, not through the SDK's
/// typed builders, to stay close to the wire shape Graph actually
/// returns). Token acquisition goes through `GraphTokenProvider` so a
/// single client transparently survives the token's own expiry.
pub struct OutlookGraphClient {
    http: Client,
    tokens: Arc<GraphTokenProvider>,
}

impl OutlookGraphClient {
    pub fn new(tokens: Arc<GraphTokenProvider>) -> InboxResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(SETTINGS.graph_request_timeout_secs))
            .build()?;
        Ok(Self { http, tokens })
    }

    async fn get_json(&self, url: &str) -> InboxResult<Value> {
        let token = self.tokens.access_token().await?;
        let resp = self.http.get(url).bearer_auth(&token).send().await?;
        if resp.status() == StatusCode::GONE {
            return Err(raise_error!(
                format!("delta token expired for {url}"),
                ErrorCode::DeltaTokenExpired
            ));
        }
        if !resp.status().is_success() {
            return Err(raise_error!(
                format!("graph request to {url} failed: {}", resp.status()),
                ErrorCode::NetworkError
            ));
        }
        Ok(resp.json::<Value>().await?)
    }

    async fn send_json(&self, method: reqwest::Method, url: &str, body: Value) -> InboxResult<()> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .request(method, url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(raise_error!(
                format!("graph request to {url} failed: {}", resp.status()),
                ErrorCode::NetworkError
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct FoldersEnvelope {
    value: Vec<GraphFolderWire>,
}

#[derive(Deserialize)]
struct GraphFolderWire {
    id: String,
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "totalItemCount")]
    total_item_count: i64,
}

fn parse_delta_envelope(value: &Value) -> InboxResult<(Vec<RawDeltaEntry>, Option<String>, Option<String>)> {
    let entries: Vec<RawDeltaEntry> = value
        .get("value")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();
    let next_link = value
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .map(str::to_string);
    let delta_link = value
        .get("@odata.deltaLink")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((entries, next_link, delta_link))
}

#[derive(Deserialize)]
struct RawDeltaEntry {
    id: String,
    #[serde(rename = "@removed")]
    removed: Option<RawRemoved>,
}

#[derive(Deserialize)]
struct RawRemoved {
    reason: Option<String>,
}

#[async_trait]
impl GraphClient for OutlookGraphClient {
    async fn list_folders(&self) -> InboxResult<Vec<GraphFolder>> {
        let value = self
            .get_json(&format!("{GRAPH_BASE}/me/mailFolders?$top=200"))
            .await?;
        let envelope: FoldersEnvelope = serde_json::from_value(value)?;
        Ok(envelope
            .value
            .into_iter()
            .map(|f| GraphFolder {
                id: f.id,
                display_name: f.display_name,
                total_item_count: f.total_item_count,
            })
            .collect())
    }

    async fn full_sync_page(&self, folder_id: &str, skip: usize, top: usize) -> InboxResult<DeltaPage> {
        let url = format!(
            "{GRAPH_BASE}/me/mailFolders/{folder_id}/messages?$skip={skip}&$top={top}&$select=id,subject"
        );
        let value = self.get_json(&url).await?;
        let (entries, next_link, delta_link) = parse_delta_envelope(&value)?;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            items.push(GraphDeltaItem::Upserted(self.get_message(&entry.id).await?));
        }
        Ok(DeltaPage {
            items,
            next_link,
            delta_link,
        })
    }

    async fn delta_sync_page(&self, url: &str) -> InboxResult<DeltaPage> {
        let value = self.get_json(url).await?;
        let (entries, next_link, delta_link) = parse_delta_envelope(&value)?;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(removed) = entry.removed {
                items.push(GraphDeltaItem::Removed {
                    id: entry.id,
                    reason: removed.reason,
                });
            } else {
                items.push(GraphDeltaItem::Upserted(self.get_message(&entry.id).await?));
            }
        }
        Ok(DeltaPage {
            items,
            next_link,
            delta_link,
        })
    }

    async fn get_message(&self, message_id: &str) -> InboxResult<GraphMessage> {
        let value = self
            .get_json(&format!("{GRAPH_BASE}/me/messages/{message_id}?$expand=attachments"))
            .await?;
        parse_message(value)
    }

    async fn download_attachment(&self, message_id: &str, attachment_id: &str) -> InboxResult<Vec<u8>> {
        let value = self
            .get_json(&format!(
                "{GRAPH_BASE}/me/messages/{message_id}/attachments/{attachment_id}"
            ))
            .await?;
        let content_bytes = value
            .get("contentBytes")
            .and_then(Value::as_str)
            .ok_or_else(|| raise_error!("attachment missing contentBytes".to_string(), ErrorCode::ExtractionFailed))?;
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, content_bytes)
            .map_err(|e| raise_error!(format!("invalid base64 attachment content: {e}"), ErrorCode::ExtractionFailed))
    }

    async fn move_message(&self, message_id: &str, destination_folder_id: &str) -> InboxResult<()> {
        self.send_json(
            reqwest::Method::POST,
            &format!("{GRAPH_BASE}/me/messages/{message_id}/move"),
            serde_json::json!({ "destinationId": destination_folder_id }),
        )
        .await
    }

    async fn delete_message(&self, message_id: &str) -> InboxResult<()> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .delete(format!("{GRAPH_BASE}/me/messages/{message_id}"))
            .bearer_auth(&token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(raise_error!(
                format!("failed to delete message {message_id}: {}", resp.status()),
                ErrorCode::NetworkError
            ));
        }
        Ok(())
    }

    async fn update_message_categories(
        &self,
        message_id: &str,
        categories: &[String],
        flag: Option<MessageFlag>,
    ) -> InboxResult<()> {
        let mut body = serde_json::json!({ "categories": categories });
        if let Some(flag) = flag {
            let due = match flag {
                MessageFlag::DueToday => "today",
                MessageFlag::DueThisWeek => "this-week",
            };
            body["flag"] = serde_json::json!({ "flagStatus": "flagged", "dueDateTime": { "dateTime": due } });
        }
        self.send_json(
            reqwest::Method::PATCH,
            &format!("{GRAPH_BASE}/me/messages/{message_id}"),
            body,
        )
        .await
    }
}

fn parse_message(value: Value) -> InboxResult<GraphMessage> {
    let get_str = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    let get_addr_list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| r.pointer("/emailAddress/address").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let attachments = value
        .get("attachments")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|a| {
                    Some(GraphAttachment {
                        id: a.get("id")?.as_str()?.to_string(),
                        name: a.get("name")?.as_str().unwrap_or_default().to_string(),
                        content_type: a
                            .get("contentType")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        size: a.get("size").and_then(Value::as_i64).unwrap_or_default(),
                        content_bytes: a.get("contentBytes").and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(GraphMessage {
        id: value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| raise_error!("message missing id".to_string(), ErrorCode::InternalError))?
            .to_string(),
        conversation_id: get_str("conversationId"),
        internet_message_id: get_str("internetMessageId"),
        subject: get_str("subject"),
        sender: value
            .pointer("/sender/emailAddress/address")
            .and_then(Value::as_str)
            .map(str::to_string),
        to_recipients: get_addr_list("toRecipients"),
        cc_recipients: get_addr_list("ccRecipients"),
        received_date_time: value
            .get("receivedDateTime")
            .and_then(Value::as_str)
            .and_then(|s| time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok())
            .map(|t| t.unix_timestamp() * 1000),
        body_preview: get_str("bodyPreview"),
        body_html: value.pointer("/body/content").and_then(Value::as_str).map(str::to_string),
        has_attachments: value.get("hasAttachments").and_then(Value::as_bool).unwrap_or(false),
        is_read: value.get("isRead").and_then(Value::as_bool).unwrap_or(false),
        etag: get_str("@odata.etag"),
        web_link: get_str("webLink"),
        attachments,
    })
}
