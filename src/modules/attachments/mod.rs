use std::path::Path;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::modules::db::repo::attachments::{self, Attachment, ExtractionStatus};
use crate::modules::error::InboxResult;
use crate::modules::graph::GraphClient;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::tasks::queue::WorkerPool;
use crate::utc_now;

/// Filename-stem substrings that mark an attachment as noise (email
/// signatures, logos), grounded on
/// `original_source/src/attachments.py::SKIP_FILENAME_PATTERNS`.
const SKIP_FILENAME_PATTERNS: &[&str] = &[
    "image001", "image002", "image003", "image004", "image005", "signature", "logo", "banner",
    "footer", "header",
];

/// Content types with a known extraction path, grounded on
/// `original_source/src/attachments.py::EXTRACTABLE_TYPES`.
const EXTRACTABLE_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "text/plain",
    "text/csv",
    "text/html",
    "text/markdown",
];

fn filename_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_skip_pattern(filename: &str) -> bool {
    let stem = filename_stem(filename);
    SKIP_FILENAME_PATTERNS.iter().any(|p| stem.contains(p))
}

fn is_extractable(content_type: &str) -> bool {
    EXTRACTABLE_TYPES.contains(&content_type)
}

fn decode_plain_text(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| {
        encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
    })
}

/// Strips HTML tags, unescapes entities, and collapses whitespace —
/// grounded on `original_source/src/attachments.py`'s HTML fallback
/// path (regex tag-strip + `html.unescape`).
fn strip_html(bytes: &[u8]) -> String {
    let text = decode_plain_text(bytes);
    let no_tags = {
        let mut out = String::with_capacity(text.len());
        let mut in_tag = false;
        for ch in text.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => {
                    in_tag = false;
                    out.push(' ');
                }
                _ if !in_tag => out.push(ch),
                _ => {}
            }
        }
        out
    };
    let unescaped = html_escape::decode_html_entities(&no_tags).into_owned();
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Invokes the external document-extraction tool with a wall-clock
/// timeout, reading back the first markdown/text output file it
/// produces (spec.md §4.3 step 5). Grounded on
/// `original_source/src/attachments.py::_extract_text_with_documents_cli`.
async fn extract_via_external_tool(bytes: &[u8], filename: &str) -> InboxResult<Option<String>> {
    let dir = tempfile::tempdir()?;
    let suffix = Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".bin".to_string());
    let input_path = dir.path().join(format!("attachment{suffix}"));
    std::fs::write(&input_path, bytes)?;
    let output_dir = dir.path().join("out");
    std::fs::create_dir_all(&output_dir)?;

    let run = tokio::process::Command::new("aech-cli-documents")
        .arg("extract")
        .arg(&input_path)
        .arg("--output-dir")
        .arg(&output_dir)
        .arg("--format")
        .arg("markdown")
        .output();

    let output = match timeout(
        Duration::from_secs(SETTINGS.attachment_extraction_timeout_secs),
        run,
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(filename, error = %e, "failed to launch extraction tool");
            return Ok(None);
        }
        Err(_) => {
            warn!(filename, "extraction tool timed out");
            return Ok(None);
        }
    };

    if !output.status.success() {
        warn!(filename, stderr = %String::from_utf8_lossy(&output.stderr), "extraction tool failed");
        return Ok(None);
    }

    for ext in ["md", "txt"] {
        if let Some(path) = glob::glob(&format!("{}/*.{}", output_dir.display(), ext))
            .ok()
            .and_then(|mut g| g.next())
            .and_then(|r| r.ok())
        {
            return Ok(Some(std::fs::read_to_string(path)?));
        }
    }
    Ok(None)
}

async fn extract_text(bytes: &[u8], filename: &str, content_type: &str) -> InboxResult<Option<String>> {
    match content_type {
        "text/plain" | "text/csv" | "text/markdown" => Ok(Some(decode_plain_text(bytes))),
        "text/html" => Ok(Some(strip_html(bytes))),
        _ => extract_via_external_tool(bytes, filename).await,
    }
}

/// Processes one pending attachment end to end (spec.md §4.3).
pub async fn process_one(client: &dyn GraphClient, att: Attachment) -> InboxResult<()> {
    let filename = att.filename.clone().unwrap_or_default();
    let content_type = att.content_type.clone().unwrap_or_default();

    if is_skip_pattern(&filename) {
        attachments::set_status(
            att.id,
            ExtractionStatus::Skipped,
            None,
            Some(format!("filename matches skip pattern: {filename}")),
            Some(utc_now!()),
        )
        .await?;
        return Ok(());
    }

    if !is_extractable(&content_type) {
        attachments::set_status(
            att.id,
            ExtractionStatus::Unsupported,
            None,
            Some(format!("content type not supported: {content_type}")),
            Some(utc_now!()),
        )
        .await?;
        return Ok(());
    }

    let bytes = match client.download_attachment(&att.email_id, &att.id).await {
        Ok(b) => b,
        Err(e) => {
            attachments::set_status(
                att.id,
                ExtractionStatus::Failed,
                None,
                Some(format!("download failed: {e}")),
                Some(utc_now!()),
            )
            .await?;
            return Ok(());
        }
    };

    let content_hash = hex::encode(Sha256::digest(&bytes))[..32].to_string();
    attachments::set_content_hash(att.id.clone(), content_hash.clone()).await?;

    if let Some(cached) = attachments::find_by_hash(content_hash.clone()).await? {
        info!(id = %att.id, "reusing cached extraction via content hash");
        attachments::set_status(
            att.id,
            ExtractionStatus::Success,
            cached.extracted_text,
            None,
            Some(utc_now!()),
        )
        .await?;
        return Ok(());
    }

    match extract_text(&bytes, &filename, &content_type).await? {
        Some(text) if !text.trim().is_empty() => {
            attachments::set_status(att.id, ExtractionStatus::Success, Some(text), None, Some(utc_now!()))
                .await?;
        }
        _ => {
            attachments::set_status(
                att.id,
                ExtractionStatus::Failed,
                None,
                Some("extraction produced no text".to_string()),
                Some(utc_now!()),
            )
            .await?;
        }
    }
    Ok(())
}

/// Drains up to `limit` pending attachments through the bounded worker
/// pool (spec.md §5 "attachment worker pool"). `client` must be `Send +
/// Sync + 'static` (an `Arc<dyn GraphClient>`) so each job can own a
/// handle to it across the `spawn`.
pub async fn process_pending(
    client: std::sync::Arc<dyn GraphClient>,
    pool: &WorkerPool,
    limit: i64,
) -> InboxResult<()> {
    let pending = attachments::pending(limit).await?;
    let jobs: Vec<_> = pending
        .into_iter()
        .map(|att| {
            let client = client.clone();
            move || async move {
                if let Err(e) = process_one(client.as_ref(), att).await {
                    warn!(error = %e, "attachment processing failed");
                }
            }
        })
        .collect();
    pool.run_all(jobs).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_pattern_matches_signature_and_numbered_images() {
        assert!(is_skip_pattern("image003.png"));
        assert!(is_skip_pattern("Company-Signature.jpg"));
        assert!(!is_skip_pattern("quarterly-report.pdf"));
    }

    #[test]
    fn extractable_type_set_matches_spec() {
        assert!(is_extractable("application/pdf"));
        assert!(is_extractable("text/csv"));
        assert!(!is_extractable("image/png"));
    }

    #[test]
    fn html_stripping_collapses_tags_and_whitespace() {
        let html = b"<html><body><p>Hello   &amp; welcome</p></body></html>";
        let text = strip_html(html);
        assert_eq!(text, "Hello & welcome");
    }
}
