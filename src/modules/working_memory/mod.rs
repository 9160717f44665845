use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::modules::db::repo::commitments::{self, Commitment, PendingDecision};
use crate::modules::db::repo::contacts::{self, Relationship};
use crate::modules::db::repo::messages::Message;
use crate::modules::db::repo::observations::{self, Observation};
use crate::modules::db::repo::projects;
use crate::modules::db::repo::threads::{self, Thread, ThreadStatus, Urgency};
use crate::modules::error::InboxResult;
use crate::modules::facts;
use crate::modules::llm::{CompletionRequest, LlmClient};
use crate::modules::settings::cli::SETTINGS;
use crate::utc_now;

const MAX_KEY_POINTS: usize = 10;
const PROJECT_CONFIDENCE_STEP: f64 = 0.1;

/// Structured LLM extraction over a single message, grounded on
/// `original_source/src/working_memory/updater.py::EmailAnalysis`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailAnalysis {
    pub thread_summary_update: Option<String>,
    pub thread_summary: Option<String>,
    pub key_points: Vec<String>,
    pub pending_questions: Vec<String>,
    pub decisions_requested: Vec<DecisionRequest>,
    pub commitments_made: Vec<CommitmentMade>,
    pub observations: Vec<ObservationNote>,
    pub project_mentions: Vec<String>,
    pub suggested_urgency: String,
    pub needs_reply: bool,
    pub extracted_new_content: Option<String>,
    pub signature_block: Option<String>,
    pub suggested_action: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionRequest {
    pub question: String,
    pub context: String,
    pub options: Vec<String>,
    pub urgency: Option<String>,
    pub deadline: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitmentMade {
    pub description: String,
    pub to_whom: Option<String>,
    pub due_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationNote {
    pub observation_type: String,
    pub content: String,
    pub confidence: Option<f64>,
}

/// `is_user_cc` per `updater.py`: CC without being in TO.
pub fn is_user_cc(user_email: &str, message: &Message) -> bool {
    let user_lower = user_email.to_lowercase();
    let to_lower: Vec<String> = message.to_emails.iter().map(|e| e.to_lowercase()).collect();
    let cc_lower: Vec<String> = message.cc_emails.iter().map(|e| e.to_lowercase()).collect();
    cc_lower.contains(&user_lower) && !to_lower.contains(&user_lower)
}

fn user_domain(user_email: &str) -> String {
    user_email.split('@').next_back().unwrap_or("").to_lowercase()
}

fn build_context(message: &Message, is_cc: bool, category: Option<&str>, requires_reply: bool) -> String {
    let mode = if is_cc {
        "CC (passive learning - observe only)"
    } else {
        "DIRECT (may need action)"
    };
    let mut body = message
        .body_markdown
        .clone()
        .or_else(|| message.body_preview.clone())
        .unwrap_or_default();
    if body.len() > 4000 {
        body.truncate(4000);
        body.push_str("...");
    }

    format!(
        "EMAIL MODE: {mode}\nCATEGORY: {}\nREQUIRES_REPLY (from triage): {requires_reply}\n\n\
         FROM: {}\nTO: {:?}\nCC: {:?}\nSUBJECT: {}\nRECEIVED: {:?}\nCONVERSATION_ID: {}\n\nBODY:\n{body}",
        category.unwrap_or("Unknown"),
        message.sender.as_deref().unwrap_or("Unknown"),
        message.to_emails,
        message.cc_emails,
        message.subject.as_deref().unwrap_or(""),
        message.received_at,
        message.conversation_id.as_deref().unwrap_or(""),
    )
}

async fn analyze(llm: &dyn LlmClient, context: &str) -> EmailAnalysis {
    let request = CompletionRequest {
        model: SETTINGS.wm_model.clone(),
        system_prompt: WM_SYSTEM_PROMPT.to_string(),
        user_prompt: context.to_string(),
        json_schema_hint: Some("EmailAnalysis".to_string()),
    };
    match llm.complete(request).await {
        Ok(response) => serde_json::from_str(&response.text).unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "working memory analysis failed, falling back to empty analysis");
            EmailAnalysis::default()
        }
    }
}

/// Runs the full working-memory extraction + mutation pipeline for one
/// message, per spec.md §4.8. `category`/`requires_reply` are the
/// triage verdict's output, if triage has already run for this message.
pub async fn process_message(
    llm: &dyn LlmClient,
    user_email: &str,
    message: &Message,
    category: Option<&str>,
    requires_reply: bool,
) -> InboxResult<()> {
    let is_cc = is_user_cc(user_email, message);
    let context = build_context(message, is_cc, category, requires_reply);
    let analysis = analyze(llm, &context).await;

    let body = message.body_markdown.clone().or_else(|| message.body_preview.clone()).unwrap_or_default();
    if let Err(e) = facts::extract_from_email(
        llm,
        &message.id,
        &body,
        message.subject.as_deref(),
        message.sender.as_deref(),
        utc_now!(),
    )
    .await
    {
        warn!(error = %e, message_id = %message.id, "facts extraction failed");
    }

    let thread_id = update_thread(message, &analysis, is_cc).await?;
    update_contacts(user_email, message, &analysis).await?;

    if is_cc || !analysis.observations.is_empty() {
        record_observations(message, &analysis, is_cc).await?;
    }

    if !is_cc {
        for decision in &analysis.decisions_requested {
            add_pending_decision(message, decision).await?;
        }
    }

    for commitment in &analysis.commitments_made {
        add_commitment(message, commitment).await?;
    }

    update_projects(message, &analysis, &thread_id).await?;

    crate::modules::db::repo::messages::set_extracted_content(
        message.id.clone(),
        analysis.extracted_new_content.clone(),
        analysis.thread_summary.clone(),
        analysis.signature_block.clone(),
        analysis.suggested_action.clone(),
    )
    .await?;

    Ok(())
}

async fn update_thread(message: &Message, analysis: &EmailAnalysis, is_cc: bool) -> InboxResult<String> {
    let conversation_id = message.conversation_id.clone().unwrap_or_else(|| message.id.clone());
    let now = utc_now!();
    let received_at = message.received_at.unwrap_or(now);
    let suggested_urgency = Urgency::parse(&analysis.suggested_urgency);

    let thread = match threads::get_by_conversation(conversation_id.clone()).await? {
        Some(mut existing) => {
            existing.message_count += 1;
            existing.last_activity_at = Some(received_at);
            existing.summary = analysis.thread_summary_update.clone().or(existing.summary);
            existing.key_points.extend(analysis.key_points.clone());
            if existing.key_points.len() > MAX_KEY_POINTS {
                let drop = existing.key_points.len() - MAX_KEY_POINTS;
                existing.key_points.drain(0..drop);
            }
            if !analysis.pending_questions.is_empty() {
                existing.pending_questions = analysis.pending_questions.clone();
            }
            if analysis.needs_reply {
                existing.needs_reply = true;
            }
            // Mirrors `updater.py`'s thread-urgency merge: `this_week` never
            // overwrites a more specific existing urgency.
            if analysis.suggested_urgency != "this_week" {
                existing.urgency = suggested_urgency;
            }
            existing.latest_message_id = Some(message.id.clone());
            existing.latest_web_link = message.web_link.clone();
            existing.updated_at = Some(now);
            existing
        }
        None => {
            let mut participants: Vec<String> = Vec::new();
            if let Some(sender) = &message.sender {
                participants.push(sender.clone());
            }
            participants.extend(message.to_emails.clone());
            participants.extend(message.cc_emails.clone());
            participants.sort();
            participants.dedup();
            participants.retain(|p| !p.is_empty());

            Thread {
                id: Uuid::new_v4().to_string(),
                conversation_id: conversation_id.clone(),
                subject: message.subject.clone(),
                participants,
                status: ThreadStatus::Active,
                urgency: suggested_urgency,
                started_at: Some(received_at),
                last_activity_at: Some(received_at),
                message_count: 1,
                user_is_cc: is_cc,
                needs_reply: analysis.needs_reply,
                reply_deadline: None,
                labels: Vec::new(),
                project_refs: Vec::new(),
                latest_message_id: Some(message.id.clone()),
                latest_web_link: message.web_link.clone(),
                summary: analysis.thread_summary_update.clone(),
                key_points: analysis.key_points.clone(),
                pending_questions: analysis.pending_questions.clone(),
                updated_at: Some(now),
            }
        }
    };

    let id = thread.id.clone();
    threads::upsert(thread).await?;
    Ok(id)
}

async fn update_contacts(user_email: &str, message: &Message, _analysis: &EmailAnalysis) -> InboxResult<()> {
    let now = utc_now!();
    let received_at = message.received_at.unwrap_or(now);
    let user_lower = user_email.to_lowercase();

    if let Some(sender) = message.sender.as_deref() {
        let sender = sender.to_lowercase();
        if !sender.is_empty() {
            contacts::touch(sender, received_at, true, false, false).await?;
        }
    }

    for cc in &message.cc_emails {
        let cc = cc.to_lowercase();
        if !cc.is_empty() && cc != user_lower {
            contacts::touch(cc, received_at, false, false, true).await?;
        }
    }

    for to in &message.to_emails {
        let to = to.to_lowercase();
        if !to.is_empty() && to != user_lower {
            contacts::touch(to, received_at, false, false, false).await?;
        }
    }

    Ok(())
}

async fn record_observations(message: &Message, analysis: &EmailAnalysis, is_cc: bool) -> InboxResult<()> {
    let now = utc_now!();
    let mut notes = analysis.observations.clone();

    if is_cc && notes.is_empty() {
        notes.push(ObservationNote {
            observation_type: "context_learned".to_string(),
            content: format!("Observed thread: {}", message.subject.as_deref().unwrap_or("Unknown")),
            confidence: Some(0.3),
        });
    }

    for note in notes {
        observations::insert(Observation {
            id: String::new(),
            observation_type: note.observation_type,
            content: Some(note.content),
            source_message_id: Some(message.id.clone()),
            confidence: note.confidence.or(Some(0.5)),
            observed_at: Some(now),
            updated_at: Some(now),
        })
        .await?;
    }

    Ok(())
}

async fn add_pending_decision(message: &Message, decision: &DecisionRequest) -> InboxResult<()> {
    let now = utc_now!();
    let urgency = decision
        .urgency
        .as_deref()
        .map(Urgency::parse)
        .unwrap_or(Urgency::ThisWeek);

    commitments::insert_decision(PendingDecision {
        id: String::new(),
        question: Some(decision.question.clone()),
        context: Some(decision.context.clone()),
        options: decision.options.clone(),
        source: Some(message.id.clone()),
        requester: message.sender.clone(),
        urgency,
        deadline: decision.deadline,
        is_resolved: false,
        updated_at: Some(now),
    })
    .await?;
    Ok(())
}

async fn add_commitment(message: &Message, made: &CommitmentMade) -> InboxResult<()> {
    let now = utc_now!();
    commitments::insert_commitment(Commitment {
        id: String::new(),
        description: Some(made.description.clone()),
        to_whom: made.to_whom.clone().or_else(|| message.sender.clone()),
        source: Some(message.id.clone()),
        committed_at: Some(now),
        due_by: made.due_by,
        is_completed: false,
        updated_at: Some(now),
    })
    .await?;
    Ok(())
}

async fn update_projects(message: &Message, analysis: &EmailAnalysis, thread_id: &str) -> InboxResult<()> {
    let now = utc_now!();
    for name in &analysis.project_mentions {
        let trimmed = name.trim();
        if trimmed.len() < 2 {
            continue;
        }
        projects::mention(
            trimmed.to_string(),
            message.conversation_id.clone().unwrap_or_else(|| thread_id.to_string()),
            message.received_at.unwrap_or(now),
            PROJECT_CONFIDENCE_STEP,
        )
        .await?;
    }
    Ok(())
}

/// Relationship classification helper (spec.md §4.8): a contact at the
/// same domain as the mailbox owner is internal.
pub fn classify_relationship(user_email: &str, contact_email: &str) -> Relationship {
    let domain = contact_email.split('@').next_back().unwrap_or("").to_lowercase();
    if domain == user_domain(user_email) {
        Relationship::Internal
    } else {
        Relationship::External
    }
}

const WM_SYSTEM_PROMPT: &str = "You are an executive assistant analyzing emails to update working memory. \
Classify the email (NEWSLETTER, AUTOMATED, TRANSACTIONAL, or DIRECT) and extract structured intelligence: \
a one-sentence thread summary update, key points, pending questions, decisions explicitly requested of the \
user, commitments the user explicitly made, passive observations (especially for CC'd threads), named \
project mentions (strict: only explicit named initiatives, never products/vendors/news topics), suggested \
urgency (immediate/today/this_week/someday), whether a reply is needed, the fresh sender-authored content \
with quoted replies and signatures stripped out, the sender's signature block if present, and a suggested \
inbox action (keep/archive/delete).";

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message {
            id: "wm-test-1".to_string(),
            conversation_id: Some("conv-1".to_string()),
            internet_message_id: None,
            subject: Some("Budget review".to_string()),
            sender: Some("Boss@Example.com".to_string()),
            to_emails: vec!["me@example.com".to_string()],
            cc_emails: vec![],
            received_at: Some(100),
            body_preview: Some("please review".to_string()),
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
        }
    }

    #[test]
    fn cc_only_recipient_is_detected() {
        let mut message = sample_message();
        message.to_emails = vec!["other@example.com".to_string()];
        message.cc_emails = vec!["me@example.com".to_string()];
        assert!(is_user_cc("me@example.com", &message));
    }

    #[test]
    fn direct_recipient_is_not_cc() {
        let message = sample_message();
        assert!(!is_user_cc("me@example.com", &message));
    }

    #[test]
    fn same_domain_contact_is_internal() {
        assert_eq!(classify_relationship("me@example.com", "boss@example.com"), Relationship::Internal);
        assert_eq!(classify_relationship("me@example.com", "vendor@other.com"), Relationship::External);
    }

    #[tokio::test]
    async fn existing_thread_summary_is_replaced_not_appended_to_key_points() {
        let mut message = sample_message();
        message.conversation_id = Some("wm-thread-merge-conv".to_string());

        let first_pass = EmailAnalysis {
            thread_summary_update: Some("initial summary".to_string()),
            suggested_urgency: "normal".to_string(),
            ..Default::default()
        };
        update_thread(&message, &first_pass, false).await.unwrap();

        let second_pass = EmailAnalysis {
            thread_summary_update: Some("revised summary".to_string()),
            key_points: vec!["new point".to_string()],
            suggested_urgency: "normal".to_string(),
            ..Default::default()
        };
        update_thread(&message, &second_pass, false).await.unwrap();

        let thread = threads::get_by_conversation("wm-thread-merge-conv".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(thread.summary.as_deref(), Some("revised summary"));
        assert!(!thread.key_points.iter().any(|p| p == "revised summary"));
        assert!(thread.key_points.iter().any(|p| p == "new point"));
    }
}
