use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::modules::error::InboxResult;
use crate::modules::llm::{CompletionRequest, LlmClient};
use crate::modules::settings::cli::SETTINGS;

/// Minimum content length before the extractor is worth calling,
/// grounded on `original_source/src/facts.py::extract_from_email`.
const MIN_CONTENT_LEN: usize = 50;
const MAX_ATTACHMENT_CHARS: usize = 10_000;

/// §3 `Fact` taxonomy: key business details, action items the user
/// owes or is owed, and behavioral observations, grounded on
/// `original_source/src/facts.py::FactType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Decision,
    Commitment,
    ActionItem,
    TaxId,
    BusinessNumber,
    AccountNumber,
    Amount,
    Address,
    Phone,
    Deadline,
    PersonName,
    CompanyName,
    ContractNumber,
    Preference,
    Relationship,
    Pattern,
    Other,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Commitment => "commitment",
            Self::ActionItem => "action_item",
            Self::TaxId => "tax_id",
            Self::BusinessNumber => "business_number",
            Self::AccountNumber => "account_number",
            Self::Amount => "amount",
            Self::Address => "address",
            Self::Phone => "phone",
            Self::Deadline => "deadline",
            Self::PersonName => "person_name",
            Self::CompanyName => "company_name",
            Self::ContractNumber => "contract_number",
            Self::Preference => "preference",
            Self::Relationship => "relationship",
            Self::Pattern => "pattern",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "decision" => Self::Decision,
            "commitment" => Self::Commitment,
            "action_item" => Self::ActionItem,
            "tax_id" => Self::TaxId,
            "business_number" => Self::BusinessNumber,
            "account_number" => Self::AccountNumber,
            "amount" => Self::Amount,
            "address" => Self::Address,
            "phone" => Self::Phone,
            "deadline" => Self::Deadline,
            "person_name" => Self::PersonName,
            "company_name" => Self::CompanyName,
            "contract_number" => Self::ContractNumber,
            "preference" => Self::Preference,
            "relationship" => Self::Relationship,
            "pattern" => Self::Pattern,
            _ => Self::Other,
        }
    }
}

/// One fact pulled out of an email or attachment by the extractor
/// collaborator (spec.md §6 `extract_facts(context) → [Fact]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedFact {
    pub fact_type: FactType,
    pub fact_value: String,
    pub context: String,
    pub confidence: f64,
    pub entity_normalized: Option<String>,
    pub due_date: Option<i64>,
}

impl Default for ExtractedFact {
    fn default() -> Self {
        Self {
            fact_type: FactType::Other,
            fact_value: String::new(),
            context: String::new(),
            confidence: 0.8,
            entity_normalized: None,
            due_date: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FactsExtraction {
    facts: Vec<ExtractedFact>,
}

const FACTS_SYSTEM_PROMPT: &str = "\
You are an expert at extracting structured facts from emails and documents.
Your goal is to identify key business information that users might search for later.

## What to Extract

### Key Details (ALWAYS extract when present)
- tax_id: EIN, TIN, VAT numbers.
- business_number: Registration numbers, company IDs, license numbers.
- account_number: Bank accounts, customer IDs, membership numbers.
- amount: Dollar amounts, prices, totals, invoices. Normalize to numeric (e.g. \"$1,234.56\" -> \"1234.56\").
- address: Physical or mailing addresses. Include the full address.
- phone: Phone numbers, normalized to E.164 when possible.
- deadline: Due dates, expiry dates, in ISO format (YYYY-MM-DD).
- person_name: Key contacts mentioned, with context about who they are.
- company_name: Organizations, vendors, clients discussed.
- contract_number: Agreement IDs, PO numbers, reference numbers.

### Action Items (extract when the user needs to act)
- decision: Someone is asking the user to make a choice or provide input.
- commitment: The user promised to do something specific.
- action_item: A task mentioned that the user should be aware of.

### Observations (for patterns and learning)
- preference: User preferences mentioned (preferred times, methods, etc.)
- relationship: Organizational relationships, reporting structures.
- pattern: Recurring patterns (weekly meetings, monthly reports).

## Guidelines
For each fact, return fact_value (the actual value), context (1-2 sentences of
surrounding text), confidence (0.0-1.0, lower for ambiguous content),
entity_normalized where applicable, and due_date only for deadlines and
commitments with dates.

## What NOT to Extract
Generic greetings or closings, already-known user information, boilerplate
template text, marketing copy, and anything obvious from the email metadata.

Return an empty list if no significant facts are found.";

async fn run_extraction(llm: &dyn LlmClient, content: &str) -> Vec<ExtractedFact> {
    if content.trim().len() < MIN_CONTENT_LEN {
        return Vec::new();
    }

    let request = CompletionRequest {
        model: SETTINGS.facts_model.clone(),
        system_prompt: FACTS_SYSTEM_PROMPT.to_string(),
        user_prompt: content.to_string(),
        json_schema_hint: Some("FactsExtraction".to_string()),
    };

    match llm.complete(request).await {
        Ok(response) => serde_json::from_str::<FactsExtraction>(&response.text).unwrap_or_default().facts,
        Err(e) => {
            warn!(error = %e, "facts extraction failed");
            Vec::new()
        }
    }
}

/// Extracts facts from an email and persists them, per spec.md §6
/// `extract_facts`. Grounded on
/// `original_source/src/facts.py::FactsExtractor.extract_from_email`.
pub async fn extract_from_email(
    llm: &dyn LlmClient,
    email_id: &str,
    body: &str,
    subject: Option<&str>,
    sender: Option<&str>,
    now: i64,
) -> InboxResult<usize> {
    let mut context = String::new();
    if let Some(subject) = subject {
        context.push_str(&format!("Subject: {subject}\n"));
    }
    if let Some(sender) = sender {
        context.push_str(&format!("From: {sender}\n"));
    }
    context.push('\n');
    context.push_str(body);

    let facts = run_extraction(llm, &context).await;
    crate::modules::db::repo::facts::store_batch("email".to_string(), email_id.to_string(), facts, now).await
}

/// Extracts facts from attachment-extracted text and persists them.
/// Grounded on
/// `original_source/src/facts.py::FactsExtractor.extract_from_attachment`.
pub async fn extract_from_attachment(
    llm: &dyn LlmClient,
    attachment_id: &str,
    extracted_text: &str,
    filename: Option<&str>,
    now: i64,
) -> InboxResult<usize> {
    let mut context = String::new();
    if let Some(filename) = filename {
        context.push_str(&format!("Document: {filename}\n"));
    }
    context.push('\n');
    let truncated: String = extracted_text.chars().take(MAX_ATTACHMENT_CHARS).collect();
    context.push_str(&truncated);

    let facts = run_extraction(llm, &context).await;
    crate::modules::db::repo::facts::store_batch("attachment".to_string(), attachment_id.to_string(), facts, now)
        .await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::modules::error::InboxResult as Result;
    use crate::modules::llm::CompletionResponse;
    use crate::modules::settings::dir::DATA_DIR_MANAGER;

    struct StubLlm(&'static str);

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse { text: self.0.to_string() })
        }
    }

    #[tokio::test]
    async fn short_content_is_skipped_without_calling_the_llm() {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.outbox_dir).unwrap();
        let llm = StubLlm(r#"{"facts": [{"fact_type": "amount", "fact_value": "1", "context": "x"}]}"#);
        let stored = extract_from_email(&llm, "facts-mod-test-1", "too short", None, None, 1).await.unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn well_formed_response_is_stored_per_fact() {
        let llm = StubLlm(
            r#"{"facts": [
                {"fact_type": "tax_id", "fact_value": "12-3456789", "context": "EIN on the invoice", "confidence": 0.95},
                {"fact_type": "deadline", "fact_value": "2026-08-01", "context": "payment due", "confidence": 0.9, "due_date": 1785000000}
            ]}"#,
        );
        let body = "Please find attached the invoice with our EIN 12-3456789, payment due 2026-08-01.";
        let stored = extract_from_email(&llm, "facts-mod-test-2", body, Some("Invoice"), Some("ap@acme.com"), 5)
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let loaded = crate::modules::db::repo::facts::for_source("email".to_string(), "facts-mod-test-2".to_string())
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|f| f.fact_type == FactType::TaxId));
    }
}
