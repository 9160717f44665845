use clap::{Parser, ValueEnum};
use std::sync::LazyLock;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

/// Every item enumerated in spec.md §6 "Configuration", plus the ambient
/// process-level fields the teacher always carries regardless of what
/// the spec's Non-goals exclude (log level/destination, root data dir).
#[derive(Debug, Parser)]
#[clap(
    name = "inboxd",
    about = "Inbox intelligence engine: mirrors a Graph mailbox, maintains working memory, emits triggers.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    #[clap(long, env, default_value = "info")]
    pub inboxd_log_level: String,

    #[clap(long, env, default_value = "false")]
    pub inboxd_log_to_file: bool,

    #[clap(long, env, default_value = "true")]
    pub inboxd_ansi_logs: bool,

    #[clap(long, env, default_value = "5")]
    pub inboxd_max_log_files: usize,

    /// Mailbox identity this process replicates. Required; missing is a
    /// fatal configuration error (spec.md §7.6).
    #[clap(long, env)]
    pub delegated_user: Option<String>,

    #[clap(long, env)]
    pub aech_user_dir: Option<String>,

    #[clap(long, env)]
    pub inbox_state_dir: Option<String>,

    #[clap(long, env)]
    pub inbox_db_path: Option<String>,

    #[clap(long, env, default_value = "aa_")]
    pub folder_prefix: String,

    #[clap(long, env, default_value = "medium")]
    pub cleanup_strategy: CleanupStrategy,

    #[clap(long, env, default_value = "5")]
    pub poll_interval: u64,

    #[clap(long, env, default_value = "local-embedding")]
    pub embedding_model: String,

    #[clap(long, env, default_value = "8")]
    pub embedding_batch_size: usize,

    /// OpenAI-compatible embeddings endpoint. Defaults to a local
    /// text-embeddings server rather than a hosted provider, matching
    /// `embedding_model`'s "local-embedding" default.
    #[clap(long, env, default_value = "http://localhost:8080/v1")]
    pub embedding_base_url: String,

    #[clap(long, env)]
    pub embedding_api_key: Option<String>,

    #[clap(long, env, default_value = "1024")]
    pub embedding_dimension: usize,

    #[clap(long, env, default_value = "3")]
    pub wm_stale_threshold_days: i64,

    #[clap(long, env, default_value = "2")]
    pub wm_urgency_escalation_days: i64,

    #[clap(long, env, default_value = "30")]
    pub wm_observation_retention_days: i64,

    #[clap(long, env, default_value = "2")]
    pub wm_reply_nudge_days: i64,

    #[clap(long, env, default_value = "3")]
    pub wm_decision_nudge_days: i64,

    #[clap(long, env, default_value = "2")]
    pub followup_n_days: i64,

    #[clap(long, env, default_value = "false")]
    pub enable_weekly_digest: bool,

    #[clap(long, env, default_value = "5")]
    pub digest_day: u32,

    #[clap(long, env, default_value = "08:00")]
    pub digest_time_local: String,

    #[clap(long, env, default_value = "UTC")]
    pub default_timezone: String,

    #[clap(long, env, default_value = "5")]
    pub attachment_worker_concurrency: usize,

    #[clap(long, env, default_value = "30")]
    pub graph_request_timeout_secs: u64,

    #[clap(long, env, default_value = "60")]
    pub attachment_extraction_timeout_secs: u64,

    #[clap(long, env, default_value = "classifier-model")]
    pub model_name: String,

    #[clap(long, env, default_value = "wm-model")]
    pub wm_model: String,

    #[clap(long, env, default_value = "alert-model")]
    pub alert_model: String,

    #[clap(long, env, default_value = "rule-parser-model")]
    pub rule_parser_model: String,

    #[clap(long, env, default_value = "facts-model")]
    pub facts_model: String,

    /// Bearer credential for the OpenAI-compatible completion endpoint.
    /// Missing is a fatal configuration error once any collaborator call
    /// is actually made (spec.md §7.6).
    #[clap(long, env)]
    pub llm_api_key: Option<String>,

    #[clap(long, env, default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    #[clap(long, env, default_value = "30")]
    pub llm_request_timeout_secs: u64,

    /// Azure AD tenant hosting the app registration used for the
    /// client-credentials flow. Required; missing is a fatal
    /// configuration error (spec.md §7.6).
    #[clap(long, env)]
    pub graph_tenant_id: Option<String>,

    #[clap(long, env)]
    pub graph_client_id: Option<String>,

    #[clap(long, env)]
    pub graph_client_secret: Option<String>,

    #[clap(long, env, default_value = "https://graph.microsoft.com/.default")]
    pub graph_scope: String,

    /// Cadence for the backlog-pull tickers spec.md leaves unspecified
    /// beyond `POLL_INTERVAL` (attachments/chunking/embedding/triage/WM
    /// engine) — each a fraction or multiple of the sync loop's own
    /// interval, not an independent protocol requirement.
    #[clap(long, env, default_value = "10")]
    pub attachment_poll_interval_secs: u64,

    #[clap(long, env, default_value = "15")]
    pub chunk_poll_interval_secs: u64,

    #[clap(long, env, default_value = "20")]
    pub embed_poll_interval_secs: u64,

    #[clap(long, env, default_value = "10")]
    pub triage_poll_interval_secs: u64,

    #[clap(long, env, default_value = "60")]
    pub wm_engine_interval_secs: u64,

    #[clap(long, env, default_value = "1000")]
    pub backlog_batch_limit: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CleanupStrategy {
    Low,
    Medium,
    Aggressive,
}

impl Settings {
    #[cfg(test)]
    fn new_for_test() -> Self {
        Self {
            inboxd_log_level: "info".into(),
            inboxd_log_to_file: false,
            inboxd_ansi_logs: false,
            inboxd_max_log_files: 5,
            delegated_user: Some("test-user@example.com".into()),
            aech_user_dir: None,
            inbox_state_dir: None,
            inbox_db_path: None,
            folder_prefix: "aa_".into(),
            cleanup_strategy: CleanupStrategy::Medium,
            poll_interval: 5,
            embedding_model: "local-embedding".into(),
            embedding_batch_size: 8,
            embedding_base_url: "http://localhost:8080/v1".into(),
            embedding_api_key: None,
            embedding_dimension: 1024,
            wm_stale_threshold_days: 3,
            wm_urgency_escalation_days: 2,
            wm_observation_retention_days: 30,
            wm_reply_nudge_days: 2,
            wm_decision_nudge_days: 3,
            followup_n_days: 2,
            enable_weekly_digest: false,
            digest_day: 5,
            digest_time_local: "08:00".into(),
            default_timezone: "UTC".into(),
            attachment_worker_concurrency: 5,
            graph_request_timeout_secs: 30,
            attachment_extraction_timeout_secs: 60,
            model_name: "classifier-model".into(),
            wm_model: "wm-model".into(),
            alert_model: "alert-model".into(),
            rule_parser_model: "rule-parser-model".into(),
            facts_model: "facts-model".into(),
            llm_api_key: Some("test-key".into()),
            llm_base_url: "https://api.openai.com/v1".into(),
            llm_request_timeout_secs: 30,
            graph_tenant_id: Some("test-tenant".into()),
            graph_client_id: Some("test-client".into()),
            graph_client_secret: Some("test-secret".into()),
            graph_scope: "https://graph.microsoft.com/.default".into(),
            attachment_poll_interval_secs: 10,
            chunk_poll_interval_secs: 15,
            embed_poll_interval_secs: 20,
            triage_poll_interval_secs: 10,
            wm_engine_interval_secs: 60,
            backlog_batch_limit: 1000,
        }
    }
}
