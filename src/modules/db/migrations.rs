use rusqlite_migration::{Migrations, M};

/// Additive-only schema, per spec.md §4.1 ("Schema is idempotent-
/// initialized at startup; missing columns are added in place
/// (additive migrations only)"). Table shapes, FTS5 virtual tables and
/// trigger bodies are grounded on
/// `examples/original_source/src/database.py::init_db` /
/// `_ensure_fts`; the `rusqlite_migration::Migrations`/`M::up` mechanism
/// itself is grounded on
/// `examples/hunterclarke-cosmos/crates/mail/src/storage/sqlite.rs`.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(INITIAL_SCHEMA), M::up(FTS_SCHEMA)])
}

const INITIAL_SCHEMA: &str = r#"
-- §3 Messages
CREATE TABLE emails (
    id TEXT PRIMARY KEY,
    conversation_id TEXT,
    internet_message_id TEXT,
    subject TEXT,
    sender TEXT,
    to_emails TEXT NOT NULL DEFAULT '[]',
    cc_emails TEXT NOT NULL DEFAULT '[]',
    received_at INTEGER,
    body_preview TEXT,
    body_html TEXT,
    body_markdown TEXT,
    extracted_signature TEXT,
    thread_summary TEXT,
    suggested_action TEXT,
    has_attachments INTEGER NOT NULL DEFAULT 0,
    is_read INTEGER NOT NULL DEFAULT 0,
    folder_id TEXT,
    etag TEXT,
    body_hash TEXT,
    category TEXT,
    processed_at INTEGER,
    web_link TEXT,
    synced_at INTEGER
);
CREATE INDEX idx_emails_conversation ON emails(conversation_id);
CREATE INDEX idx_emails_folder ON emails(folder_id);
CREATE INDEX idx_emails_processed ON emails(processed_at);

CREATE TABLE folders (
    id TEXT PRIMARY KEY,
    display_name TEXT,
    total_item_count INTEGER
);

CREATE TABLE sync_state (
    folder_id TEXT PRIMARY KEY,
    delta_link TEXT,
    last_sync_at INTEGER,
    sync_kind TEXT,
    messages_synced INTEGER NOT NULL DEFAULT 0
);

-- §3 Attachments
CREATE TABLE attachments (
    id TEXT PRIMARY KEY,
    email_id TEXT NOT NULL,
    filename TEXT,
    content_type TEXT,
    size_bytes INTEGER,
    content_hash TEXT,
    extracted_text TEXT,
    extraction_status TEXT NOT NULL DEFAULT 'pending',
    extraction_error TEXT,
    downloaded_at INTEGER,
    extracted_at INTEGER,
    FOREIGN KEY(email_id) REFERENCES emails(id) ON DELETE CASCADE
);
CREATE INDEX idx_attachments_email ON attachments(email_id);
CREATE INDEX idx_attachments_hash ON attachments(content_hash);
CREATE INDEX idx_attachments_status ON attachments(extraction_status);

-- §3 Chunks
CREATE TABLE chunks (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    char_offset_start INTEGER,
    char_offset_end INTEGER,
    metadata_json TEXT,
    embedding BLOB,
    created_at INTEGER,
    UNIQUE(source_type, source_id, chunk_index)
);
CREATE INDEX idx_chunks_source ON chunks(source_type, source_id);
CREATE INDEX idx_chunks_pending_embedding ON chunks(id) WHERE embedding IS NULL;

-- triage log (append-only)
CREATE TABLE triage_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email_id TEXT NOT NULL,
    action TEXT NOT NULL,
    destination_folder TEXT,
    reason TEXT,
    timestamp INTEGER NOT NULL,
    FOREIGN KEY(email_id) REFERENCES emails(id) ON DELETE CASCADE
);

CREATE TABLE labels (
    message_id TEXT NOT NULL,
    label TEXT NOT NULL,
    confidence REAL,
    created_at INTEGER,
    PRIMARY KEY(message_id, label),
    FOREIGN KEY(message_id) REFERENCES emails(id) ON DELETE CASCADE
);

CREATE TABLE reply_tracking (
    message_id TEXT PRIMARY KEY,
    requires_reply INTEGER NOT NULL,
    reason TEXT,
    last_activity_at INTEGER,
    nudge_scheduled_at INTEGER,
    follow_up_sent_at INTEGER,
    FOREIGN KEY(message_id) REFERENCES emails(id) ON DELETE CASCADE
);

CREATE TABLE user_preferences (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at INTEGER
);

CREATE TABLE weekly_digest_log (
    iso_year INTEGER NOT NULL,
    iso_week INTEGER NOT NULL,
    emitted_at INTEGER NOT NULL,
    PRIMARY KEY(iso_year, iso_week)
);

-- §3 Working memory
CREATE TABLE threads (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL UNIQUE,
    subject TEXT,
    participants_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'active',
    urgency TEXT NOT NULL DEFAULT 'someday',
    started_at INTEGER,
    last_activity_at INTEGER,
    message_count INTEGER NOT NULL DEFAULT 0,
    user_is_cc INTEGER NOT NULL DEFAULT 0,
    needs_reply INTEGER NOT NULL DEFAULT 0,
    reply_deadline INTEGER,
    labels_json TEXT NOT NULL DEFAULT '[]',
    project_refs_json TEXT NOT NULL DEFAULT '[]',
    latest_message_id TEXT,
    latest_web_link TEXT,
    summary TEXT,
    key_points_json TEXT NOT NULL DEFAULT '[]',
    pending_questions_json TEXT NOT NULL DEFAULT '[]',
    updated_at INTEGER
);
CREATE INDEX idx_threads_status ON threads(status);
CREATE INDEX idx_threads_last_activity ON threads(last_activity_at);

CREATE TABLE contacts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    organization TEXT,
    relationship TEXT NOT NULL DEFAULT 'unknown',
    first_seen_at INTEGER,
    last_interaction_at INTEGER,
    total_count INTEGER NOT NULL DEFAULT 0,
    they_initiated_count INTEGER NOT NULL DEFAULT 0,
    user_initiated_count INTEGER NOT NULL DEFAULT 0,
    cc_count INTEGER NOT NULL DEFAULT 0,
    is_internal INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER
);

CREATE TABLE projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_lower TEXT NOT NULL UNIQUE,
    related_threads_json TEXT NOT NULL DEFAULT '[]',
    confidence REAL NOT NULL DEFAULT 0.3,
    first_mentioned_at INTEGER,
    last_activity_at INTEGER,
    updated_at INTEGER
);

CREATE TABLE observations (
    id TEXT PRIMARY KEY,
    observation_type TEXT NOT NULL,
    content TEXT,
    source_message_id TEXT,
    confidence REAL,
    observed_at INTEGER,
    updated_at INTEGER
);
CREATE INDEX idx_observations_observed_at ON observations(observed_at);

CREATE TABLE pending_decisions (
    id TEXT PRIMARY KEY,
    question TEXT,
    context TEXT,
    options_json TEXT NOT NULL DEFAULT '[]',
    source TEXT,
    requester TEXT,
    urgency TEXT NOT NULL DEFAULT 'this_week',
    deadline INTEGER,
    is_resolved INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER
);
CREATE INDEX idx_decisions_resolved ON pending_decisions(is_resolved);

CREATE TABLE commitments (
    id TEXT PRIMARY KEY,
    description TEXT,
    to_whom TEXT,
    source TEXT,
    committed_at INTEGER,
    due_by INTEGER,
    is_completed INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER
);
CREATE INDEX idx_commitments_completed ON commitments(is_completed);

-- §3 Facts (flat, polymorphic)
CREATE TABLE facts (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    fact_type TEXT NOT NULL,
    fact_value TEXT,
    context TEXT,
    confidence REAL,
    entity_normalized TEXT,
    due_date INTEGER,
    status TEXT NOT NULL DEFAULT 'active',
    created_at INTEGER
);
CREATE INDEX idx_facts_source ON facts(source_type, source_id);
CREATE INDEX idx_facts_type ON facts(fact_type);

-- §3 Alert rules / triggers
CREATE TABLE alert_rules (
    id TEXT PRIMARY KEY,
    rule_text TEXT NOT NULL,
    conditions_json TEXT NOT NULL,
    event_types_json TEXT NOT NULL DEFAULT '[]',
    channel TEXT,
    target TEXT,
    cooldown_secs INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_triggered_at INTEGER,
    trigger_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER
);

CREATE TABLE alert_triggers (
    id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_id TEXT NOT NULL,
    match_reason TEXT,
    created_at INTEGER,
    UNIQUE(rule_id, event_type, event_id),
    FOREIGN KEY(rule_id) REFERENCES alert_rules(id) ON DELETE CASCADE
);

-- §6 trigger emitter dedupe ledger
CREATE TABLE trigger_ledger (
    dedupe_key TEXT PRIMARY KEY,
    trigger_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

const FTS_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE emails_fts USING fts5(
    id UNINDEXED,
    subject,
    body_text,
    sender,
    tokenize = 'porter'
);

CREATE TRIGGER emails_ai_fts AFTER INSERT ON emails BEGIN
    INSERT OR REPLACE INTO emails_fts(id, subject, body_text, sender)
    VALUES (new.id, new.subject, COALESCE(new.body_markdown, new.body_preview), new.sender);
END;

CREATE TRIGGER emails_ad_fts AFTER DELETE ON emails BEGIN
    DELETE FROM emails_fts WHERE id = old.id;
END;

CREATE TRIGGER emails_au_fts AFTER UPDATE ON emails BEGIN
    DELETE FROM emails_fts WHERE id = old.id;
    INSERT OR REPLACE INTO emails_fts(id, subject, body_text, sender)
    VALUES (new.id, new.subject, COALESCE(new.body_markdown, new.body_preview), new.sender);
END;

CREATE VIRTUAL TABLE chunks_fts USING fts5(
    id UNINDEXED,
    content,
    tokenize = 'porter'
);

CREATE TRIGGER chunks_ai_fts AFTER INSERT ON chunks BEGIN
    INSERT OR REPLACE INTO chunks_fts(id, content) VALUES (new.id, new.content);
END;

CREATE TRIGGER chunks_ad_fts AFTER DELETE ON chunks BEGIN
    DELETE FROM chunks_fts WHERE id = old.id;
END;

CREATE TRIGGER chunks_au_fts AFTER UPDATE ON chunks BEGIN
    DELETE FROM chunks_fts WHERE id = old.id;
    INSERT OR REPLACE INTO chunks_fts(id, content) VALUES (new.id, new.content);
END;
"#;
