use std::sync::LazyLock;

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

/// Ambient observability (spec.md §9 design notes carry this regardless
/// of the CLI/admin Non-goal), mirroring the teacher's
/// `RUSTMAILER_EVENT_DISPATCH_TOTAL_BY_TYPE_STATUS_AND_DESTINATION`
/// pattern: counters/gauges keyed by component and outcome, exposed only
/// through `gather()` for the in-process status snapshot and tests.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static SYNC_PAGES_FETCHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_sync_pages_fetched_total",
        "Graph pages fetched by folder and sync kind",
        &["folder_id", "kind"],
    )
});

pub static MESSAGES_UPSERTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_messages_upserted_total",
        "Messages upserted by the replicator",
        &["folder_id"],
    )
});

pub static ATTACHMENTS_BY_STATUS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_attachments_by_status_total",
        "Attachment extraction outcomes",
        &["status"],
    )
});

pub static CHUNKS_CREATED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_chunks_created_total",
        "Chunks created by source type",
        &["source_type"],
    )
});

pub static EMBEDDINGS_WRITTEN: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_embeddings_written_total",
        "Embeddings written, by outcome",
        &["outcome"],
    )
});

pub static TRIGGERS_EMITTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_triggers_emitted_total",
        "Triggers emitted by type",
        &["trigger_type"],
    )
});

pub static ALERT_EVALUATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_counter(
        "inboxd_alert_evaluations_total",
        "Alert rule evaluations by outcome",
        &["outcome"],
    )
});

pub static PENDING_GAUGES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_gauge(
        "inboxd_pending",
        "Pending work items by queue",
        &["queue"],
    )
});

fn register_counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("valid metric");
    let _ = REGISTRY.register(Box::new(counter.clone()));
    counter
}

fn register_gauge(name: &str, help: &str, labels: &[&str]) -> IntGaugeVec {
    let gauge = IntGaugeVec::new(Opts::new(name, help), labels).expect("valid metric");
    let _ = REGISTRY.register(Box::new(gauge.clone()));
    gauge
}

pub fn initialize() {
    LazyLock::force(&SYNC_PAGES_FETCHED);
    LazyLock::force(&MESSAGES_UPSERTED);
    LazyLock::force(&ATTACHMENTS_BY_STATUS);
    LazyLock::force(&CHUNKS_CREATED);
    LazyLock::force(&EMBEDDINGS_WRITTEN);
    LazyLock::force(&TRIGGERS_EMITTED);
    LazyLock::force(&ALERT_EVALUATIONS);
    LazyLock::force(&PENDING_GAUGES);
}
