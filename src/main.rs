use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tracing::info;

use modules::attachments;
use modules::chunker;
use modules::common::signal::SignalManager;
use modules::context::Initialize;
use modules::db::manager::Db;
use modules::db::query_library;
use modules::embedder;
use modules::embedding::openai::OpenAiEmbeddingModel;
use modules::error::InboxResult;
use modules::graph::client::OutlookGraphClient;
use modules::graph::token::GraphTokenProvider;
use modules::llm::openai::OpenAiClient;
use modules::logger;
use modules::metrics;
use modules::replicator;
use modules::scheduler::periodic::PeriodicTask;
use modules::settings::cli::SETTINGS;
use modules::settings::dir::{require_delegated_user, DataDirManager};
use modules::status;
use modules::tasks::queue::WorkerPool;
use modules::triage;
use modules::wm_engine;

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  ___       _               _     _
 |_ _|_ __ | |__   _____  _| | __| |
  | || '_ \| '_ \ / _ \ \/ / |/ _` |
  | || | | | |_) | (_) >  <| | (_| |
 |___|_| |_|_.__/ \___/_/\_\_|\__,_|
"#;

#[tokio::main]
async fn main() -> InboxResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting inboxd");
    info!("Version: {}", inboxd_version!());

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    run().await
}

/// Boots every process-wide singleton, in the order each depends on the
/// last (signal broadcaster, then data dir, then metrics registry, then
/// the database — which migrates on open), per spec.md §9 ("Global
/// state").
async fn initialize() -> InboxResult<()> {
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    query_library::ensure_query_library()?;
    metrics::initialize();
    Db::initialize().await?;
    Ok(())
}

/// Wires the collaborators (Graph, LLM, embedding) and starts every
/// periodic task described in spec.md §5 "Scheduling", then blocks
/// until a shutdown signal drains them.
async fn run() -> InboxResult<()> {
    let user = require_delegated_user()?;

    let tokens = Arc::new(GraphTokenProvider::new()?);
    let graph: Arc<dyn modules::graph::GraphClient> = Arc::new(OutlookGraphClient::new(tokens)?);
    let llm: Arc<dyn modules::llm::LlmClient> = Arc::new(OpenAiClient::from_settings()?);
    let embedding_model: Arc<dyn modules::embedding::EmbeddingModel> =
        Arc::new(OpenAiEmbeddingModel::from_settings()?);
    let attachment_pool = Arc::new(WorkerPool::new(SETTINGS.attachment_worker_concurrency));

    let mut handles = Vec::new();

    handles.push({
        let graph = graph.clone();
        PeriodicTask::new("graph-sync").start(
            move || {
                let graph = graph.clone();
                async move { replicator::sync_all_folders(graph.as_ref()).await }
            },
            Duration::from_secs(SETTINGS.poll_interval),
            true,
            true,
        )
    });

    handles.push({
        let graph = graph.clone();
        let pool = attachment_pool.clone();
        PeriodicTask::new("attachment-worker").start(
            move || {
                let graph = graph.clone();
                let pool = pool.clone();
                async move {
                    attachments::process_pending(graph.clone(), pool.as_ref(), SETTINGS.backlog_batch_limit).await
                }
            },
            Duration::from_secs(SETTINGS.attachment_poll_interval_secs),
            true,
            false,
        )
    });

    handles.push(PeriodicTask::new("chunker").start(
        || async move {
            chunker::process_unindexed_messages(SETTINGS.backlog_batch_limit).await?;
            chunker::process_unindexed_attachments(SETTINGS.backlog_batch_limit).await?;
            Ok(())
        },
        Duration::from_secs(SETTINGS.chunk_poll_interval_secs),
        true,
        false,
    ));

    handles.push({
        let embedding_model = embedding_model.clone();
        PeriodicTask::new("embedder").start(
            move || {
                let embedding_model = embedding_model.clone();
                async move {
                    embedder::embed_pending_chunks(embedding_model.as_ref(), SETTINGS.backlog_batch_limit, |_, _| {})
                        .await?;
                    Ok(())
                }
            },
            Duration::from_secs(SETTINGS.embed_poll_interval_secs),
            true,
            false,
        )
    });

    handles.push({
        let graph = graph.clone();
        let llm = llm.clone();
        let user = user.clone();
        PeriodicTask::new("triage").start(
            move || {
                let graph = graph.clone();
                let llm = llm.clone();
                let user = user.clone();
                async move {
                    triage::process_pending(graph.as_ref(), llm.as_ref(), &user, SETTINGS.backlog_batch_limit).await;
                    triage::emit_followup_triggers(&user).await?;
                    triage::emit_weekly_digest_trigger(&user).await?;
                    Ok(())
                }
            },
            Duration::from_secs(SETTINGS.triage_poll_interval_secs),
            true,
            false,
        )
    });

    handles.push({
        let llm = llm.clone();
        let user = user.clone();
        PeriodicTask::new("wm-engine").start(
            move || {
                let llm = llm.clone();
                let user = user.clone();
                async move {
                    wm_engine::run_cycle(&user, llm.as_ref()).await?;
                    Ok(())
                }
            },
            Duration::from_secs(SETTINGS.wm_engine_interval_secs),
            true,
            false,
        )
    });

    handles.push(PeriodicTask::new("status-log").start(
        || async move {
            let snapshot = status::snapshot();
            info!(
                messages_upserted = snapshot.messages_upserted,
                chunks_created = snapshot.chunks_created,
                "status snapshot"
            );
            Ok(())
        },
        Duration::from_secs(300),
        true,
        false,
    ));

    modules::utils::shutdown::shutdown_signal().await;
    info!("shutdown requested, draining periodic tasks...");
    for handle in handles {
        handle.cancel().await;
    }
    info!("inboxd stopped");
    Ok(())
}
