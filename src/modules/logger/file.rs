use crate::modules::logger::validate_log_level;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

pub static LOG_WORKER_GUARD: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

pub fn setup_file_logger() -> Result<(), tracing::dispatcher::SetGlobalDefaultError> {
    validate_log_level(&SETTINGS.inboxd_log_level);
    let level = SETTINGS.inboxd_log_level.parse::<Level>().unwrap();

    let (nonb, guard) = server_log_writer();
    let _ = LOG_WORKER_GUARD.set(vec![guard]);

    let layer = fmt::layer()
        .with_timer(super::LocalTimer)
        .with_ansi(SETTINGS.inboxd_ansi_logs)
        .with_level(true)
        .with_writer(nonb)
        .with_target(true);

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(layer);

    tracing::subscriber::set_global_default(subscriber)
}

fn server_log_writer() -> (NonBlocking, WorkerGuard) {
    let rolling = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("inboxd")
        .max_log_files(SETTINGS.inboxd_max_log_files)
        .build(DATA_DIR_MANAGER.log_dir.clone())
        .expect("failed to initialize rolling file appender");
    tracing_appender::non_blocking(rolling)
}
