use std::sync::LazyLock;

use crate::modules::{context::Initialize, error::InboxResult, utils::shutdown::shutdown_signal};
use tokio::sync::broadcast;
use tracing::info;

pub static SIGNAL_MANAGER: LazyLock<SignalManager> = LazyLock::new(SignalManager::new);

/// Broadcasts a single shutdown event to every periodic task and worker
/// pool so in-flight transactions can finish before the process exits,
/// per spec.md §5 ("Cancellation & timeouts").
pub struct SignalManager {
    sender: broadcast::Sender<()>,
}

impl SignalManager {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        SignalManager { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }
}

impl Initialize for SignalManager {
    async fn initialize() -> InboxResult<()> {
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining in-flight work...");
            let _ = SIGNAL_MANAGER.sender.send(());
        });
        Ok(())
    }
}
