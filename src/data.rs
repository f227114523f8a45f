use std::{ops::Deref, sync::Arc};

use crate::config::BotConfig;
use crate::notify::{NotifyRepository, ReconcileRequest, Reconciler, YamlNotifyRepository};
use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;
use tokio::sync::mpsc::Sender;
use tracing::error;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("reconciler", &self.reconciler)
            .field("reconcile_tx", &self.reconcile_tx)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Wire up the shared state from an already loaded config
    #[must_use]
    pub fn new(
        config: Arc<BotConfig>,
        repository: Arc<dyn NotifyRepository>,
        reconcile_tx: Sender<ReconcileRequest>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&config),
            Arc::clone(&repository),
        ));
        Self(Arc::new(DataInner {
            config,
            repository,
            reconciler,
            reconcile_tx,
        }))
    }

    /// Data backed by the YAML store named in the config
    #[must_use]
    pub fn with_yaml_store(config: Arc<BotConfig>, reconcile_tx: Sender<ReconcileRequest>) -> Self {
        let repository = Arc::new(YamlNotifyRepository::new(config.notify_db.clone()));
        Self::new(config, repository, reconcile_tx)
    }

    /// Queue a request for the reconcile task, logging if it is gone
    pub async fn send_reconcile(&self, request: ReconcileRequest) {
        if let Err(e) = self.reconcile_tx.send(request).await {
            error!("Failed to send mute status request: {e}");
        }
    }
}

/// Main centralized data structure for the bot
pub struct DataInner {
    pub config: Arc<BotConfig>,
    // Store of users with mute notifications enabled
    pub repository: Arc<dyn NotifyRepository>,
    pub reconciler: Arc<Reconciler>,
    // Channel to the reconcile task
    pub reconcile_tx: Sender<ReconcileRequest>,
}

/// Tests for the data module
#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MemoryNotifyRepository, ReconcileService, StatusCode};

    #[test]
    fn test_data_new() {
        let (tx, _rx) = ReconcileService::channel();
        let data = Data::new(
            Arc::new(BotConfig::default()),
            Arc::new(MemoryNotifyRepository::new()),
            tx,
        );
        assert!(data.config.rules.is_empty());
        assert_eq!(data.reconciler.status_of(1), StatusCode::Unknown);
    }

    #[test]
    fn test_data_debug_impl() {
        let (tx, _rx) = ReconcileService::channel();
        let data = Data::with_yaml_store(Arc::new(BotConfig::default()), tx);
        let debug_output = format!("{:?}", data);
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("config"));
        assert!(debug_output.contains("reconciler"));
    }

    #[tokio::test]
    async fn test_send_reconcile() {
        let (tx, mut rx) = ReconcileService::channel();
        let data = Data::new(
            Arc::new(BotConfig::default()),
            Arc::new(MemoryNotifyRepository::new()),
            tx,
        );
        data.send_reconcile(ReconcileRequest::ScanNow).await;
        assert!(matches!(rx.recv().await, Some(ReconcileRequest::ScanNow)));

        drop(rx);
        // Closed channel is logged, not a panic
        data.send_reconcile(ReconcileRequest::ScanNow).await;
    }
}
