//! Reconcile service
//!
//! Owns the single task that drives the [`Reconciler`]: periodic scans and
//! gateway voice updates both arrive here and are processed one at a time.

use crate::notify::{Reconciler, VoiceObservation, VoiceSource};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info};

/// Capacity of the request channel
pub const REQUEST_BUFFER: usize = 100;

/// Requests accepted by the reconcile task
#[derive(Debug, Clone)]
pub enum ReconcileRequest {
    /// Run a full scan now instead of waiting for the next tick
    ScanNow,
    /// A member's voice state changed
    VoiceUpdate(VoiceObservation),
    /// Stop after the work in progress
    Shutdown,
}

/// Entry point for the reconcile task
pub struct ReconcileService;

impl ReconcileService {
    /// Create the request channel
    #[must_use]
    pub fn channel() -> (Sender<ReconcileRequest>, Receiver<ReconcileRequest>) {
        mpsc::channel(REQUEST_BUFFER)
    }

    /// Spawn the reconcile loop
    pub fn spawn(
        reconciler: Arc<Reconciler>,
        source: Arc<dyn VoiceSource>,
        rx: Receiver<ReconcileRequest>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            Self::run(&reconciler, source.as_ref(), rx, interval).await;
        })
    }

    /// The loop itself. Every arm awaits its work before the next request
    /// or tick is taken, so scans never overlap and voice updates never
    /// interleave with a scan.
    pub async fn run(
        reconciler: &Reconciler,
        source: &dyn VoiceSource,
        mut rx: Receiver<ReconcileRequest>,
        interval: Duration,
    ) {
        info!("Starting mute status task with {}ms interval", interval.as_millis());

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                request = rx.recv() => {
                    match request {
                        Some(ReconcileRequest::ScanNow) => {
                            info!("Received request to scan mute status");
                            reconciler.tick(source).await;
                        }
                        Some(ReconcileRequest::VoiceUpdate(observation)) => {
                            if let Err(e) = reconciler.handle_voice_update(&observation).await {
                                error!(
                                    target: crate::ERROR_TARGET,
                                    user_id = observation.user_id,
                                    kind = e.kind(),
                                    error = %e,
                                    "Error handling voice state update"
                                );
                            }
                        }
                        Some(ReconcileRequest::Shutdown) => {
                            info!("Received shutdown request for mute status task");
                            break;
                        }
                        None => {
                            info!("Mute status request channel closed");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    reconciler.tick(source).await;
                }
            }
        }

        info!("Mute status task shut down");
    }
}
