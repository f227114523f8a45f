//! Mute status reconciliation
//!
//! The [`Reconciler`] keeps the last status it saw for each watched user and
//! compares fresh observations against it. Only a change produces a
//! [`Transition`], and every transition is handed to the output rules bound
//! to that user.
//!
//! Two paths feed it: [`Reconciler::tick`] scans every configured guild,
//! [`Reconciler::handle_voice_update`] handles one gateway event. Both use
//! [`StatusMap::observe`], which updates the map in the same step that
//! reports the change, so a transition is claimed exactly once no matter
//! which path sees it first.

use crate::config::BotConfig;
use crate::notify::{
    NotifyRepository, NotifyResult, OutputRule, StatusCode, VoiceObservation, VoiceSource,
    rules_for_user,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Last observed status per user, `Unknown` for users never seen
#[derive(Debug, Default)]
pub struct StatusMap {
    statuses: DashMap<u64, StatusCode>,
}

impl StatusMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status last recorded for `user_id`
    #[must_use]
    pub fn get(&self, user_id: u64) -> StatusCode {
        self.statuses
            .get(&user_id)
            .map_or(StatusCode::Unknown, |entry| *entry.value())
    }

    /// Record `status` for `user_id`, returning the previous status if it
    /// changed. The comparison and the update happen under the entry lock.
    pub fn observe(&self, user_id: u64, status: StatusCode) -> Option<StatusCode> {
        match self.statuses.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let previous = *entry.get();
                if previous == status {
                    None
                } else {
                    entry.insert(status);
                    Some(previous)
                }
            }
            Entry::Vacant(entry) => {
                if status == StatusCode::Unknown {
                    None
                } else {
                    entry.insert(status);
                    Some(StatusCode::Unknown)
                }
            }
        }
    }

    /// Drop what we know about `user_id`
    pub fn forget(&self, user_id: u64) {
        self.statuses.remove(&user_id);
    }

    /// Number of users with a recorded status
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }
}

/// A confirmed status change for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub user_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub previous: StatusCode,
    pub status: StatusCode,
    pub observed_at: DateTime<Utc>,
}

impl Transition {
    #[must_use]
    pub fn muted(&self) -> bool {
        self.status.is_muted()
    }
}

/// Outcome of one broadcast batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Rule applications started
    pub dispatched: usize,
    /// Rule applications that returned an error or panicked
    pub failed: usize,
}

/// Outcome of one full scan
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub transitions: Vec<Transition>,
    pub broadcast: BroadcastReport,
}

/// Diff-then-broadcast engine shared by the timer and the event handler
pub struct Reconciler {
    config: Arc<BotConfig>,
    repository: Arc<dyn NotifyRepository>,
    statuses: StatusMap,
    /// Held for the whole duration of a tick
    tick_guard: Mutex<()>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("listening_guilds", &self.config.listening_guilds)
            .field("rules", &self.config.rules.len())
            .field("statuses", &self.statuses)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(config: Arc<BotConfig>, repository: Arc<dyn NotifyRepository>) -> Self {
        Self {
            config,
            repository,
            statuses: StatusMap::new(),
            tick_guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn status_of(&self, user_id: u64) -> StatusCode {
        self.statuses.get(user_id)
    }

    /// Forget the last status of `user_id`; the next observation counts as
    /// a transition
    pub fn forget(&self, user_id: u64) {
        self.statuses.forget(user_id);
    }

    /// Run one scan and broadcast its transitions.
    ///
    /// Returns `None` without doing anything if another tick is still
    /// running. Failures are logged here and never returned.
    pub async fn tick(&self, source: &dyn VoiceSource) -> Option<TickReport> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            warn!("Previous mute status scan still running, skipping tick");
            return None;
        };

        let transitions = match self.scan(source).await {
            Ok(transitions) => transitions,
            Err(e) => {
                error!(
                    target: crate::ERROR_TARGET,
                    kind = e.kind(),
                    error = %e,
                    "Mute status scan failed"
                );
                return Some(TickReport::default());
            }
        };

        let broadcast = self.broadcast(&transitions).await;
        Some(TickReport {
            transitions,
            broadcast,
        })
    }

    /// Compare every watched member in every listening guild against the
    /// status map, recording and returning the changes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the watched-user set cannot be read. Guilds
    /// and channels that cannot be listed are logged and skipped.
    pub async fn scan(&self, source: &dyn VoiceSource) -> NotifyResult<Vec<Transition>> {
        let watched = self.repository.get_users().await?;
        let mut transitions = Vec::new();
        if watched.is_empty() {
            return Ok(transitions);
        }

        for &guild_id in &self.config.listening_guilds {
            let channels = match source.voice_channels(guild_id).await {
                Ok(channels) => channels,
                Err(e) => {
                    warn!(guild_id, error = %e, "Unable to list voice channels");
                    continue;
                }
            };
            for channel_id in channels {
                let members = match source.channel_members(guild_id, channel_id).await {
                    Ok(members) => members,
                    Err(e) => {
                        warn!(guild_id, channel_id, error = %e, "Unable to list voice members");
                        continue;
                    }
                };
                transitions.extend(
                    members
                        .iter()
                        .filter_map(|member| self.record(&watched, member)),
                );
            }
        }

        debug!(
            count = transitions.len(),
            tracked = self.statuses.len(),
            "Mute status scan complete"
        );
        Ok(transitions)
    }

    /// Event path: apply one observation and broadcast if it is a change.
    ///
    /// # Errors
    ///
    /// Returns an error if the watched-user set cannot be read.
    pub async fn handle_voice_update(
        &self,
        observation: &VoiceObservation,
    ) -> NotifyResult<Option<Transition>> {
        let watched = self.repository.get_users().await?;
        let Some(transition) = self.record(&watched, observation) else {
            return Ok(None);
        };
        self.broadcast(std::slice::from_ref(&transition)).await;
        Ok(Some(transition))
    }

    fn record(
        &self,
        watched: &BTreeSet<u64>,
        observation: &VoiceObservation,
    ) -> Option<Transition> {
        if !watched.contains(&observation.user_id) {
            return None;
        }
        let status = observation.status();
        let previous = self.statuses.observe(observation.user_id, status)?;
        let transition = Transition {
            user_id: observation.user_id,
            guild_id: observation.guild_id,
            channel_id: observation.channel_id,
            previous,
            status,
            observed_at: Utc::now(),
        };
        info!(
            target: crate::NOTIFY_TARGET,
            user_id = transition.user_id,
            guild_id = ?transition.guild_id,
            channel_id = ?transition.channel_id,
            previous = %previous,
            status = %status,
            event = "transition",
            "Mute status changed"
        );
        Some(transition)
    }

    /// Apply every matching rule for every transition concurrently and wait
    /// for the batch. A failing rule is logged and does not affect others.
    pub async fn broadcast(&self, transitions: &[Transition]) -> BroadcastReport {
        let mut tasks = JoinSet::new();
        for transition in transitions {
            for rule in rules_for_user(&self.config.rules, transition.user_id) {
                let rule: Arc<OutputRule> = Arc::clone(rule);
                let status = transition.status;
                tasks.spawn(async move {
                    let result = rule.apply(status).await;
                    (rule, result)
                });
            }
        }

        let mut report = BroadcastReport {
            dispatched: tasks.len(),
            failed: 0,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((rule, Err(e))) => {
                    report.failed += 1;
                    error!(
                        target: crate::ERROR_TARGET,
                        rule = %rule.name,
                        user_id = rule.id,
                        kind = e.kind(),
                        error = %e,
                        "Output rule failed to render"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!(target: crate::ERROR_TARGET, error = %e, "Output rule task aborted");
                }
            }
        }

        if report.dispatched > 0 {
            info!(
                target: crate::NOTIFY_TARGET,
                transitions = transitions.len(),
                dispatched = report.dispatched,
                failed = report.failed,
                event = "broadcast",
                "Mute status broadcast finished"
            );
        }
        report
    }
}
