use crate::Data;
use crate::notify::{ReconcileRequest, VoiceObservation};
use poise::serenity_prelude::{self as serenity, Context, EventHandler, GuildId, Ready, VoiceState};
use tracing::{debug, info, warn};

pub struct Handler {
    pub data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: crate::EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count = guilds.len();
        for guild_id in &self.data.config.listening_guilds {
            if !guilds.iter().any(|id| id.get() == *guild_id) {
                warn!("Listening guild {guild_id} is not available to the bot");
            }
        }
        info!(
            "Cache ready! The bot is in {guild_count} guild(s), {} in cache",
            ctx.cache.guild_count()
        );
        // Pick up members who were already in voice before we connected
        self.data.send_reconcile(ReconcileRequest::ScanNow).await;
    }

    /// Feeds voice state changes into the reconcile task.
    async fn voice_state_update(&self, _ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let observation = VoiceObservation::from(&new);
        debug!(
            target: crate::EVENT_TARGET,
            user_id = observation.user_id,
            channel_id = ?observation.channel_id,
            status = %observation.status(),
            "Voice state update"
        );
        self.data
            .send_reconcile(ReconcileRequest::VoiceUpdate(observation))
            .await;
    }
}
