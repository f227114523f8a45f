//! Voice state sources
//!
//! The reconciler does not talk to Discord directly. It asks a
//! [`VoiceSource`] for the voice channels of a guild and the members in
//! each channel, which keeps the scan logic testable without a gateway.

use crate::notify::{NotifyError, NotifyResult, StatusCode};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serenity::{ChannelType, Guild, GuildId, VoiceState};
use std::sync::Arc;

/// A member's voice flags at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceObservation {
    pub user_id: u64,
    pub guild_id: Option<u64>,
    /// `None` once the member left voice
    pub channel_id: Option<u64>,
    /// Server mute
    pub mute: bool,
    pub self_mute: bool,
    /// Stage audience member without speaker rights
    pub suppress: bool,
}

impl VoiceObservation {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_flags(self.mute, self.self_mute, self.suppress)
    }
}

impl From<&VoiceState> for VoiceObservation {
    fn from(state: &VoiceState) -> Self {
        Self {
            user_id: state.user_id.get(),
            guild_id: state.guild_id.map(GuildId::get),
            channel_id: state.channel_id.map(serenity::ChannelId::get),
            mute: state.mute,
            self_mute: state.self_mute,
            suppress: state.suppress,
        }
    }
}

/// Read access to live voice membership
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceSource: Send + Sync {
    /// Voice channels of `guild_id`
    async fn voice_channels(&self, guild_id: u64) -> NotifyResult<Vec<u64>>;

    /// Members currently connected to `channel_id`
    async fn channel_members(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> NotifyResult<Vec<VoiceObservation>>;
}

/// [`VoiceSource`] reading the serenity cache
#[derive(Clone)]
pub struct CacheVoiceSource {
    cache: Arc<serenity::Cache>,
}

impl CacheVoiceSource {
    #[must_use]
    pub fn new(cache: Arc<serenity::Cache>) -> Self {
        Self { cache }
    }

    fn guild_id(guild_id: u64) -> NotifyResult<GuildId> {
        if guild_id == 0 {
            return Err(NotifyError::GuildUnavailable(guild_id));
        }
        Ok(GuildId::new(guild_id))
    }

    fn cached_voice_channels(&self, guild_id: u64) -> NotifyResult<Vec<u64>> {
        let guild = self
            .cache
            .guild(Self::guild_id(guild_id)?)
            .ok_or(NotifyError::GuildUnavailable(guild_id))?;
        Ok(voice_channel_ids(&guild))
    }

    fn cached_channel_members(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> NotifyResult<Vec<VoiceObservation>> {
        let guild = self
            .cache
            .guild(Self::guild_id(guild_id)?)
            .ok_or(NotifyError::GuildUnavailable(guild_id))?;
        Ok(members_in_channel(&guild, channel_id))
    }
}

/// Channels of `guild` that members can be muted in: voice and stage
fn voice_channel_ids(guild: &Guild) -> Vec<u64> {
    guild
        .channels
        .values()
        .filter(|channel| matches!(channel.kind, ChannelType::Voice | ChannelType::Stage))
        .map(|channel| channel.id.get())
        .collect()
}

/// Voice states of `guild` connected to `channel_id`. Cached voice states
/// may lack a guild id, so the guild's own id is filled in.
fn members_in_channel(guild: &Guild, channel_id: u64) -> Vec<VoiceObservation> {
    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id.map(serenity::ChannelId::get) == Some(channel_id))
        .map(|state| VoiceObservation {
            guild_id: Some(guild.id.get()),
            ..VoiceObservation::from(state)
        })
        .collect()
}

#[async_trait]
impl VoiceSource for CacheVoiceSource {
    async fn voice_channels(&self, guild_id: u64) -> NotifyResult<Vec<u64>> {
        self.cached_voice_channels(guild_id)
    }

    async fn channel_members(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> NotifyResult<Vec<VoiceObservation>> {
        self.cached_channel_members(guild_id, channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_status() {
        let mut observation = VoiceObservation {
            user_id: 1,
            guild_id: Some(2),
            channel_id: Some(3),
            mute: false,
            self_mute: false,
            suppress: false,
        };
        assert_eq!(observation.status(), StatusCode::Unmuted);
        observation.suppress = true;
        assert_eq!(observation.status(), StatusCode::Muted);
    }

    #[tokio::test]
    async fn test_empty_cache_reports_missing_guild() {
        let source = CacheVoiceSource::new(Arc::new(serenity::Cache::default()));
        let err = source.voice_channels(123).await.unwrap_err();
        assert!(matches!(err, NotifyError::GuildUnavailable(123)));

        let err = source.channel_members(0, 1).await.unwrap_err();
        assert!(matches!(err, NotifyError::GuildUnavailable(0)));
    }

    fn channel(id: u64, kind: ChannelType) -> serenity::GuildChannel {
        let mut channel = serenity::GuildChannel::default();
        channel.id = serenity::ChannelId::new(id);
        channel.kind = kind;
        channel
    }

    fn voice_state(user_id: u64, channel_id: u64, self_mute: bool, suppress: bool) -> VoiceState {
        ::serenity::json::from_value(::serenity::json::json!({
            "channel_id": channel_id.to_string(),
            "deaf": false,
            "mute": false,
            "self_deaf": false,
            "self_mute": self_mute,
            "self_video": false,
            "session_id": "session",
            "suppress": suppress,
            "user_id": user_id.to_string(),
            "request_to_speak_timestamp": null,
        }))
        .expect("valid voice state")
    }

    fn populated_guild() -> Guild {
        let mut guild = Guild::default();
        guild.id = GuildId::new(1);
        for channel in [
            channel(10, ChannelType::Voice),
            channel(11, ChannelType::Stage),
            channel(12, ChannelType::Text),
            channel(13, ChannelType::Category),
        ] {
            guild.channels.insert(channel.id, channel);
        }
        for state in [
            voice_state(100, 10, true, false),
            voice_state(101, 10, false, false),
            voice_state(102, 11, false, true),
        ] {
            guild.voice_states.insert(state.user_id, state);
        }
        guild
    }

    #[test]
    fn test_voice_and_stage_channels_are_listed() {
        let mut channels = voice_channel_ids(&populated_guild());
        channels.sort_unstable();
        assert_eq!(channels, vec![10, 11]);
    }

    #[test]
    fn test_members_are_filtered_by_channel() {
        let guild = populated_guild();

        let mut members = members_in_channel(&guild, 10);
        members.sort_by_key(|member| member.user_id);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].user_id, 100);
        assert_eq!(members[0].status(), StatusCode::Muted);
        assert_eq!(members[1].user_id, 101);
        assert_eq!(members[1].status(), StatusCode::Unmuted);
        // The payload carried no guild id; the guild's own id is used
        assert!(members.iter().all(|member| member.guild_id == Some(1)));

        let audience = members_in_channel(&guild, 11);
        assert_eq!(audience.len(), 1);
        assert_eq!(audience[0].user_id, 102);
        assert_eq!(audience[0].status(), StatusCode::Muted);

        assert!(members_in_channel(&guild, 12).is_empty());
    }
}
