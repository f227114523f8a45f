use crate::notify::{NotifyError, NotifyRepository, NotifyResult, StatusCode, VoiceObservation};
use crate::{Data, Error};
use poise::serenity_prelude::{self as serenity, RoleId};
use poise::{Context, command};
use tracing::info;

/// Reply sent by `ping`
pub const PING_REPLY: &str = "pong!";

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    // Sent to the channel, not as a reply
    ctx.say(PING_REPLY).await?;
    Ok(())
}

/// Ever wondering if you're muted in VC? Let me check!
#[command(prefix_command, slash_command, guild_only)]
pub async fn amimuted(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    let author = ctx.author().id;
    // Cache refs must not be held across the reply await
    let status = ctx.guild().and_then(|guild| {
        guild
            .voice_states
            .get(&author)
            .filter(|state| state.channel_id.is_some())
            .map(|state| VoiceObservation::from(state).status())
    });
    ctx.reply(amimuted_reply(status)).await?;
    Ok(())
}

/// Reply for `amimuted`, `None` when the author is not in voice
#[must_use]
pub fn amimuted_reply(status: Option<StatusCode>) -> &'static str {
    match status {
        Some(StatusCode::Muted) => "You are muted!",
        Some(_) => "You are not muted!",
        None => "I can't find you in a voice channel :(",
    }
}

/// Result of a successful `mutenotify` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The user was already in the requested state
    AlreadySet,
    Enabled,
    Disabled,
}

/// Core of the `mutenotify` command.
///
/// # Errors
///
/// Returns [`NotifyError::NotStaff`] if the actor is not staff, or a storage
/// error from the repository.
pub async fn toggle_mutenotify(
    repository: &dyn NotifyRepository,
    actor_is_staff: bool,
    target_id: u64,
    enable: bool,
) -> NotifyResult<ToggleOutcome> {
    if !actor_is_staff {
        return Err(NotifyError::NotStaff);
    }

    let current = repository.contains(target_id).await?;
    if current == enable {
        return Ok(ToggleOutcome::AlreadySet);
    }

    if enable {
        repository.add_users(&[target_id]).await?;
        Ok(ToggleOutcome::Enabled)
    } else {
        repository.remove_users(&[target_id]).await?;
        Ok(ToggleOutcome::Disabled)
    }
}

/// Reply text for a `mutenotify` outcome
#[must_use]
pub fn toggle_reply(outcome: ToggleOutcome, display_name: &str, enable: bool) -> String {
    match outcome {
        ToggleOutcome::AlreadySet => format!("Mutenotify for {display_name} is already {enable}"),
        ToggleOutcome::Enabled | ToggleOutcome::Disabled => "Success!".to_string(),
    }
}

/// Enable or disable mute status notifications for a user (staff only)
#[command(prefix_command, slash_command, guild_only)]
pub async fn mutenotify(
    ctx: Context<'_, Data, Error>,
    #[description = "User to change"] user: serenity::User,
    #[description = "Whether notifications are enabled"] value: bool,
) -> Result<(), Error> {
    let roles: Vec<RoleId> = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    let is_staff = ctx.data().config.is_staff(&roles);

    let outcome =
        match toggle_mutenotify(ctx.data().repository.as_ref(), is_staff, user.id.get(), value)
            .await
        {
            Ok(outcome) => outcome,
            Err(NotifyError::NotStaff) => {
                ctx.reply(NotifyError::NotStaff.to_string()).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

    if outcome != ToggleOutcome::AlreadySet {
        info!(
            target: crate::COMMAND_TARGET,
            user_id = user.id.get(),
            enabled = value,
            event = "mutenotify_changed",
            "Mute notifications updated"
        );
        if !value {
            ctx.data().reconciler.forget(user.id.get());
        }
    }

    let display_name = user.global_name.as_deref().unwrap_or(&user.name);
    ctx.reply(toggle_reply(outcome, display_name, value)).await?;
    Ok(())
}
