pub mod commands;
pub mod config;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod notify;

pub const BOT_NAME: &str = "mute_notifier";
pub const COMMAND_TARGET: &str = "mute_notifier::command";
pub const ERROR_TARGET: &str = "mute_notifier::error";
pub const EVENT_TARGET: &str = "mute_notifier::handlers";
pub const NOTIFY_TARGET: &str = "mute_notifier::notify";
pub const CONSOLE_TARGET: &str = "mute_notifier";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
