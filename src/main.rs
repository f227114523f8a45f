use std::env;
use std::sync::Arc;

use mute_notifier::config::TOKEN_ENV;
use mute_notifier::handlers::Handler;
use mute_notifier::notify::{CacheVoiceSource, ReconcileRequest, ReconcileService};
use mute_notifier::{BOT_NAME, BotConfig, Data, Error, commands, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load environment variables
    let token = env::var(TOKEN_ENV).map_err(|_| format!("{TOKEN_ENV} must be set"))?;

    // Load the configuration once; it is immutable from here on
    let config = Arc::new(BotConfig::load(BotConfig::path_from_env()).await?);
    let scan_interval = config.scan_interval;

    // Set up the bot's data
    let (reconcile_tx, reconcile_rx) = ReconcileService::channel();
    let data = Data::with_yaml_store(Arc::clone(&config), reconcile_tx);
    let setup_data = data.clone();
    let reconciler = Arc::clone(&data.reconciler);

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::amimuted(),
                commands::mutenotify(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.prefix.clone()),
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Error while handling error: {e}");
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands".to_string());
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(setup_data)
            })
        })
        .build();

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(Handler::new(data.clone()))
        .framework(framework)
        .await?;

    // Start the mute status task against the gateway cache
    let source = Arc::new(CacheVoiceSource::new(Arc::clone(&client.cache)));
    let reconcile_task = ReconcileService::spawn(reconciler, source, reconcile_rx, scan_interval);

    // Stop the shards on Ctrl-C
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        info!("Shutting down {BOT_NAME}");
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    let result = client.start().await;

    // Let the tick in progress finish its broadcast before the runtime goes away
    data.send_reconcile(ReconcileRequest::Shutdown).await;
    if let Err(e) = reconcile_task.await {
        error!("Mute status task failed: {e}");
    }

    result?;
    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
