// This is the entry point of the anti-raid bot.
//
// **Architecture Overview:**
// - `core/` = Detection and response logic (platform-agnostic)
// - `infra/` = Implementations of core traits (settings storage)
// - `discord/` = Discord-specific adapters (commands, events, moderation calls)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers
// 5. Start the idle-window sweeper

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::antiraid::{AntiRaidRuntimeConfig, AntiRaidService};
use crate::discord::antiraid::events as antiraid_events;
use crate::discord::{Data, Error};
use crate::infra::antiraid::SqliteSettingsStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Read an env var, falling back to `default` when missing or unparsable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn runtime_config_from_env() -> AntiRaidRuntimeConfig {
    let defaults = AntiRaidRuntimeConfig::default();
    AntiRaidRuntimeConfig {
        action_timeout: Duration::from_secs(env_or(
            "ANTIRAID_ACTION_TIMEOUT_SECS",
            defaults.action_timeout.as_secs(),
        )),
        idle_multiplier: env_or("ANTIRAID_IDLE_MULTIPLIER", defaults.idle_multiplier),
        // tokio's interval panics on a zero period
        sweep_interval: Duration::from_secs(
            env_or(
                "ANTIRAID_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )
            .max(1),
        ),
        ..defaults
    }
}

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        antiraid_events::handle_message(ctx, data, new_message).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").context(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    )?;

    let db_path =
        std::env::var("ANTIRAID_DB_PATH").unwrap_or_else(|_| "data/antiraid.db".to_string());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .context("Failed to create data directory for SQLite files")?;
        }
    }

    let runtime_config = runtime_config_from_env();
    tracing::info!(?runtime_config, "AntiRaid runtime configuration");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .context("Failed to connect to AntiRaid settings DB")?;
    let settings_store = SqliteSettingsStore::new(pool);
    settings_store
        .migrate()
        .await
        .context("Failed to migrate AntiRaid settings DB")?;

    let data = Data {
        antiraid: Arc::new(AntiRaidService::new(settings_store, runtime_config)),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    // Mention counts and the member/role cache need no privileged content intent
    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![discord::antiraid::commands::antiraid()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered, bot is ready");

                // Background sweep of idle (guild, user) windows.
                let service = Arc::clone(&data.antiraid);
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(service.config().sweep_interval);
                    loop {
                        ticker.tick().await;
                        let evicted = service.sweep_idle_windows(chrono::Utc::now());
                        tracing::debug!(
                            evicted,
                            remaining = service.tracked_windows(),
                            "Swept idle AntiRaid windows"
                        );
                    }
                });

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
