// Discord layer - commands, event handlers and the platform adapter.

#[path = "antiraid/mod.rs"]
pub mod antiraid;

use crate::core::antiraid::AntiRaidService;
use crate::infra::antiraid::SqliteSettingsStore;
use std::sync::Arc;

/// Shared state handed to every command and event.
pub struct Data {
    pub antiraid: Arc<AntiRaidService<SqliteSettingsStore>>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
