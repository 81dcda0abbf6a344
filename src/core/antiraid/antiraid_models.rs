// Anti-raid domain models - data structures for the raid detector.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity types into these before calling core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest timeout the platform accepts (28 days).
pub const MAX_MUTE_DURATION_SECS: u64 = 28 * 24 * 60 * 60;
/// Longest ping message we allow, leaves room for the alert line in a 2000 char message.
pub const MAX_PING_MESSAGE_LEN: usize = 1500;
/// One day. Longer windows stop being raid detection.
pub const MAX_SPAM_INTERVAL_SECS: u64 = 24 * 60 * 60;

// ============================================================================
// IDENTIFIERS
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// A community (tenant). Unit of configuration isolation.
    GuildId
);
id_type!(UserId);
id_type!(RoleId);
id_type!(ChannelId);

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A write was rejected because it would break a settings invariant.
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Punishment applied to a raider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishAction {
    /// Platform timeout for `mute_duration_secs`.
    Mute,
    Kick,
    Ban,
}

impl PunishAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PunishAction::Mute => "mute",
            PunishAction::Kick => "kick",
            PunishAction::Ban => "ban",
        }
    }

    /// Past tense used in alerts and logs.
    pub fn verbed(self) -> &'static str {
        match self {
            PunishAction::Mute => "Muted",
            PunishAction::Kick => "Kicked",
            PunishAction::Ban => "Banned",
        }
    }
}

impl fmt::Display for PunishAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunishAction {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mute" => Ok(PunishAction::Mute),
            "kick" => Ok(PunishAction::Kick),
            "ban" => Ok(PunishAction::Ban),
            other => Err(SettingsError::Invalid(format!(
                "unknown action `{}`, expected one of: mute, kick, ban",
                other
            ))),
        }
    }
}

/// Per-guild anti-raid configuration.
///
/// The detector only ever reads a snapshot of this; writes go through
/// [`GuildSettings::validate`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    /// Whether detection runs for this guild
    pub enabled: bool,
    /// Messages within the window that count as a raid
    pub spam_limit: u32,
    /// Sliding window length in seconds
    pub spam_interval_secs: u64,
    /// Mentions in a single message that count as a raid
    pub mention_limit: u32,
    /// What happens to the raider
    pub action: PunishAction,
    /// Timeout length when `action` is `Mute`
    pub mute_duration_secs: u64,
    /// Members holding any of these roles are never checked
    pub whitelist_role_ids: BTreeSet<RoleId>,
    /// Where the detailed action log goes
    pub log_channel_id: Option<ChannelId>,
    /// Role pinged in the alert
    pub ping_role_id: Option<RoleId>,
    /// Text sent along with the role ping
    pub ping_message: String,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            spam_limit: 7,         // 7 messages...
            spam_interval_secs: 5, // ...in 5 seconds
            mention_limit: 5,
            action: PunishAction::Mute,
            mute_duration_secs: 600, // 10 minute timeout
            whitelist_role_ids: BTreeSet::new(),
            log_channel_id: None,
            ping_role_id: None,
            ping_message: "Raider detected! Action taken.".to_string(),
        }
    }
}

impl GuildSettings {
    /// Check the invariants a stored snapshot must hold.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.spam_interval_secs == 0 || self.spam_interval_secs > MAX_SPAM_INTERVAL_SECS {
            return Err(SettingsError::Invalid(format!(
                "spam interval must be between 1 and {} seconds",
                MAX_SPAM_INTERVAL_SECS
            )));
        }
        if self.mute_duration_secs == 0 || self.mute_duration_secs > MAX_MUTE_DURATION_SECS {
            return Err(SettingsError::Invalid(format!(
                "mute duration must be between 1 and {} seconds",
                MAX_MUTE_DURATION_SECS
            )));
        }
        if self.ping_message.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "ping message cannot be empty".to_string(),
            ));
        }
        if self.ping_message.chars().count() > MAX_PING_MESSAGE_LEN {
            return Err(SettingsError::Invalid(format!(
                "ping message cannot exceed {} characters",
                MAX_PING_MESSAGE_LEN
            )));
        }
        Ok(())
    }

    /// Window length, clamped to the accepted range for snapshots that skipped `validate`.
    pub fn spam_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.spam_interval_secs.min(MAX_SPAM_INTERVAL_SECS) as i64)
    }

    pub fn mute_duration(&self) -> Duration {
        Duration::from_secs(self.mute_duration_secs)
    }
}

/// Process-wide knobs for the responder and the window sweeper.
#[derive(Debug, Clone)]
pub struct AntiRaidRuntimeConfig {
    /// Upper bound on waiting for any single platform call
    pub action_timeout: Duration,
    /// How many recent channel messages the cleanup step inspects
    pub purge_lookback: u8,
    /// Only messages this close to the trigger are cleaned up
    pub purge_window: Duration,
    /// Days of messages removed along with a ban
    pub ban_delete_message_days: u8,
    /// Idle windows older than `interval * multiplier` are evicted
    pub idle_multiplier: u32,
    /// How often the idle sweep runs
    pub sweep_interval: Duration,
}

impl Default for AntiRaidRuntimeConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(5),
            purge_lookback: 15,
            purge_window: Duration::from_secs(10),
            ban_delete_message_days: 1,
            idle_multiplier: 4,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// EVENTS AND DETECTION RESULTS
// ============================================================================

/// One incoming chat message, reduced to what the detector needs.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// `None` for direct messages
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub mentioned_user_count: u32,
    pub mentioned_role_count: u32,
    /// `@everyone` / `@here`
    pub broadcast_mention: bool,
    pub author_role_ids: BTreeSet<RoleId>,
    pub author_is_admin: bool,
    pub author_is_bot: bool,
    pub author_hierarchy_rank: u32,
    pub bot_hierarchy_rank: u32,
}

/// Why an event skipped detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exemption {
    DirectMessage,
    Bot,
    Disabled,
    Administrator,
    WhitelistedRole,
    /// Settings could not be fetched, so the event is let through.
    ConfigUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentKind {
    /// Too many users/roles addressed in one message
    MassMention,
    /// Too many messages inside the window
    Velocity,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentKind::MassMention => write!(f, "Mass Mention"),
            IncidentKind::Velocity => write!(f, "Message Velocity"),
        }
    }
}

/// A single detected violation. Consumed once by the responder.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub kind: IncidentKind,
    pub triggering_count: u32,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

/// Result of running one event through the detector.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Exempt(Exemption),
    /// Not a violation; `window_count` is the user's message count in the window.
    Clean { window_count: usize },
    Violation(Incident),
}

impl Detection {
    #[allow(dead_code)]
    pub fn incident(&self) -> Option<&Incident> {
        match self {
            Detection::Violation(incident) => Some(incident),
            _ => None,
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// What the responder knows about the member it is about to act on.
#[derive(Debug, Clone)]
pub struct ResponseTarget {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub hierarchy_rank: u32,
    pub bot_hierarchy_rank: u32,
    pub channel_id: ChannelId,
    pub triggered_at: DateTime<Utc>,
}

impl ResponseTarget {
    pub fn from_event(event: &MessageEvent) -> Self {
        Self {
            user_id: event.author_id,
            display_name: event.author_name.clone(),
            avatar_url: event.author_avatar_url.clone(),
            hierarchy_rank: event.author_hierarchy_rank,
            bot_hierarchy_rank: event.bot_hierarchy_rank,
            channel_id: event.channel_id,
            triggered_at: event.timestamp,
        }
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// Structured record sent to the guild's log channel after a punishment.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLogRecord {
    pub user_name: String,
    pub user_id: UserId,
    pub action: PunishAction,
    pub reason: String,
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
    pub avatar_url: Option<String>,
}

/// How a response ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Punished {
        action: PunishAction,
        purged: usize,
        alerted: bool,
        logged: bool,
    },
    /// The member ranks at or above the bot; nothing was done.
    HierarchyBlocked,
    /// The platform refused the punishment.
    Forbidden,
    /// The punishment failed for any other reason.
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = GuildSettings::default();
        assert!(settings.validate().is_ok());
        assert!(!settings.enabled);
        assert_eq!(settings.spam_limit, 7);
        assert_eq!(settings.spam_interval_secs, 5);
        assert_eq!(settings.mention_limit, 5);
        assert_eq!(settings.action, PunishAction::Mute);
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("MUTE".parse::<PunishAction>().unwrap(), PunishAction::Mute);
        assert_eq!(" kick ".parse::<PunishAction>().unwrap(), PunishAction::Kick);
        assert_eq!("ban".parse::<PunishAction>().unwrap(), PunishAction::Ban);
        assert!(matches!(
            "softban".parse::<PunishAction>(),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_broken_settings() {
        let zero_interval = GuildSettings {
            spam_interval_secs: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());

        let day_interval = GuildSettings {
            spam_interval_secs: MAX_SPAM_INTERVAL_SECS,
            ..Default::default()
        };
        assert!(day_interval.validate().is_ok());

        let huge_interval = GuildSettings {
            spam_interval_secs: 100_000_000_000_000,
            ..Default::default()
        };
        assert!(huge_interval.validate().is_err());
        assert_eq!(
            huge_interval.spam_interval(),
            chrono::Duration::seconds(MAX_SPAM_INTERVAL_SECS as i64)
        );

        let long_mute = GuildSettings {
            mute_duration_secs: MAX_MUTE_DURATION_SECS + 1,
            ..Default::default()
        };
        assert!(long_mute.validate().is_err());

        let blank_ping = GuildSettings {
            ping_message: "   ".to_string(),
            ..Default::default()
        };
        assert!(blank_ping.validate().is_err());
    }

    #[test]
    fn test_ids_compare_by_value() {
        assert_eq!(RoleId(42), RoleId::from(42));
        assert_eq!(UserId(7).to_string(), "7");
    }
}
