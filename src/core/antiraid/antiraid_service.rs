// Anti-raid service - ties settings, detection and response together.
//
// This service handles:
// - Reading a settings snapshot per message
// - Running the raid detector
// - Handing violations to the incident responder
// - Validated settings updates for the operator commands
// - Evicting idle windows
//
// NO Discord dependencies here - the platform is reached through the
// ModerationActions/Messaging ports.

use super::antiraid_models::{
    AntiRaidRuntimeConfig, ChannelId, Detection, Exemption, GuildId, GuildSettings,
    MessageEvent, PunishAction, ResponseOutcome, ResponseTarget, RoleId, SettingsError,
};
use super::guard_policy;
use super::incident_responder::{IncidentResponder, Messaging, ModerationActions};
use super::raid_detector::RaidDetector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for reading and persisting per-guild settings.
#[async_trait]
pub trait GuildSettingsStore: Send + Sync {
    /// Settings for a guild, defaults when none are stored.
    async fn get_settings(&self, guild_id: GuildId) -> Result<GuildSettings, SettingsError>;

    async fn save_settings(
        &self,
        guild_id: GuildId,
        settings: &GuildSettings,
    ) -> Result<(), SettingsError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AntiRaidService<S: GuildSettingsStore> {
    store: S,
    detector: RaidDetector,
    responder: IncidentResponder,
    config: AntiRaidRuntimeConfig,
}

impl<S: GuildSettingsStore> AntiRaidService<S> {
    pub fn new(store: S, config: AntiRaidRuntimeConfig) -> Self {
        Self {
            store,
            detector: RaidDetector::new(),
            responder: IncidentResponder::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &AntiRaidRuntimeConfig {
        &self.config
    }

    /// Classify a message. A settings read failure lets the message through.
    pub async fn check_message(&self, event: &MessageEvent) -> Detection {
        self.check_with_settings(event).await.0
    }

    /// Classify a message and, on a violation, run the full response.
    ///
    /// Returns `None` when nothing was detected.
    pub async fn handle_message<P>(
        &self,
        platform: &P,
        event: &MessageEvent,
    ) -> Option<ResponseOutcome>
    where
        P: ModerationActions + Messaging,
    {
        let (detection, settings) = self.check_with_settings(event).await;
        let incident = match detection {
            Detection::Violation(incident) => incident,
            _ => return None,
        };
        let settings = settings?;

        tracing::info!(
            guild_id = incident.guild_id.get(),
            user_id = incident.author_id.get(),
            channel_id = incident.channel_id.get(),
            kind = %incident.kind,
            count = incident.triggering_count,
            at = %incident.detected_at,
            "Raid incident detected"
        );

        let target = ResponseTarget::from_event(event);
        Some(
            self.responder
                .respond(platform, &incident, &settings, &target)
                .await,
        )
    }

    async fn check_with_settings(
        &self,
        event: &MessageEvent,
    ) -> (Detection, Option<GuildSettings>) {
        if let Some(reason) = guard_policy::context_exemption(event) {
            return (Detection::Exempt(reason), None);
        }
        let Some(guild_id) = event.guild_id else {
            return (Detection::Exempt(Exemption::DirectMessage), None);
        };

        let settings = match self.store.get_settings(guild_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    guild_id = guild_id.get(),
                    "AntiRaid settings unavailable, skipping message: {}",
                    e
                );
                return (Detection::Exempt(Exemption::ConfigUnavailable), None);
            }
        };

        let detection = self.detector.evaluate(event, &settings);
        (detection, Some(settings))
    }

    /// Drop windows of users who went quiet. Returns how many were evicted.
    pub fn sweep_idle_windows(&self, now: DateTime<Utc>) -> usize {
        self.detector
            .tracker()
            .sweep_idle(now, self.config.idle_multiplier)
    }

    /// Number of (guild, user) windows currently held.
    pub fn tracked_windows(&self) -> usize {
        self.detector.tracker().len()
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    pub async fn get_settings(&self, guild_id: GuildId) -> Result<GuildSettings, SettingsError> {
        self.store.get_settings(guild_id).await
    }

    /// Apply `change` to the stored settings, validate and save.
    async fn update<F>(
        &self,
        guild_id: GuildId,
        change: F,
    ) -> Result<GuildSettings, SettingsError>
    where
        F: FnOnce(&mut GuildSettings),
    {
        let mut settings = self.store.get_settings(guild_id).await?;
        change(&mut settings);
        settings.validate()?;
        self.store.save_settings(guild_id, &settings).await?;
        Ok(settings)
    }

    /// Flip detection on/off. Returns the new state.
    pub async fn toggle_enabled(&self, guild_id: GuildId) -> Result<bool, SettingsError> {
        let settings = self.update(guild_id, |s| s.enabled = !s.enabled).await?;
        Ok(settings.enabled)
    }

    pub async fn set_action(
        &self,
        guild_id: GuildId,
        action: PunishAction,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.action = action).await?;
        Ok(())
    }

    pub async fn set_mute_duration(
        &self,
        guild_id: GuildId,
        seconds: u64,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.mute_duration_secs = seconds)
            .await?;
        Ok(())
    }

    pub async fn set_spam_threshold(
        &self,
        guild_id: GuildId,
        messages: u32,
        seconds: u64,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| {
            s.spam_limit = messages;
            s.spam_interval_secs = seconds;
        })
        .await?;
        Ok(())
    }

    pub async fn set_mention_limit(
        &self,
        guild_id: GuildId,
        limit: u32,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.mention_limit = limit).await?;
        Ok(())
    }

    /// Returns `false` when the role was already whitelisted.
    pub async fn add_whitelist_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<bool, SettingsError> {
        let mut added = false;
        self.update(guild_id, |s| added = s.whitelist_role_ids.insert(role_id))
            .await?;
        Ok(added)
    }

    /// Returns `false` when the role was not whitelisted.
    pub async fn remove_whitelist_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<bool, SettingsError> {
        let mut removed = false;
        self.update(guild_id, |s| removed = s.whitelist_role_ids.remove(&role_id))
            .await?;
        Ok(removed)
    }

    pub async fn set_log_channel(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.log_channel_id = channel_id)
            .await?;
        Ok(())
    }

    pub async fn set_ping_role(
        &self,
        guild_id: GuildId,
        role_id: Option<RoleId>,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.ping_role_id = role_id).await?;
        Ok(())
    }

    pub async fn set_ping_message(
        &self,
        guild_id: GuildId,
        message: String,
    ) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.ping_message = message).await?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
