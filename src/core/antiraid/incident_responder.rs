// Incident responder - turns one detected incident into one punishment.
//
// Steps, in fixed order:
// 1. Hierarchy guard (hard stop, nothing else runs)
// 2. Cleanup of the raider's recent messages (best effort)
// 3. Punishment (mute/kick/ban) - failure ends the response
// 4. In-channel alert (best effort)
// 5. Log channel record (best effort)
//
// Platform calls go through the ModerationActions/Messaging ports and are each
// bounded by `action_timeout`. The timeout only bounds our wait; an action the
// platform already accepted is not undone.

use super::antiraid_models::{
    ActionLogRecord, AntiRaidRuntimeConfig, ChannelId, GuildSettings, Incident, PunishAction,
    ResponseOutcome, ResponseTarget, RoleId, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Missing permissions: {0}")]
    PermissionDenied(String),

    #[error("Target could not be resolved: {0}")]
    Unresolvable(String),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Platform error: {0}")]
    Failed(String),
}

// ============================================================================
// PLATFORM PORTS
// ============================================================================

/// Moderation capabilities of the host platform, scoped to one guild.
#[async_trait]
pub trait ModerationActions: Send + Sync {
    /// Delete `author`'s messages among the last `lookback_limit` in `channel`
    /// that were sent within `window` before `until`. Returns how many were deleted.
    async fn purge_recent_messages(
        &self,
        channel: ChannelId,
        author: UserId,
        lookback_limit: u8,
        window: Duration,
        until: DateTime<Utc>,
    ) -> Result<usize, ActionError>;

    async fn timeout_member(
        &self,
        user: UserId,
        duration: Duration,
        reason: &str,
    ) -> Result<(), ActionError>;

    async fn kick_member(&self, user: UserId, reason: &str) -> Result<(), ActionError>;

    async fn ban_member(
        &self,
        user: UserId,
        reason: &str,
        delete_message_days: u8,
    ) -> Result<(), ActionError>;
}

/// Outbound messages of the host platform.
#[async_trait]
pub trait Messaging: Send + Sync {
    async fn send_channel_message(
        &self,
        channel: ChannelId,
        content: &str,
        allow_role_mention: bool,
    ) -> Result<(), ActionError>;

    async fn send_log_record(
        &self,
        channel: ChannelId,
        record: &ActionLogRecord,
    ) -> Result<(), ActionError>;

    /// Whether the role still exists in the guild.
    async fn role_exists(&self, role: RoleId) -> Result<bool, ActionError>;
}

// ============================================================================
// RESPONDER
// ============================================================================

pub struct IncidentResponder {
    config: AntiRaidRuntimeConfig,
}

impl IncidentResponder {
    pub fn new(config: AntiRaidRuntimeConfig) -> Self {
        Self { config }
    }

    /// Respond to one incident. Never returns an error: every failure ends up
    /// in the outcome or in the log.
    pub async fn respond<P>(
        &self,
        platform: &P,
        incident: &Incident,
        settings: &GuildSettings,
        target: &ResponseTarget,
    ) -> ResponseOutcome
    where
        P: ModerationActions + Messaging,
    {
        let guild_id = incident.guild_id.get();
        let user_id = target.user_id.get();

        if target.hierarchy_rank >= target.bot_hierarchy_rank {
            tracing::info!(
                guild_id,
                user_id,
                member_rank = target.hierarchy_rank,
                bot_rank = target.bot_hierarchy_rank,
                "Member outranks the bot, skipping response"
            );
            return ResponseOutcome::HierarchyBlocked;
        }

        let purged = match self
            .bounded(platform.purge_recent_messages(
                target.channel_id,
                target.user_id,
                self.config.purge_lookback,
                self.config.purge_window,
                target.triggered_at,
            ))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(guild_id, user_id, "Failed to purge raid messages: {}", e);
                0
            }
        };

        let action = settings.action;
        let punished = match action {
            PunishAction::Mute => {
                self.bounded(platform.timeout_member(
                    target.user_id,
                    settings.mute_duration(),
                    &incident.reason,
                ))
                .await
            }
            PunishAction::Kick => {
                self.bounded(platform.kick_member(target.user_id, &incident.reason))
                    .await
            }
            PunishAction::Ban => {
                self.bounded(platform.ban_member(
                    target.user_id,
                    &incident.reason,
                    self.config.ban_delete_message_days,
                ))
                .await
            }
        };

        match punished {
            Ok(()) => {}
            Err(ActionError::PermissionDenied(detail)) => {
                tracing::warn!(
                    guild_id,
                    user_id,
                    action = action.as_str(),
                    "Missing permissions to punish member: {}",
                    detail
                );
                return ResponseOutcome::Forbidden;
            }
            Err(e) => {
                tracing::error!(
                    guild_id,
                    user_id,
                    action = action.as_str(),
                    "Failed to punish member: {}",
                    e
                );
                return ResponseOutcome::Failed(e.to_string());
            }
        }

        tracing::info!(
            guild_id,
            user_id,
            action = action.as_str(),
            kind = %incident.kind,
            purged,
            "AntiRaid action taken"
        );

        let ping_role = match settings.ping_role_id {
            Some(role) => match self.bounded(platform.role_exists(role)).await {
                Ok(true) => Some(role),
                Ok(false) => {
                    tracing::debug!(guild_id, role_id = role.get(), "Ping role no longer exists");
                    None
                }
                // Unknown is not gone, still ping
                Err(e) => {
                    tracing::warn!(guild_id, "Failed to resolve ping role: {}", e);
                    Some(role)
                }
            },
            None => None,
        };

        let alert = alert_content(settings, ping_role, action, target);
        let alerted = match self
            .bounded(platform.send_channel_message(
                target.channel_id,
                &alert,
                ping_role.is_some(),
            ))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(guild_id, user_id, "Failed to send raid alert: {}", e);
                false
            }
        };

        let logged = match settings.log_channel_id {
            Some(log_channel) => {
                let record = ActionLogRecord {
                    user_name: target.display_name.clone(),
                    user_id: target.user_id,
                    action,
                    reason: incident.reason.clone(),
                    channel_id: target.channel_id,
                    timestamp: Utc::now(),
                    avatar_url: target.avatar_url.clone(),
                };
                match self
                    .bounded(platform.send_log_record(log_channel, &record))
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            guild_id,
                            channel_id = log_channel.get(),
                            "Failed to send log to channel: {}",
                            e
                        );
                        false
                    }
                }
            }
            None => false,
        };

        ResponseOutcome::Punished {
            action,
            purged,
            alerted,
            logged,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ActionError>>,
    ) -> Result<T, ActionError> {
        match tokio::time::timeout(self.config.action_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::TimedOut(self.config.action_timeout)),
        }
    }
}

/// In-channel alert text, with the role ping prepended when `ping_role` is given.
pub fn alert_content(
    settings: &GuildSettings,
    ping_role: Option<RoleId>,
    action: PunishAction,
    target: &ResponseTarget,
) -> String {
    let alert = format!(
        "🛡️ **AntiRaid:** {} {} for spamming/raiding.",
        action.verbed(),
        target.mention()
    );

    match ping_role {
        Some(role) => format!("<@&{}> {}\n{}", role, settings.ping_message, alert),
        None => alert,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antiraid::antiraid_models::{GuildId, IncidentKind, RoleId};
    use crate::core::antiraid::test_support::{enabled_settings, ts};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Purge,
        Timeout(Duration),
        Kick,
        Ban(u8),
        Alert { content: String, roles: bool },
        Log(ChannelId),
    }

    #[derive(Default)]
    struct Failures {
        purge: bool,
        punish_forbidden: bool,
        punish_error: bool,
        punish_hangs: bool,
        alert: bool,
        log: bool,
        role_missing: bool,
    }

    /// Records every platform call in order.
    #[derive(Default)]
    struct RecordingPlatform {
        calls: Mutex<Vec<Call>>,
        fail: Failures,
    }

    impl RecordingPlatform {
        fn failing(fail: Failures) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        async fn punish_result(&self) -> Result<(), ActionError> {
            if self.fail.punish_hangs {
                std::future::pending::<()>().await;
            }
            if self.fail.punish_forbidden {
                return Err(ActionError::PermissionDenied("403".to_string()));
            }
            if self.fail.punish_error {
                return Err(ActionError::Failed("500".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ModerationActions for RecordingPlatform {
        async fn purge_recent_messages(
            &self,
            _: ChannelId,
            _: UserId,
            _: u8,
            _: Duration,
            _: DateTime<Utc>,
        ) -> Result<usize, ActionError> {
            self.push(Call::Purge);
            if self.fail.purge {
                return Err(ActionError::Failed("purge".to_string()));
            }
            Ok(4)
        }

        async fn timeout_member(
            &self,
            _: UserId,
            duration: Duration,
            _: &str,
        ) -> Result<(), ActionError> {
            self.push(Call::Timeout(duration));
            self.punish_result().await
        }

        async fn kick_member(&self, _: UserId, _: &str) -> Result<(), ActionError> {
            self.push(Call::Kick);
            self.punish_result().await
        }

        async fn ban_member(&self, _: UserId, _: &str, days: u8) -> Result<(), ActionError> {
            self.push(Call::Ban(days));
            self.punish_result().await
        }
    }

    #[async_trait]
    impl Messaging for RecordingPlatform {
        async fn send_channel_message(
            &self,
            _: ChannelId,
            content: &str,
            allow_role_mention: bool,
        ) -> Result<(), ActionError> {
            self.push(Call::Alert {
                content: content.to_string(),
                roles: allow_role_mention,
            });
            if self.fail.alert {
                return Err(ActionError::Failed("send".to_string()));
            }
            Ok(())
        }

        async fn send_log_record(
            &self,
            channel: ChannelId,
            _: &ActionLogRecord,
        ) -> Result<(), ActionError> {
            self.push(Call::Log(channel));
            if self.fail.log {
                return Err(ActionError::Unresolvable("gone".to_string()));
            }
            Ok(())
        }

        async fn role_exists(&self, _: RoleId) -> Result<bool, ActionError> {
            Ok(!self.fail.role_missing)
        }
    }

    fn incident() -> Incident {
        Incident {
            guild_id: GuildId(1),
            channel_id: ChannelId(20),
            author_id: UserId(10),
            kind: IncidentKind::Velocity,
            triggering_count: 7,
            reason: "AntiRaid: Exceeded message velocity limit (7 messages in 5s)".to_string(),
            detected_at: ts(0),
        }
    }

    fn target(rank: u32, bot_rank: u32) -> ResponseTarget {
        ResponseTarget {
            user_id: UserId(10),
            display_name: "raider".to_string(),
            avatar_url: None,
            hierarchy_rank: rank,
            bot_hierarchy_rank: bot_rank,
            channel_id: ChannelId(20),
            triggered_at: ts(0),
        }
    }

    fn responder() -> IncidentResponder {
        IncidentResponder::new(AntiRaidRuntimeConfig::default())
    }

    #[tokio::test]
    async fn test_mute_runs_steps_in_order() {
        let platform = RecordingPlatform::default();
        let settings = GuildSettings {
            log_channel_id: Some(ChannelId(99)),
            ..enabled_settings()
        };

        let outcome = responder()
            .respond(&platform, &incident(), &settings, &target(1, 5))
            .await;

        assert_eq!(
            outcome,
            ResponseOutcome::Punished {
                action: PunishAction::Mute,
                purged: 4,
                alerted: true,
                logged: true,
            }
        );
        assert_eq!(
            platform.calls(),
            vec![
                Call::Purge,
                Call::Timeout(Duration::from_secs(600)),
                Call::Alert {
                    content: "🛡️ **AntiRaid:** Muted <@10> for spamming/raiding.".to_string(),
                    roles: false,
                },
                Call::Log(ChannelId(99)),
            ]
        );
    }

    #[tokio::test]
    async fn test_outranking_member_gets_no_side_effects() {
        let platform = RecordingPlatform::default();
        let settings = GuildSettings {
            action: PunishAction::Ban,
            log_channel_id: Some(ChannelId(99)),
            ..enabled_settings()
        };

        let outcome = responder()
            .respond(&platform, &incident(), &settings, &target(9, 5))
            .await;

        assert_eq!(outcome, ResponseOutcome::HierarchyBlocked);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_equal_rank_is_blocked() {
        let platform = RecordingPlatform::default();
        let outcome = responder()
            .respond(&platform, &incident(), &enabled_settings(), &target(5, 5))
            .await;

        assert_eq!(outcome, ResponseOutcome::HierarchyBlocked);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_punishment_skips_alert_and_log() {
        let platform = RecordingPlatform::failing(Failures {
            punish_forbidden: true,
            ..Default::default()
        });
        let settings = GuildSettings {
            action: PunishAction::Kick,
            log_channel_id: Some(ChannelId(99)),
            ..enabled_settings()
        };

        let outcome = responder()
            .respond(&platform, &incident(), &settings, &target(1, 5))
            .await;

        assert_eq!(outcome, ResponseOutcome::Forbidden);
        assert_eq!(platform.calls(), vec![Call::Purge, Call::Kick]);
    }

    #[tokio::test]
    async fn test_other_punishment_failure_is_reported() {
        let platform = RecordingPlatform::failing(Failures {
            punish_error: true,
            ..Default::default()
        });

        let outcome = responder()
            .respond(&platform, &incident(), &enabled_settings(), &target(1, 5))
            .await;

        assert!(matches!(outcome, ResponseOutcome::Failed(_)));
        assert_eq!(platform.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_purge_alert_and_log_failures_do_not_block_punishment() {
        let platform = RecordingPlatform::failing(Failures {
            purge: true,
            alert: true,
            log: true,
            ..Default::default()
        });
        let settings = GuildSettings {
            action: PunishAction::Ban,
            log_channel_id: Some(ChannelId(99)),
            ..enabled_settings()
        };

        let outcome = responder()
            .respond(&platform, &incident(), &settings, &target(1, 5))
            .await;

        assert_eq!(
            outcome,
            ResponseOutcome::Punished {
                action: PunishAction::Ban,
                purged: 0,
                alerted: false,
                logged: false,
            }
        );
        assert!(platform.calls().contains(&Call::Ban(1)));
    }

    #[tokio::test]
    async fn test_ping_role_prefixes_alert() {
        let platform = RecordingPlatform::default();
        let settings = GuildSettings {
            action: PunishAction::Kick,
            ping_role_id: Some(RoleId(300)),
            ping_message: "Mods, raid in progress".to_string(),
            ..enabled_settings()
        };

        responder()
            .respond(&platform, &incident(), &settings, &target(1, 5))
            .await;

        assert!(platform.calls().contains(&Call::Alert {
            content: "<@&300> Mods, raid in progress\n🛡️ **AntiRaid:** Kicked <@10> for spamming/raiding."
                .to_string(),
            roles: true,
        }));
    }

    #[tokio::test]
    async fn test_deleted_ping_role_is_left_out_of_alert() {
        let platform = RecordingPlatform::failing(Failures {
            role_missing: true,
            ..Default::default()
        });
        let settings = GuildSettings {
            ping_role_id: Some(RoleId(300)),
            ..enabled_settings()
        };

        responder()
            .respond(&platform, &incident(), &settings, &target(1, 5))
            .await;

        assert!(platform.calls().contains(&Call::Alert {
            content: "🛡️ **AntiRaid:** Muted <@10> for spamming/raiding.".to_string(),
            roles: false,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_punishment_times_out() {
        let platform = RecordingPlatform::failing(Failures {
            punish_hangs: true,
            ..Default::default()
        });

        let outcome = responder()
            .respond(&platform, &incident(), &enabled_settings(), &target(1, 5))
            .await;

        assert!(matches!(outcome, ResponseOutcome::Failed(msg) if msg.contains("Timed out")));
        assert_eq!(platform.calls().len(), 2);
    }
}
