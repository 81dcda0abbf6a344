// Raid detector - classifies each message as exempt, clean or a violation.
//
// Order per message:
// 1. Guard policy (exempt messages stop here)
// 2. Mention check - a violation here returns WITHOUT touching the window
// 3. Velocity check - record in the window, trip and clear at the limit
//
// The mention short-circuit means a mass-mention message never counts toward
// velocity. Kept on purpose, see DESIGN.md.

use super::antiraid_models::{
    Detection, Exemption, GuildSettings, Incident, IncidentKind, MessageEvent,
};
use super::guard_policy;
use super::mention_counter::count_mentions;
use super::window_tracker::{WindowCheck, WindowTracker};

pub struct RaidDetector {
    tracker: WindowTracker,
}

impl RaidDetector {
    pub fn new() -> Self {
        Self {
            tracker: WindowTracker::new(),
        }
    }

    pub fn tracker(&self) -> &WindowTracker {
        &self.tracker
    }

    /// Run one message through the state machine.
    pub fn evaluate(&self, event: &MessageEvent, settings: &GuildSettings) -> Detection {
        if let Some(reason) = guard_policy::exemption(event, settings) {
            return Detection::Exempt(reason);
        }
        let Some(guild_id) = event.guild_id else {
            return Detection::Exempt(Exemption::DirectMessage);
        };

        let mentions = count_mentions(event);
        if mentions >= settings.mention_limit {
            tracing::debug!(
                guild_id = guild_id.get(),
                user_id = event.author_id.get(),
                mentions,
                "Mention limit reached"
            );
            return Detection::Violation(Incident {
                guild_id,
                channel_id: event.channel_id,
                author_id: event.author_id,
                kind: IncidentKind::MassMention,
                triggering_count: mentions,
                reason: format!("AntiRaid: Exceeded mention limit ({})", mentions),
                detected_at: event.timestamp,
            });
        }

        match self.tracker.record_and_trip(
            guild_id,
            event.author_id,
            event.timestamp,
            settings.spam_interval(),
            settings.spam_limit as usize,
        ) {
            WindowCheck::Below(window_count) => Detection::Clean { window_count },
            WindowCheck::Tripped(count) => {
                tracing::debug!(
                    guild_id = guild_id.get(),
                    user_id = event.author_id.get(),
                    count,
                    "Velocity limit reached, window cleared"
                );
                Detection::Violation(Incident {
                    guild_id,
                    channel_id: event.channel_id,
                    author_id: event.author_id,
                    kind: IncidentKind::Velocity,
                    triggering_count: count as u32,
                    reason: format!(
                        "AntiRaid: Exceeded message velocity limit ({} messages in {}s)",
                        settings.spam_limit, settings.spam_interval_secs
                    ),
                    detected_at: event.timestamp,
                })
            }
        }
    }
}

impl Default for RaidDetector {
    fn default() -> Self {
        Self::new()
    }
}
