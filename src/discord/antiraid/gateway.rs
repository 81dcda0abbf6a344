// Serenity implementation of the moderation and messaging ports.
//
// One instance is built per incident, scoped to the guild the message came from.

use crate::core::antiraid::{
    ActionError, ActionLogRecord, ChannelId, Messaging, ModerationActions, RoleId, UserId,
};
use crate::discord::antiraid::formatter::format_action_log;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

/// First second of 2015, the epoch Discord snowflakes count from.
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Creation time (unix millis) encoded in a snowflake id.
pub fn snowflake_millis(id: u64) -> i64 {
    ((id >> 22) + DISCORD_EPOCH_MS) as i64
}

/// Ids of `author`'s messages sent within `window_ms` before `until_ms`.
///
/// `messages` holds (message id, author id) pairs. Age comes from the snowflake.
pub fn select_purge_ids(
    messages: &[(u64, u64)],
    author: u64,
    until_ms: i64,
    window_ms: i64,
) -> Vec<u64> {
    messages
        .iter()
        .filter(|(_, author_id)| *author_id == author)
        .filter(|(id, _)| until_ms - snowflake_millis(*id) < window_ms)
        .map(|(id, _)| *id)
        .collect()
}

/// Map a serenity error onto the port's error type. HTTP 403 means we lack permissions.
fn map_error(err: serenity::Error) -> ActionError {
    if let serenity::Error::Http(http_err) = &err {
        if http_err.status_code().map(|s| s.as_u16()) == Some(403) {
            return ActionError::PermissionDenied(err.to_string());
        }
    }
    ActionError::Failed(err.to_string())
}

pub struct SerenityModeration {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    guild_id: serenity::GuildId,
}

impl SerenityModeration {
    pub fn new(ctx: &serenity::Context, guild_id: serenity::GuildId) -> Self {
        Self {
            http: ctx.http.clone(),
            cache: ctx.cache.clone(),
            guild_id,
        }
    }
}

#[async_trait]
impl ModerationActions for SerenityModeration {
    async fn purge_recent_messages(
        &self,
        channel: ChannelId,
        author: UserId,
        lookback_limit: u8,
        window: Duration,
        until: DateTime<Utc>,
    ) -> Result<usize, ActionError> {
        let channel_id = serenity::ChannelId::new(channel.get());
        let messages = channel_id
            .messages(&self.http, serenity::GetMessages::new().limit(lookback_limit))
            .await
            .map_err(map_error)?;

        let candidates: Vec<(u64, u64)> = messages
            .iter()
            .map(|m| (m.id.get(), m.author.id.get()))
            .collect();
        let ids: Vec<serenity::MessageId> = select_purge_ids(
            &candidates,
            author.get(),
            until.timestamp_millis(),
            window.as_millis() as i64,
        )
        .into_iter()
        .map(serenity::MessageId::new)
        .collect();

        match ids.as_slice() {
            [] => {}
            [single] => channel_id
                .delete_message(&self.http, *single)
                .await
                .map_err(map_error)?,
            // Bulk delete needs at least two ids
            _ => channel_id
                .delete_messages(&self.http, ids.iter())
                .await
                .map_err(map_error)?,
        }

        Ok(ids.len())
    }

    async fn timeout_member(
        &self,
        user: UserId,
        duration: Duration,
        reason: &str,
    ) -> Result<(), ActionError> {
        let timeout_until = serenity::Timestamp::from_unix_timestamp(
            Utc::now().timestamp() + duration.as_secs() as i64,
        )
        .map_err(|e| ActionError::Failed(format!("invalid timeout timestamp: {}", e)))?;

        self.guild_id
            .edit_member(
                &self.http,
                serenity::UserId::new(user.get()),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(timeout_until)
                    .audit_log_reason(reason),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn kick_member(&self, user: UserId, reason: &str) -> Result<(), ActionError> {
        self.guild_id
            .kick_with_reason(&self.http, serenity::UserId::new(user.get()), reason)
            .await
            .map_err(map_error)
    }

    async fn ban_member(
        &self,
        user: UserId,
        reason: &str,
        delete_message_days: u8,
    ) -> Result<(), ActionError> {
        self.guild_id
            .ban_with_reason(
                &self.http,
                serenity::UserId::new(user.get()),
                delete_message_days,
                reason,
            )
            .await
            .map_err(map_error)
    }
}

#[async_trait]
impl Messaging for SerenityModeration {
    async fn send_channel_message(
        &self,
        channel: ChannelId,
        content: &str,
        allow_role_mention: bool,
    ) -> Result<(), ActionError> {
        let mentions = serenity::CreateAllowedMentions::new()
            .all_users(true)
            .all_roles(allow_role_mention);

        serenity::ChannelId::new(channel.get())
            .send_message(
                &self.http,
                serenity::CreateMessage::new()
                    .content(content)
                    .allowed_mentions(mentions),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn send_log_record(
        &self,
        channel: ChannelId,
        record: &ActionLogRecord,
    ) -> Result<(), ActionError> {
        let channel_id = serenity::ChannelId::new(channel.get());

        // Only a cached guild can tell us the channel is gone; otherwise just try.
        let known = self
            .cache
            .guild(self.guild_id)
            .map(|guild| guild.channels.contains_key(&channel_id));
        if known == Some(false) {
            return Err(ActionError::Unresolvable(format!(
                "log channel {} is not in guild {}",
                channel, self.guild_id
            )));
        }

        channel_id
            .send_message(
                &self.http,
                serenity::CreateMessage::new().embed(format_action_log(record)),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn role_exists(&self, role: RoleId) -> Result<bool, ActionError> {
        let role_id = serenity::RoleId::new(role.get());
        let cached = self
            .cache
            .guild(self.guild_id)
            .map(|guild| guild.roles.contains_key(&role_id));
        if let Some(exists) = cached {
            return Ok(exists);
        }

        let roles = self.guild_id.roles(&self.http).await.map_err(map_error)?;
        Ok(roles.contains_key(&role_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_millis() {
        // Example id from the Discord developer docs: 2016-04-30 11:18:25.796 UTC
        assert_eq!(snowflake_millis(175928847299117063), 1_462_015_105_796);
        assert_eq!(snowflake_millis(0), DISCORD_EPOCH_MS as i64);
    }

    /// Snowflake whose creation time is `ms` unix millis.
    fn id_at(ms: i64, seq: u64) -> u64 {
        (((ms as u64) - DISCORD_EPOCH_MS) << 22) | seq
    }

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_purge_keeps_only_author_messages() {
        let messages = vec![
            (id_at(NOW - 1_000, 1), 10),
            (id_at(NOW - 900, 2), 11),
            (id_at(NOW - 800, 3), 10),
        ];

        let ids = select_purge_ids(&messages, 10, NOW, 10_000);

        assert_eq!(ids, vec![id_at(NOW - 1_000, 1), id_at(NOW - 800, 3)]);
    }

    #[test]
    fn test_purge_excludes_message_at_window_edge() {
        let messages = vec![
            (id_at(NOW - 10_000, 1), 10),
            (id_at(NOW - 9_999, 2), 10),
            (id_at(NOW - 30_000, 3), 10),
        ];

        let ids = select_purge_ids(&messages, 10, NOW, 10_000);

        assert_eq!(ids, vec![id_at(NOW - 9_999, 2)]);
    }

    #[test]
    fn test_purge_with_no_matches_is_empty() {
        let messages = vec![(id_at(NOW, 1), 11)];
        assert!(select_purge_ids(&messages, 10, NOW, 10_000).is_empty());
    }
}
