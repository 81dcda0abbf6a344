// Turns serenity messages into core MessageEvents and runs them through the service.
//
// Everything read from the cache is copied out before any await, the cache
// guards are not Send.

use crate::core::antiraid::{ChannelId, GuildId, MessageEvent, ResponseOutcome, RoleId, UserId};
use crate::discord::antiraid::gateway::{snowflake_millis, SerenityModeration};
use crate::discord::Data;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::collections::BTreeSet;

/// Privilege facts about the author and the bot, read from the guild cache.
#[derive(Debug, Default)]
struct MemberFacts {
    author_roles: BTreeSet<RoleId>,
    author_is_admin: bool,
    author_rank: u32,
    bot_rank: u32,
}

/// The parts of a guild role that matter for privilege checks.
#[derive(Debug, Clone, Copy)]
struct RoleFacts {
    position: u16,
    administrator: bool,
}

/// Hierarchy rank: highest role position, guild owner above everything.
fn hierarchy_rank(is_owner: bool, roles: &[RoleFacts]) -> u32 {
    if is_owner {
        return u32::MAX;
    }
    roles
        .iter()
        .map(|role| role.position as u32)
        .max()
        .unwrap_or(0)
}

/// `roles` must include @everyone, which can grant administrator to all.
fn has_admin(is_owner: bool, roles: &[RoleFacts]) -> bool {
    is_owner || roles.iter().any(|role| role.administrator)
}

fn role_facts(guild: &serenity::Guild, roles: &[serenity::RoleId]) -> Vec<RoleFacts> {
    roles
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .map(|role| RoleFacts {
            position: role.position,
            administrator: role.permissions.administrator(),
        })
        .collect()
}

fn everyone_facts(guild: &serenity::Guild) -> Option<RoleFacts> {
    // @everyone shares the guild's id
    let everyone = serenity::RoleId::new(guild.id.get());
    role_facts(guild, &[everyone]).into_iter().next()
}

fn member_facts(ctx: &serenity::Context, msg: &serenity::Message) -> MemberFacts {
    let Some(guild_id) = msg.guild_id else {
        return MemberFacts::default();
    };
    let Some(guild) = ctx.cache.guild(guild_id) else {
        // Without the guild cache the bot rank is unknown, which blocks any response.
        tracing::debug!(guild_id = guild_id.get(), "Guild not cached");
        return MemberFacts::default();
    };

    let author_roles: Vec<serenity::RoleId> = msg
        .member
        .as_ref()
        .map(|m| m.roles.clone())
        .or_else(|| guild.members.get(&msg.author.id).map(|m| m.roles.clone()))
        .unwrap_or_default();

    let bot_id = ctx.cache.current_user().id;
    let bot_roles: Vec<serenity::RoleId> = guild
        .members
        .get(&bot_id)
        .map(|m| m.roles.clone())
        .unwrap_or_default();

    let author_is_owner = guild.owner_id == msg.author.id;
    let mut author_facts = role_facts(&guild, &author_roles);
    let author_rank = hierarchy_rank(author_is_owner, &author_facts);
    author_facts.extend(everyone_facts(&guild));

    MemberFacts {
        author_roles: author_roles.iter().map(|r| RoleId(r.get())).collect(),
        author_is_admin: has_admin(author_is_owner, &author_facts),
        author_rank,
        bot_rank: hierarchy_rank(guild.owner_id == bot_id, &role_facts(&guild, &bot_roles)),
    }
}

/// Snapshot a serenity message for the detector.
pub fn build_event(ctx: &serenity::Context, msg: &serenity::Message) -> MessageEvent {
    let facts = member_facts(ctx, msg);
    let timestamp = DateTime::<Utc>::from_timestamp_millis(snowflake_millis(msg.id.get()))
        .unwrap_or_else(Utc::now);

    MessageEvent {
        guild_id: msg.guild_id.map(|id| GuildId(id.get())),
        channel_id: ChannelId(msg.channel_id.get()),
        author_id: UserId(msg.author.id.get()),
        author_name: msg.author.name.clone(),
        author_avatar_url: Some(msg.author.face()),
        timestamp,
        mentioned_user_count: msg.mentions.len() as u32,
        mentioned_role_count: msg.mention_roles.len() as u32,
        broadcast_mention: msg.mention_everyone,
        author_role_ids: facts.author_roles,
        author_is_admin: facts.author_is_admin,
        author_is_bot: msg.author.bot,
        author_hierarchy_rank: facts.author_rank,
        bot_hierarchy_rank: facts.bot_rank,
    }
}

/// Check a message for raid behavior and respond if needed.
///
/// Returns the response outcome when an incident was detected.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    msg: &serenity::Message,
) -> Option<ResponseOutcome> {
    // Skip bots and DMs before touching the cache
    if msg.author.bot {
        return None;
    }
    let guild_id = msg.guild_id?;

    let event = build_event(ctx, msg);
    let platform = SerenityModeration::new(ctx, guild_id);
    let outcome = data.antiraid.handle_message(&platform, &event).await;

    if let Some(outcome) = &outcome {
        tracing::debug!(
            guild_id = guild_id.get(),
            user_id = msg.author.id.get(),
            ?outcome,
            "AntiRaid response finished"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(position: u16) -> RoleFacts {
        RoleFacts {
            position,
            administrator: false,
        }
    }

    #[test]
    fn test_rank_is_highest_role_position() {
        assert_eq!(hierarchy_rank(false, &[role(3), role(12), role(7)]), 12);
    }

    #[test]
    fn test_no_roles_gives_rank_zero() {
        assert_eq!(hierarchy_rank(false, &[]), 0);
    }

    #[test]
    fn test_owner_outranks_any_role() {
        let owner = hierarchy_rank(true, &[]);
        let top_role = hierarchy_rank(false, &[role(u16::MAX)]);
        assert!(owner > top_role);
    }

    #[test]
    fn test_admin_from_any_role_or_ownership() {
        let everyone_admin = RoleFacts {
            position: 0,
            administrator: true,
        };

        assert!(!has_admin(false, &[role(5), role(0)]));
        assert!(has_admin(false, &[role(5), everyone_admin]));
        assert!(has_admin(true, &[]));
    }
}
