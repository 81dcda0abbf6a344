// Anti-raid slash commands for configuration.
//
// Thin layer: parse the arguments, call the service, report the result.

use crate::core::antiraid::{ChannelId, GuildId, PunishAction, RoleId, SettingsError};
use crate::discord::antiraid::formatter::format_settings;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ActionChoice {
    #[name = "mute"]
    Mute,
    #[name = "kick"]
    Kick,
    #[name = "ban"]
    Ban,
}

impl From<ActionChoice> for PunishAction {
    fn from(choice: ActionChoice) -> Self {
        match choice {
            ActionChoice::Mute => PunishAction::Mute,
            ActionChoice::Kick => PunishAction::Kick,
            ActionChoice::Ban => PunishAction::Ban,
        }
    }
}

fn guild_of(ctx: &Context<'_>) -> Result<GuildId, Error> {
    Ok(GuildId(ctx.guild_id().ok_or("Must be used in a server")?.get()))
}

/// Report a validation failure to the invoker; anything else is a real error.
async fn reply_result(
    ctx: Context<'_>,
    result: Result<(), SettingsError>,
    success: String,
) -> Result<(), Error> {
    match result {
        Ok(()) => {
            ctx.say(success).await?;
            Ok(())
        }
        Err(SettingsError::Invalid(reason)) => {
            ctx.say(format!("❌ {}", reason)).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Configure the AntiRaid system.
#[poise::command(
    slash_command,
    subcommands(
        "toggle",
        "action",
        "mutetime",
        "spamlimit",
        "mentionlimit",
        "whitelist",
        "logchannel",
        "pingrole",
        "pingmessage",
        "view"
    ),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn antiraid(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - subcommands do the work
    Ok(())
}

/// Enable or disable AntiRaid.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn toggle(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let enabled = ctx.data().antiraid.toggle_enabled(guild_id).await?;

    let status = if enabled { "Enabled" } else { "Disabled" };
    ctx.say(format!("AntiRaid is now **{}**.", status)).await?;
    Ok(())
}

/// Set the punishment: mute, kick, or ban.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn action(
    ctx: Context<'_>,
    #[description = "What happens to a detected raider"] action: ActionChoice,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let action = PunishAction::from(action);
    let result = ctx.data().antiraid.set_action(guild_id, action).await;

    reply_result(
        ctx,
        result,
        format!("Punishment action set to: **{}**.", action),
    )
    .await
}

/// Set how long a mute lasts.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn mutetime(
    ctx: Context<'_>,
    #[description = "Timeout length in seconds (default: 600)"] seconds: u64,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let result = ctx
        .data()
        .antiraid
        .set_mute_duration(guild_id, seconds)
        .await;

    reply_result(
        ctx,
        result,
        format!("Mute duration set to **{} seconds**.", seconds),
    )
    .await
}

/// Set spam threshold (e.g. 7 messages in 5 seconds).
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn spamlimit(
    ctx: Context<'_>,
    #[description = "Messages allowed in the window (default: 7)"] messages: u32,
    #[description = "Window length in seconds (default: 5)"]
    #[min = 1]
    #[max = 86400]
    seconds: u64,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let result = ctx
        .data()
        .antiraid
        .set_spam_threshold(guild_id, messages, seconds)
        .await;

    reply_result(
        ctx,
        result,
        format!(
            "Limit set: **{} messages** within **{} seconds**.",
            messages, seconds
        ),
    )
    .await
}

/// Set max mentions per message.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn mentionlimit(
    ctx: Context<'_>,
    #[description = "Mentions allowed per message (default: 5)"] limit: u32,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let result = ctx
        .data()
        .antiraid
        .set_mention_limit(guild_id, limit)
        .await;

    reply_result(
        ctx,
        result,
        format!("Mention limit set to **{}** per message.", limit),
    )
    .await
}

/// Manage exempt roles.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("whitelist_add", "whitelist_remove")
)]
pub async fn whitelist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Exempt a role from AntiRaid.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    rename = "add"
)]
pub async fn whitelist_add(
    ctx: Context<'_>,
    #[description = "Role to exempt"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let added = ctx
        .data()
        .antiraid
        .add_whitelist_role(guild_id, RoleId(role.id.get()))
        .await?;

    if added {
        ctx.say(format!("Added {} to whitelist.", role.name)).await?;
    } else {
        ctx.say("That role is already whitelisted.").await?;
    }
    Ok(())
}

/// Stop exempting a role.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    rename = "remove"
)]
pub async fn whitelist_remove(
    ctx: Context<'_>,
    #[description = "Role to stop exempting"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let removed = ctx
        .data()
        .antiraid
        .remove_whitelist_role(guild_id, RoleId(role.id.get()))
        .await?;

    if removed {
        ctx.say(format!("Removed {} from whitelist.", role.name))
            .await?;
    } else {
        ctx.say("That role is not whitelisted.").await?;
    }
    Ok(())
}

/// Set the log channel. Leave empty to disable logging.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn logchannel(
    ctx: Context<'_>,
    #[description = "Channel for detailed action logs"] channel: Option<serenity::Channel>,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let channel_id = channel.map(|c| c.id());

    ctx.data()
        .antiraid
        .set_log_channel(guild_id, channel_id.map(|id| ChannelId(id.get())))
        .await?;

    match channel_id {
        Some(id) => ctx.say(format!("Logs will now be sent to <#{}>.", id)).await?,
        None => ctx.say("Logging disabled.").await?,
    };
    Ok(())
}

/// Set the role to ping when a raid is detected. Leave empty to disable.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn pingrole(
    ctx: Context<'_>,
    #[description = "Role to ping on a raid"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let role_id = role.as_ref().map(|r| r.id);

    ctx.data()
        .antiraid
        .set_ping_role(guild_id, role_id.map(|id| RoleId(id.get())))
        .await?;

    match role_id {
        Some(id) => {
            ctx.say(format!("I will ping <@&{}> when a raid triggers.", id))
                .await?
        }
        None => ctx.say("Role pings disabled.").await?,
    };
    Ok(())
}

/// Set the custom text to send with the role ping.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn pingmessage(
    ctx: Context<'_>,
    #[description = "Text sent with the role ping"] message: String,
) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let result = ctx
        .data()
        .antiraid
        .set_ping_message(guild_id, message.clone())
        .await;

    reply_result(ctx, result, format!("Ping message set to: `{}`", message)).await
}

/// View current settings.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn view(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_of(&ctx)?;
    let settings = ctx.data().antiraid.get_settings(guild_id).await?;

    ctx.send(poise::CreateReply::default().embed(format_settings(&settings)))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_choice_maps_to_core_action() {
        assert_eq!(PunishAction::from(ActionChoice::Mute), PunishAction::Mute);
        assert_eq!(PunishAction::from(ActionChoice::Kick), PunishAction::Kick);
        assert_eq!(PunishAction::from(ActionChoice::Ban), PunishAction::Ban);
    }
}
