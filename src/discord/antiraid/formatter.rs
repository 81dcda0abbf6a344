use crate::core::antiraid::{ActionLogRecord, GuildSettings};
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};

pub fn format_action_log(record: &ActionLogRecord) -> CreateEmbed {
    let timestamp = serenity::Timestamp::from_unix_timestamp(record.timestamp.timestamp())
        .unwrap_or_else(|_| serenity::Timestamp::now());

    let mut embed = CreateEmbed::default()
        .title("🛡️ AntiRaid Action Log")
        .color(serenity::Color::RED)
        .field(
            "User",
            format!("{} ({})", record.user_name, record.user_id),
            true,
        )
        .field("Action", record.action.verbed(), true)
        .field("Reason", &record.reason, false)
        .field("Channel", format!("<#{}>", record.channel_id), true)
        .footer(CreateEmbedFooter::new(format!("User ID: {}", record.user_id)))
        .timestamp(timestamp);

    if let Some(url) = &record.avatar_url {
        embed = embed.thumbnail(url);
    }
    embed
}

pub fn format_settings(settings: &GuildSettings) -> CreateEmbed {
    let status = if settings.enabled {
        "✅ Enabled"
    } else {
        "❌ Disabled"
    };

    let whitelist = if settings.whitelist_role_ids.is_empty() {
        "None".to_string()
    } else {
        settings
            .whitelist_role_ids
            .iter()
            .map(|id| format!("<@&{}>", id))
            .collect::<Vec<_>>()
            .join(", ")
    };

    CreateEmbed::default()
        .title("AntiRaid Settings")
        .color(serenity::Color::RED)
        .field("Status", status, true)
        .field("Action", settings.action.as_str().to_uppercase(), true)
        .field(
            "Mute Duration",
            format!("{} sec", settings.mute_duration_secs),
            true,
        )
        .field(
            "Spam Limit",
            format!(
                "{} msgs / {} sec",
                settings.spam_limit, settings.spam_interval_secs
            ),
            true,
        )
        .field(
            "Mention Limit",
            format!("{} per message", settings.mention_limit),
            true,
        )
        .field(
            "Log Channel",
            settings
                .log_channel_id
                .map(|id| format!("<#{}>", id))
                .unwrap_or_else(|| "None".to_string()),
            true,
        )
        .field(
            "Ping Role",
            settings
                .ping_role_id
                .map(|id| format!("<@&{}>", id))
                .unwrap_or_else(|| "None".to_string()),
            true,
        )
        .field("Ping Message", &settings.ping_message, false)
        .field("Whitelisted Roles", whitelist, false)
}
