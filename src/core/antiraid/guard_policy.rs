// Decides whether a message is exempt from raid detection.
//
// Checks run in a fixed order and stop at the first match:
// direct message, bot author, detection disabled, administrator, whitelisted role.

use super::antiraid_models::{Exemption, GuildSettings, MessageEvent};

/// Exemptions that need no guild settings.
pub fn context_exemption(event: &MessageEvent) -> Option<Exemption> {
    if event.guild_id.is_none() {
        return Some(Exemption::DirectMessage);
    }
    if event.author_is_bot {
        return Some(Exemption::Bot);
    }
    None
}

/// Full exemption check against a settings snapshot.
pub fn exemption(event: &MessageEvent, settings: &GuildSettings) -> Option<Exemption> {
    if let Some(reason) = context_exemption(event) {
        return Some(reason);
    }
    if !settings.enabled {
        return Some(Exemption::Disabled);
    }
    if event.author_is_admin {
        return Some(Exemption::Administrator);
    }
    if event
        .author_role_ids
        .iter()
        .any(|role| settings.whitelist_role_ids.contains(role))
    {
        return Some(Exemption::WhitelistedRole);
    }
    None
}

/// Yes/no form of [`exemption`] for callers that do not need the reason.
#[allow(dead_code)]
pub fn is_exempt(event: &MessageEvent, settings: &GuildSettings) -> bool {
    exemption(event, settings).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antiraid::antiraid_models::RoleId;
    use crate::core::antiraid::test_support::{enabled_settings, event};

    #[test]
    fn test_regular_member_is_checked() {
        let msg = event(1, 10, 0);
        assert_eq!(exemption(&msg, &enabled_settings()), None);
        assert!(!is_exempt(&msg, &enabled_settings()));
    }

    #[test]
    fn test_direct_message_wins_over_everything() {
        let mut msg = event(1, 10, 0);
        msg.guild_id = None;
        msg.author_is_bot = true;
        msg.author_is_admin = true;
        assert_eq!(
            exemption(&msg, &GuildSettings::default()),
            Some(Exemption::DirectMessage)
        );
    }

    #[test]
    fn test_bot_checked_before_disabled() {
        let mut msg = event(1, 10, 0);
        msg.author_is_bot = true;
        assert_eq!(
            exemption(&msg, &GuildSettings::default()),
            Some(Exemption::Bot)
        );
    }

    #[test]
    fn test_disabled_guild_is_exempt() {
        let msg = event(1, 10, 0);
        assert_eq!(
            exemption(&msg, &GuildSettings::default()),
            Some(Exemption::Disabled)
        );
    }

    #[test]
    fn test_administrator_is_exempt() {
        let mut msg = event(1, 10, 0);
        msg.author_is_admin = true;
        assert_eq!(
            exemption(&msg, &enabled_settings()),
            Some(Exemption::Administrator)
        );
    }

    #[test]
    fn test_whitelisted_role_is_exempt() {
        let mut settings = enabled_settings();
        settings.whitelist_role_ids.insert(RoleId(500));

        let mut msg = event(1, 10, 0);
        msg.author_role_ids.insert(RoleId(499));
        assert_eq!(exemption(&msg, &settings), None);

        msg.author_role_ids.insert(RoleId(500));
        assert_eq!(exemption(&msg, &settings), Some(Exemption::WhitelistedRole));
    }

    #[test]
    fn test_exemption_is_pure() {
        let mut settings = enabled_settings();
        settings.whitelist_role_ids.insert(RoleId(500));
        let mut msg = event(1, 10, 0);
        msg.author_role_ids.insert(RoleId(500));

        let first = is_exempt(&msg, &settings);
        let second = is_exempt(&msg, &settings);
        assert_eq!(first, second);
    }
}
