// Counts everyone a single message addresses.

use super::antiraid_models::MessageEvent;

/// Explicit user mentions + role mentions + one for `@everyone`/`@here`.
pub fn count_mentions(event: &MessageEvent) -> u32 {
    event
        .mentioned_user_count
        .saturating_add(event.mentioned_role_count)
        .saturating_add(u32::from(event.broadcast_mention))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antiraid::test_support::event;

    #[test]
    fn test_counts_users_roles_and_broadcast() {
        let mut msg = event(1, 10, 0);
        assert_eq!(count_mentions(&msg), 0);

        msg.mentioned_user_count = 3;
        msg.mentioned_role_count = 2;
        assert_eq!(count_mentions(&msg), 5);

        msg.broadcast_mention = true;
        assert_eq!(count_mentions(&msg), 6);
    }
}
