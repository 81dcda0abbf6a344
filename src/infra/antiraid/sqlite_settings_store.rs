// SQLite-backed settings store for the anti-raid system.
//
// Tables:
// - antiraid_settings: one row per guild, whitelist kept as a JSON array

use crate::core::antiraid::{
    ChannelId, GuildId, GuildSettings, GuildSettingsStore, PunishAction, RoleId, SettingsError,
};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeSet;

pub struct SqliteSettingsStore {
    pool: Pool<Sqlite>,
}

impl SqliteSettingsStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS antiraid_settings (
                guild_id INTEGER PRIMARY KEY,
                enabled BOOLEAN NOT NULL DEFAULT 0,
                spam_limit INTEGER NOT NULL DEFAULT 7,
                spam_interval_secs INTEGER NOT NULL DEFAULT 5,
                mention_limit INTEGER NOT NULL DEFAULT 5,
                action TEXT NOT NULL DEFAULT 'mute',
                mute_duration_secs INTEGER NOT NULL DEFAULT 600,
                whitelist_roles TEXT NOT NULL DEFAULT '[]',
                log_channel_id INTEGER,
                ping_role_id INTEGER,
                ping_message TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SettingsError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl GuildSettingsStore for SqliteSettingsStore {
    async fn get_settings(&self, guild_id: GuildId) -> Result<GuildSettings, SettingsError> {
        let row = sqlx::query("SELECT * FROM antiraid_settings WHERE guild_id = ?")
            .bind(guild_id.get() as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SettingsError::Storage(e.to_string()))?;

        let Some(row) = row else {
            // Return default settings if none exist
            return Ok(GuildSettings::default());
        };

        let action: String = row.get("action");
        let whitelist_json: String = row.get("whitelist_roles");
        let whitelist_role_ids: BTreeSet<RoleId> = serde_json::from_str(&whitelist_json)
            .map_err(|e| SettingsError::Storage(format!("corrupt whitelist: {}", e)))?;

        Ok(GuildSettings {
            enabled: row.get("enabled"),
            spam_limit: row.get::<i64, _>("spam_limit") as u32,
            spam_interval_secs: row.get::<i64, _>("spam_interval_secs") as u64,
            mention_limit: row.get::<i64, _>("mention_limit") as u32,
            action: action
                .parse::<PunishAction>()
                .map_err(|e| SettingsError::Storage(e.to_string()))?,
            mute_duration_secs: row.get::<i64, _>("mute_duration_secs") as u64,
            whitelist_role_ids,
            log_channel_id: row
                .get::<Option<i64>, _>("log_channel_id")
                .map(|id| ChannelId(id as u64)),
            ping_role_id: row
                .get::<Option<i64>, _>("ping_role_id")
                .map(|id| RoleId(id as u64)),
            ping_message: row.get("ping_message"),
        })
    }

    async fn save_settings(
        &self,
        guild_id: GuildId,
        settings: &GuildSettings,
    ) -> Result<(), SettingsError> {
        let whitelist_json = serde_json::to_string(&settings.whitelist_role_ids)
            .map_err(|e| SettingsError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO antiraid_settings (
                guild_id, enabled, spam_limit, spam_interval_secs, mention_limit,
                action, mute_duration_secs, whitelist_roles, log_channel_id,
                ping_role_id, ping_message
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                enabled = excluded.enabled,
                spam_limit = excluded.spam_limit,
                spam_interval_secs = excluded.spam_interval_secs,
                mention_limit = excluded.mention_limit,
                action = excluded.action,
                mute_duration_secs = excluded.mute_duration_secs,
                whitelist_roles = excluded.whitelist_roles,
                log_channel_id = excluded.log_channel_id,
                ping_role_id = excluded.ping_role_id,
                ping_message = excluded.ping_message
            "#,
        )
        .bind(guild_id.get() as i64)
        .bind(settings.enabled)
        .bind(settings.spam_limit as i64)
        .bind(settings.spam_interval_secs as i64)
        .bind(settings.mention_limit as i64)
        .bind(settings.action.as_str())
        .bind(settings.mute_duration_secs as i64)
        .bind(whitelist_json)
        .bind(settings.log_channel_id.map(|id| id.get() as i64))
        .bind(settings.ping_role_id.map(|id| id.get() as i64))
        .bind(settings.ping_message.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SettingsError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::NamedTempFile;

    async fn open_store(path: &std::path::Path) -> SqliteSettingsStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap();
        let store = SqliteSettingsStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_guild_returns_defaults() {
        let tmp = NamedTempFile::new().unwrap();
        let store = open_store(tmp.path()).await;

        let settings = store.get_settings(GuildId(1)).await.unwrap();
        assert_eq!(settings, GuildSettings::default());
    }

    #[tokio::test]
    async fn test_settings_survive_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        let mut settings = GuildSettings {
            enabled: true,
            action: PunishAction::Ban,
            log_channel_id: Some(ChannelId(1234567890123)),
            ping_role_id: Some(RoleId(42)),
            ping_message: "Raid!".to_string(),
            ..Default::default()
        };
        settings.whitelist_role_ids.insert(RoleId(7));
        settings.whitelist_role_ids.insert(RoleId(9));

        {
            let store = open_store(tmp.path()).await;
            store.save_settings(GuildId(1), &settings).await.unwrap();
        }

        let store = open_store(tmp.path()).await;
        assert_eq!(store.get_settings(GuildId(1)).await.unwrap(), settings);
        assert_eq!(
            store.get_settings(GuildId(2)).await.unwrap(),
            GuildSettings::default()
        );
    }
}
