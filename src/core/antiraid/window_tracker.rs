// Sliding-window message counter keyed by (guild, user).
//
// Each key owns an ordered queue of that user's recent message timestamps.
// DashMap shards the map, and the entry guard held inside each operation is
// what serializes record/reset for one key while other keys run in parallel.
//
// Timestamps are expected to be monotonic per user. Out-of-order timestamps
// (clock skew) are not reordered and may prune too much or too little.

use super::antiraid_models::{GuildId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

#[derive(Debug)]
struct WindowState {
    timestamps: VecDeque<DateTime<Utc>>,
    /// Interval used on the most recent record, drives idle eviction.
    interval: chrono::Duration,
    last_seen: DateTime<Utc>,
}

impl WindowState {
    fn new(interval: chrono::Duration, now: DateTime<Utc>) -> Self {
        Self {
            timestamps: VecDeque::new(),
            interval,
            last_seen: now,
        }
    }

    fn record(&mut self, timestamp: DateTime<Utc>, interval: chrono::Duration) -> usize {
        self.timestamps.push_back(timestamp);
        self.interval = interval;
        if timestamp > self.last_seen {
            self.last_seen = timestamp;
        }

        // A window reaching past the representable range keeps everything
        if let Some(cutoff) = timestamp.checked_sub_signed(interval) {
            self.timestamps.retain(|t| *t > cutoff);
        }
        self.timestamps.len()
    }

    fn reset(&mut self) {
        self.timestamps.clear();
    }
}

/// Result of [`WindowTracker::record_and_trip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    /// Below the limit; the count after recording.
    Below(usize),
    /// Limit reached; the window has already been cleared.
    Tripped(usize),
}

/// Per-(guild, user) sliding windows, transient for the process lifetime.
#[derive(Default)]
pub struct WindowTracker {
    windows: DashMap<(GuildId, UserId), WindowState>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Append `timestamp`, drop everything at or before `timestamp - interval`
    /// and return how many entries remain.
    ///
    /// Standalone form of the first half of `record_and_trip`. The detector
    /// never calls it on its own, since a separate `reset` would race.
    #[allow(dead_code)]
    pub fn record(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        timestamp: DateTime<Utc>,
        interval: chrono::Duration,
    ) -> usize {
        let mut window = self
            .windows
            .entry((guild_id, user_id))
            .or_insert_with(|| WindowState::new(interval, timestamp));
        window.record(timestamp, interval)
    }

    /// Clear the user's window (debounce after a trigger).
    #[allow(dead_code)]
    pub fn reset(&self, guild_id: GuildId, user_id: UserId) {
        if let Some(mut window) = self.windows.get_mut(&(guild_id, user_id)) {
            window.reset();
        }
    }

    /// Record and, if the count reaches `limit`, clear the window before the
    /// entry lock is released so no concurrent event can observe the full window.
    pub fn record_and_trip(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        timestamp: DateTime<Utc>,
        interval: chrono::Duration,
        limit: usize,
    ) -> WindowCheck {
        let mut window = self
            .windows
            .entry((guild_id, user_id))
            .or_insert_with(|| WindowState::new(interval, timestamp));

        let count = window.record(timestamp, interval);
        if count >= limit {
            window.reset();
            WindowCheck::Tripped(count)
        } else {
            WindowCheck::Below(count)
        }
    }

    /// Evict windows that are empty or whose newest message is older than
    /// `interval * multiplier`. Returns how many keys were removed.
    pub fn sweep_idle(&self, now: DateTime<Utc>, multiplier: u32) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            let idle_after = window
                .interval
                .checked_mul(i32::try_from(multiplier.max(1)).unwrap_or(i32::MAX))
                .unwrap_or(chrono::Duration::MAX);
            let idle_for = now.signed_duration_since(window.last_seen);
            !window.timestamps.is_empty() && idle_for < idle_after
        });
        before.saturating_sub(self.windows.len())
    }

    /// Current number of tracked (guild, user) keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of timestamps currently held for a user.
    #[allow(dead_code)]
    pub fn window_len(&self, guild_id: GuildId, user_id: UserId) -> usize {
        self.windows
            .get(&(guild_id, user_id))
            .map(|w| w.timestamps.len())
            .unwrap_or(0)
    }
}
