use super::detector::ProtectionAction;
use chrono::Duration;

/// Longest manual protection window the `/antiraid enable` command accepts, in minutes.
pub const MAX_MANUAL_MINUTES: u32 = 24 * 60;

/// Tuning knobs of the join-rate detector.
///
/// The automatic path always uses these values; manual activation only
/// overrides the action and the window length.
#[derive(Debug, Clone)]
pub struct RaidSettings {
    /// Joins inside `window` that count as a raid (inclusive).
    pub threshold: usize,
    /// Sliding window the evaluator looks back over.
    pub window: Duration,
    /// Length of an automatically started protection window.
    pub auto_duration: Duration,
    /// Action applied by an automatically started protection window.
    pub auto_action: ProtectionAction,
    /// Manual window length when the moderator does not pass one.
    pub manual_default_minutes: u32,
    /// Join records older than this are dropped by the janitor.
    pub join_retention: Duration,
    /// How often the runner checks for lapsed protection windows.
    pub tick_period: std::time::Duration,
    /// How often the runner performs a full janitor sweep.
    pub sweep_period: std::time::Duration,
    /// Message history purged when a raider is banned.
    pub ban_purge_seconds: u32,
}

impl Default for RaidSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::seconds(10),
            auto_duration: Duration::minutes(30),
            auto_action: ProtectionAction::Monitor,
            manual_default_minutes: 30,
            join_retention: Duration::hours(1),
            tick_period: std::time::Duration::from_secs(30),
            sweep_period: std::time::Duration::from_secs(3600),
            ban_purge_seconds: 3600,
        }
    }
}
