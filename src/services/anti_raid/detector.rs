use super::settings::RaidSettings;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use std::collections::HashMap;
use tracing::debug;

/// What happens to members joining while a protection window is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum ProtectionAction {
    Monitor,
    Kick,
    Ban,
}

impl ProtectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionAction::Monitor => "none",
            ProtectionAction::Kick => "kick",
            ProtectionAction::Ban => "ban",
        }
    }

    /// Fluent key of the human readable action name.
    pub fn label_key(&self) -> &'static str {
        match self {
            ProtectionAction::Monitor => "antiraid-action-monitor",
            ProtectionAction::Kick => "antiraid-action-kick",
            ProtectionAction::Ban => "antiraid-action-ban",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionOrigin {
    /// Started by the evaluator; carries the join count that tripped it.
    Automatic { trigger_count: usize },
    Manual,
}

impl ProtectionOrigin {
    pub fn trigger_count(&self) -> usize {
        match self {
            ProtectionOrigin::Automatic { trigger_count } => *trigger_count,
            ProtectionOrigin::Manual => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionOrigin::Automatic { .. } => "automatic",
            ProtectionOrigin::Manual => "manual",
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            ProtectionOrigin::Automatic { .. } => "antiraid-origin-automatic",
            ProtectionOrigin::Manual => "antiraid-origin-manual",
        }
    }
}

/// A protection window. Only meaningful while `now < expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protection {
    pub action: ProtectionAction,
    pub origin: ProtectionOrigin,
    pub threshold: usize,
    pub window: Duration,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Protection {
    fn automatic(settings: &RaidSettings, trigger_count: usize, now: DateTime<Utc>) -> Self {
        Self {
            action: settings.auto_action,
            origin: ProtectionOrigin::Automatic { trigger_count },
            threshold: settings.threshold,
            window: settings.window,
            activated_at: now,
            expires_at: now + settings.auto_duration,
        }
    }

    fn manual(
        settings: &RaidSettings,
        action: ProtectionAction,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            origin: ProtectionOrigin::Manual,
            threshold: settings.threshold,
            window: settings.window,
            activated_at: now,
            expires_at: now + duration,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn duration(&self) -> Duration {
        self.expires_at - self.activated_at
    }

    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Read-only view of an active protection window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionStatus {
    pub enabled: bool,
    pub action: ProtectionAction,
    pub origin: ProtectionOrigin,
    pub threshold: usize,
    pub time_left: Duration,
    pub expires_at: DateTime<Utc>,
}

impl ProtectionStatus {
    fn of(protection: &Protection, now: DateTime<Utc>) -> Self {
        Self {
            enabled: true,
            action: protection.action,
            origin: protection.origin,
            threshold: protection.threshold,
            time_left: protection.time_left(now),
            expires_at: protection.expires_at,
        }
    }

    pub fn time_left_ms(&self) -> i64 {
        self.time_left.num_milliseconds()
    }

    /// Minutes left, rounded up so a running window never shows "0".
    pub fn minutes_left(&self) -> i64 {
        (self.time_left_ms() + 59_999) / 60_000
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidEvaluation {
    pub is_raid: bool,
    pub recent_members: Vec<serenity::UserId>,
}

/// Result of feeding one join into the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDecision {
    /// No protection active, the join was recorded and did not breach the threshold.
    Recorded { recent: usize },
    /// The join breached the threshold and started an automatic protection window.
    RaidDetected {
        protection: Protection,
        recent_members: Vec<serenity::UserId>,
    },
    /// A protection window is active; the caller must apply its action.
    Intercepted { protection: Protection },
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub expired: Vec<(serenity::GuildId, Protection)>,
    pub purged_joins: usize,
    pub dropped_guilds: usize,
}

#[derive(Debug, Default)]
struct GuildRaidState {
    joins: HashMap<serenity::UserId, DateTime<Utc>>,
    protection: Option<Protection>,
    /// Lapsed windows replaced before a tick could report them.
    displaced: Vec<Protection>,
}

impl GuildRaidState {
    fn active_protection(&self, now: DateTime<Utc>) -> Option<&Protection> {
        self.protection.as_ref().filter(|p| !p.is_expired(now))
    }

    fn record(&mut self, user_id: serenity::UserId, now: DateTime<Utc>) {
        self.joins.insert(user_id, now);
    }

    /// Installs a new window. A lapsed one still in place is kept for the next tick.
    fn replace_protection(&mut self, protection: Protection, now: DateTime<Utc>) {
        if let Some(stale) = self.protection.replace(protection) {
            if stale.is_expired(now) {
                debug!(
                    "Lapsed protection ({}, expired at {}) replaced before it was ticked",
                    stale.action.as_str(),
                    stale.expires_at
                );
                self.displaced.push(stale);
            }
        }
    }

    fn recent_members(&self, window: Duration, now: DateTime<Utc>) -> Vec<serenity::UserId> {
        self.joins
            .iter()
            .filter(|(_, joined_at)| now - **joined_at <= window)
            .map(|(user_id, _)| *user_id)
            .collect()
    }

    fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<Protection> {
        let mut expired = std::mem::take(&mut self.displaced);
        if self.protection.as_ref().is_some_and(|p| p.is_expired(now)) {
            expired.extend(self.protection.take());
        }
        expired
    }

    fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.protection.is_none() && self.displaced.is_empty()
    }
}

/// Per-guild join bookkeeping and protection state.
///
/// Every method takes the current instant explicitly. Each operation holds the
/// guild's map entry only for its synchronous body, so the record, evaluate and
/// activate steps for one guild never interleave with another event for the
/// same guild.
///
/// Lapsed protection windows are treated as absent by every read. They are
/// physically removed and reported only by [`RaidDetector::tick`] and
/// [`RaidDetector::sweep`], which keeps a single deactivation path.
pub struct RaidDetector {
    settings: RaidSettings,
    guilds: DashMap<serenity::GuildId, GuildRaidState>,
}

impl RaidDetector {
    pub fn new(mut settings: RaidSettings) -> Self {
        settings.threshold = settings.threshold.max(1);
        Self {
            settings,
            guilds: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &RaidSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn record_join(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        now: DateTime<Utc>,
    ) {
        self.guilds.entry(guild_id).or_default().record(user_id, now);
    }

    pub fn evaluate(&self, guild_id: serenity::GuildId, now: DateTime<Utc>) -> RaidEvaluation {
        let recent_members = self
            .guilds
            .get(&guild_id)
            .map(|state| state.recent_members(self.settings.window, now))
            .unwrap_or_default();

        RaidEvaluation {
            is_raid: recent_members.len() >= self.settings.threshold,
            recent_members,
        }
    }

    /// Routes a join either to the active protection window or through
    /// record + evaluate, starting an automatic window on breach.
    pub fn handle_join(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        now: DateTime<Utc>,
    ) -> JoinDecision {
        let mut state = self.guilds.entry(guild_id).or_default();

        if let Some(protection) = state.active_protection(now) {
            return JoinDecision::Intercepted {
                protection: protection.clone(),
            };
        }

        state.record(user_id, now);
        let recent_members = state.recent_members(self.settings.window, now);
        if recent_members.len() < self.settings.threshold {
            return JoinDecision::Recorded {
                recent: recent_members.len(),
            };
        }

        let protection = Protection::automatic(&self.settings, recent_members.len(), now);
        state.replace_protection(protection.clone(), now);
        // The burst is consumed by this window; it must not trip a second one.
        state.joins.clear();

        JoinDecision::RaidDetected {
            protection,
            recent_members,
        }
    }

    /// Starts a manual window, replacing whatever window was running. A lapsed
    /// window it displaces is still reported by the next tick.
    pub fn enable(
        &self,
        guild_id: serenity::GuildId,
        action: ProtectionAction,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Protection {
        let protection = Protection::manual(&self.settings, action, duration, now);
        self.guilds
            .entry(guild_id)
            .or_default()
            .replace_protection(protection.clone(), now);
        protection
    }

    /// Ends the active window. Returns `None` when nothing was active.
    pub fn disable(&self, guild_id: serenity::GuildId, now: DateTime<Utc>) -> Option<Protection> {
        let mut state = self.guilds.get_mut(&guild_id)?;
        if state.active_protection(now).is_some() {
            state.protection.take()
        } else {
            None
        }
    }

    pub fn status(&self, guild_id: serenity::GuildId, now: DateTime<Utc>) -> Option<ProtectionStatus> {
        let state = self.guilds.get(&guild_id)?;
        state
            .active_protection(now)
            .map(|protection| ProtectionStatus::of(protection, now))
    }

    /// Removes every lapsed protection window and hands them back.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<(serenity::GuildId, Protection)> {
        let mut expired = Vec::new();
        for mut entry in self.guilds.iter_mut() {
            let guild_id = *entry.key();
            for protection in entry.value_mut().take_expired(now) {
                expired.push((guild_id, protection));
            }
        }
        expired
    }

    /// Janitor pass: expires lapsed windows, drops join records older than the
    /// retention period and forgets guilds with nothing left to track.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - self.settings.join_retention;
        let mut report = SweepReport::default();

        self.guilds.retain(|guild_id, state| {
            for protection in state.take_expired(now) {
                report.expired.push((*guild_id, protection));
            }

            let before = state.joins.len();
            state.joins.retain(|_, joined_at| *joined_at >= cutoff);
            report.purged_joins += before - state.joins.len();

            if state.is_empty() {
                report.dropped_guilds += 1;
                false
            } else {
                true
            }
        });

        report
    }

    pub fn tracked_guilds(&self) -> usize {
        self.guilds.len()
    }

    #[cfg(test)]
    pub fn tracked_joins(&self, guild_id: serenity::GuildId) -> usize {
        self.guilds
            .get(&guild_id)
            .map(|state| state.joins.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: serenity::GuildId = serenity::GuildId::new(1);

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn user(id: u64) -> serenity::UserId {
        serenity::UserId::new(id)
    }

    fn detector() -> RaidDetector {
        RaidDetector::new(RaidSettings::default())
    }

    #[test]
    fn test_burst_inside_window_is_a_raid() {
        let detector = detector();
        for (i, at) in [0, 2000, 4000, 6000, 8000].into_iter().enumerate() {
            detector.record_join(GUILD, user(i as u64 + 1), t(at));
        }

        let evaluation = detector.evaluate(GUILD, t(8000));
        assert!(evaluation.is_raid);
        assert_eq!(evaluation.recent_members.len(), 5);

        detector.record_join(GUILD, user(6), t(20_000));
        let evaluation = detector.evaluate(GUILD, t(20_000));
        assert!(!evaluation.is_raid);
        assert_eq!(evaluation.recent_members, vec![user(6)]);
    }

    #[test]
    fn test_window_edge_is_inclusive() {
        let detector = detector();
        for id in 1..=4 {
            detector.record_join(GUILD, user(id), t(0));
        }
        detector.record_join(GUILD, user(5), t(10_000));

        assert!(detector.evaluate(GUILD, t(10_000)).is_raid);
        assert!(!detector.evaluate(GUILD, t(10_001)).is_raid);
    }

    #[test]
    fn test_evaluate_does_not_mutate() {
        let detector = detector();
        detector.record_join(GUILD, user(1), t(0));

        detector.evaluate(GUILD, t(100_000));
        detector.evaluate(serenity::GuildId::new(2), t(0));

        assert_eq!(detector.tracked_joins(GUILD), 1);
        assert_eq!(detector.tracked_guilds(), 1);
    }

    #[test]
    fn test_rejoin_replaces_previous_instant() {
        let detector = detector();
        for _ in 0..5 {
            detector.record_join(GUILD, user(1), t(0));
        }

        assert_eq!(detector.tracked_joins(GUILD), 1);
        assert!(!detector.evaluate(GUILD, t(0)).is_raid);
    }

    #[test]
    fn test_raid_reported_once_per_episode() {
        let detector = detector();
        let decisions: Vec<_> = (1..=10)
            .map(|id| detector.handle_join(GUILD, user(id), t(id as i64 * 500)))
            .collect();

        let detected = decisions
            .iter()
            .filter(|d| matches!(d, JoinDecision::RaidDetected { .. }))
            .count();
        assert_eq!(detected, 1);

        match &decisions[4] {
            JoinDecision::RaidDetected {
                protection,
                recent_members,
            } => {
                assert_eq!(recent_members.len(), 5);
                assert_eq!(protection.action, ProtectionAction::Monitor);
                assert_eq!(
                    protection.origin,
                    ProtectionOrigin::Automatic { trigger_count: 5 }
                );
                assert_eq!(protection.expires_at, t(2500) + Duration::minutes(30));
            }
            other => panic!("expected raid on fifth join, got {:?}", other),
        }

        assert!(
            decisions[5..]
                .iter()
                .all(|d| matches!(d, JoinDecision::Intercepted { .. }))
        );
        assert_eq!(detector.tracked_joins(GUILD), 0);
    }

    #[test]
    fn test_disable_after_raid_does_not_retrigger() {
        let detector = detector();
        for id in 1..=5 {
            detector.handle_join(GUILD, user(id), t(0));
        }
        assert!(detector.disable(GUILD, t(1000)).is_some());

        assert_eq!(
            detector.handle_join(GUILD, user(6), t(2000)),
            JoinDecision::Recorded { recent: 1 }
        );
    }

    #[test]
    fn test_manual_window_and_lazy_expiry() {
        let detector = detector();
        let protection = detector.enable(GUILD, ProtectionAction::Ban, Duration::minutes(10), t(0));
        assert_eq!(protection.expires_at, t(600_000));
        assert_eq!(protection.duration(), Duration::minutes(10));

        let status = detector.status(GUILD, t(0)).unwrap();
        assert!(status.enabled);
        assert_eq!(status.action, ProtectionAction::Ban);
        assert_eq!(status.time_left_ms(), 600_000);
        assert_eq!(status.minutes_left(), 10);

        let mut last = status.time_left_ms();
        for ms in (0..600_000).step_by(45_000) {
            let left = detector.status(GUILD, t(ms)).unwrap().time_left_ms();
            assert!(left <= last);
            last = left;
        }

        assert!(detector.status(GUILD, t(600_000)).is_none());
        // Lazy expiry leaves physical removal to the tick.
        assert_eq!(detector.tracked_guilds(), 1);
        assert!(matches!(
            detector.handle_join(GUILD, user(1), t(600_001)),
            JoinDecision::Recorded { .. }
        ));
    }

    #[test]
    fn test_window_is_not_renewed_by_joins() {
        let detector = detector();
        for id in 1..=5 {
            detector.handle_join(GUILD, user(id), t(0));
        }
        let before = detector.status(GUILD, t(0)).unwrap().expires_at;

        for id in 6..=20 {
            detector.handle_join(GUILD, user(id), t(60_000));
        }

        assert_eq!(detector.status(GUILD, t(60_000)).unwrap().expires_at, before);
    }

    #[test]
    fn test_disable_without_protection() {
        let detector = detector();
        assert!(detector.disable(GUILD, t(0)).is_none());

        detector.enable(GUILD, ProtectionAction::Kick, Duration::minutes(1), t(0));
        assert!(detector.disable(GUILD, t(60_000)).is_none());
    }

    #[test]
    fn test_tick_reports_each_lapse_once() {
        let detector = detector();
        let other = serenity::GuildId::new(2);
        detector.enable(GUILD, ProtectionAction::Kick, Duration::minutes(1), t(0));
        detector.enable(other, ProtectionAction::Ban, Duration::minutes(5), t(0));

        assert!(detector.tick(t(59_999)).is_empty());

        let expired = detector.tick(t(60_000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, GUILD);
        assert!(detector.tick(t(60_000)).is_empty());
        assert!(detector.status(other, t(60_000)).is_some());
    }

    #[test]
    fn test_reenable_replaces_window() {
        let detector = detector();
        detector.enable(GUILD, ProtectionAction::Kick, Duration::minutes(1), t(0));
        detector.enable(GUILD, ProtectionAction::Ban, Duration::minutes(10), t(30_000));

        assert!(detector.tick(t(60_000)).is_empty());
        assert_eq!(
            detector.status(GUILD, t(60_000)).unwrap().action,
            ProtectionAction::Ban
        );
    }

    #[test]
    fn test_lapsed_window_replaced_by_enable_is_still_reported() {
        let detector = detector();
        detector.enable(GUILD, ProtectionAction::Kick, Duration::minutes(1), t(0));
        detector.enable(GUILD, ProtectionAction::Ban, Duration::minutes(10), t(70_000));

        let expired = detector.tick(t(80_000));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, GUILD);
        assert_eq!(expired[0].1.action, ProtectionAction::Kick);
        assert!(detector.tick(t(80_000)).is_empty());
        assert_eq!(
            detector.status(GUILD, t(80_000)).unwrap().action,
            ProtectionAction::Ban
        );
    }

    #[test]
    fn test_lapsed_window_replaced_by_raid_is_still_reported() {
        let detector = detector();
        detector.enable(GUILD, ProtectionAction::Kick, Duration::minutes(1), t(0));
        for id in 1..=5 {
            detector.handle_join(GUILD, user(id), t(70_000));
        }
        assert!(detector.status(GUILD, t(70_000)).unwrap().origin.trigger_count() > 0);

        let report = detector.sweep(t(80_000));
        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].1.action, ProtectionAction::Kick);
        assert_eq!(report.expired[0].1.origin, ProtectionOrigin::Manual);
        assert_eq!(detector.tracked_guilds(), 1);
    }

    #[test]
    fn test_sweep_purges_old_joins_and_empty_guilds() {
        let detector = detector();
        let quiet = serenity::GuildId::new(2);
        let busy = serenity::GuildId::new(3);
        detector.record_join(quiet, user(1), t(0));
        detector.record_join(busy, user(2), t(0));
        detector.record_join(busy, user(3), t(3_000_000));
        detector.enable(GUILD, ProtectionAction::Kick, Duration::minutes(30), t(0));

        let report = detector.sweep(t(3_700_000));

        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].0, GUILD);
        assert_eq!(report.purged_joins, 2);
        assert_eq!(report.dropped_guilds, 2);
        assert_eq!(detector.tracked_guilds(), 1);
        assert_eq!(detector.tracked_joins(busy), 1);
    }

    #[test]
    fn test_guilds_are_isolated() {
        let detector = detector();
        let other = serenity::GuildId::new(2);
        for id in 1..=4 {
            detector.handle_join(GUILD, user(id), t(0));
            detector.handle_join(other, user(id + 100), t(0));
        }

        assert!(!detector.evaluate(GUILD, t(0)).is_raid);
        assert!(matches!(
            detector.handle_join(GUILD, user(5), t(0)),
            JoinDecision::RaidDetected { .. }
        ));
        assert!(detector.status(other, t(0)).is_none());
    }

    #[test]
    fn test_custom_threshold() {
        let detector = RaidDetector::new(RaidSettings {
            threshold: 2,
            window: Duration::seconds(1),
            ..RaidSettings::default()
        });

        assert!(matches!(
            detector.handle_join(GUILD, user(1), t(0)),
            JoinDecision::Recorded { recent: 1 }
        ));
        assert!(matches!(
            detector.handle_join(GUILD, user(2), t(1500)),
            JoinDecision::Recorded { recent: 1 }
        ));
        assert!(matches!(
            detector.handle_join(GUILD, user(3), t(2000)),
            JoinDecision::RaidDetected { .. }
        ));
    }
}
