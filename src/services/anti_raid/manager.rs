use super::detector::{
    JoinDecision, Protection, ProtectionAction, ProtectionStatus, RaidDetector, RaidEvaluation,
    SweepReport,
};
use super::gateway::{GatewayError, ModerationGateway, RaidAlert};
use super::settings::{MAX_MANUAL_MINUTES, RaidSettings};
use crate::services::localization::L10nProxy;
use chrono::{DateTime, Duration, Utc};
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

/// What happened to a member who joined during an active protection window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PenaltyOutcome {
    Kicked,
    Banned,
    /// Monitor-only window, nothing was done to the member.
    Observed,
    /// The bot may not remove this member (permissions or role hierarchy).
    Skipped,
    /// The member left before the action went through.
    MemberGone,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Recorded {
        recent: usize,
    },
    RaidDetected {
        protection: Protection,
        recent_members: Vec<serenity::UserId>,
    },
    Intercepted {
        protection: Protection,
        penalty: PenaltyOutcome,
    },
}

/// Result of a manual enable/disable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionChange {
    Enabled(Protection),
    Disabled(Protection),
    NotActive,
    InvalidDuration(u32),
}

impl ProtectionChange {
    /// Moderator-facing message describing the change.
    pub fn describe(&self, l10n: &L10nProxy) -> String {
        match self {
            ProtectionChange::Enabled(protection) => {
                let mut args = FluentArgs::new();
                args.set("action", l10n.t(protection.action.label_key(), None));
                args.set("minutes", protection.duration().num_minutes());
                l10n.t("antiraid-enabled-message", Some(&args))
            }
            ProtectionChange::Disabled(_) => l10n.t("antiraid-disabled-message", None),
            ProtectionChange::NotActive => l10n.t("antiraid-not-active-message", None),
            ProtectionChange::InvalidDuration(minutes) => {
                let mut args = FluentArgs::new();
                args.set("minutes", *minutes);
                args.set("max", MAX_MANUAL_MINUTES);
                l10n.t("antiraid-invalid-duration", Some(&args))
            }
        }
    }
}

/// Anti-raid front door shared through [`crate::Data`].
///
/// Detector state transitions happen synchronously; all Discord I/O goes
/// through the [`ModerationGateway`] passed by the caller, after the
/// transition, so a slow or failing request never holds guild state.
pub struct AntiRaidService {
    pub(crate) detector: RaidDetector,
}

impl AntiRaidService {
    pub fn new(settings: RaidSettings) -> Self {
        Self {
            detector: RaidDetector::new(settings),
        }
    }

    pub fn settings(&self) -> &RaidSettings {
        self.detector.settings()
    }

    pub async fn handle_member_join(
        &self,
        gateway: &dyn ModerationGateway,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        now: DateTime<Utc>,
    ) -> JoinOutcome {
        match self.detector.handle_join(guild_id, user_id, now) {
            JoinDecision::Recorded { recent } => JoinOutcome::Recorded { recent },
            JoinDecision::RaidDetected {
                protection,
                recent_members,
            } => {
                warn!(
                    "Raid detected in guild {}: {} joins within {}s, protection ({}) active until {}",
                    guild_id,
                    recent_members.len(),
                    protection.window.num_seconds(),
                    protection.action.as_str(),
                    protection.expires_at
                );
                self.notify(gateway, guild_id, &protection).await;
                JoinOutcome::RaidDetected {
                    protection,
                    recent_members,
                }
            }
            JoinDecision::Intercepted { protection } => {
                let penalty = self
                    .apply_protection(gateway, guild_id, user_id, &protection)
                    .await;
                JoinOutcome::Intercepted {
                    protection,
                    penalty,
                }
            }
        }
    }

    async fn apply_protection(
        &self,
        gateway: &dyn ModerationGateway,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        protection: &Protection,
    ) -> PenaltyOutcome {
        let result = match protection.action {
            ProtectionAction::Monitor => {
                info!(
                    "User {} joined guild {} during active raid protection",
                    user_id, guild_id
                );
                return PenaltyOutcome::Observed;
            }
            ProtectionAction::Kick => gateway
                .kick(guild_id, user_id)
                .await
                .map(|_| PenaltyOutcome::Kicked),
            ProtectionAction::Ban => gateway
                .ban(guild_id, user_id, self.settings().ban_purge_seconds)
                .await
                .map(|_| PenaltyOutcome::Banned),
        };

        match result {
            Ok(outcome) => {
                info!(
                    "Raid protection: {} user {} in guild {}",
                    protection.action.as_str(),
                    user_id,
                    guild_id
                );
                outcome
            }
            Err(GatewayError::MissingPermissions) => {
                warn!(
                    "Raid protection: cannot {} user {} in guild {}, skipping",
                    protection.action.as_str(),
                    user_id,
                    guild_id
                );
                PenaltyOutcome::Skipped
            }
            Err(GatewayError::UnknownMember) => {
                info!(
                    "Raid protection: user {} already left guild {}",
                    user_id, guild_id
                );
                PenaltyOutcome::MemberGone
            }
            Err(e) => {
                error!(
                    "Raid protection: failed to {} user {} in guild {}: {:?}",
                    protection.action.as_str(),
                    user_id,
                    guild_id,
                    e
                );
                PenaltyOutcome::Failed(e.to_string())
            }
        }
    }

    /// Best-effort alert about a new protection window. Never fails.
    pub async fn notify(
        &self,
        gateway: &dyn ModerationGateway,
        guild_id: serenity::GuildId,
        protection: &Protection,
    ) {
        let channel_id = match gateway.alert_channel(guild_id).await {
            Ok(Some(channel_id)) => channel_id,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    "Failed to resolve raid alert channel for guild {}: {:?}",
                    guild_id, e
                );
                return;
            }
        };

        let alert = RaidAlert::for_protection(guild_id, protection);
        if let Err(e) = gateway.send_alert(channel_id, &alert).await {
            warn!(
                "Failed to send raid alert to channel {} in guild {}: {:?}",
                channel_id, guild_id, e
            );
        }
    }

    pub async fn enable_manual_protection(
        &self,
        gateway: &dyn ModerationGateway,
        guild_id: serenity::GuildId,
        action: ProtectionAction,
        duration_minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> ProtectionChange {
        let minutes = duration_minutes.unwrap_or(self.settings().manual_default_minutes);
        if minutes == 0 || minutes > MAX_MANUAL_MINUTES {
            return ProtectionChange::InvalidDuration(minutes);
        }

        let protection =
            self.detector
                .enable(guild_id, action, Duration::minutes(minutes as i64), now);
        info!(
            "Manual raid protection ({}) enabled in guild {} for {} minutes",
            action.as_str(),
            guild_id,
            minutes
        );

        self.notify(gateway, guild_id, &protection).await;
        ProtectionChange::Enabled(protection)
    }

    pub fn disable_manual_protection(
        &self,
        guild_id: serenity::GuildId,
        now: DateTime<Utc>,
    ) -> ProtectionChange {
        match self.detector.disable(guild_id, now) {
            Some(protection) => {
                info!("Raid protection disabled in guild {}", guild_id);
                ProtectionChange::Disabled(protection)
            }
            None => ProtectionChange::NotActive,
        }
    }

    pub fn protection_status(
        &self,
        guild_id: serenity::GuildId,
        now: DateTime<Utc>,
    ) -> Option<ProtectionStatus> {
        self.detector.status(guild_id, now)
    }

    /// Joins currently inside the sliding window, without recording anything.
    pub fn evaluate(&self, guild_id: serenity::GuildId, now: DateTime<Utc>) -> RaidEvaluation {
        let evaluation = self.detector.evaluate(guild_id, now);
        debug!(
            "Guild {} has {} recent join(s), over threshold: {}",
            guild_id,
            evaluation.recent_members.len(),
            evaluation.is_raid
        );
        evaluation
    }

    /// Deactivates every protection window whose expiry has passed.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<(serenity::GuildId, Protection)> {
        let expired = self.detector.tick(now);
        for (guild_id, protection) in &expired {
            info!(
                "Raid protection ({}) expired in guild {}",
                protection.action.as_str(),
                guild_id
            );
        }
        expired
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let report = self.detector.sweep(now);
        for (guild_id, protection) in &report.expired {
            info!(
                "Raid protection ({}) expired in guild {}",
                protection.action.as_str(),
                guild_id
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const GUILD: serenity::GuildId = serenity::GuildId::new(42);

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[derive(Default)]
    struct RecordingGateway {
        kicks: Mutex<Vec<serenity::UserId>>,
        bans: Mutex<Vec<(serenity::UserId, u32)>>,
        alerts: Mutex<Vec<(serenity::ChannelId, RaidAlert)>>,
        alert_channel: Option<serenity::ChannelId>,
        deny_removal: bool,
        member_gone: bool,
        fail_alerts: bool,
    }

    impl RecordingGateway {
        fn with_alert_channel() -> Self {
            Self {
                alert_channel: Some(serenity::ChannelId::new(7)),
                ..Default::default()
            }
        }

        fn removal_result(&self) -> Result<(), GatewayError> {
            if self.deny_removal {
                Err(GatewayError::MissingPermissions)
            } else if self.member_gone {
                Err(GatewayError::UnknownMember)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ModerationGateway for RecordingGateway {
        async fn kick(
            &self,
            _guild_id: serenity::GuildId,
            user_id: serenity::UserId,
        ) -> Result<(), GatewayError> {
            self.removal_result()?;
            self.kicks.lock().unwrap().push(user_id);
            Ok(())
        }

        async fn ban(
            &self,
            _guild_id: serenity::GuildId,
            user_id: serenity::UserId,
            delete_message_seconds: u32,
        ) -> Result<(), GatewayError> {
            self.removal_result()?;
            self.bans
                .lock()
                .unwrap()
                .push((user_id, delete_message_seconds));
            Ok(())
        }

        async fn alert_channel(
            &self,
            _guild_id: serenity::GuildId,
        ) -> Result<Option<serenity::ChannelId>, GatewayError> {
            Ok(self.alert_channel)
        }

        async fn send_alert(
            &self,
            channel_id: serenity::ChannelId,
            alert: &RaidAlert,
        ) -> Result<(), GatewayError> {
            if self.fail_alerts {
                return Err(GatewayError::MissingPermissions);
            }
            self.alerts
                .lock()
                .unwrap()
                .push((channel_id, alert.clone()));
            Ok(())
        }
    }

    fn service() -> AntiRaidService {
        AntiRaidService::new(RaidSettings::default())
    }

    #[tokio::test]
    async fn test_raid_triggers_single_alert() {
        let service = service();
        let gateway = RecordingGateway::with_alert_channel();

        let mut outcomes = vec![];
        for (i, at) in [0, 2000, 4000, 6000, 8000].into_iter().enumerate() {
            let user = serenity::UserId::new(i as u64 + 1);
            outcomes.push(service.handle_member_join(&gateway, GUILD, user, t(at)).await);
        }

        assert!(matches!(outcomes[3], JoinOutcome::Recorded { recent: 4 }));
        assert!(matches!(outcomes[4], JoinOutcome::RaidDetected { .. }));

        let outcome = service
            .handle_member_join(&gateway, GUILD, serenity::UserId::new(6), t(20_000))
            .await;
        assert!(matches!(
            outcome,
            JoinOutcome::Intercepted {
                penalty: PenaltyOutcome::Observed,
                ..
            }
        ));

        let alerts = gateway.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, serenity::ChannelId::new(7));
        assert_eq!(alerts[0].1.trigger_count, 5);
        assert_eq!(alerts[0].1.duration, Duration::minutes(30));
        assert!(gateway.kicks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_ban_window() {
        let service = service();
        let gateway = RecordingGateway::default();

        let change = service
            .enable_manual_protection(&gateway, GUILD, ProtectionAction::Ban, Some(10), t(0))
            .await;
        assert!(matches!(change, ProtectionChange::Enabled(_)));

        let status = service.protection_status(GUILD, t(0)).unwrap();
        assert_eq!(status.action, ProtectionAction::Ban);
        assert_eq!(status.time_left_ms(), 600_000);

        let outcome = service
            .handle_member_join(&gateway, GUILD, serenity::UserId::new(9), t(1000))
            .await;
        assert!(matches!(
            outcome,
            JoinOutcome::Intercepted {
                penalty: PenaltyOutcome::Banned,
                ..
            }
        ));
        assert_eq!(
            *gateway.bans.lock().unwrap(),
            vec![(serenity::UserId::new(9), 3600)]
        );

        assert!(service.protection_status(GUILD, t(600_000)).is_none());
    }

    #[tokio::test]
    async fn test_default_manual_duration() {
        let service = service();
        let gateway = RecordingGateway::default();

        let change = service
            .enable_manual_protection(&gateway, GUILD, ProtectionAction::Kick, None, t(0))
            .await;

        match change {
            ProtectionChange::Enabled(protection) => {
                assert_eq!(protection.duration(), Duration::minutes(30));
            }
            other => panic!("expected enabled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_manual_duration() {
        let service = service();
        let gateway = RecordingGateway::default();

        for minutes in [0, MAX_MANUAL_MINUTES + 1] {
            let change = service
                .enable_manual_protection(&gateway, GUILD, ProtectionAction::Kick, Some(minutes), t(0))
                .await;
            assert_eq!(change, ProtectionChange::InvalidDuration(minutes));
        }
        assert!(service.protection_status(GUILD, t(0)).is_none());
    }

    #[tokio::test]
    async fn test_kick_without_permission_is_skipped() {
        let service = service();
        let gateway = RecordingGateway {
            deny_removal: true,
            ..Default::default()
        };
        service
            .enable_manual_protection(&gateway, GUILD, ProtectionAction::Kick, Some(30), t(0))
            .await;
        let before = service.protection_status(GUILD, t(1000));

        let outcome = service
            .handle_member_join(&gateway, GUILD, serenity::UserId::new(3), t(1000))
            .await;

        assert!(matches!(
            outcome,
            JoinOutcome::Intercepted {
                penalty: PenaltyOutcome::Skipped,
                ..
            }
        ));
        assert!(gateway.kicks.lock().unwrap().is_empty());
        assert_eq!(service.protection_status(GUILD, t(1000)), before);
    }

    #[tokio::test]
    async fn test_member_already_gone() {
        let service = service();
        let gateway = RecordingGateway {
            member_gone: true,
            ..Default::default()
        };
        service
            .enable_manual_protection(&gateway, GUILD, ProtectionAction::Ban, Some(5), t(0))
            .await;

        let outcome = service
            .handle_member_join(&gateway, GUILD, serenity::UserId::new(3), t(0))
            .await;

        match outcome {
            JoinOutcome::Intercepted { penalty, .. } => {
                assert_eq!(penalty, PenaltyOutcome::MemberGone);
            }
            other => panic!("expected intercepted join, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_alert_failures_are_swallowed() {
        let service = service();
        let gateway = RecordingGateway {
            alert_channel: Some(serenity::ChannelId::new(7)),
            fail_alerts: true,
            ..Default::default()
        };

        let change = service
            .enable_manual_protection(&gateway, GUILD, ProtectionAction::Kick, Some(5), t(0))
            .await;

        assert!(matches!(change, ProtectionChange::Enabled(_)));
        assert!(gateway.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_alert_has_no_trigger_count() {
        let service = service();
        let gateway = RecordingGateway::with_alert_channel();

        service
            .enable_manual_protection(&gateway, GUILD, ProtectionAction::Kick, Some(15), t(0))
            .await;

        let alerts = gateway.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].1.trigger_count, 0);
        assert_eq!(alerts[0].1.action, ProtectionAction::Kick);
        assert_eq!(alerts[0].1.duration, Duration::minutes(15));
    }

    #[test]
    fn test_disable_reports_structured_result() {
        let service = service();

        assert_eq!(
            service.disable_manual_protection(GUILD, t(0)),
            ProtectionChange::NotActive
        );

        service
            .detector
            .enable(GUILD, ProtectionAction::Kick, Duration::minutes(5), t(0));
        let change = service.disable_manual_protection(GUILD, t(1000));
        assert!(matches!(change, ProtectionChange::Disabled(_)));
        assert!(service.protection_status(GUILD, t(1000)).is_none());
        assert_eq!(
            service.disable_manual_protection(GUILD, t(2000)),
            ProtectionChange::NotActive
        );
    }

    #[test]
    fn test_tick_deactivates_expired_windows() {
        let service = service();
        service
            .detector
            .enable(GUILD, ProtectionAction::Kick, Duration::minutes(5), t(0));

        assert!(service.tick(t(299_999)).is_empty());
        assert_eq!(service.tick(t(300_000)).len(), 1);
        assert_eq!(
            service.disable_manual_protection(GUILD, t(300_000)),
            ProtectionChange::NotActive
        );
    }
}
