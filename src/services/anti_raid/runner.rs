use super::detector::Protection;
use super::manager::AntiRaidService;
use crate::db::entities::security_logs::SecurityEventType;
use crate::services::localization::LocalizationManager;
use crate::services::logger::{LogLevel, LoggerService, SecurityEvent};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Instant, interval};
use tracing::{debug, error, info};

impl AntiRaidService {
    /// Starts the background task that expires protection windows every tick
    /// and runs the janitor sweep once per sweep period.
    pub fn start_protection_runner(
        self: Arc<Self>,
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        logger: Arc<LoggerService>,
        l10n: Arc<LocalizationManager>,
    ) {
        tokio::spawn(async move {
            info!("Raid protection runner started.");
            let tick_period = self.settings().tick_period;
            let sweep_period = self.settings().sweep_period;
            let mut ticker = interval(tick_period);
            let mut last_sweep = Instant::now();

            loop {
                ticker.tick().await;
                let now = Utc::now();

                let sweep_due = last_sweep.elapsed() >= sweep_period;
                if sweep_due {
                    last_sweep = Instant::now();
                }
                let expired = self.run_once(now, sweep_due);

                for (guild_id, protection) in expired {
                    if let Err(e) =
                        log_expiry(&http, &cache, &logger, &l10n, guild_id, &protection).await
                    {
                        error!(
                            "Failed to log raid protection expiry in guild {}: {:?}",
                            guild_id, e
                        );
                    }
                }
            }
        });
    }

    /// One runner cycle: a janitor sweep when one is due, a plain tick
    /// otherwise. Both hand back the windows that lapsed.
    pub(crate) fn run_once(
        &self,
        now: DateTime<Utc>,
        sweep_due: bool,
    ) -> Vec<(serenity::GuildId, Protection)> {
        if !sweep_due {
            return self.tick(now);
        }

        let report = self.sweep(now);
        if report.purged_joins > 0 || report.dropped_guilds > 0 {
            info!(
                "Raid janitor purged {} join record(s), dropped {} idle guild(s), {} still tracked",
                report.purged_joins,
                report.dropped_guilds,
                self.detector.tracked_guilds()
            );
        } else {
            debug!("Raid janitor found nothing to purge");
        }
        report.expired
    }
}

async fn log_expiry(
    http: &serenity::Http,
    cache: &serenity::Cache,
    logger: &LoggerService,
    l10n: &Arc<LocalizationManager>,
    guild_id: serenity::GuildId,
    protection: &Protection,
) -> Result<(), crate::Error> {
    let l10n = l10n.for_guild(cache, guild_id);
    let action = l10n.t(protection.action.label_key(), None);

    let event = SecurityEvent::new(guild_id, SecurityEventType::ProtectionExpired)
        .content(format!("Raid protection ({}) expired", protection.action.as_str()))
        .metadata(json!({
            "action": protection.action.as_str(),
            "activatedAt": protection.activated_at,
            "expiresAt": protection.expires_at,
        }));

    logger
        .log_event(
            http,
            event,
            LogLevel::Success,
            &l10n.t("antiraid-expired-title", None),
            &l10n.t("antiraid-expired-desc", None),
            vec![
                (l10n.t("antiraid-field-action", None), action),
                (
                    l10n.t("antiraid-field-origin", None),
                    l10n.t(protection.origin.label_key(), None),
                ),
            ],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::anti_raid::{ProtectionAction, RaidSettings};
    use chrono::Duration;

    const GUILD: serenity::GuildId = serenity::GuildId::new(1);

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_tick_cycle_reports_expiry() {
        let service = AntiRaidService::new(RaidSettings::default());
        service
            .detector
            .enable(GUILD, ProtectionAction::Kick, Duration::minutes(1), t(0));

        assert!(service.run_once(t(30_000), false).is_empty());
        let expired = service.run_once(t(60_000), false);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, GUILD);
    }

    #[test]
    fn test_sweep_cycle_reports_expiry_and_purges() {
        let service = AntiRaidService::new(RaidSettings::default());
        let quiet = serenity::GuildId::new(2);
        service
            .detector
            .enable(GUILD, ProtectionAction::Ban, Duration::minutes(1), t(0));
        service
            .detector
            .handle_join(quiet, serenity::UserId::new(7), t(0));

        let expired = service.run_once(t(3_700_000), true);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, GUILD);
        assert_eq!(expired[0].1.action, ProtectionAction::Ban);
        assert_eq!(service.detector.tracked_guilds(), 0);
        assert!(service.run_once(t(3_700_000), true).is_empty());
    }
}
