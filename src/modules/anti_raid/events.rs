use crate::db::entities::security_logs::SecurityEventType;
use crate::services::anti_raid::{DiscordGateway, JoinOutcome, PenaltyOutcome};
use crate::services::logger::{LogLevel, SecurityEvent};
use crate::{Data, Error};
use chrono::Utc;
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use serde_json::json;
use tracing::debug;

pub fn handler<'a>(
    ctx: &'a serenity::Context,
    event: &'a serenity::FullEvent,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
        if let serenity::FullEvent::GuildMemberAddition { new_member, .. } = event {
            handle_member_join(ctx, new_member, data).await?;
        }
        Ok(())
    })
}

async fn handle_member_join(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    let guild_id = member.guild_id;
    let user_id = member.user.id;
    let gateway = DiscordGateway::new(ctx, data);

    let outcome = data
        .anti_raid
        .handle_member_join(&gateway, guild_id, user_id, Utc::now())
        .await;

    match outcome {
        JoinOutcome::Recorded { recent } => {
            debug!(
                "Join of {} in guild {} recorded ({} recent)",
                user_id, guild_id, recent
            );
        }
        JoinOutcome::RaidDetected {
            protection,
            recent_members,
        } => {
            let l10n = data.l10n.for_guild(&ctx.cache, guild_id);
            let mut args = FluentArgs::new();
            args.set("count", recent_members.len() as i64);

            let members = recent_members
                .iter()
                .map(|id| format!("<@{}>", id))
                .collect::<Vec<_>>()
                .join(" ");

            let event = SecurityEvent::new(guild_id, SecurityEventType::RaidDetected)
                .user(user_id)
                .content(format!(
                    "{} joins within {}s",
                    recent_members.len(),
                    protection.window.num_seconds()
                ))
                .metadata(json!({
                    "count": recent_members.len(),
                    "threshold": protection.threshold,
                    "windowSeconds": protection.window.num_seconds(),
                    "members": recent_members.iter().map(|id| id.get().to_string()).collect::<Vec<_>>(),
                    "action": protection.action.as_str(),
                    "expiresAt": protection.expires_at,
                }));

            data.logger
                .log_event(
                    &ctx.http,
                    event,
                    LogLevel::Alert,
                    &l10n.t("antiraid-detected-title", None),
                    &l10n.t("antiraid-alert-desc-automatic", Some(&args)),
                    vec![
                        (
                            l10n.t("antiraid-field-action", None),
                            l10n.t(protection.action.label_key(), None),
                        ),
                        (
                            l10n.t("antiraid-field-duration", None),
                            l10n.minutes(protection.duration().num_minutes()),
                        ),
                        (l10n.t("antiraid-field-members", None), members),
                    ],
                )
                .await?;
        }
        JoinOutcome::Intercepted {
            protection,
            penalty,
        } => {
            let (event_type, successful) = match &penalty {
                PenaltyOutcome::Kicked => (SecurityEventType::RaidMemberKicked, true),
                PenaltyOutcome::Banned => (SecurityEventType::RaidMemberBanned, true),
                PenaltyOutcome::Observed | PenaltyOutcome::MemberGone => {
                    (SecurityEventType::RaidMemberObserved, true)
                }
                PenaltyOutcome::Skipped | PenaltyOutcome::Failed(_) => {
                    (SecurityEventType::RaidPenaltyFailed, false)
                }
            };

            let detail = match &penalty {
                PenaltyOutcome::Failed(reason) => reason.clone(),
                PenaltyOutcome::Skipped => "missing permissions or role hierarchy".to_string(),
                PenaltyOutcome::MemberGone => "member left before the action".to_string(),
                _ => String::new(),
            };

            let event = SecurityEvent::new(guild_id, event_type)
                .target(user_id)
                .content(format!(
                    "Join intercepted by raid protection ({})",
                    protection.action.as_str()
                ))
                .metadata(json!({
                    "action": protection.action.as_str(),
                    "origin": protection.origin.as_str(),
                    "detail": detail,
                }))
                .successful(successful);

            data.logger.record(event).await?;
        }
    }

    Ok(())
}
