use crate::db::entities::security_logs::SecurityEventType;
use crate::services::logger::{LogLevel, SecurityEvent};
use crate::{Data, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serde_json::json;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days between account creation and `now`, never negative.
pub fn account_age_days(created_at_unix: i64, now: DateTime<Utc>) -> i64 {
    ((now.timestamp() - created_at_unix) / SECONDS_PER_DAY).max(0)
}

pub async fn handle_guild_member_add(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    let guild_id = member.guild_id;
    let user = &member.user;
    let created_at = user.id.created_at().to_utc();
    let age_days = account_age_days(created_at.timestamp(), Utc::now());

    let l10n = data.l10n.for_guild(&ctx.cache, guild_id);

    let mut args = fluent::FluentArgs::new();
    args.set("userId", user.id.get().to_string());

    let mut age_args = fluent::FluentArgs::new();
    age_args.set("days", age_days);

    let event = SecurityEvent::new(guild_id, SecurityEventType::UserJoin)
        .user(user.id)
        .content(format!("{} joined", user.name))
        .metadata(json!({
            "accountCreated": created_at,
            "accountAgeDays": age_days,
            "bot": user.bot(),
        }));

    data.logger
        .log_event(
            &ctx.http,
            event,
            LogLevel::Info,
            &l10n.t("log-member-join-title", None),
            &l10n.t("log-member-join-desc", Some(&args)),
            vec![
                (
                    l10n.t("log-member-join-created", None),
                    format!("<t:{}:F>", created_at.timestamp()),
                ),
                (
                    l10n.t("log-member-join-age", None),
                    l10n.t("log-member-join-age-value", Some(&age_args)),
                ),
            ],
        )
        .await
}

pub async fn handle_guild_member_remove(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user: &serenity::User,
    member_data_if_available: Option<&serenity::Member>,
    data: &Data,
) -> Result<(), Error> {
    let l10n = data.l10n.for_guild(&ctx.cache, guild_id);

    let mut args = fluent::FluentArgs::new();
    args.set("userId", user.id.get().to_string());

    let roles: Vec<serenity::RoleId> = member_data_if_available
        .map(|member| member.roles.iter().cloned().collect())
        .unwrap_or_default();

    let mut fields = vec![];
    if !roles.is_empty() {
        let role_mentions = roles
            .iter()
            .map(|id| format!("<@&{}>", id.get()))
            .collect::<Vec<_>>()
            .join(", ");
        fields.push((l10n.t("log-member-leave-roles", None), role_mentions));
    }

    if let Some(joined_at) = member_data_if_available.and_then(|m| m.joined_at) {
        fields.push((
            l10n.t("log-member-leave-joined", None),
            format!("<t:{}:R>", joined_at.to_utc().timestamp()),
        ));
    }

    let event = SecurityEvent::new(guild_id, SecurityEventType::UserLeave)
        .user(user.id)
        .content(format!("{} left", user.name))
        .metadata(json!({
            "roles": roles.iter().map(|id| id.get().to_string()).collect::<Vec<_>>(),
        }));

    data.logger
        .log_event(
            &ctx.http,
            event,
            LogLevel::Info,
            &l10n.t("log-member-leave-title", None),
            &l10n.t("log-member-leave-desc", Some(&args)),
            fields,
        )
        .await
}
