use crate::db::entities::security_logs::SecurityEventType;
use crate::services::anti_raid::{DiscordGateway, ProtectionAction, ProtectionChange};
use crate::services::localization::ContextL10nExt;
use crate::services::logger::{LogLevel, SecurityEvent, build_card};
use crate::{Context, Error};
use chrono::Utc;
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use serde_json::json;

/// Manage raid protection
#[poise::command(
    slash_command,
    subcommands("enable", "disable", "status"),
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn antiraid(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Enable raid protection manually
#[poise::command(
    slash_command,
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn enable(
    ctx: Context<'_>,
    #[description = "What to do with members who join while protection is on"]
    action: ProtectionAction,
    #[description = "How long protection stays on, in minutes (default 30)"]
    #[min = 1]
    #[max = 1440]
    duration: Option<u32>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let l10n = ctx.l10n_guild();
    let data = ctx.data();
    let gateway = DiscordGateway::new(ctx.serenity_context(), &data);

    let change = data
        .anti_raid
        .enable_manual_protection(&gateway, guild_id, action, duration, Utc::now())
        .await;

    let ProtectionChange::Enabled(protection) = &change else {
        reply_notice(ctx, change.describe(&l10n)).await?;
        return Ok(());
    };

    let title = l10n.t("antiraid-enabled-title", None);
    let desc = change.describe(&l10n);
    let fields = vec![
        (
            l10n.t("antiraid-field-action", None),
            l10n.t(action.label_key(), None),
        ),
        (
            l10n.t("antiraid-field-duration", None),
            l10n.minutes(protection.duration().num_minutes()),
        ),
        (
            l10n.t("antiraid-field-moderator", None),
            format!("<@{}>", ctx.author().id),
        ),
    ];

    reply_card(
        ctx,
        build_card(LogLevel::Alert, &title, &desc, fields.clone()),
        false,
    )
    .await?;

    let event = SecurityEvent::new(guild_id, SecurityEventType::ProtectionEnabled)
        .user(ctx.author().id)
        .content(format!(
            "Manual raid protection ({}) enabled for {} minutes",
            action.as_str(),
            protection.duration().num_minutes()
        ))
        .metadata(json!({
            "action": action.as_str(),
            "durationMinutes": protection.duration().num_minutes(),
            "expiresAt": protection.expires_at,
        }));

    data.logger
        .log_event(ctx.http(), event, LogLevel::Audit, &title, &desc, fields)
        .await?;

    Ok(())
}

/// Disable raid protection
#[poise::command(
    slash_command,
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let l10n = ctx.l10n_guild();
    let data = ctx.data();

    let change = data
        .anti_raid
        .disable_manual_protection(guild_id, Utc::now());

    let ProtectionChange::Disabled(protection) = &change else {
        reply_notice(ctx, change.describe(&l10n)).await?;
        return Ok(());
    };

    let title = l10n.t("antiraid-disabled-title", None);
    let desc = change.describe(&l10n);
    let fields = vec![(
        l10n.t("antiraid-field-moderator", None),
        format!("<@{}>", ctx.author().id),
    )];

    reply_card(
        ctx,
        build_card(LogLevel::Success, &title, &desc, fields.clone()),
        false,
    )
    .await?;

    let event = SecurityEvent::new(guild_id, SecurityEventType::ProtectionDisabled)
        .user(ctx.author().id)
        .content(format!(
            "Raid protection ({}) disabled manually",
            protection.action.as_str()
        ))
        .metadata(json!({
            "action": protection.action.as_str(),
            "expiresAt": protection.expires_at,
        }));

    data.logger
        .log_event(ctx.http(), event, LogLevel::Audit, &title, &desc, fields)
        .await?;

    Ok(())
}

/// Show the current raid protection status
#[poise::command(
    slash_command,
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let l10n = ctx.l10n_user();

    let data = ctx.data();
    let anti_raid = &data.anti_raid;
    let now = Utc::now();

    let Some(status) = anti_raid.protection_status(guild_id, now) else {
        let evaluation = anti_raid.evaluate(guild_id, now);
        let mut args = FluentArgs::new();
        args.set("count", evaluation.recent_members.len() as i64);
        args.set("threshold", anti_raid.settings().threshold as i64);
        reply_notice(ctx, l10n.t("antiraid-status-inactive", Some(&args))).await?;
        return Ok(());
    };

    let mut threshold_args = FluentArgs::new();
    threshold_args.set("count", status.threshold as i64);

    let card = build_card(
        LogLevel::Warn,
        &l10n.t("antiraid-status-title", None),
        &l10n.t("antiraid-status-active", None),
        vec![
            (
                l10n.t("antiraid-field-action", None),
                l10n.t(status.action.label_key(), None),
            ),
            (
                l10n.t("antiraid-field-time-left", None),
                l10n.minutes(status.minutes_left()),
            ),
            (
                l10n.t("antiraid-field-expires", None),
                format!("<t:{}:t>", status.expires_at.timestamp()),
            ),
            (
                l10n.t("antiraid-field-threshold", None),
                l10n.t("antiraid-threshold-value", Some(&threshold_args)),
            ),
            (
                l10n.t("antiraid-field-origin", None),
                l10n.t(status.origin.label_key(), None),
            ),
        ],
    );

    reply_card(ctx, card, true).await
}

fn guild_id(ctx: &Context<'_>) -> Result<serenity::GuildId, Error> {
    ctx.guild_id()
        .ok_or_else(|| anyhow::anyhow!("Raid protection is only available in guilds"))
}

async fn reply_card(
    ctx: Context<'_>,
    card: serenity::CreateComponent<'static>,
    ephemeral: bool,
) -> Result<(), Error> {
    let mut flags = serenity::MessageFlags::IS_COMPONENTS_V2;
    if ephemeral {
        flags |= serenity::MessageFlags::EPHEMERAL;
    }

    ctx.send(
        poise::CreateReply::default()
            .flags(flags)
            .components(vec![card]),
    )
    .await?;

    Ok(())
}

async fn reply_notice(ctx: Context<'_>, text: String) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}
