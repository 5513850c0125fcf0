use crate::db::entities::guild_configs;
use crate::db::entities::security_logs::SecurityEventType;
use crate::services::localization::ContextL10nExt;
use crate::services::logger::{LogLevel, SecurityEvent};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;

/// Which configured channel a command updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelSetting {
    Log,
    Alert,
}

impl ChannelSetting {
    fn as_str(&self) -> &'static str {
        match self {
            ChannelSetting::Log => "log_channel_id",
            ChannelSetting::Alert => "alert_channel_id",
        }
    }

    fn title_key(&self) -> &'static str {
        match self {
            ChannelSetting::Log => "config-log-channel-title",
            ChannelSetting::Alert => "config-alert-channel-title",
        }
    }

    fn desc_key(&self) -> &'static str {
        match self {
            ChannelSetting::Log => "config-log-channel-desc",
            ChannelSetting::Alert => "config-alert-channel-desc",
        }
    }
}

/// Configuration commands
#[poise::command(
    slash_command,
    subcommands("log_channel", "alert_channel"),
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn config(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the channel where security logs will be sent
#[poise::command(
    slash_command,
    rename = "log-channel",
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn log_channel(
    ctx: Context<'_>,
    #[description = "The channel to send logs to"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    set_channel(ctx, ChannelSetting::Log, channel.id).await
}

/// Set the channel where raid alerts will be sent
#[poise::command(
    slash_command,
    rename = "alert-channel",
    install_context = "Guild",
    interaction_context = "Guild",
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn alert_channel(
    ctx: Context<'_>,
    #[description = "The channel to send raid alerts to"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    set_channel(ctx, ChannelSetting::Alert, channel.id).await
}

async fn set_channel(
    ctx: Context<'_>,
    setting: ChannelSetting,
    channel_id: serenity::ChannelId,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| anyhow::anyhow!("Configuration is only available in guilds"))?;
    let data = ctx.data();
    let db = &data.db;

    let mut config: guild_configs::ActiveModel =
        match guild_configs::Entity::find_by_id(guild_id.get() as i64)
            .one(db)
            .await?
        {
            Some(m) => m.into(),
            None => {
                let m = guild_configs::ActiveModel {
                    guild_id: Set(guild_id.get() as i64),
                    ..Default::default()
                };
                m.insert(db).await?.into()
            }
        };

    let value = Some(channel_id.get() as i64);
    match setting {
        ChannelSetting::Log => config.log_channel_id = Set(value),
        ChannelSetting::Alert => config.alert_channel_id = Set(value),
    }
    config.update(db).await?;

    let l10n = ctx.l10n_guild();
    let mut args = fluent::FluentArgs::new();
    args.set("channelId", channel_id.get().to_string());

    let title = l10n.t(setting.title_key(), None);
    let desc = l10n.t(setting.desc_key(), Some(&args));

    ctx.say(desc.clone()).await?;

    let event = SecurityEvent::new(guild_id, SecurityEventType::ConfigChanged)
        .user(ctx.author().id)
        .content(format!("{} set to {}", setting.as_str(), channel_id))
        .metadata(json!({
            "setting": setting.as_str(),
            "channelId": channel_id.get().to_string(),
        }));

    data.logger
        .log_event(
            ctx.http(),
            event,
            LogLevel::Audit,
            &title,
            &desc,
            vec![(
                l10n.t("config-field-moderator", None),
                format!("<@{}>", ctx.author().id),
            )],
        )
        .await?;

    Ok(())
}
