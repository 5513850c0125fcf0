use super::detector::{Protection, ProtectionAction, ProtectionOrigin};
use crate::Data;
use crate::db::entities::guild_configs;
use crate::services::localization::LocalizationManager;
use crate::services::logger::{LogLevel, build_card};
use async_trait::async_trait;
use chrono::Duration;
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing permissions to moderate this member")]
    MissingPermissions,
    #[error("member is no longer in the guild")]
    UnknownMember,
    #[error(transparent)]
    Discord(Box<serenity::Error>),
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

impl GatewayError {
    /// Maps the HTTP statuses the penalty path treats specially. Other
    /// statuses stay wrapped as [`GatewayError::Discord`].
    fn from_status(status: u16) -> Option<Self> {
        match status {
            403 => Some(GatewayError::MissingPermissions),
            404 => Some(GatewayError::UnknownMember),
            _ => None,
        }
    }
}

impl From<serenity::Error> for GatewayError {
    fn from(err: serenity::Error) -> Self {
        if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) =
            &err
        {
            if let Some(classified) = GatewayError::from_status(response.status_code.as_u16()) {
                return classified;
            }
        }
        GatewayError::Discord(Box::new(err))
    }
}

/// Whether the bot may remove `target_id` given the highest role positions
/// known for both members. The owner can never be removed; when either
/// position is unknown the API gets the final say.
fn outranks_by_position(
    owner_id: serenity::UserId,
    target_id: serenity::UserId,
    bot_position: Option<u16>,
    target_position: Option<u16>,
) -> bool {
    if owner_id == target_id {
        return false;
    }
    match (bot_position, target_position) {
        (Some(bot), Some(target)) => bot > target,
        _ => true,
    }
}

/// Payload of the one-shot alert sent when a protection window starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidAlert {
    pub guild_id: serenity::GuildId,
    pub trigger_count: usize,
    pub action: ProtectionAction,
    pub duration: Duration,
    pub origin: ProtectionOrigin,
}

impl RaidAlert {
    pub fn for_protection(guild_id: serenity::GuildId, protection: &Protection) -> Self {
        Self {
            guild_id,
            trigger_count: protection.origin.trigger_count(),
            action: protection.action,
            duration: protection.duration(),
            origin: protection.origin,
        }
    }
}

/// Outbound calls the anti-raid service makes into the chat platform.
#[async_trait]
pub trait ModerationGateway: Send + Sync {
    /// Kicks a member if the bot outranks them.
    async fn kick(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
    ) -> Result<(), GatewayError>;

    /// Bans a member if the bot outranks them, purging recent messages.
    async fn ban(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        delete_message_seconds: u32,
    ) -> Result<(), GatewayError>;

    /// Channel that receives raid alerts, if the guild has one.
    async fn alert_channel(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<Option<serenity::ChannelId>, GatewayError>;

    async fn send_alert(
        &self,
        channel_id: serenity::ChannelId,
        alert: &RaidAlert,
    ) -> Result<(), GatewayError>;
}

/// [`ModerationGateway`] backed by the serenity HTTP client and cache.
pub struct DiscordGateway<'a> {
    http: &'a serenity::Http,
    cache: &'a serenity::Cache,
    db: &'a DatabaseConnection,
    l10n: &'a Arc<LocalizationManager>,
}

impl<'a> DiscordGateway<'a> {
    pub fn new(ctx: &'a serenity::Context, data: &'a Data) -> Self {
        Self {
            http: &ctx.http,
            cache: &ctx.cache,
            db: &data.db,
            l10n: &data.l10n,
        }
    }

    fn penalty_reason(&self, guild_id: serenity::GuildId) -> String {
        self.l10n
            .for_guild(self.cache, guild_id)
            .t("antiraid-penalty-reason", None)
    }

    /// Role hierarchy check against cached guild data. When the guild or one
    /// of the members is not cached the API gets the final say.
    fn outranks(&self, guild_id: serenity::GuildId, user_id: serenity::UserId) -> bool {
        let bot_id = self.cache.current_user().id;
        let Some(guild) = self.cache.guild(guild_id) else {
            return true;
        };

        let highest = |member_id: serenity::UserId| {
            guild.members.get(&member_id).map(|member| {
                member
                    .roles
                    .iter()
                    .filter_map(|r| guild.roles.get(r).map(|role| role.position))
                    .max()
                    .unwrap_or(0)
            })
        };

        outranks_by_position(guild.owner_id, user_id, highest(bot_id), highest(user_id))
    }
}

#[async_trait]
impl ModerationGateway for DiscordGateway<'_> {
    async fn kick(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
    ) -> Result<(), GatewayError> {
        if !self.outranks(guild_id, user_id) {
            return Err(GatewayError::MissingPermissions);
        }
        let reason = self.penalty_reason(guild_id);
        guild_id.kick(self.http, user_id, Some(&reason)).await?;
        Ok(())
    }

    async fn ban(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        delete_message_seconds: u32,
    ) -> Result<(), GatewayError> {
        if !self.outranks(guild_id, user_id) {
            return Err(GatewayError::MissingPermissions);
        }
        let reason = self.penalty_reason(guild_id);
        guild_id
            .ban(self.http, user_id, delete_message_seconds, Some(&reason))
            .await?;
        Ok(())
    }

    async fn alert_channel(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<Option<serenity::ChannelId>, GatewayError> {
        let configured = guild_configs::Entity::find_by_id(guild_id.get() as i64)
            .one(self.db)
            .await?
            .and_then(|c| c.alert_channel_id);
        if let Some(id) = configured {
            return Ok(Some(serenity::ChannelId::new(id as u64)));
        }

        let cached = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.system_channel_id);
        match cached {
            Some(channel_id) => Ok(channel_id),
            None => Ok(guild_id.to_partial_guild(self.http).await?.system_channel_id),
        }
    }

    async fn send_alert(
        &self,
        channel_id: serenity::ChannelId,
        alert: &RaidAlert,
    ) -> Result<(), GatewayError> {
        let l10n = self.l10n.for_guild(self.cache, alert.guild_id);

        let description = match alert.origin {
            ProtectionOrigin::Automatic { .. } => {
                let mut args = FluentArgs::new();
                args.set("count", alert.trigger_count as i64);
                l10n.t("antiraid-alert-desc-automatic", Some(&args))
            }
            ProtectionOrigin::Manual => l10n.t("antiraid-alert-desc-manual", None),
        };

        let card = build_card(
            LogLevel::Alert,
            &l10n.t("antiraid-alert-title", None),
            &format!("@here\n{}", description),
            vec![
                (
                    l10n.t("antiraid-field-action", None),
                    l10n.t(alert.action.label_key(), None),
                ),
                (
                    l10n.t("antiraid-field-duration", None),
                    l10n.minutes(alert.duration.num_minutes()),
                ),
            ],
        );

        let message = serenity::CreateMessage::new()
            .flags(serenity::MessageFlags::IS_COMPONENTS_V2)
            .components(vec![card])
            .allowed_mentions(serenity::CreateAllowedMentions::new().everyone(true));

        self.http
            .send_message(channel_id.into(), Vec::new(), &message)
            .await?;

        Ok(())
    }
}
