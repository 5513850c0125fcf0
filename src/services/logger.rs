use crate::Error;
use crate::db::entities::{
    guild_configs,
    security_logs::{self, SecurityEventType},
};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Alert,
    Audit,
}

impl LogLevel {
    pub fn icon(&self) -> &'static str {
        match self {
            LogLevel::Info => "ℹ️",
            LogLevel::Success => "✅",
            LogLevel::Warn => "⚠️",
            LogLevel::Alert => "🚨",
            LogLevel::Audit => "📝",
        }
    }

    pub fn color(&self) -> u32 {
        match self {
            LogLevel::Info => 0x3498db,    // Blue
            LogLevel::Success => 0x2ecc71, // Green
            LogLevel::Warn => 0xf1c40f,    // Yellow
            LogLevel::Alert => 0xe74c3c,   // Red
            LogLevel::Audit => 0x95a5a6,   // Gray
        }
    }
}

/// Builds the components-v2 card used for log mirrors, alerts and command replies.
pub fn build_card(
    level: LogLevel,
    title: &str,
    desc: &str,
    fields: Vec<(String, String)>,
) -> serenity::CreateComponent<'static> {
    let mut inner_components = vec![];

    inner_components.push(serenity::CreateContainerComponent::TextDisplay(
        serenity::CreateTextDisplay::new(format!("### {} {}", level.icon(), title)),
    ));

    inner_components.push(serenity::CreateContainerComponent::Separator(
        serenity::CreateSeparator::new(true),
    ));

    if !desc.is_empty() {
        inner_components.push(serenity::CreateContainerComponent::TextDisplay(
            serenity::CreateTextDisplay::new(desc.to_string()),
        ));
    }

    if !fields.is_empty() {
        inner_components.push(serenity::CreateContainerComponent::Separator(
            serenity::CreateSeparator::new(false),
        ));

        for (name, value) in fields {
            inner_components.push(serenity::CreateContainerComponent::TextDisplay(
                serenity::CreateTextDisplay::new(format!("> **{}**\n> {}", name, value)),
            ));
        }
    }

    serenity::CreateComponent::Container(
        serenity::CreateContainer::new(inner_components).accent_color(level.color()),
    )
}

/// A row of the security audit trail, built up before it is logged.
#[derive(Debug, Clone)]
pub struct SecurityEvent {
    pub guild_id: serenity::GuildId,
    pub event_type: SecurityEventType,
    pub user_id: Option<serenity::UserId>,
    pub target_id: Option<serenity::UserId>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub successful: bool,
}

impl SecurityEvent {
    pub fn new(guild_id: serenity::GuildId, event_type: SecurityEventType) -> Self {
        Self {
            guild_id,
            event_type,
            user_id: None,
            target_id: None,
            content: String::new(),
            metadata: serde_json::json!({}),
            successful: true,
        }
    }

    /// The user who performed the action (moderator, or the joining member).
    pub fn user(mut self, user_id: serenity::UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// The user the action was applied to.
    pub fn target(mut self, target_id: serenity::UserId) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn successful(mut self, successful: bool) -> Self {
        self.successful = successful;
        self
    }

    fn into_active_model(self) -> security_logs::ActiveModel {
        security_logs::ActiveModel {
            guild_id: Set(self.guild_id.get() as i64),
            event_type: Set(self.event_type),
            user_id: Set(self.user_id.map(|id| id.get() as i64)),
            target_id: Set(self.target_id.map(|id| id.get() as i64)),
            content: Set(self.content),
            metadata: Set(self.metadata),
            successful: Set(self.successful),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
    }
}

pub struct LoggerService {
    db: DatabaseConnection,
}

impl LoggerService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persists a security event, then mirrors it into the guild's log channel.
    /// The row is always written; the mirror is skipped when no channel is configured.
    pub async fn log_event(
        &self,
        http: &serenity::Http,
        event: SecurityEvent,
        level: LogLevel,
        title: &str,
        desc: &str,
        fields: Vec<(String, String)>,
    ) -> Result<(), Error> {
        let guild_id = event.guild_id;
        self.record(event).await?;

        self.log_action(http, guild_id, level, title, desc, fields)
            .await
    }

    /// Persists a security event without mirroring it.
    pub async fn record(&self, event: SecurityEvent) -> Result<(), Error> {
        event.into_active_model().insert(&self.db).await?;
        Ok(())
    }

    /// Sends a card to the guild's log channel. If none is configured, it does nothing.
    pub async fn log_action(
        &self,
        http: &serenity::Http,
        guild_id: serenity::GuildId,
        level: LogLevel,
        title: &str,
        desc: &str,
        fields: Vec<(String, String)>,
    ) -> Result<(), Error> {
        let g_config = guild_configs::Entity::find_by_id(guild_id.get() as i64)
            .one(&self.db)
            .await?;

        let channel_id = match g_config.and_then(|c| c.log_channel_id) {
            Some(id) => serenity::ChannelId::new(id as u64),
            None => return Ok(()),
        };

        let message = serenity::CreateMessage::new()
            .flags(serenity::MessageFlags::IS_COMPONENTS_V2)
            .components(vec![build_card(level, title, desc, fields)])
            .allowed_mentions(serenity::CreateAllowedMentions::new());

        http.send_message(channel_id.into(), Vec::new(), &message)
            .await?;

        Ok(())
    }
}
