use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum SecurityEventType {
    #[sea_orm(string_value = "user_join")]
    UserJoin,
    #[sea_orm(string_value = "user_leave")]
    UserLeave,
    #[sea_orm(string_value = "raid_detected")]
    RaidDetected,
    #[sea_orm(string_value = "raid_member_kicked")]
    RaidMemberKicked,
    #[sea_orm(string_value = "raid_member_banned")]
    RaidMemberBanned,
    #[sea_orm(string_value = "raid_member_observed")]
    RaidMemberObserved,
    #[sea_orm(string_value = "raid_penalty_failed")]
    RaidPenaltyFailed,
    #[sea_orm(string_value = "protection_enabled")]
    ProtectionEnabled,
    #[sea_orm(string_value = "protection_disabled")]
    ProtectionDisabled,
    #[sea_orm(string_value = "protection_expired")]
    ProtectionExpired,
    #[sea_orm(string_value = "config_changed")]
    ConfigChanged,
}

/// Every security-relevant event the bot observed, one row per event.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Eq)]
#[sea_orm(table_name = "security_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub guild_id: i64,
    pub event_type: SecurityEventType,
    pub user_id: Option<i64>,
    pub target_id: Option<i64>,
    pub content: String,
    pub metadata: Json,
    pub successful: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
