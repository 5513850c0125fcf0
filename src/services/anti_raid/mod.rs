pub mod detector;
pub mod gateway;
pub mod manager;
pub mod runner;
pub mod settings;

pub use detector::ProtectionAction;
pub use gateway::DiscordGateway;
pub use manager::{AntiRaidService, JoinOutcome, PenaltyOutcome, ProtectionChange};
pub use settings::RaidSettings;
