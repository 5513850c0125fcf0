pub mod guild_configs;
pub mod security_logs;
