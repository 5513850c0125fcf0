pub mod anti_raid;
pub mod event_manager;
pub mod localization;
pub mod log_retention;
pub mod logger;
