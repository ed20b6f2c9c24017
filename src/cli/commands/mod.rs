mod cache;
mod check;
mod config;
mod reschedule;

pub use cache::cmd_cache_clear;
pub use check::cmd_check;
pub use config::cmd_config_init;
pub use reschedule::cmd_reschedule;
