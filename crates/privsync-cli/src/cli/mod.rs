pub mod commands;
pub mod config;

pub use commands::{run_command, CliCommand, SettingsPatch};
pub use config::{default_config_path, CliConfig};
