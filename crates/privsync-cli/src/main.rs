use std::path::PathBuf;

use clap::{Parser, Subcommand};
use privsync_cli::cli::{default_config_path, run_command, CliCommand, CliConfig, SettingsPatch};
use privsync_core::tracing_setup::init_tracing_with_service;
use privsync_core::UnarchiveOnNewMessage;

#[derive(Parser)]
#[command(name = "privsync")]
#[command(about = "Inspect and change account privacy settings")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (contains apiBase, authToken, appConfig)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the API base URL from the config file
    #[arg(long)]
    api_base: Option<String>,

    /// Treat the account as premium
    #[arg(long)]
    premium: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current privacy settings
    Get,

    /// Change privacy settings
    Set {
        /// Archive and mute new chats from non-contacts
        #[arg(long)]
        archive_and_mute: Option<bool>,

        /// Unarchive policy: none, not-in-folders or any
        #[arg(long)]
        unarchive: Option<UnarchiveOnNewMessage>,

        /// Hide read time from other users
        #[arg(long)]
        hide_read_time: Option<bool>,

        /// Only premium users may start new chats
        #[arg(long)]
        require_premium: Option<bool>,
    },

    /// Show whether paid reactions are anonymous by default
    PaidReaction,
}

fn main() {
    init_tracing_with_service("privsync-cli");

    let cli = Cli::parse();
    let file_config = load_config(&cli);

    let mut config = file_config.to_core_config();
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }
    if cli.premium {
        config.premium = true;
    }

    let command = match cli.command {
        Some(Commands::Get) => CliCommand::Get,
        Some(Commands::Set {
            archive_and_mute,
            unarchive,
            hide_read_time,
            require_premium,
        }) => CliCommand::Set(SettingsPatch {
            archive_and_mute,
            unarchive_on_new_message: unarchive,
            hide_read_time,
            new_require_premium: require_premium,
        }),
        Some(Commands::PaidReaction) => CliCommand::PaidReaction,
        None => {
            eprintln!("No command specified. Use --help for usage.");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(command, config, file_config.app_config, cli.pretty) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration from --config, falling back to the default location
fn load_config(cli: &Cli) -> CliConfig {
    if let Some(ref path) = cli.config {
        match CliConfig::load(path) {
            Ok(config) => return config,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(path) = default_config_path().filter(|path| path.exists()) {
        match CliConfig::load(&path) {
            Ok(config) => return config,
            Err(e) => {
                eprintln!("Warning: ignoring {}: {:#}", path.display(), e);
            }
        }
    }

    CliConfig::default()
}
