use anyhow::{Context, Result};
use privsync_core::{CoreConfig, PrivacyRuntime, PrivacySettings, UnarchiveOnNewMessage};
use serde_json::json;
use tokio::task::LocalSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Print the current settings
    Get,
    /// Change some settings, keeping the rest as the server has them
    Set(SettingsPatch),
    /// Print the paid reaction privacy
    PaidReaction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub archive_and_mute: Option<bool>,
    pub unarchive_on_new_message: Option<UnarchiveOnNewMessage>,
    pub hide_read_time: Option<bool>,
    pub new_require_premium: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }

    pub fn apply_to(&self, settings: PrivacySettings) -> PrivacySettings {
        PrivacySettings {
            archive_and_mute: self.archive_and_mute.unwrap_or(settings.archive_and_mute),
            unarchive_on_new_message: self
                .unarchive_on_new_message
                .unwrap_or(settings.unarchive_on_new_message),
            hide_read_time: self.hide_read_time.unwrap_or(settings.hide_read_time),
            new_require_premium: self
                .new_require_premium
                .unwrap_or(settings.new_require_premium),
        }
    }
}

/// Run one command on a fresh single-threaded runtime and print its JSON result.
pub fn run_command(
    command: CliCommand,
    config: CoreConfig,
    app_config: Option<serde_json::Value>,
    pretty: bool,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let local = LocalSet::new();
    let output = local.block_on(&runtime, execute(command, config, app_config))?;

    let rendered = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}

async fn execute(
    command: CliCommand,
    config: CoreConfig,
    app_config: Option<serde_json::Value>,
) -> Result<serde_json::Value> {
    let runtime = PrivacyRuntime::new(config)?;
    if let Some(app_config) = &app_config {
        runtime.apply_app_config(app_config);
    }

    match command {
        CliCommand::Get => {
            let settings = runtime.refresh().await?;
            Ok(json!({
                "settings": settings,
                "showArchiveAndMute": runtime.privacy().show_archive_and_mute_current(),
            }))
        }
        CliCommand::Set(patch) => {
            if patch.is_empty() {
                anyhow::bail!("Nothing to change; pass at least one setting flag");
            }
            let current = runtime.refresh().await?;
            let requested = patch.apply_to(current);
            tracing::info!("updating privacy settings: {:?}", requested);

            let stored = runtime.store(requested.clone()).await?;
            Ok(json!({
                "requested": requested,
                "settings": stored,
            }))
        }
        CliCommand::PaidReaction => {
            let anonymous = runtime.paid_reaction_anonymous().await?;
            Ok(json!({ "paidReactionAnonymous": anonymous }))
        }
    }
}
