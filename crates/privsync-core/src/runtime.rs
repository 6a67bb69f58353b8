use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use crate::api::HttpTransport;
use crate::config::CoreConfig;
use crate::models::PrivacySettings;
use crate::privacy::{GlobalPrivacy, LoadState};
use crate::session::{AppConfigSnapshot, SessionEntitlements};

/// Wires one session's HTTP transport, entitlements and privacy settings.
///
/// Lives on a single thread; every async method must be awaited inside a
/// `tokio::task::LocalSet`.
pub struct PrivacyRuntime {
    config: CoreConfig,
    session: Rc<SessionEntitlements>,
    privacy: GlobalPrivacy,
}

impl PrivacyRuntime {
    pub fn new(config: CoreConfig) -> Result<Self> {
        let transport = Rc::new(
            HttpTransport::new(&config).context("Failed to build HTTP transport")?,
        );
        let session = Rc::new(SessionEntitlements::new(config.premium));
        let privacy = GlobalPrivacy::new(transport.clone(), transport.clone(), session.clone());

        Ok(Self {
            config,
            session,
            privacy,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn session(&self) -> Rc<SessionEntitlements> {
        self.session.clone()
    }

    pub fn privacy(&self) -> &GlobalPrivacy {
        &self.privacy
    }

    pub fn apply_app_config(&self, value: &serde_json::Value) {
        self.session
            .apply_app_config(&AppConfigSnapshot::from_value(value));
    }

    /// Reload and wait for the request (or the one already in flight) to finish.
    ///
    /// Errors only if the request itself failed; the settings keep whatever
    /// value they had before.
    pub async fn refresh(&self) -> Result<PrivacySettings> {
        let failures_before = self.privacy.status().failures;
        let (tx, rx) = oneshot::channel();
        self.privacy.reload(Some(Box::new(move || {
            let _ = tx.send(());
        })));
        rx.await.context("Settings reload was dropped")?;

        if self.privacy.status().failures > failures_before {
            anyhow::bail!("Failed to load privacy settings from {}", self.config.api_base);
        }
        Ok(self.privacy.settings())
    }

    /// Push `settings` and wait until the server has answered.
    pub async fn store(&self, settings: PrivacySettings) -> Result<PrivacySettings> {
        let failures_before = self.privacy.status().failures;
        self.privacy.update(settings);
        self.privacy.settled().await;

        if self.privacy.status().failures > failures_before {
            anyhow::bail!("Server rejected privacy settings update");
        }
        Ok(self.privacy.settings())
    }

    /// Paid reaction privacy, fetched from the server on first use only.
    ///
    /// A failed first fetch is not retried; later calls keep failing.
    pub async fn paid_reaction_anonymous(&self) -> Result<bool> {
        self.privacy.load_paid_reaction_anonymous();
        match self.privacy.paid_reaction_loaded().await {
            LoadState::Loaded => Ok(self.privacy.paid_reaction_anonymous_current()),
            state => anyhow::bail!(
                "Failed to load paid reaction privacy from {} ({:?})",
                self.config.api_base,
                state
            ),
        }
    }
}
