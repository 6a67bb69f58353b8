use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_SECS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Whether the session holds a premium subscription
    pub premium: bool,
}

impl CoreConfig {
    pub fn new<S: Into<String>>(api_base: S) -> Self {
        Self {
            api_base: api_base.into(),
            auth_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            premium: false,
        }
    }

    pub fn with_auth_token<S: Into<String>>(mut self, token: S) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}
