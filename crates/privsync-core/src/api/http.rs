//! JSON-over-HTTP transport for the account settings endpoints.
//!
//! Every call is a `POST {api_base}/{method}` whose response is wrapped in an
//! envelope: `{"ok": true, "result": ...}` on success or
//! `{"ok": false, "error_code": 403, "error_type": "PREMIUM_ACCOUNT_REQUIRED"}`
//! when the server refuses.

use futures::future::{FutureExt, LocalBoxFuture};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::transport::{PaidReactionTransport, SettingsTransport, TransportError};
use crate::config::CoreConfig;
use crate::constants::{
    METHOD_GET_GLOBAL_PRIVACY, METHOD_GET_PAID_REACTION_PRIVACY, METHOD_SET_GLOBAL_PRIVACY,
};
use crate::models::GlobalPrivacyFlags;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PaidReactionPrivacy {
    #[serde(default)]
    anonymous: bool,
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &CoreConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(
        self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}/{}", self.api_base, method);
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("rpc {} request_id={}", method, request_id);

        let mut request = self
            .client
            .post(&url)
            .header("x-request-id", &request_id)
            .json(&params);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TransportError::Http(format!("{} returned {}", method, status)));
            }
            Err(e) => return Err(TransportError::Decode(e.to_string())),
        };

        if !envelope.ok || !status.is_success() {
            let code = envelope
                .error_code
                .unwrap_or_else(|| i32::from(status.as_u16()));
            let error_type = envelope
                .error_type
                .unwrap_or_else(|| "UNKNOWN_ERROR".to_string());
            tracing::debug!(
                "rpc {} request_id={} failed: {} {}",
                method,
                request_id,
                code,
                error_type
            );
            return Err(TransportError::Rpc { code, error_type });
        }

        envelope
            .result
            .ok_or_else(|| TransportError::Decode(format!("{} response has no result", method)))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Http(err.to_string())
    }
}

impl SettingsTransport<GlobalPrivacyFlags> for HttpTransport {
    fn get_settings(&self) -> LocalBoxFuture<'static, Result<GlobalPrivacyFlags, TransportError>> {
        self.clone()
            .call(METHOD_GET_GLOBAL_PRIVACY, json!({}))
            .boxed_local()
    }

    fn set_settings(
        &self,
        settings: GlobalPrivacyFlags,
    ) -> LocalBoxFuture<'static, Result<GlobalPrivacyFlags, TransportError>> {
        self.clone()
            .call(METHOD_SET_GLOBAL_PRIVACY, json!({ "settings": settings }))
            .boxed_local()
    }
}

impl PaidReactionTransport for HttpTransport {
    fn get_paid_reaction_privacy(&self) -> LocalBoxFuture<'static, Result<bool, TransportError>> {
        let call = self
            .clone()
            .call::<PaidReactionPrivacy>(METHOD_GET_PAID_REACTION_PRIVACY, json!({}));
        async move { call.await.map(|privacy| privacy.anonymous) }.boxed_local()
    }
}
