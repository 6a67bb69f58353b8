use futures::future::LocalBoxFuture;

use crate::constants::ERROR_PREMIUM_ACCOUNT_REQUIRED;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("RPC error {code}: {error_type}")]
    Rpc { code: i32, error_type: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn rpc<S: Into<String>>(code: i32, error_type: S) -> Self {
        TransportError::Rpc {
            code,
            error_type: error_type.into(),
        }
    }

    /// True when the server refused a write because a gated setting was
    /// requested by an account that is not entitled to it.
    pub fn is_entitlement_denied(&self) -> bool {
        matches!(
            self,
            TransportError::Rpc { error_type, .. } if error_type == ERROR_PREMIUM_ACCOUNT_REQUIRED
        )
    }
}

/// Remote endpoint that stores one settings bundle in its wire form `W`.
///
/// Both calls are issued eagerly: the returned future owns everything it
/// needs, and dropping it abandons the request.
pub trait SettingsTransport<W> {
    fn get_settings(&self) -> LocalBoxFuture<'static, Result<W, TransportError>>;

    fn set_settings(&self, settings: W) -> LocalBoxFuture<'static, Result<W, TransportError>>;
}

pub trait PaidReactionTransport {
    /// Returns whether paid reactions are sent anonymously by default.
    fn get_paid_reaction_privacy(&self) -> LocalBoxFuture<'static, Result<bool, TransportError>>;
}
