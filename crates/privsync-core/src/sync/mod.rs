pub mod stream;
pub mod synchronizer;
pub mod variable;

#[cfg(test)]
pub(crate) mod test_support;

use std::fmt;

use crate::session::EntitlementContext;

pub use synchronizer::{Callback, SettingSynchronizer};
pub use variable::{Subscription, Variable};

/// A bundle of settings stored remotely as one unit.
pub trait SyncedSettings: Clone + PartialEq + Default + fmt::Debug + 'static {
    type Wire: Clone + fmt::Debug + 'static;

    /// Decoding is total: anything the server leaves out maps to its default.
    fn decode(wire: &Self::Wire) -> Self;

    /// Unpermitted gated fields are dropped from the result, not rejected.
    fn encode(&self, entitlements: &dyn EntitlementContext) -> Self::Wire;

    /// Copy of `self` with every entitlement-gated field at its disallowed value.
    fn without_gated_fields(&self) -> Self;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub reload_in_flight: bool,
    pub write_in_flight: bool,
    /// Requests that ended in a failure the synchronizer absorbed.
    pub failures: u64,
}

impl SyncStatus {
    pub fn is_idle(&self) -> bool {
        !self.reload_in_flight && !self.write_in_flight
    }
}
