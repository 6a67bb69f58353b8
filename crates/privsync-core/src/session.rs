//! Session-scoped entitlement and feature context.
//!
//! The synchronizer never reaches for process-wide state: whatever it needs to
//! know about the account (premium status, server-side feature switches,
//! pending suggestions) is asked of an [`EntitlementContext`] handed to it at
//! construction.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};

use crate::constants::{
    APP_CONFIG_AUTOARCHIVE_AVAILABLE, APP_CONFIG_NEW_REQUIRE_PREMIUM_FREE,
    APP_CONFIG_PENDING_SUGGESTIONS,
};
use crate::sync::{Subscription, Variable};

/// Settings whose requested value is only honored for entitled accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatedField {
    NewRequirePremium,
}

/// Server-driven feature switches that feed derived settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    AutoarchiveSettingAvailable,
}

pub trait EntitlementContext {
    /// Queried synchronously at write time.
    fn is_field_permitted(&self, field: GatedField) -> bool;

    fn is_feature_enabled(&self, flag: FeatureFlag) -> bool;

    fn feature_flag(&self, flag: FeatureFlag) -> Subscription<bool>;

    fn pending_suggestions(&self) -> Subscription<BTreeSet<String>>;

    fn dismiss_suggestion(&self, key: &str);
}

/// The subset of the server's app config this crate consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfigSnapshot {
    pub autoarchive_setting_available: bool,
    pub new_require_premium_free: bool,
    pub pending_suggestions: Vec<String>,
}

impl AppConfigSnapshot {
    /// Missing or mistyped keys fall back to their defaults.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let flag = |key: &str| value.get(key).and_then(|v| v.as_bool()).unwrap_or(false);

        let pending_suggestions = value
            .get(APP_CONFIG_PENDING_SUGGESTIONS)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            autoarchive_setting_available: flag(APP_CONFIG_AUTOARCHIVE_AVAILABLE),
            new_require_premium_free: flag(APP_CONFIG_NEW_REQUIRE_PREMIUM_FREE),
            pending_suggestions,
        }
    }
}

/// Entitlements of one logged-in session.
pub struct SessionEntitlements {
    premium: Cell<bool>,
    new_require_premium_free: Cell<bool>,
    autoarchive_available: Variable<bool>,
    suggestions: Variable<BTreeSet<String>>,
    dismissed: RefCell<HashSet<String>>,
}

impl SessionEntitlements {
    pub fn new(premium: bool) -> Self {
        Self {
            premium: Cell::new(premium),
            new_require_premium_free: Cell::new(false),
            autoarchive_available: Variable::new(false),
            suggestions: Variable::new(BTreeSet::new()),
            dismissed: RefCell::new(HashSet::new()),
        }
    }

    pub fn set_premium(&self, premium: bool) {
        if self.premium.replace(premium) != premium {
            tracing::debug!("session premium status changed: {}", premium);
        }
    }

    pub fn apply_app_config(&self, snapshot: &AppConfigSnapshot) {
        self.new_require_premium_free
            .set(snapshot.new_require_premium_free);

        self.autoarchive_available
            .set(snapshot.autoarchive_setting_available);

        let pending: BTreeSet<String> = {
            let dismissed = self.dismissed.borrow();
            snapshot
                .pending_suggestions
                .iter()
                .filter(|key| !dismissed.contains(*key))
                .cloned()
                .collect()
        };
        self.suggestions.set(pending);
    }
}

impl Default for SessionEntitlements {
    fn default() -> Self {
        Self::new(false)
    }
}

impl EntitlementContext for SessionEntitlements {
    fn is_field_permitted(&self, field: GatedField) -> bool {
        match field {
            GatedField::NewRequirePremium => {
                self.premium.get() || self.new_require_premium_free.get()
            }
        }
    }

    fn is_feature_enabled(&self, flag: FeatureFlag) -> bool {
        match flag {
            FeatureFlag::AutoarchiveSettingAvailable => self.autoarchive_available.get(),
        }
    }

    fn feature_flag(&self, flag: FeatureFlag) -> Subscription<bool> {
        match flag {
            FeatureFlag::AutoarchiveSettingAvailable => self.autoarchive_available.subscribe(),
        }
    }

    fn pending_suggestions(&self) -> Subscription<BTreeSet<String>> {
        self.suggestions.subscribe()
    }

    fn dismiss_suggestion(&self, key: &str) {
        self.dismissed.borrow_mut().insert(key.to_string());
        self.suggestions.modify(|current| current.remove(key));
    }
}
