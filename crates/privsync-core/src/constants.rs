//! Application-wide constants
//!
//! Centralized location for wire flag bits, server error types and
//! app-config keys shared across modules.

/// Default API endpoint used when no config overrides it
pub const DEFAULT_API_BASE: &str = "https://api.privsync.local/v1";

/// Default per-request timeout for the HTTP transport
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

// Global privacy settings flag bits
pub const FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS: u32 = 1 << 0;
pub const FLAG_KEEP_ARCHIVED_UNMUTED: u32 = 1 << 1;
pub const FLAG_KEEP_ARCHIVED_FOLDERS: u32 = 1 << 2;
pub const FLAG_HIDE_READ_MARKS: u32 = 1 << 3;
pub const FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM: u32 = 1 << 4;

// RPC method names
pub const METHOD_GET_GLOBAL_PRIVACY: &str = "account.getGlobalPrivacySettings";
pub const METHOD_SET_GLOBAL_PRIVACY: &str = "account.setGlobalPrivacySettings";
pub const METHOD_GET_PAID_REACTION_PRIVACY: &str = "messages.getPaidReactionPrivacy";

/// Server error type returned when a premium-only setting is requested
/// by an account that is not entitled to it
pub const ERROR_PREMIUM_ACCOUNT_REQUIRED: &str = "PREMIUM_ACCOUNT_REQUIRED";

// App config keys
pub const APP_CONFIG_AUTOARCHIVE_AVAILABLE: &str = "autoarchive_setting_available";
pub const APP_CONFIG_NEW_REQUIRE_PREMIUM_FREE: &str =
    "new_noncontact_peers_require_premium_without_ownpremium";
pub const APP_CONFIG_PENDING_SUGGESTIONS: &str = "pending_suggestions";

/// Suggestion key for the "archive and mute new chats" promo
pub const SUGGESTION_AUTOARCHIVE_POPULAR: &str = "AUTOARCHIVE_POPULAR";
