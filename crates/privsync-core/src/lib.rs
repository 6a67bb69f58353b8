pub mod api;
pub mod config;
pub mod constants;
pub mod models;
pub mod privacy;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod tracing_setup;

pub use api::{HttpTransport, PaidReactionTransport, SettingsTransport, TransportError};
pub use config::CoreConfig;
pub use models::{GlobalPrivacyFlags, PrivacySettings, UnarchiveOnNewMessage};
pub use privacy::{GlobalPrivacy, LoadState};
pub use runtime::PrivacyRuntime;
pub use session::{AppConfigSnapshot, EntitlementContext, FeatureFlag, GatedField, SessionEntitlements};
pub use sync::{SettingSynchronizer, Subscription, SyncStatus, SyncedSettings, Variable};
