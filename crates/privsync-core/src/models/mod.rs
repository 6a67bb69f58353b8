pub mod privacy;
pub mod wire;

pub use privacy::{PrivacySettings, UnarchiveOnNewMessage};
pub use wire::GlobalPrivacyFlags;
