pub mod http;
pub mod transport;

pub use http::HttpTransport;
pub use transport::{PaidReactionTransport, SettingsTransport, TransportError};
