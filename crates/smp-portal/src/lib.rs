pub mod auth;
pub mod batch;
pub mod config;
pub mod extract;
pub mod report;
pub mod session;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, AuthState, LoginFlow};
pub use batch::{BatchError, BatchOptions, BatchOrchestrator};
pub use config::{ConfigError, PortalConfig};
pub use session::Session;
pub use transport::{HttpTransport, NetworkError, Transport};

pub const DEFAULT_PORTAL_URL: &str = "https://smp2025.pesrp.edu.pk";

pub(crate) const LOGIN_PATH: &str = "/login";
pub(crate) const DETAIL_REPORT_PATH: &str = "/detail-report";
