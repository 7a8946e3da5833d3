pub mod schema;
pub mod session;

pub use schema::{AuditConfig, Config, DelimiterConfig, ProviderConfig};
pub use session::SessionConfig;
