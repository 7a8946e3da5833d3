mod audit;
mod core;
mod delimiters;
mod provider;

pub use audit::AuditConfig;
pub use self::core::Config;
pub use delimiters::DelimiterConfig;
pub use provider::ProviderConfig;
