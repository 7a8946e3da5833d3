pub mod observer;
pub mod style;

pub use observer::CliObserver;
