// ── Infrastructure ───────────────────────────────────────────────────────────
pub mod http_client;
pub mod scrub;
pub mod sse;
pub mod streaming;
pub mod traits;
pub mod types;

// ── Decorator layers ────────────────────────────────────────────────────────
pub mod factory;
pub mod reliable;

// ── Provider implementations ────────────────────────────────────────────────
pub mod compatible;

// ── Infrastructure re-exports ───────────────────────────────────────────────
pub use http_client::build_provider_client_with_timeout;
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns};
pub use sse::{SseBuffer, parse_data_lines};
pub use streaming::{StreamEvent, TextStream, collect_text, text_stream_from_chunks};
pub use traits::{Evaluator, Generator, Provider};
pub use types::{StopReason, WireMessage, map_finish_reason, to_wire_messages, wire_role};

// ── Provider + factory re-exports ───────────────────────────────────────────
pub use compatible::OpenAiCompatibleProvider;
pub use factory::{create_resilient_provider, resolve_api_key};
pub use reliable::ReliableProvider;
