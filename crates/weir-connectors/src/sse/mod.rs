//! HTTP event-stream source connector.
//!
//! Consumes a long-lived `GET` response body (SSE-style: one payload per
//! line) and turns it into an infinite sequence of [`RawEvent`]s with
//! transparent reconnection.
//!
//! # Delivery Guarantees
//!
//! The stream is **non-replayable**: events published while the
//! connection is down are gone. The source provides best-effort delivery
//! and never terminates on a transient failure — only cancellation ends
//! the sequence.
//!
//! [`RawEvent`]: crate::record::RawEvent

pub mod config;
pub mod parser;
pub mod source;

pub use config::SseSourceConfig;
pub use parser::StreamFrameDecoder;
pub use source::SseSource;
