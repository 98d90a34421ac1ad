//! Integration tests for Tollgate.
//!
//! Every test runs the real engine client against a mock engine listening on
//! a Unix socket in a temporary directory.
//!
//! - `harness.rs`     - Mock engine, recording transport, fetcher helpers
//! - `scenarios.rs`   - End-to-end produce scenarios
//! - `lifecycle.rs`   - Engine handle setup and pass-through mode
//! - `fail_policy.rs` - Strict and lenient handling of engine failures
//! - `producer.rs`    - Producer path: keys, overrides, batches, tombstones
//! - `consumer.rs`    - Consumer path: audience and cancellation
//! - `reconnect.rs`   - Session recovery after transport failures
//! - `concurrency.rs` - Both paths sharing one handle

mod scenarios;

// Re-exports for external test usage if needed
#[allow(unused_imports)]
pub use harness::{EngineReply, MockEngine, RecordingTransport};
