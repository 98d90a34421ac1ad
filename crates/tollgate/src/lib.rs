//! Tollgate: payload interception shim for Kafka clients.
//!
//! Tollgate sits between application code and a Kafka client library. Every
//! produced value and every fetched value passes through an external
//! processing engine, which may rewrite it, leave it alone, or report an
//! error.
//!
//! # Core Invariants
//!
//! 1. **Pass-Through When Unconfigured**: without engine configuration, or
//!    when the engine refuses the session, every payload flows unmodified
//! 2. **Fail-Open By Default**: engine errors keep the original payload unless
//!    the message asked for strict errors
//! 3. **Nothing Sent On Failure**: a strict processing error or an encode
//!    error aborts the send before the transport sees it
//! 4. **One Handle**: the engine handle is built once and shared by both
//!    paths; nothing is global
//!
//! # Architecture
//!
//! ```text
//! app -> InterceptingProducer -> Gate -> Engine -> Transport
//! app <- InterceptingConsumer <- Gate <- Engine <- Fetcher
//! ```

pub mod audience;
pub mod client;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod gate;
pub mod message;
pub mod producer;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use audience::{resolve, Audience, AudienceOverride, OperationType, RuntimeConfig};
pub use client::EngineClient;
pub use config::{EngineEndpoint, ShimConfig};
pub use consumer::{Fetcher, InterceptingConsumer};
pub use engine::{Engine, EngineHandle, ExecStatus, ProcessRequest, ProcessResponse};
pub use error::{ConfigError, ShimError, ShimResult};
pub use gate::Gate;
pub use message::{
    ByteEncoder, ConsumerMessage, EncodeError, Encoder, JsonEncoder, ProducedRecord,
    ProducerMessage, RecordHeader, StringEncoder,
};
pub use producer::{Delivery, InterceptingProducer, Transport};
