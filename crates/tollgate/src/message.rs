//! Message envelopes for the produce and consume paths.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure to turn a message key or value into bytes.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct EncodeError(pub String);

/// Produces the raw bytes of a message key or value.
pub trait Encoder: Send + Sync {
    fn encode(&self) -> Result<Vec<u8>, EncodeError>;

    /// Encoded length in bytes, if known without encoding.
    fn length(&self) -> Option<usize>;
}

/// Raw bytes, passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteEncoder(pub Vec<u8>);

impl Encoder for ByteEncoder {
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(self.0.clone())
    }

    fn length(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

impl From<Vec<u8>> for ByteEncoder {
    fn from(value: Vec<u8>) -> Self {
        ByteEncoder(value)
    }
}

impl From<&[u8]> for ByteEncoder {
    fn from(value: &[u8]) -> Self {
        ByteEncoder(value.to_vec())
    }
}

/// UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEncoder(pub String);

impl Encoder for StringEncoder {
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(self.0.as_bytes().to_vec())
    }

    fn length(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

impl From<&str> for StringEncoder {
    fn from(value: &str) -> Self {
        StringEncoder(value.to_string())
    }
}

impl From<String> for StringEncoder {
    fn from(value: String) -> Self {
        StringEncoder(value)
    }
}

/// Any serializable value, encoded as JSON.
#[derive(Debug, Clone)]
pub struct JsonEncoder<T>(pub T);

impl<T: Serialize + Send + Sync> Encoder for JsonEncoder<T> {
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(&self.0).map_err(|e| EncodeError(format!("JSON encoding failed: {}", e)))
    }

    fn length(&self) -> Option<usize> {
        None
    }
}

/// A message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RecordHeader {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Partition value meaning "let the transport pick".
pub const ANY_PARTITION: i32 = -1;

/// A message handed to the producer by application code.
pub struct ProducerMessage {
    pub topic: String,
    pub key: Option<Box<dyn Encoder>>,
    pub value: Option<Box<dyn Encoder>>,
    pub headers: Vec<RecordHeader>,
    pub partition: i32,
}

impl ProducerMessage {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: None,
            headers: Vec::new(),
            partition: ANY_PARTITION,
        }
    }

    pub fn with_key(mut self, key: impl Encoder + 'static) -> Self {
        self.key = Some(Box::new(key));
        self
    }

    pub fn with_value(mut self, value: impl Encoder + 'static) -> Self {
        self.value = Some(Box::new(value));
        self
    }

    pub fn with_header(mut self, header: RecordHeader) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    /// Encoded size of key plus value, or `None` if either encoder cannot
    /// tell without encoding.
    pub fn byte_size(&self) -> Option<usize> {
        let key = self.key.as_ref().map_or(Some(0), |k| k.length())?;
        let value = self.value.as_ref().map_or(Some(0), |v| v.length())?;
        Some(key + value)
    }
}

impl fmt::Debug for ProducerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerMessage")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("key_len", &self.key.as_ref().and_then(|k| k.length()))
            .field("value_len", &self.value.as_ref().and_then(|v| v.length()))
            .field("headers", &self.headers.len())
            .finish()
    }
}

/// A fully encoded message as handed to the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedRecord {
    pub topic: String,
    pub partition: i32,
    pub key: Option<Vec<u8>>,
    /// `None` for a tombstone.
    pub value: Option<Vec<u8>>,
    pub headers: Vec<RecordHeader>,
}

/// A message fetched from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` for a tombstone.
    pub value: Option<Vec<u8>>,
    pub headers: Vec<RecordHeader>,
    pub timestamp: DateTime<Utc>,
}

impl ConsumerMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: Some(value),
            headers: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}
