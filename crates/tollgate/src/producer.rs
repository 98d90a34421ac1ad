//! Producer-path adapter.
//!
//! Encodes each outbound message, runs its value through the gate and only
//! then hands it to the underlying transport. A failed encode or a strict
//! processing error aborts the send before the transport is touched.

use crate::audience::{OperationType, RuntimeConfig};
use crate::error::{ShimError, ShimResult};
use crate::gate::Gate;
use crate::message::{ProducedRecord, ProducerMessage};
use async_trait::async_trait;
use tracing::debug;

/// Where a record ends up once it has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// The underlying send path, e.g. a broker client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, record: ProducedRecord) -> ShimResult<Delivery>;

    /// Send several records in order.
    async fn send_batch(&self, records: Vec<ProducedRecord>) -> ShimResult<Vec<Delivery>> {
        let mut deliveries = Vec::with_capacity(records.len());
        for record in records {
            deliveries.push(self.send(record).await?);
        }
        Ok(deliveries)
    }
}

/// Producer that intercepts every message before it is sent.
pub struct InterceptingProducer<T> {
    gate: Gate,
    transport: T,
}

impl<T: Transport> InterceptingProducer<T> {
    pub fn new(gate: Gate, transport: T) -> Self {
        Self { gate, transport }
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send one message.
    ///
    /// `runtime` is the optional per-message override and applies to this
    /// call only.
    pub async fn send_message(
        &self,
        msg: ProducerMessage,
        runtime: Option<&RuntimeConfig>,
    ) -> ShimResult<Delivery> {
        let record = self.prepare(msg, runtime).await?;
        let delivery = self.transport.send(record).await?;

        debug!(
            partition = delivery.partition,
            offset = delivery.offset,
            "Message delivered"
        );

        Ok(delivery)
    }

    /// Send a batch of messages.
    ///
    /// Every message is encoded and processed before the first one is sent;
    /// any failure aborts the whole batch with nothing transmitted. `runtime`
    /// applies to each message of the batch.
    pub async fn send_messages(
        &self,
        msgs: Vec<ProducerMessage>,
        runtime: Option<&RuntimeConfig>,
    ) -> ShimResult<Vec<Delivery>> {
        let mut records = Vec::with_capacity(msgs.len());
        for msg in msgs {
            records.push(self.prepare(msg, runtime).await?);
        }

        self.transport.send_batch(records).await
    }

    /// Encode a message and run its value through the gate.
    async fn prepare(
        &self,
        msg: ProducerMessage,
        runtime: Option<&RuntimeConfig>,
    ) -> ShimResult<ProducedRecord> {
        let ProducerMessage {
            topic,
            key,
            value,
            headers,
            partition,
        } = msg;

        let key = match key {
            Some(encoder) => Some(encoder.encode().map_err(|e| ShimError::Encode {
                topic: topic.clone(),
                field: "key",
                message: e.to_string(),
            })?),
            None => None,
        };

        let value = match value {
            Some(encoder) => {
                let data = encoder.encode().map_err(|e| ShimError::Encode {
                    topic: topic.clone(),
                    field: "value",
                    message: e.to_string(),
                })?;

                Some(
                    self.gate
                        .process(OperationType::Producer, &topic, data, runtime)
                        .await?,
                )
            }
            // Tombstones carry nothing to process
            None => None,
        };

        Ok(ProducedRecord {
            topic,
            partition,
            key,
            value,
            headers,
        })
    }
}
