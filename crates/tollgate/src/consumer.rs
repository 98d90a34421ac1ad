//! Consumer-path adapter.
//!
//! Wraps an underlying fetcher and runs each fetched value through the gate
//! before the caller sees it. Consumers never carry a runtime override, so
//! the audience always derives from the source topic.

use crate::audience::OperationType;
use crate::error::ShimResult;
use crate::gate::Gate;
use crate::message::ConsumerMessage;
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The underlying fetch path, e.g. one partition claim.
#[async_trait]
pub trait Fetcher: Send {
    /// Next raw message, or `None` once the source is exhausted.
    async fn fetch(&mut self) -> ShimResult<Option<ConsumerMessage>>;
}

#[async_trait]
impl Fetcher for mpsc::Receiver<ConsumerMessage> {
    async fn fetch(&mut self) -> ShimResult<Option<ConsumerMessage>> {
        Ok(self.recv().await)
    }
}

/// Consumer that intercepts every fetched message.
pub struct InterceptingConsumer<F> {
    gate: Gate,
    fetcher: F,
    cancel: CancellationToken,
}

impl<F: Fetcher> InterceptingConsumer<F> {
    pub fn new(gate: Gate, fetcher: F) -> Self {
        Self::with_cancellation(gate, fetcher, CancellationToken::new())
    }

    /// Build a consumer that stops once `cancel` fires.
    pub fn with_cancellation(gate: Gate, fetcher: F, cancel: CancellationToken) -> Self {
        Self {
            gate,
            fetcher,
            cancel,
        }
    }

    /// Token that stops this consumer when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Fetch and process the next message.
    ///
    /// Returns `Ok(None)` when the fetcher is exhausted or the consumer has
    /// been cancelled. A message that arrives together with cancellation is
    /// dropped unprocessed. Gate errors are returned for that message and
    /// not retried.
    pub async fn next_message(&mut self) -> ShimResult<Option<ConsumerMessage>> {
        match self.fetch_raw().await? {
            Some(msg) => self.process_fetched(msg).await.map(Some),
            None => Ok(None),
        }
    }

    /// Deliver every processed message to `handler` until the fetcher is
    /// exhausted or the consumer is cancelled.
    ///
    /// Processing and handler failures are logged and the message skipped.
    /// Only a fetch failure ends the loop with an error. Returns the number
    /// of messages handled successfully.
    pub async fn run<H, Fut>(&mut self, mut handler: H) -> ShimResult<u64>
    where
        H: FnMut(ConsumerMessage) -> Fut,
        Fut: Future<Output = ShimResult<()>>,
    {
        let mut handled = 0u64;

        while let Some(msg) = self.fetch_raw().await? {
            let (topic, partition, offset) = (msg.topic.clone(), msg.partition, msg.offset);

            let msg = match self.process_fetched(msg).await {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(
                        error = %e,
                        topic = %topic,
                        partition,
                        offset,
                        "Skipping message that failed processing"
                    );
                    continue;
                }
            };

            match handler(msg).await {
                Ok(()) => handled += 1,
                Err(e) => warn!(
                    error = %e,
                    topic = %topic,
                    partition,
                    offset,
                    "Message handler failed"
                ),
            }
        }

        info!(handled, "Consumer loop stopped");

        Ok(handled)
    }

    /// Next unprocessed message, or `None` on exhaustion or cancellation.
    async fn fetch_raw(&mut self) -> ShimResult<Option<ConsumerMessage>> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            fetched = self.fetcher.fetch() => fetched?,
        };

        let msg = match fetched {
            Some(msg) => msg,
            None => return Ok(None),
        };

        if self.cancel.is_cancelled() {
            debug!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "Dropping message fetched during cancellation"
            );
            return Ok(None);
        }

        Ok(Some(msg))
    }

    async fn process_fetched(&self, mut msg: ConsumerMessage) -> ShimResult<ConsumerMessage> {
        // Tombstones carry nothing to process
        if let Some(value) = msg.value.take() {
            let processed = self
                .gate
                .process(OperationType::Consumer, &msg.topic, value, None)
                .await?;
            msg.value = Some(processed);
        }

        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineHandle, ProcessRequest, ProcessResponse};
    use crate::error::ShimError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Engine that upper-cases payloads and counts calls.
    #[derive(Default)]
    struct UpperEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Engine for UpperEngine {
        async fn process(&self, request: ProcessRequest) -> ProcessResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.data == b"fail" {
                return ProcessResponse::error("rejected by rule");
            }
            let mut data = request.data;
            data.make_ascii_uppercase();
            ProcessResponse::modified(data)
        }
    }

    /// Fetcher over a fixed list that can cancel a token mid-fetch.
    struct ListFetcher {
        messages: VecDeque<ConsumerMessage>,
        cancel_on_fetch: Option<CancellationToken>,
    }

    impl ListFetcher {
        fn new(values: &[&str]) -> Self {
            let messages = values
                .iter()
                .enumerate()
                .map(|(i, v)| ConsumerMessage::new("orders", 0, i as i64, v.as_bytes().to_vec()))
                .collect();
            Self {
                messages,
                cancel_on_fetch: None,
            }
        }
    }

    #[async_trait]
    impl Fetcher for ListFetcher {
        async fn fetch(&mut self) -> ShimResult<Option<ConsumerMessage>> {
            if let Some(token) = &self.cancel_on_fetch {
                token.cancel();
            }
            Ok(self.messages.pop_front())
        }
    }

    fn active_gate() -> (Gate, Arc<UpperEngine>) {
        let engine = Arc::new(UpperEngine::default());
        (Gate::new(EngineHandle::active(engine.clone())), engine)
    }

    #[tokio::test]
    async fn test_next_message_replaces_value() {
        let (gate, engine) = active_gate();
        let mut consumer = InterceptingConsumer::new(gate, ListFetcher::new(&["abc"]));

        let msg = consumer.next_message().await.unwrap().unwrap();
        assert_eq!(msg.value, Some(b"ABC".to_vec()));
        assert_eq!(msg.offset, 0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        assert!(consumer.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_engine_error_fails_open() {
        // Consumers carry no override, so engine errors fail open
        let (gate, _engine) = active_gate();
        let mut consumer = InterceptingConsumer::new(gate, ListFetcher::new(&["fail"]));

        let msg = consumer.next_message().await.unwrap().unwrap();
        assert_eq!(msg.value, Some(b"fail".to_vec()));
    }

    #[tokio::test]
    async fn test_cancelled_consumer_never_fetches() {
        let (gate, engine) = active_gate();
        let mut consumer = InterceptingConsumer::new(gate, ListFetcher::new(&["abc"]));

        consumer.cancellation_token().cancel();

        assert!(consumer.next_message().await.unwrap().is_none());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_message_fetched_during_cancellation_is_not_processed() {
        let (gate, engine) = active_gate();
        let token = CancellationToken::new();
        let mut fetcher = ListFetcher::new(&["abc"]);
        fetcher.cancel_on_fetch = Some(token.clone());

        let mut consumer = InterceptingConsumer::with_cancellation(gate, fetcher, token);

        assert!(consumer.next_message().await.unwrap().is_none());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tombstone_skips_engine() {
        let (gate, engine) = active_gate();
        let mut fetcher = ListFetcher::new(&[]);
        let mut tombstone = ConsumerMessage::new("orders", 0, 0, Vec::new());
        tombstone.value = None;
        fetcher.messages.push_back(tombstone);

        let mut consumer = InterceptingConsumer::new(gate, fetcher);
        let msg = consumer.next_message().await.unwrap().unwrap();

        assert_eq!(msg.value, None);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_channel_fetcher() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(ConsumerMessage::new("payments", 2, 9, b"x".to_vec()))
            .await
            .unwrap();
        drop(tx);

        let mut consumer = InterceptingConsumer::new(Gate::disabled(), rx);
        let msg = consumer.next_message().await.unwrap().unwrap();
        assert_eq!(msg.topic, "payments");
        assert_eq!(msg.value, Some(b"x".to_vec()));
        assert!(consumer.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_skips_handler_failures() {
        let (gate, _engine) = active_gate();
        let mut consumer =
            InterceptingConsumer::new(gate, ListFetcher::new(&["a", "bad", "c"]));

        let mut seen = Vec::new();
        let handled = consumer
            .run(|msg| {
                let value = msg.value.clone().unwrap_or_default();
                seen.push(value.clone());
                async move {
                    if value == b"BAD" {
                        Err(ShimError::Transport("handler refused".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(handled, 2);
        assert_eq!(seen, vec![b"A".to_vec(), b"BAD".to_vec(), b"C".to_vec()]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (tx, rx) = mpsc::channel::<ConsumerMessage>(1);
        let mut consumer = InterceptingConsumer::new(Gate::disabled(), rx);
        let token = consumer.cancellation_token();

        let task = tokio::spawn(async move {
            consumer
                .run(|_| async { Ok::<_, ShimError>(()) })
                .await
        });

        token.cancel();
        let handled = task.await.unwrap().unwrap();
        assert_eq!(handled, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_drops_message_fetched_during_cancellation() {
        let (gate, engine) = active_gate();
        let token = CancellationToken::new();
        let mut fetcher = ListFetcher::new(&["abc", "def"]);
        fetcher.cancel_on_fetch = Some(token.clone());

        let mut consumer = InterceptingConsumer::with_cancellation(gate, fetcher, token);

        let mut seen = 0;
        let handled = consumer
            .run(|_| {
                seen += 1;
                async { Ok::<_, ShimError>(()) }
            })
            .await
            .unwrap();

        assert_eq!(handled, 0);
        assert_eq!(seen, 0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_handles_tombstones_without_engine() {
        let (gate, engine) = active_gate();
        let mut fetcher = ListFetcher::new(&["abc"]);
        let mut tombstone = ConsumerMessage::new("orders", 0, 1, Vec::new());
        tombstone.value = None;
        fetcher.messages.push_back(tombstone);

        let mut consumer = InterceptingConsumer::new(gate, fetcher);
        let mut values = Vec::new();
        let handled = consumer
            .run(|msg| {
                values.push(msg.value);
                async { Ok::<_, ShimError>(()) }
            })
            .await
            .unwrap();

        assert_eq!(handled, 2);
        assert_eq!(values, vec![Some(b"ABC".to_vec()), None]);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }
}
