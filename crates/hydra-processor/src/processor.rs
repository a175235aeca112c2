use std::sync::{Arc, PoisonError, RwLock};

use futures::Stream;
use hydra_ledger::ChunkStore;
use hydra_types::{Batch, ChunkId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::codec::{BatchDecoder, JsonBatchDecoder};
use crate::config::ProcessorConfig;
use crate::error::{ProcessorError, Result};
use crate::event::UpdateEvent;

/// Counts of what happened while draining a chunk source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Batches written to the ledger and published.
    pub batches: usize,
    /// Items that failed to decode or apply.
    pub failures: usize,
}

type Subscribers = Vec<mpsc::UnboundedSender<UpdateEvent>>;

/// Ingestion front door: writes batches into a ledger and republishes them.
///
/// Within one batch every entry reaches the ledger before the batch is
/// published. Batches are published in submission order and never
/// coalesced. Each subscriber has its own unbounded queue, so a slow
/// subscriber sees every batch published after it subscribed and never
/// holds up the others.
pub struct ChunkProcessor {
    ledger: Arc<dyn ChunkStore>,
    decoder: Box<dyn BatchDecoder>,
    max_item_bytes: usize,
    subscribers: RwLock<Option<Subscribers>>,
}

impl ChunkProcessor {
    pub fn new(ledger: Arc<dyn ChunkStore>) -> Self {
        Self::with_config(ledger, &ProcessorConfig::default())
    }

    pub fn with_config(ledger: Arc<dyn ChunkStore>, config: &ProcessorConfig) -> Self {
        Self {
            ledger,
            decoder: Box::new(JsonBatchDecoder),
            max_item_bytes: config.max_item_bytes,
            subscribers: RwLock::new(Some(Vec::new())),
        }
    }

    /// Replace the decoder used by the encoded-stream entry points.
    pub fn with_decoder(mut self, decoder: impl BatchDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// Write every entry of `batch` into the ledger, then publish it.
    ///
    /// A failing entry stops the batch: entries before it stay committed,
    /// the batch is not published, and an [`UpdateEvent::Error`] is
    /// published instead. Such failures are not returned; the only error
    /// is [`ProcessorError::Closed`] after [`Self::close`].
    pub fn process_batch(&self, batch: Batch) -> Result<()> {
        self.handle_batch(batch).map(|_| ())
    }

    /// Decode and process each item of an encoded chunk source.
    ///
    /// Decode failures are published as error events and ingestion moves on
    /// to the next item. Returns once the source ends.
    pub async fn process_encoded_stream<S, T>(&self, stream: S) -> Result<StreamSummary>
    where
        S: Stream<Item = T>,
        T: AsRef<[u8]>,
    {
        tokio::pin!(stream);
        let mut summary = StreamSummary::default();
        while let Some(item) = stream.next().await {
            self.handle_encoded(item.as_ref(), &mut summary)?;
        }
        debug!(
            batches = summary.batches,
            failures = summary.failures,
            "encoded stream drained"
        );
        Ok(summary)
    }

    /// Process a line-delimited source, one encoded batch per line.
    ///
    /// Lines are handed to the decoder as raw bytes, so a line that is not
    /// valid UTF-8 fails like any other undecodable item. Blank lines are
    /// skipped. Only a read failure ends ingestion early; it is published
    /// as an error event and returned.
    pub async fn process_lines<R>(&self, reader: R) -> Result<StreamSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut segments = reader.split(b'\n');
        let mut summary = StreamSummary::default();
        loop {
            let mut line = match segments.next_segment().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    let error = ProcessorError::Io(e.to_string());
                    warn!(error = %error, "chunk source failed");
                    self.publish(UpdateEvent::Error(error.clone()));
                    return Err(error);
                }
            };
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.handle_encoded(&line, &mut summary)?;
        }
        debug!(
            batches = summary.batches,
            failures = summary.failures,
            "line source drained"
        );
        Ok(summary)
    }

    /// Subscribe to update events published from now on.
    ///
    /// After [`Self::close`] the returned receiver is already closed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UpdateEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = subscribers.as_mut() {
            subscribers.push(tx);
        }
        rx
    }

    /// Update events as a stream. The stream ends when the processor is
    /// closed and every queued event has been taken.
    pub fn updates(&self) -> impl Stream<Item = UpdateEvent> + Send + Unpin + 'static {
        UnboundedReceiverStream::new(self.subscribe())
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Terminate the update channel. Subscribers' streams complete normally.
    pub fn close(&self) {
        let subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscribers) = subscribers {
            info!(subscribers = subscribers.len(), "processor closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn handle_encoded(&self, bytes: &[u8], summary: &mut StreamSummary) -> Result<()> {
        let decoded = if bytes.len() > self.max_item_bytes {
            Err(ProcessorError::TooLarge {
                size: bytes.len(),
                max: self.max_item_bytes,
            })
        } else {
            self.decoder.decode(bytes)
        };

        match decoded {
            Ok(batch) => {
                if self.handle_batch(batch)? {
                    summary.batches += 1;
                } else {
                    summary.failures += 1;
                }
            }
            Err(error) => {
                if self.is_closed() {
                    return Err(ProcessorError::Closed);
                }
                warn!(error = %error, "dropping undecodable batch");
                self.publish(UpdateEvent::Error(error));
                summary.failures += 1;
            }
        }
        Ok(())
    }

    /// Returns whether the batch was accepted.
    fn handle_batch(&self, batch: Batch) -> Result<bool> {
        if self.is_closed() {
            return Err(ProcessorError::Closed);
        }

        match self.apply(&batch) {
            Ok(()) => {
                debug!(entries = batch.len(), "batch applied");
                let states = Arc::new(self.ledger.states());
                self.publish(UpdateEvent::Batch {
                    batch: Arc::new(batch),
                    states,
                });
                Ok(true)
            }
            Err(error) => {
                warn!(error = %error, "batch failed");
                self.publish(UpdateEvent::Error(error));
                Ok(false)
            }
        }
    }

    fn apply(&self, batch: &Batch) -> Result<()> {
        for (key, data) in batch {
            let id = ChunkId::parse(key.as_str()).map_err(|e| ProcessorError::InvalidEntry {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            self.ledger.resolve(id, data.clone());
        }
        Ok(())
    }

    fn publish(&self, event: UpdateEvent) {
        let mut guard = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = guard.as_mut() else {
            return;
        };
        // A failed send means the receiver was dropped.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("update published with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_ledger::{ChunkLedger, ChunkReader, ChunkWriter};
    use hydra_types::ChunkState;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::error::TryRecvError;

    fn id(s: &str) -> ChunkId {
        ChunkId::parse(s).unwrap()
    }

    fn batch(value: Value) -> Batch {
        match value {
            Value::Object(map) => map,
            _ => panic!("batch must be an object"),
        }
    }

    fn setup() -> (Arc<ChunkLedger>, ChunkProcessor) {
        let ledger = Arc::new(ChunkLedger::new());
        let processor = ChunkProcessor::new(ledger.clone());
        (ledger, processor)
    }

    #[test]
    fn batch_is_written_then_published() {
        let (ledger, processor) = setup();
        ledger.register(id("1"));
        let mut rx = processor.subscribe();

        processor.process_batch(batch(json!({"1": "hello"}))).unwrap();

        assert_eq!(ledger.value(&id("1")), Some(json!("hello")));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.as_batch(), Some(&batch(json!({"1": "hello"}))));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn every_subscriber_sees_every_batch_in_order() {
        let (_ledger, processor) = setup();
        let mut a = processor.subscribe();
        let mut b = processor.subscribe();
        assert_eq!(processor.subscriber_count(), 2);

        processor.process_batch(batch(json!({"1": 1}))).unwrap();
        processor.process_batch(batch(json!({"2": 2}))).unwrap();

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.try_recv().unwrap().as_batch(), Some(&batch(json!({"1": 1}))));
            assert_eq!(rx.try_recv().unwrap().as_batch(), Some(&batch(json!({"2": 2}))));
        }
    }

    #[test]
    fn late_subscribers_get_no_history() {
        let (_ledger, processor) = setup();
        processor.process_batch(batch(json!({"1": 1}))).unwrap();

        let mut rx = processor.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn dropped_subscriber_does_not_affect_others() {
        let (ledger, processor) = setup();
        let mut kept = processor.subscribe();
        drop(processor.subscribe());

        processor.process_batch(batch(json!({"1": 1}))).unwrap();
        assert!(kept.try_recv().is_ok());
        assert!(ledger.is_resolved(&id("1")));
    }

    #[test]
    fn failing_entry_publishes_error_and_keeps_earlier_entries() {
        let (ledger, processor) = setup();
        let mut rx = processor.subscribe();

        processor
            .process_batch(batch(json!({"1": "a", "": "b", "2": "c"})))
            .unwrap();

        assert!(ledger.is_resolved(&id("1")));
        assert!(!ledger.is_resolved(&id("2")));
        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event.as_error(),
            Some(ProcessorError::InvalidEntry { key, .. }) if key.is_empty()
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // Still usable afterwards.
        processor.process_batch(batch(json!({"2": "c"}))).unwrap();
        assert!(ledger.is_resolved(&id("2")));
    }

    #[test]
    fn close_is_terminal() {
        let (_ledger, processor) = setup();
        let mut rx = processor.subscribe();

        processor.close();
        assert!(processor.is_closed());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(
            processor.process_batch(batch(json!({"1": 1}))),
            Err(ProcessorError::Closed)
        );

        let mut late = processor.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(processor.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn malformed_item_then_good_item() {
        let (ledger, processor) = setup();
        let mut rx = processor.subscribe();

        let source = tokio_stream::iter(vec!["{oops", r#"{"1":"ok"}"#]);
        let summary = processor.process_encoded_stream(source).await.unwrap();

        assert_eq!(summary, StreamSummary { batches: 1, failures: 1 });
        assert!(rx.recv().await.unwrap().is_error());
        assert_eq!(
            rx.recv().await.unwrap().as_batch(),
            Some(&batch(json!({"1": "ok"})))
        );
        assert_eq!(ledger.value(&id("1")), Some(json!("ok")));
    }

    #[tokio::test]
    async fn custom_decoder_is_used() {
        struct KeyValue;
        impl BatchDecoder for KeyValue {
            fn decode(&self, bytes: &[u8]) -> Result<Batch> {
                let text = std::str::from_utf8(bytes).map_err(|e| ProcessorError::Decode {
                    reason: e.to_string(),
                })?;
                let (key, value) = text.split_once('=').ok_or_else(|| ProcessorError::Decode {
                    reason: "missing '='".into(),
                })?;
                let mut batch = Batch::new();
                batch.insert(key.to_string(), Value::from(value));
                Ok(batch)
            }
        }

        let ledger = Arc::new(ChunkLedger::new());
        let processor = ChunkProcessor::new(ledger.clone()).with_decoder(KeyValue);
        let source = tokio_stream::iter(vec![b"1=one".to_vec(), b"garbage".to_vec()]);
        let summary = processor.process_encoded_stream(source).await.unwrap();

        assert_eq!(summary, StreamSummary { batches: 1, failures: 1 });
        assert_eq!(ledger.value(&id("1")), Some(json!("one")));
    }

    #[tokio::test]
    async fn line_source_skips_blank_lines() {
        let (ledger, processor) = setup();
        let input: &[u8] = b"{\"1\": 1}\n\n   \n{\"2\": [2]}\nnot json\n";

        let summary = processor.process_lines(input).await.unwrap();

        assert_eq!(summary, StreamSummary { batches: 2, failures: 1 });
        assert_eq!(ledger.value(&id("2")), Some(json!([2])));
    }

    #[tokio::test]
    async fn updates_stream_ends_on_close() {
        let (_ledger, processor) = setup();
        let mut updates = processor.updates();

        processor.process_batch(batch(json!({"1": 1}))).unwrap();
        processor.close();

        let first = updates.next().await.unwrap();
        assert_eq!(first.as_batch(), Some(&batch(json!({"1": 1}))));
        assert!(updates.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_after_close_is_rejected() {
        let (_ledger, processor) = setup();
        processor.close();
        let source = tokio_stream::iter(vec![r#"{"1": 1}"#]);
        assert_eq!(
            processor.process_encoded_stream(source).await,
            Err(ProcessorError::Closed)
        );
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_stop_later_lines() {
        let (ledger, processor) = setup();
        let mut rx = processor.subscribe();
        let input: &[u8] = b"\xff\xfe\n{\"1\":\"ok\"}\r\n";

        let summary = processor.process_lines(input).await.unwrap();

        assert_eq!(summary, StreamSummary { batches: 1, failures: 1 });
        assert!(matches!(
            rx.recv().await.unwrap().as_error(),
            Some(ProcessorError::Decode { .. })
        ));
        assert_eq!(ledger.value(&id("1")), Some(json!("ok")));
    }

    #[test]
    fn batch_events_carry_states_as_published() {
        let (ledger, processor) = setup();
        ledger.register(id("1"));
        ledger.register(id("2"));
        let mut rx = processor.subscribe();

        processor.process_batch(batch(json!({"1": "x"}))).unwrap();
        processor.process_batch(batch(json!({"2": "y"}))).unwrap();

        let first = rx.try_recv().unwrap();
        let states = first.states().unwrap();
        assert_eq!(states[&id("1")], ChunkState::Loaded);
        assert_eq!(states[&id("2")], ChunkState::Pending);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.states().unwrap()[&id("2")], ChunkState::Loaded);
    }

    #[tokio::test]
    async fn slow_subscriber_sees_every_batch() {
        let (_ledger, processor) = setup();
        let updates = processor.updates();

        for n in 0..5000 {
            let mut entry = Batch::new();
            entry.insert(n.to_string(), json!(n));
            processor.process_batch(entry).unwrap();
        }
        processor.close();

        let seen: Vec<_> = updates.collect().await;
        assert_eq!(seen.len(), 5000);
    }

    #[tokio::test]
    async fn oversized_item_is_skipped() {
        let ledger = Arc::new(ChunkLedger::new());
        let processor = ChunkProcessor::with_config(
            ledger.clone(),
            &ProcessorConfig { max_item_bytes: 12 },
        );
        let mut rx = processor.subscribe();

        let source = tokio_stream::iter(vec![r#"{"1": "far too long"}"#, r#"{"2": 2}"#]);
        let summary = processor.process_encoded_stream(source).await.unwrap();

        assert_eq!(summary, StreamSummary { batches: 1, failures: 1 });
        assert_eq!(
            rx.recv().await.unwrap().as_error(),
            Some(&ProcessorError::TooLarge { size: 21, max: 12 })
        );
        assert!(!ledger.contains(&id("1")));
        assert!(ledger.is_resolved(&id("2")));
    }
}
