/// Progress Stream: a unidirectional, long-lived event channel from a
/// running pipeline task to a single subscriber.
///
/// Built on a bounded `tokio::mpsc` channel, following the same
/// producer/background-task split used by the embedding and extraction
/// pipelines: the producer is cheap to call from pipeline code and never
/// blocks the work it is reporting on, and subscriber disconnect (the
/// receiver being dropped) does not abort the producing task — it only
/// silences further emission.

use serde::Serialize;
use tokio::sync::mpsc;

/// One emitted event. `progress` is monotonically non-decreasing within a
/// stream; exactly one terminal event (`Complete` or `Error`) is ever sent.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Processing { progress: u8 },
    Complete { progress: u8 },
    Error { progress: u8, reason: String },
}

impl ProgressEvent {
    /// `text/event-stream` frame per the external interface contract.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap_or_default())
    }

    fn progress(&self) -> u8 {
        match self {
            ProgressEvent::Processing { progress } => *progress,
            ProgressEvent::Complete { progress } => *progress,
            ProgressEvent::Error { progress, .. } => *progress,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

/// Producer handle held by pipeline code. Cloneable; all clones share the
/// same monotonicity/terminal-once bookkeeping via the inner channel.
#[derive(Clone)]
pub struct ProgressProducer {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ProgressProducer {
    /// Emit a `processing` event. Silently clamps `progress` upward to the
    /// last emitted value so callers never need to track it themselves.
    /// No-op once a terminal event has already been sent on this stream.
    pub fn processing(&self, progress: u8) {
        self.emit(ProgressEvent::Processing {
            progress: progress.min(100),
        });
    }

    /// Emit the terminal `complete` event at progress 100.
    pub fn complete(&self) {
        self.emit(ProgressEvent::Complete { progress: 100 });
    }

    /// Emit the terminal `error` event at progress 0.
    pub fn error(&self, reason: impl Into<String>) {
        self.emit(ProgressEvent::Error {
            progress: 0,
            reason: reason.into(),
        });
    }

    fn emit(&self, event: ProgressEvent) {
        // try_send: a full or closed channel must never block or fail the
        // work being reported on. Dropping an event here only affects what
        // the subscriber observes, not the pipeline's committed side effects.
        if self.sender.try_send(event).is_err() {
            tracing::debug!("progress event dropped: subscriber channel full or closed");
        }
    }
}

/// Consumer handle given to the single subscriber of a stream.
pub struct ProgressConsumer {
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl ProgressConsumer {
    /// Await the next event, or `None` once the stream has ended (producer
    /// dropped after emitting its terminal event, or without one on panic).
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }
}

/// Create a linked producer/consumer pair for one pipeline run.
/// `capacity` bounds how many unconsumed events may buffer before the
/// producer starts dropping intermediate ones (the terminal event is
/// still best-effort, not guaranteed, if the subscriber never reads).
pub fn channel(capacity: usize) -> (ProgressProducer, ProgressConsumer) {
    let (sender, receiver) = mpsc::channel(capacity);
    (ProgressProducer { sender }, ProgressConsumer { receiver })
}

/// Track monotonicity and terminal-once across a raw sequence of events —
/// used by tests and by any code that wants to assert the stream contract
/// holds instead of just trusting `ProgressProducer`'s clamping.
pub fn validate_sequence(events: &[ProgressEvent]) -> Result<(), String> {
    let mut last_progress = 0u8;
    let mut seen_terminal = false;
    for (i, event) in events.iter().enumerate() {
        if seen_terminal {
            return Err(format!("event {} emitted after a terminal event", i));
        }
        let p = event.progress();
        if p < last_progress {
            return Err(format!(
                "event {} progress {} is less than previous progress {}",
                i, p, last_progress
            ));
        }
        last_progress = p;
        if event.is_terminal() {
            seen_terminal = true;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn producer_clamps_and_consumer_receives_in_order() {
        let (tx, mut rx) = channel(8);
        tx.processing(10);
        tx.processing(30);
        tx.complete();

        assert_eq!(rx.recv().await, Some(ProgressEvent::Processing { progress: 10 }));
        assert_eq!(rx.recv().await, Some(ProgressEvent::Processing { progress: 30 }));
        assert_eq!(rx.recv().await, Some(ProgressEvent::Complete { progress: 100 }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_the_consumer_does_not_panic_the_producer() {
        let (tx, rx) = channel(1);
        drop(rx);
        tx.processing(50);
        tx.complete();
    }

    #[test]
    fn validate_sequence_rejects_non_monotonic_progress() {
        let events = vec![
            ProgressEvent::Processing { progress: 50 },
            ProgressEvent::Processing { progress: 20 },
        ];
        assert!(validate_sequence(&events).is_err());
    }

    #[test]
    fn validate_sequence_rejects_events_after_terminal() {
        let events = vec![
            ProgressEvent::Complete { progress: 100 },
            ProgressEvent::Processing { progress: 100 },
        ];
        assert!(validate_sequence(&events).is_err());
    }

    #[test]
    fn sse_frame_matches_external_interface_shape() {
        let event = ProgressEvent::Processing { progress: 42 };
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.contains("\"type\":\"processing\""));
        assert!(frame.contains("\"progress\":42"));
    }
}
