use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use rq_types::{ChannelError, Event, EventSink, RqResult, Timeframe};

/// Default bounded capacity of the event channel (§4.1): a feed producer
/// blocks once this many unconsumed events are queued, giving the consumer
/// back-pressure instead of unbounded memory growth.
pub const DEFAULT_CAPACITY: usize = 10;

struct Shared {
    timeframe: Timeframe,
    closed: AtomicBool,
}

/// Producer half of the event channel (C2), handed to a [`Feed`] as the
/// thing it plays events into.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    shared: Arc<Shared>,
}

#[async_trait]
impl EventSink for EventSender {
    async fn send(&self, event: Event) -> RqResult<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed.into());
        }
        if !event.is_heartbeat() && !self.shared.timeframe.contains_time(event.time) {
            let tf = &self.shared.timeframe;
            let past_end = if tf.inclusive { event.time > tf.end } else { event.time >= tf.end };
            if past_end {
                tracing::debug!(time = %event.time, "event past timeframe end, closing channel");
                self.close();
            } else {
                tracing::debug!(time = %event.time, "event before configured timeframe start, dropped");
            }
            return Ok(());
        }
        self.tx.send(event).await.map_err(|_| ChannelError::Closed)?;
        Ok(())
    }
}

impl EventSender {
    /// Idempotent: closing an already-closed sender is a no-op.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Consumer half of the event channel (C2, C10). Synthesizes a heartbeat
/// event when no real event arrives within `heartbeat_timeout`, so the run
/// kernel's step loop never blocks forever on a stalled feed.
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
    shared: Arc<Shared>,
    last_time: DateTime<Utc>,
}

/// Outcome of one [`EventReceiver::recv`] call.
pub enum Received {
    Event(Event),
    Closed,
}

impl EventReceiver {
    /// Awaits the next event, falling back to a synthetic heartbeat clamped
    /// to at least the last event's time if `heartbeat_timeout` elapses
    /// first. Returns `Closed` once the sender is gone and drained.
    pub async fn recv(&mut self, heartbeat_timeout: Duration) -> Received {
        match tokio::time::timeout(heartbeat_timeout, self.rx.recv()).await {
            Ok(Some(event)) => {
                if event.time > self.last_time {
                    self.last_time = event.time;
                }
                Received::Event(event)
            }
            Ok(None) => Received::Closed,
            Err(_elapsed) => {
                let now = Utc::now().max(self.last_time);
                Received::Event(Event::heartbeat(now))
            }
        }
    }
}

/// Builds a bounded event channel gated to `timeframe` (§4.1). `capacity`
/// governs the back-pressure point; [`DEFAULT_CAPACITY`] matches the
/// reference configuration.
pub fn event_channel(timeframe: Timeframe, capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared { timeframe, closed: AtomicBool::new(false) });
    (
        EventSender { tx, shared: shared.clone() },
        EventReceiver { rx, shared, last_time: DateTime::<Utc>::MIN_UTC },
    )
}
