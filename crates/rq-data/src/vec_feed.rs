use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rq_types::{Event, EventSink, Feed, RqResult, Timeframe};

/// Replays an in-memory, already-ordered `Vec<Event>` through the channel
/// (C16). Exists so the kernel and orchestrator have something concrete to
/// run against in tests without reaching for any external feed source.
#[derive(Debug, Clone)]
pub struct VecFeed {
    events: Vec<Event>,
    timeframe: Timeframe,
}

impl VecFeed {
    /// `events` must already be sorted by `time`; this mirrors the contract
    /// every [`Feed`] implementation must uphold.
    pub fn new(events: Vec<Event>) -> Self {
        let timeframe = Self::span(&events);
        Self { events, timeframe }
    }

    /// Builds a feed gated to an explicit timeframe rather than one inferred
    /// from the event times (e.g. to leave room for a heartbeat tail).
    pub fn with_timeframe(events: Vec<Event>, timeframe: Timeframe) -> Self {
        Self { events, timeframe }
    }

    fn span(events: &[Event]) -> Timeframe {
        match (events.first(), events.last()) {
            (Some(first), Some(last)) => Timeframe::new(first.time, last.time, true),
            _ => Timeframe::empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(|e| e.time)
    }
}

#[async_trait]
impl Feed for VecFeed {
    async fn play(&self, sink: &dyn EventSink) -> RqResult<()> {
        for event in &self.events {
            sink.send(event.clone()).await?;
        }
        Ok(())
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_types::{Asset, Currency, PriceItem};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn abc() -> Asset {
        Asset::stock("ABC", Currency::usd())
    }

    fn event_at(secs: i64) -> Event {
        Event::new(
            DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs),
            vec![(abc(), PriceItem::TradePrice { price: dec!(1), volume: dec!(1) })],
        )
    }

    struct RecordingSink {
        received: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event: Event) -> RqResult<()> {
            self.received.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[test]
    fn timeframe_spans_first_to_last_event() {
        let feed = VecFeed::new(vec![event_at(10), event_at(20), event_at(30)]);
        assert_eq!(feed.timeframe().start, event_at(10).time);
        assert_eq!(feed.timeframe().end, event_at(30).time);
    }

    #[test]
    fn empty_feed_has_empty_timeframe() {
        let feed = VecFeed::new(Vec::new());
        assert!(feed.timeframe().is_empty());
    }

    #[tokio::test]
    async fn play_replays_every_event_in_order() {
        let feed = VecFeed::new(vec![event_at(1), event_at(2), event_at(3)]);
        let sink = RecordingSink { received: Mutex::new(Vec::new()) };
        feed.play(&sink).await.unwrap();
        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].time, event_at(1).time);
        assert_eq!(received[2].time, event_at(3).time);
    }
}
