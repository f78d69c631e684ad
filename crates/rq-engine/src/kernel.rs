use std::sync::Arc;
use std::time::Duration;

use rq_types::{internal_error, Broker, Feed, Instruction, Journal, RqResult, Strategy};

use crate::cancel::CancelToken;
use crate::channel::{event_channel, Received, DEFAULT_CAPACITY};

/// Drives one backtest run end to end (C10): spawns the feed as a producer
/// task, then repeatedly steps `receive -> sync -> strategy.create ->
/// broker.place -> journal.track` until the feed closes or `cancel` fires.
#[derive(Clone, Copy)]
pub struct RunKernel {
    heartbeat_timeout: Duration,
    capacity: usize,
}

impl RunKernel {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self { heartbeat_timeout, capacity: DEFAULT_CAPACITY }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub async fn run(
        &self,
        feed: Arc<dyn Feed>,
        mut broker: Box<dyn Broker>,
        mut strategy: Box<dyn Strategy>,
        mut journal: Box<dyn Journal>,
        cancel: CancelToken,
    ) -> RqResult<Box<dyn Journal>> {
        let timeframe = feed.timeframe();
        let (sender, mut receiver) = event_channel(timeframe, self.capacity);

        let producer = {
            let sender = sender.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    result = feed.play(&sender) => result,
                    _ = cancel.cancelled() => {
                        sender.close();
                        Ok(())
                    }
                }
            })
        };

        loop {
            let received = tokio::select! {
                r = receiver.recv(self.heartbeat_timeout) => r,
                _ = cancel.cancelled() => break,
            };

            match received {
                Received::Closed => break,
                Received::Event(event) => {
                    let account = broker.sync();
                    let instructions: Vec<Instruction> = strategy.create(&event, &account);
                    let account = broker.place(instructions.clone(), &event)?;
                    journal.track(&event, &account, &instructions);
                }
            }
        }

        sender.close();
        producer.await.map_err(|e| internal_error!("feed producer task panicked: {e}"))??;
        journal.flush();
        strategy.reset();
        broker.reset();
        Ok(journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rq_types::{Account, Asset, Currency, Event, EventSink, PriceItem, Timeframe};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedFeed {
        events: Vec<Event>,
        timeframe: Timeframe,
    }

    #[async_trait]
    impl Feed for FixedFeed {
        async fn play(&self, sink: &dyn EventSink) -> RqResult<()> {
            for event in self.events.clone() {
                sink.send(event).await?;
            }
            Ok(())
        }

        fn timeframe(&self) -> Timeframe {
            self.timeframe
        }
    }

    struct NoopBroker {
        account: Account,
    }

    impl Broker for NoopBroker {
        fn place(&mut self, _instructions: Vec<Instruction>, event: &Event) -> RqResult<Account> {
            self.account.last_update = event.time;
            Ok(self.account.clone())
        }
        fn sync(&self) -> Account {
            self.account.clone()
        }
        fn reset(&mut self) {}
    }

    struct CountingStrategy {
        calls: Arc<AtomicUsize>,
    }

    impl Strategy for CountingStrategy {
        fn create(&mut self, _event: &Event, _account: &Account) -> Vec<Instruction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
        fn reset(&mut self) {}
    }

    struct CountingJournal {
        tracked: Arc<AtomicUsize>,
    }

    impl Journal for CountingJournal {
        fn track(&mut self, _event: &Event, _account: &Account, _instructions: &[Instruction]) {
            self.tracked.fetch_add(1, Ordering::SeqCst);
        }
        fn metric_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn get_metric(&self, _name: &str) -> Vec<(chrono::DateTime<Utc>, f64)> {
            Vec::new()
        }
        fn flush(&mut self) {}
    }

    fn abc() -> Asset {
        Asset::stock("ABC", Currency::usd())
    }

    #[tokio::test]
    async fn run_drains_every_event_through_the_pipeline() {
        let t0 = Utc::now();
        let events = vec![
            Event::new(t0, vec![(abc(), PriceItem::TradePrice { price: dec!(100), volume: dec!(1) })]),
            Event::new(t0 + chrono::Duration::seconds(1), vec![(abc(), PriceItem::TradePrice { price: dec!(101), volume: dec!(1) })]),
        ];
        let feed = Arc::new(FixedFeed { events, timeframe: Timeframe::infinite() });
        let broker = Box::new(NoopBroker { account: Account::new(Currency::usd(), t0) });
        let calls = Arc::new(AtomicUsize::new(0));
        let tracked = Arc::new(AtomicUsize::new(0));
        let strategy = Box::new(CountingStrategy { calls: calls.clone() });
        let journal = Box::new(CountingJournal { tracked: tracked.clone() });

        let kernel = RunKernel::new(Duration::from_millis(50));
        kernel.run(feed, broker, strategy, journal, CancelToken::new()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tracked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelling_stops_the_run_promptly() {
        let t0 = Utc::now();
        let feed = Arc::new(FixedFeed { events: Vec::new(), timeframe: Timeframe::infinite() });
        let broker = Box::new(NoopBroker { account: Account::new(Currency::usd(), t0) });
        let calls = Arc::new(AtomicUsize::new(0));
        let tracked = Arc::new(AtomicUsize::new(0));
        let strategy = Box::new(CountingStrategy { calls });
        let journal = Box::new(CountingJournal { tracked });

        let cancel = CancelToken::new();
        cancel.cancel();
        let kernel = RunKernel::new(Duration::from_secs(5));
        let result = kernel.run(feed, broker, strategy, journal, cancel).await;
        assert!(result.is_ok());
    }
}
