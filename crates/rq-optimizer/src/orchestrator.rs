use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rq_engine::{CancelToken, RunKernel};
use rq_types::{config_error, internal_error, Broker, Event, EventSink, Feed, Journal, RqError, RqResult, Strategy, Timeframe};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::scoring::Score;
use crate::search::{Params, SearchStrategy};

/// Wraps a feed so it plays the same events but is gated to a narrower
/// window; the event channel (C2) drops anything outside `timeframe()`, so
/// this is enough to run one backtest over a walk-forward/Monte-Carlo slice
/// of a larger feed without touching the feed itself.
struct WindowedFeed {
    inner: Arc<dyn Feed>,
    window: Timeframe,
}

impl WindowedFeed {
    fn new(inner: Arc<dyn Feed>, window: Timeframe) -> Self {
        Self { inner, window }
    }
}

#[async_trait]
impl Feed for WindowedFeed {
    async fn play(&self, sink: &dyn EventSink) -> RqResult<()> {
        self.inner.play(sink).await
    }

    fn timeframe(&self) -> Timeframe {
        self.window
    }
}

/// How an [`Orchestrator`] carves a feed's timeframe into one or more run
/// windows (C11).
#[derive(Debug, Clone)]
pub enum RunPlan {
    SingleRun,
    WalkForward { period: Duration, overlap: Duration, anchored: bool },
    MonteCarlo { period: Duration, samples: usize, seed: u64 },
}

impl RunPlan {
    pub fn windows(&self, feed_timeframe: Timeframe) -> RqResult<Vec<Timeframe>> {
        match self {
            RunPlan::SingleRun => Ok(vec![feed_timeframe]),
            RunPlan::WalkForward { period, overlap, anchored } => {
                if *anchored && !overlap.is_zero() {
                    return Err(config_error!("walk-forward requires overlap = 0 when anchored"));
                }
                if *anchored {
                    let mut windows = Vec::new();
                    let mut window_end = feed_timeframe.start + *period;
                    while window_end <= feed_timeframe.end {
                        windows.push(Timeframe::new(feed_timeframe.start, window_end, feed_timeframe.inclusive));
                        window_end += *period;
                    }
                    Ok(windows)
                } else {
                    Ok(feed_timeframe.split(*period, *overlap))
                }
            }
            RunPlan::MonteCarlo { period, samples, seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                Ok(feed_timeframe.sample(*period, *samples, &mut rng))
            }
        }
    }
}

type BrokerFactory = dyn Fn() -> Box<dyn Broker> + Send + Sync;
type StrategyFactory = dyn Fn() -> Box<dyn Strategy> + Send + Sync;
type JournalFactory = dyn Fn() -> Box<dyn Journal> + Send + Sync;

/// Runs a single- or multi-window backtest plan (C11): `singleRun` is one
/// kernel invocation over the feed's whole timeframe, `walkForward` and
/// `monteCarlo` replay it once per derived window, in parallel up to
/// `concurrency`.
pub struct Orchestrator {
    kernel: RunKernel,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(kernel: RunKernel, concurrency: usize) -> Self {
        Self { kernel, concurrency: concurrency.max(1) }
    }

    pub async fn run_plan(
        &self,
        plan: &RunPlan,
        feed: Arc<dyn Feed>,
        make_broker: Arc<BrokerFactory>,
        make_strategy: Arc<StrategyFactory>,
        make_journal: Arc<JournalFactory>,
        cancel: CancelToken,
    ) -> RqResult<Vec<(Timeframe, Box<dyn Journal>)>> {
        let windows = plan.windows(feed.timeframe())?;
        tracing::info!(window_count = windows.len(), concurrency = self.concurrency, "orchestrator run_plan starting");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(windows.len());

        for window in &windows {
            let window = *window;
            let kernel = self.kernel;
            let windowed: Arc<dyn Feed> = Arc::new(WindowedFeed::new(feed.clone(), window));
            let broker = (make_broker)();
            let strategy = (make_strategy)();
            let journal = (make_journal)();
            let permit = semaphore.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("orchestrator semaphore never closes");
                let journal = kernel.run(windowed, broker, strategy, journal, cancel).await?;
                Ok::<_, RqError>((window, journal))
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let (window, journal) = match handle.await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "orchestrator run window failed");
                    return Err(e);
                }
                Err(e) => return Err(internal_error!("orchestrator run task panicked: {e}")),
            };
            results.push((window, journal));
        }
        Ok(results)
    }
}

/// One scored trial produced by [`Optimizer::optimize`] (C11).
#[derive(Debug, Clone)]
pub struct RunResult {
    pub params: Params,
    pub score: f64,
    pub timeframe: Timeframe,
    pub run_id: Uuid,
    pub validation: bool,
}

/// Static configuration for one [`Optimizer::optimize`] call.
#[derive(Clone, Copy)]
pub struct OptimizerConfig {
    pub kernel: RunKernel,
    pub concurrency: usize,
    pub batch_size: usize,
    pub train: Timeframe,
    pub validate: Timeframe,
}

type ParamBrokerFactory = dyn Fn(&Params) -> Box<dyn Broker> + Send + Sync;
type ParamStrategyFactory = dyn Fn(&Params) -> Box<dyn Strategy> + Send + Sync;

/// Sweeps a [`SearchStrategy`] over the training timeframe with bounded
/// concurrency, keeps the max-scoring parameter set, then validates it on a
/// disjoint timeframe (C11).
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub async fn optimize(
        &self,
        feed: Arc<dyn Feed>,
        mut space: Box<dyn SearchStrategy>,
        score: Score,
        make_broker: Arc<ParamBrokerFactory>,
        make_strategy: Arc<ParamStrategyFactory>,
        make_journal: Arc<JournalFactory>,
    ) -> RqResult<Vec<RunResult>> {
        tracing::info!(batch_size = self.config.batch_size, concurrency = self.config.concurrency, "optimizer sweep starting");
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut results = Vec::new();
        let mut best: Option<(Params, f64)> = None;

        loop {
            let batch = space.suggest(self.config.batch_size);
            if batch.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for params in batch {
                let kernel = self.config.kernel;
                let train: Arc<dyn Feed> = Arc::new(WindowedFeed::new(feed.clone(), self.config.train));
                let broker = (make_broker)(&params);
                let strategy = (make_strategy)(&params);
                let journal = (make_journal)();
                let permit = semaphore.clone();
                let score = score.clone();
                let train_tf = self.config.train;

                handles.push(tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("optimizer semaphore never closes");
                    let journal = kernel.run(train, broker, strategy, journal, CancelToken::new()).await?;
                    let value = score.calculate(journal.as_ref(), train_tf);
                    Ok::<_, RqError>((params, value))
                }));
            }

            for handle in handles {
                let (params, value) = match handle.await {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "optimizer trial failed, skipping");
                        continue;
                    }
                    Err(e) => return Err(internal_error!("optimizer trial task panicked: {e}")),
                };
                tracing::debug!(score = value, "optimizer trial scored");
                space.report(&params, value);
                if best.as_ref().map(|(_, s)| value > *s).unwrap_or(true) {
                    best = Some((params.clone(), value));
                }
                results.push(RunResult {
                    params,
                    score: value,
                    timeframe: self.config.train,
                    run_id: Uuid::new_v4(),
                    validation: false,
                });
            }
        }

        if let Some((best_params, best_score)) = best {
            tracing::info!(score = best_score, "optimizer validating best parameter set");
            let validate: Arc<dyn Feed> = Arc::new(WindowedFeed::new(feed.clone(), self.config.validate));
            let broker = (make_broker)(&best_params);
            let strategy = (make_strategy)(&best_params);
            let journal = (make_journal)();
            let journal = self.config.kernel.run(validate, broker, strategy, journal, CancelToken::new()).await?;
            let value = score.calculate(journal.as_ref(), self.config.validate);
            results.push(RunResult {
                params: best_params,
                score: value,
                timeframe: self.config.validate,
                run_id: Uuid::new_v4(),
                validation: true,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Reduction;
    use crate::search::{EmptySpace, GridSearch};
    use chrono::{TimeZone, Utc};
    use rq_types::{Account, Asset, Currency, Instruction, PriceItem};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn ymd(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn abc() -> Asset {
        Asset::stock("ABC", Currency::usd())
    }

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

    struct RecordingJournal {
        steps: Arc<Mutex<Vec<f64>>>,
    }

    impl Journal for RecordingJournal {
        fn track(&mut self, event: &Event, _account: &Account, _instructions: &[Instruction]) {
            self.steps.lock().unwrap().push(event.time.timestamp() as f64);
        }
        fn metric_names(&self) -> Vec<String> {
            vec!["equity".into()]
        }
        fn get_metric(&self, _name: &str) -> Vec<(chrono::DateTime<Utc>, f64)> {
            self.steps.lock().unwrap().iter().map(|v| (ymd(2020, 1, 1), *v)).collect()
        }
        fn flush(&mut self) {}
    }

    fn events_over(days: i64) -> Vec<Event> {
        (0..days)
            .map(|d| {
                Event::new(
                    ymd(2020, 1, 1) + Duration::days(d),
                    vec![(abc(), PriceItem::TradePrice { price: dec!(1), volume: dec!(1) })],
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn single_run_plan_covers_the_whole_feed_timeframe() {
        let timeframe = Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 10), true);
        let windows = RunPlan::SingleRun.windows(timeframe).unwrap();
        assert_eq!(windows, vec![timeframe]);
    }

    #[tokio::test]
    async fn anchored_walk_forward_requires_zero_overlap() {
        let timeframe = Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 10), true);
        let plan = RunPlan::WalkForward { period: Duration::days(2), overlap: Duration::days(1), anchored: true };
        assert!(plan.windows(timeframe).is_err());
    }

    #[tokio::test]
    async fn anchored_walk_forward_produces_growing_windows_from_feed_start() {
        let timeframe = Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 7), true);
        let plan = RunPlan::WalkForward { period: Duration::days(2), overlap: Duration::zero(), anchored: true };
        let windows = plan.windows(timeframe).unwrap();
        assert!(windows.iter().all(|w| w.start == timeframe.start));
        assert!(windows.windows(2).all(|pair| pair[1].end > pair[0].end));
    }

    #[tokio::test]
    async fn orchestrator_runs_one_window_per_plan_entry() {
        let feed_timeframe = Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 5), true);
        let feed: Arc<dyn Feed> = Arc::new(FixedFeed { events: events_over(4), timeframe: feed_timeframe });
        let orchestrator = Orchestrator::new(RunKernel::new(std::time::Duration::from_millis(50)), 2);

        let make_broker: Arc<BrokerFactory> =
            Arc::new(|| Box::new(NoopBroker { account: Account::new(Currency::usd(), ymd(2020, 1, 1)) }) as Box<dyn Broker>);
        let make_strategy: Arc<StrategyFactory> = Arc::new(|| {
            struct NoOpStrategy;
            impl Strategy for NoOpStrategy {
                fn create(&mut self, _e: &Event, _a: &Account) -> Vec<Instruction> {
                    Vec::new()
                }
                fn reset(&mut self) {}
            }
            Box::new(NoOpStrategy) as Box<dyn Strategy>
        });
        let make_journal: Arc<JournalFactory> =
            Arc::new(|| Box::new(RecordingJournal { steps: Arc::new(Mutex::new(Vec::new())) }) as Box<dyn Journal>);

        let plan = RunPlan::WalkForward { period: Duration::days(2), overlap: Duration::zero(), anchored: false };
        let results = orchestrator
            .run_plan(&plan, feed, make_broker, make_strategy, make_journal, CancelToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn optimizer_picks_the_max_scoring_params_and_validates_once() {
        let feed_timeframe = Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 10), true);
        let feed: Arc<dyn Feed> = Arc::new(FixedFeed { events: events_over(9), timeframe: feed_timeframe });

        let make_broker: Arc<ParamBrokerFactory> =
            Arc::new(|_p| Box::new(NoopBroker { account: Account::new(Currency::usd(), ymd(2020, 1, 1)) }) as Box<dyn Broker>);
        let make_strategy: Arc<ParamStrategyFactory> = Arc::new(|_p| {
            struct NoOpStrategy;
            impl Strategy for NoOpStrategy {
                fn create(&mut self, _e: &Event, _a: &Account) -> Vec<Instruction> {
                    Vec::new()
                }
                fn reset(&mut self) {}
            }
            Box::new(NoOpStrategy) as Box<dyn Strategy>
        });
        let make_journal: Arc<JournalFactory> =
            Arc::new(|| Box::new(RecordingJournal { steps: Arc::new(Mutex::new(Vec::new())) }) as Box<dyn Journal>);

        let config = OptimizerConfig {
            kernel: RunKernel::new(std::time::Duration::from_millis(50)),
            concurrency: 2,
            batch_size: 4,
            train: Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 6), true),
            validate: Timeframe::new(ymd(2020, 1, 6), ymd(2020, 1, 10), true),
        };
        let optimizer = Optimizer::new(config);
        let space = Box::new(GridSearch::new(
            &crate::search::SearchSpace::new().add_int("x", 1, 3),
            2,
        )) as Box<dyn SearchStrategy>;
        let score = Score::new("equity", Reduction::Mean);

        let results = optimizer.optimize(feed, space, score, make_broker, make_strategy, make_journal).await.unwrap();

        assert_eq!(results.iter().filter(|r| !r.validation).count(), 3);
        assert_eq!(results.iter().filter(|r| r.validation).count(), 1);
    }

    #[tokio::test]
    async fn empty_space_optimize_yields_no_validation_run() {
        let feed_timeframe = Timeframe::new(ymd(2020, 1, 1), ymd(2020, 1, 5), true);
        let feed: Arc<dyn Feed> = Arc::new(FixedFeed { events: events_over(4), timeframe: feed_timeframe });

        let make_broker: Arc<ParamBrokerFactory> =
            Arc::new(|_p| Box::new(NoopBroker { account: Account::new(Currency::usd(), ymd(2020, 1, 1)) }) as Box<dyn Broker>);
        let make_strategy: Arc<ParamStrategyFactory> = Arc::new(|_p| {
            struct NoOpStrategy;
            impl Strategy for NoOpStrategy {
                fn create(&mut self, _e: &Event, _a: &Account) -> Vec<Instruction> {
                    Vec::new()
                }
                fn reset(&mut self) {}
            }
            Box::new(NoOpStrategy) as Box<dyn Strategy>
        });
        let make_journal: Arc<JournalFactory> =
            Arc::new(|| Box::new(RecordingJournal { steps: Arc::new(Mutex::new(Vec::new())) }) as Box<dyn Journal>);

        let config = OptimizerConfig {
            kernel: RunKernel::new(std::time::Duration::from_millis(50)),
            concurrency: 1,
            batch_size: 4,
            train: feed_timeframe,
            validate: feed_timeframe,
        };
        let optimizer = Optimizer::new(config);
        let space = Box::new(EmptySpace::new()) as Box<dyn SearchStrategy>;
        let score = Score::new("equity", Reduction::Mean);

        let results = optimizer.optimize(feed, space, score, make_broker, make_strategy, make_journal).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.validation));
    }
}
