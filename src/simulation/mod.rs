//! Timer-driven traffic simulation
//!
//! Each tick generates one event, evaluates it against a snapshot of the
//! shared rule store and prepends it to the event log. Ticks run one at a
//! time on a single tokio task; at most one ticker exists per simulator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::SimulationConfig;
use crate::detection::{
    EventLog, ProbabilitySource, RandomChance, RuleEvaluator, TrafficGenerator, TrafficSource,
};
use crate::models::{Rule, TrafficEvent};
use crate::rules::SharedRuleStore;

/// Errors that can occur while controlling the simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("No tokio runtime available to run the ticker: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// State touched by a tick. Guarded by one mutex so that a tick and a
/// stop command never interleave.
struct Engine {
    log: EventLog,
    evaluator: RuleEvaluator<Box<dyn ProbabilitySource>>,
    source: Box<dyn TrafficSource>,
    sink: Option<mpsc::Sender<TrafficEvent>>,
    /// Bumped on every start and stop; a ticker only runs while it owns the current epoch
    epoch: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Engine {
    fn tick(&mut self, rules: &[Rule]) -> TrafficEvent {
        let mut event = self.source.next_event();

        match self.evaluator.annotate(&mut event, rules) {
            Some(matched) if matched.is_alert() => log::warn!(
                "ALERT {} - {} -> {} {}/{}",
                event.status,
                event.source_ip,
                event.destination_ip,
                event.protocol,
                event.port
            ),
            Some(_) => log::debug!("Traffic {} matched: {}", event.id, event.status),
            None => {}
        }

        self.log.append(event.clone());
        self.forward(&event);
        event
    }

    /// A ticker whose task panicked or returned no longer counts as running
    fn ticker_alive(&self) -> bool {
        self.ticker.as_ref().map_or(false, |ticker| !ticker.is_finished())
    }

    fn forward(&mut self, event: &TrafficEvent) {
        let Some(sink) = &self.sink else { return };
        match sink.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Event sink full, dropping traffic event {}", event.id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::info!("Event sink closed, no longer forwarding events");
                self.sink = None;
            }
        }
    }
}

/// Traffic simulator with a start/stop ticker
pub struct Simulator {
    rules: SharedRuleStore,
    engine: Arc<Mutex<Engine>>,
    period: Duration,
}

impl Simulator {
    /// Create a simulator with random traffic and random signature matching
    pub fn new(rules: SharedRuleStore, config: &SimulationConfig) -> Self {
        let chance: Box<dyn ProbabilitySource> = Box::new(RandomChance::new());
        let engine = Engine {
            log: EventLog::with_capacity(config.log_capacity),
            evaluator: RuleEvaluator::with_source(chance, config.signature_match_rate),
            source: Box::new(TrafficGenerator::new()),
            sink: None,
            epoch: 0,
            ticker: None,
        };

        Simulator {
            rules,
            engine: Arc::new(Mutex::new(engine)),
            period: config.tick_interval(),
        }
    }

    /// Replace the traffic source
    pub fn with_source(self, source: impl TrafficSource + 'static) -> Self {
        self.lock().source = Box::new(source);
        self
    }

    /// Replace the probability source used by Signature rules
    pub fn with_probability(self, chance: impl ProbabilitySource + 'static) -> Self {
        let chance: Box<dyn ProbabilitySource> = Box::new(chance);
        {
            let mut engine = self.lock();
            let rate = engine.evaluator.signature_rate();
            engine.evaluator = RuleEvaluator::with_source(chance, rate);
        }
        self
    }

    /// Forward every appended event to `sink`
    pub fn with_event_sink(self, sink: mpsc::Sender<TrafficEvent>) -> Self {
        self.lock().sink = Some(sink);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one tick immediately, independent of the ticker
    pub fn step(&self) -> TrafficEvent {
        let rules = self.rule_snapshot();
        self.lock().tick(&rules)
    }

    /// Start the periodic ticker on the current tokio runtime.
    ///
    /// Returns `Ok(false)` if a ticker is already running.
    pub fn start(&self) -> Result<bool, SimulationError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let mut engine = self.lock();
        if engine.ticker_alive() {
            log::debug!("Simulation already running");
            return Ok(false);
        }
        if engine.ticker.take().is_some() {
            log::warn!("Previous ticker exited unexpectedly, restarting");
        }

        engine.epoch += 1;
        let epoch = engine.epoch;
        let period = self.period;
        let shared = Arc::clone(&self.engine);
        let rules = Arc::clone(&self.rules);

        engine.ticker = Some(runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let snapshot = read_rules(&rules);
                let mut engine = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if engine.epoch != epoch {
                    break;
                }
                engine.tick(&snapshot);
            }
        }));

        log::info!("Simulation started (tick every {:?})", period);
        Ok(true)
    }

    /// Stop the ticker. No tick appends to the log once this returns.
    ///
    /// Returns `false` if the simulation was not running.
    pub fn stop(&self) -> bool {
        let mut engine = self.lock();
        let running = engine.ticker_alive();
        let Some(ticker) = engine.ticker.take() else {
            return false;
        };
        engine.epoch += 1;
        ticker.abort();
        if running {
            log::info!("Simulation stopped");
        }
        running
    }

    pub fn is_running(&self) -> bool {
        self.lock().ticker_alive()
    }

    /// Logged events, newest first
    pub fn events(&self) -> Vec<TrafficEvent> {
        self.lock().log.snapshot()
    }

    pub fn clear_events(&self) {
        self.lock().log.clear();
    }

    fn rule_snapshot(&self) -> Arc<Vec<Rule>> {
        read_rules(&self.rules)
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_rules(rules: &SharedRuleStore) -> Arc<Vec<Rule>> {
    rules.read().unwrap_or_else(PoisonError::into_inner).snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FixedChance;
    use crate::models::{Protocol, RuleAction, RuleCondition, TrafficStatus};
    use crate::rules::RuleStore;
    use std::net::Ipv4Addr;

    /// Emits the same packet every tick with increasing ids
    struct FixedTraffic {
        next_id: u64,
    }

    impl TrafficSource for FixedTraffic {
        fn next_event(&mut self) -> TrafficEvent {
            self.next_id += 1;
            TrafficEvent {
                id: self.next_id,
                timestamp: "12:00:00".to_string(),
                source_ip: Ipv4Addr::new(192, 168, 1, 100),
                destination_ip: Ipv4Addr::new(10, 0, 0, 5),
                protocol: Protocol::Tcp,
                port: 80,
                status: TrafficStatus::Allowed,
                alert: false,
            }
        }
    }

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            tick_interval_ms: 20,
            ..SimulationConfig::default()
        }
    }

    fn simulator(rules: SharedRuleStore) -> Simulator {
        Simulator::new(rules, &fast_config())
            .with_source(FixedTraffic { next_id: 0 })
            .with_probability(FixedChance(false))
    }

    fn rule(id: i64, name: &str, condition: RuleCondition, action: RuleAction) -> Rule {
        Rule {
            id,
            name: name.to_string(),
            condition,
            action,
        }
    }

    #[test]
    fn test_step_without_rules_allows() {
        let sim = Simulator::new(RuleStore::shared(), &fast_config());

        let event = sim.step();
        assert_eq!(event.status, TrafficStatus::Allowed);
        assert!(!event.alert);
        assert_eq!(sim.events().len(), 1);
    }

    #[test]
    fn test_step_applies_rules() {
        let rules = RuleStore::shared();
        rules.write().unwrap().load(vec![rule(
            1,
            "R1",
            RuleCondition::parse("IP", r#"{"source":"192.168.1.1","dest":"","port":""}"#),
            RuleAction::Block,
        )]);
        let sim = simulator(rules);

        let event = sim.step();
        assert_eq!(event.status.to_string(), "Block (Rule: R1)");
        assert!(event.alert);
    }

    #[test]
    fn test_rule_edits_apply_to_next_tick() {
        let rules = RuleStore::shared();
        let sim = simulator(rules.clone());

        assert!(sim.step().is_allowed());
        rules
            .write()
            .unwrap()
            .add(rule(2, "tcp", RuleCondition::Protocol("TCP".into()), RuleAction::Flag));
        let event = sim.step();
        assert_eq!(event.status.to_string(), "Flag (Rule: tcp)");
        assert!(!event.alert);
    }

    #[test]
    fn test_log_is_bounded() {
        let config = SimulationConfig {
            log_capacity: 5,
            ..fast_config()
        };
        let sim = Simulator::new(RuleStore::shared(), &config).with_source(FixedTraffic { next_id: 0 });

        for _ in 0..12 {
            sim.step();
        }
        let ids: Vec<u64> = sim.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![12, 11, 10, 9, 8]);
    }

    #[test]
    fn test_start_requires_runtime() {
        let sim = simulator(RuleStore::shared());
        assert!(matches!(sim.start(), Err(SimulationError::NoRuntime(_))));
        assert!(!sim.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let sim = simulator(RuleStore::shared());

        assert!(sim.start().unwrap());
        assert!(!sim.start().unwrap());
        assert!(sim.is_running());

        // Ticks at 20, 40, 60, 80 and 100 ms; a second ticker would double this
        time::sleep(Duration::from_millis(110)).await;
        assert!(sim.stop());
        assert_eq!(sim.events().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_period() {
        let sim = simulator(RuleStore::shared());
        sim.start().unwrap();

        time::sleep(Duration::from_millis(19)).await;
        assert!(sim.events().is_empty());
        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(sim.events().len(), 1);
        sim.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_appends() {
        let sim = simulator(RuleStore::shared());
        sim.start().unwrap();
        time::sleep(Duration::from_millis(70)).await;

        assert!(sim.stop());
        assert!(!sim.is_running());
        assert_eq!(sim.events().len(), 3);

        time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sim.events().len(), 3);
        assert!(!sim.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let sim = simulator(RuleStore::shared());

        sim.start().unwrap();
        sim.stop();
        sim.clear_events();

        assert!(sim.start().unwrap());
        time::sleep(Duration::from_millis(70)).await;
        sim.stop();
        assert_eq!(sim.events().len(), 3);
    }

    /// Panics on the first packet, then behaves like `FixedTraffic`
    struct PanicOnce {
        panicked: bool,
        inner: FixedTraffic,
    }

    impl TrafficSource for PanicOnce {
        fn next_event(&mut self) -> TrafficEvent {
            if !self.panicked {
                self.panicked = true;
                panic!("traffic source failed");
            }
            self.inner.next_event()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_ticker_can_be_restarted() {
        let sim = simulator(RuleStore::shared()).with_source(PanicOnce {
            panicked: false,
            inner: FixedTraffic { next_id: 0 },
        });

        assert!(sim.start().unwrap());
        time::sleep(Duration::from_millis(30)).await;
        assert!(!sim.is_running());
        assert!(sim.events().is_empty());

        assert!(sim.start().unwrap());
        assert!(sim.is_running());
        time::sleep(Duration::from_millis(50)).await;
        assert!(sim.stop());
        assert_eq!(sim.events().len(), 2);
    }

    #[test]
    fn test_nan_match_rate_does_not_panic() {
        let rules = RuleStore::shared();
        rules.write().unwrap().load(vec![rule(
            1,
            "sig",
            RuleCondition::Signature("malware".into()),
            RuleAction::Block,
        )]);
        let config = SimulationConfig {
            signature_match_rate: f64::NAN,
            ..fast_config()
        };
        let sim = Simulator::new(rules, &config).with_source(FixedTraffic { next_id: 0 });

        for _ in 0..20 {
            assert!(sim.step().is_allowed());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_sink_receives_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let sim = simulator(RuleStore::shared()).with_event_sink(tx);

        sim.start().unwrap();
        let received = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event within timeout");
        sim.stop();

        let received = received.unwrap();
        assert_eq!(received.source_ip, Ipv4Addr::new(192, 168, 1, 100));
        assert!(sim.events().iter().any(|e| e.id == received.id));
    }

    #[test]
    fn test_full_sink_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let sim = simulator(RuleStore::shared()).with_event_sink(tx);

        for _ in 0..3 {
            sim.step();
        }
        assert_eq!(sim.events().len(), 3);
    }
}
