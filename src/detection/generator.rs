//! Synthetic traffic generation
//!
//! Every field is drawn independently and uniformly: source addresses
//! from `192.168.1.0/24`, destinations from `10.0.0.0/24`, one of three
//! protocols and a port below 65535.

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;

use crate::models::{Protocol, TrafficEvent, TrafficStatus};

/// Source of traffic events for the simulator
pub trait TrafficSource: Send {
    fn next_event(&mut self) -> TrafficEvent;
}

impl<S: TrafficSource + ?Sized> TrafficSource for Box<S> {
    fn next_event(&mut self) -> TrafficEvent {
        (**self).next_event()
    }
}

/// Uniform random traffic generator
pub struct TrafficGenerator<R: Rng = StdRng> {
    rng: R,
    last_id: u64,
}

impl TrafficGenerator<StdRng> {
    /// Create a generator seeded from system entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a reproducible generator
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for TrafficGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> TrafficGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        TrafficGenerator { rng, last_id: 0 }
    }

    /// Produce one unevaluated event
    pub fn generate(&mut self) -> TrafficEvent {
        let now = Local::now();
        let id = self.next_id(now.timestamp_millis().max(0) as u64);

        TrafficEvent {
            id,
            timestamp: now.format("%H:%M:%S").to_string(),
            source_ip: Ipv4Addr::new(192, 168, 1, self.rng.gen_range(0..255)),
            destination_ip: Ipv4Addr::new(10, 0, 0, self.rng.gen_range(0..255)),
            protocol: Protocol::ALL[self.rng.gen_range(0..Protocol::ALL.len())],
            port: self.rng.gen_range(0..65535),
            status: TrafficStatus::Allowed,
            alert: false,
        }
    }

    /// Millisecond clock, bumped when two events land in the same millisecond
    fn next_id(&mut self, now_millis: u64) -> u64 {
        self.last_id = now_millis.max(self.last_id + 1);
        self.last_id
    }
}

impl<R: Rng + Send> TrafficSource for TrafficGenerator<R> {
    fn next_event(&mut self) -> TrafficEvent {
        self.generate()
    }
}
