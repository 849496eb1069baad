//! First-match-wins rule evaluation
//!
//! Rules are scanned in list order and the first one whose condition holds
//! decides the outcome. Address conditions are substring containment
//! tests rather than CIDR checks.
//!
//! `Signature` rules do not inspect traffic at all: each evaluation fires
//! with a fixed probability drawn from a [`ProbabilitySource`]. Replaying
//! the same event can therefore give different outcomes. Tests should
//! inject [`FixedChance`] instead of relying on real randomness.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{
    IpCondition, Rule, RuleAction, RuleCondition, RuleId, TrafficEvent, TrafficStatus,
};

/// Default probability that a `Signature` rule fires
pub const DEFAULT_SIGNATURE_MATCH_RATE: f64 = 0.2;

/// Yields `true` with the requested probability
pub trait ProbabilitySource: Send {
    fn chance(&mut self, rate: f64) -> bool;
}

impl<P: ProbabilitySource + ?Sized> ProbabilitySource for Box<P> {
    fn chance(&mut self, rate: f64) -> bool {
        (**self).chance(rate)
    }
}

/// Probability source backed by a pseudo-random generator
pub struct RandomChance<R: Rng = StdRng> {
    rng: R,
}

impl RandomChance<StdRng> {
    pub fn new() -> Self {
        RandomChance {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        RandomChance {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomChance<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng + Send> ProbabilitySource for RandomChance<R> {
    fn chance(&mut self, rate: f64) -> bool {
        self.rng.gen_bool(normalize_rate(rate))
    }
}

/// Clamp a probability into `0..=1`; NaN counts as never
pub fn normalize_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Deterministic stub: always or never fires
#[derive(Debug, Clone, Copy)]
pub struct FixedChance(pub bool);

impl ProbabilitySource for FixedChance {
    fn chance(&mut self, _rate: f64) -> bool {
        self.0
    }
}

/// The rule that decided an event's outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: RuleAction,
}

impl MatchResult {
    fn from_rule(rule: &Rule) -> Self {
        MatchResult {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            action: rule.action.clone(),
        }
    }

    pub fn status(&self) -> TrafficStatus {
        TrafficStatus::Matched {
            action: self.action.to_string(),
            rule_name: self.rule_name.clone(),
        }
    }

    pub fn is_alert(&self) -> bool {
        self.action.is_alerting()
    }
}

/// Scans a rule list against traffic events
pub struct RuleEvaluator<P: ProbabilitySource = RandomChance> {
    chance: P,
    signature_rate: f64,
}

impl RuleEvaluator<RandomChance> {
    pub fn new() -> Self {
        Self::with_source(RandomChance::new(), DEFAULT_SIGNATURE_MATCH_RATE)
    }
}

impl Default for RuleEvaluator<RandomChance> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProbabilitySource> RuleEvaluator<P> {
    pub fn with_source(chance: P, signature_rate: f64) -> Self {
        let normalized = normalize_rate(signature_rate);
        if normalized != signature_rate {
            log::warn!(
                "Signature match rate {} out of range, using {}",
                signature_rate,
                normalized
            );
        }
        RuleEvaluator {
            chance,
            signature_rate: normalized,
        }
    }

    pub fn signature_rate(&self) -> f64 {
        self.signature_rate
    }

    /// Return the first rule in `rules` that matches `event`, if any
    pub fn evaluate(&mut self, event: &TrafficEvent, rules: &[Rule]) -> Option<MatchResult> {
        let source = event.source_ip.to_string();
        let destination = event.destination_ip.to_string();
        let port = event.port.to_string();
        let fields = EventFields {
            source: &source,
            destination: &destination,
            protocol: event.protocol.as_str(),
            port: &port,
        };

        rules
            .iter()
            .find(|rule| self.matches(&rule.condition, &fields))
            .map(MatchResult::from_rule)
    }

    /// Evaluate and write the outcome into the event
    pub fn annotate(&mut self, event: &mut TrafficEvent, rules: &[Rule]) -> Option<MatchResult> {
        let result = self.evaluate(event, rules);
        match &result {
            Some(matched) => {
                event.status = matched.status();
                event.alert = matched.is_alert();
            }
            None => {
                event.status = TrafficStatus::Allowed;
                event.alert = false;
            }
        }
        result
    }

    fn matches(&mut self, condition: &RuleCondition, fields: &EventFields<'_>) -> bool {
        match condition {
            RuleCondition::Ip(ip) => ip_matches(ip, fields),
            RuleCondition::LegacyIp(fragment) => {
                fields.source.contains(fragment.as_str())
                    || fields.destination.contains(fragment.as_str())
            }
            RuleCondition::Protocol(protocol) => fields.protocol == protocol.as_str(),
            RuleCondition::Port(port) => fields.port == port.as_str(),
            RuleCondition::Signature(_) => self.chance.chance(self.signature_rate),
            RuleCondition::Unknown { .. } => false,
        }
    }
}

/// String views of the event fields rules compare against
struct EventFields<'a> {
    source: &'a str,
    destination: &'a str,
    protocol: &'a str,
    port: &'a str,
}

fn ip_matches(condition: &IpCondition, fields: &EventFields<'_>) -> bool {
    let source_ok = condition.source().map_or(true, |s| fields.source.contains(s));
    let dest_ok = condition.dest().map_or(true, |d| fields.destination.contains(d));
    let port_ok = condition.port().map_or(true, |p| fields.port == p);
    source_ok && dest_ok && port_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;
    use std::net::Ipv4Addr;

    fn event(src: [u8; 4], dst: [u8; 4], protocol: Protocol, port: u16) -> TrafficEvent {
        TrafficEvent {
            id: 1,
            timestamp: "00:00:00".to_string(),
            source_ip: Ipv4Addr::from(src),
            destination_ip: Ipv4Addr::from(dst),
            protocol,
            port,
            status: TrafficStatus::Allowed,
            alert: false,
        }
    }

    fn default_event() -> TrafficEvent {
        event([192, 168, 1, 100], [10, 0, 0, 5], Protocol::Tcp, 80)
    }

    fn rule(id: RuleId, name: &str, kind: &str, condition: &str, action: &str) -> Rule {
        Rule::from_stored(id, name, kind, condition, action)
    }

    fn never() -> RuleEvaluator<FixedChance> {
        RuleEvaluator::with_source(FixedChance(false), DEFAULT_SIGNATURE_MATCH_RATE)
    }

    fn always() -> RuleEvaluator<FixedChance> {
        RuleEvaluator::with_source(FixedChance(true), DEFAULT_SIGNATURE_MATCH_RATE)
    }

    #[test]
    fn test_empty_rules_allow() {
        let mut evaluator = never();
        let mut e = default_event();

        assert!(evaluator.annotate(&mut e, &[]).is_none());
        assert_eq!(e.status, TrafficStatus::Allowed);
        assert!(!e.alert);
    }

    #[test]
    fn test_block_rule_end_to_end() {
        let rules = vec![rule(
            1,
            "R1",
            "IP",
            r#"{"source":"192.168.1.1","dest":"","port":""}"#,
            "Block",
        )];
        let mut e = default_event();

        let result = never().annotate(&mut e, &rules).unwrap();
        assert_eq!(result.rule_id, 1);
        assert_eq!(e.status.to_string(), "Block (Rule: R1)");
        assert!(e.alert);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            rule(1, "first", "IP", "{}", "Flag"),
            rule(2, "second", "Protocol", "TCP", "Block"),
        ];
        let mut e = default_event();

        let result = never().annotate(&mut e, &rules).unwrap();
        assert_eq!(result.rule_name, "first");
        assert_eq!(e.status.to_string(), "Flag (Rule: first)");
        assert!(!e.alert);
    }

    #[test]
    fn test_later_rules_not_consulted() {
        // A signature rule after a guaranteed match must never draw
        struct Panicking;
        impl ProbabilitySource for Panicking {
            fn chance(&mut self, _rate: f64) -> bool {
                panic!("signature rule consulted after a match");
            }
        }

        let rules = vec![
            rule(1, "all", "IP", "{}", "Log"),
            rule(2, "sig", "Signature", "anything", "Reject"),
        ];
        let mut evaluator = RuleEvaluator::with_source(Panicking, 0.2);
        let result = evaluator.evaluate(&default_event(), &rules).unwrap();
        assert_eq!(result.rule_id, 1);
    }

    #[test]
    fn test_source_containment_ignores_dest_and_port() {
        let rules = vec![rule(1, "src", "IP", r#"{"source":"192.168.1.5"}"#, "Flag")];
        let mut evaluator = never();

        for (dst, port) in [([10, 0, 0, 1], 22), ([10, 0, 0, 200], 8080)] {
            let e = event([192, 168, 1, 5], dst, Protocol::Udp, port);
            assert!(evaluator.evaluate(&e, &rules).is_some());
        }
        // Containment, not equality
        let e = event([192, 168, 1, 55], [10, 0, 0, 1], Protocol::Udp, 1);
        assert!(evaluator.evaluate(&e, &rules).is_some());

        let e = event([192, 168, 1, 4], [10, 0, 0, 1], Protocol::Udp, 1);
        assert!(evaluator.evaluate(&e, &rules).is_none());
    }

    #[test]
    fn test_wildcard_ip_rule_matches_everything() {
        let rules = vec![rule(1, "any", "IP", "{}", "Log")];
        let mut evaluator = never();
        let mut generator = crate::detection::TrafficGenerator::seeded(3);

        for _ in 0..50 {
            assert!(evaluator.evaluate(&generator.generate(), &rules).is_some());
        }
    }

    #[test]
    fn test_all_ip_subconditions_required() {
        let rules = vec![rule(
            1,
            "web",
            "IP",
            r#"{"source":"192.168.1","dest":"10.0.0.5","port":"443"}"#,
            "Reject",
        )];
        let mut evaluator = never();

        assert!(evaluator.evaluate(&default_event(), &rules).is_none());
        let e = event([192, 168, 1, 100], [10, 0, 0, 5], Protocol::Tcp, 443);
        let result = evaluator.evaluate(&e, &rules).unwrap();
        assert!(result.is_alert());
    }

    #[test]
    fn test_protocol_rule_exact_match() {
        let rules = vec![rule(1, "tcp", "Protocol", "TCP", "Flag")];
        let mut evaluator = never();

        for protocol in Protocol::ALL {
            let e = event([192, 168, 1, 1], [10, 0, 0, 1], protocol, 1);
            assert_eq!(evaluator.evaluate(&e, &rules).is_some(), protocol == Protocol::Tcp);
        }

        let lowercase = vec![rule(1, "tcp", "Protocol", "tcp", "Flag")];
        assert!(evaluator.evaluate(&default_event(), &lowercase).is_none());
    }

    #[test]
    fn test_port_rule_exact_match() {
        let rules = vec![rule(1, "http", "Port", "80", "Block")];
        let mut evaluator = never();

        assert!(evaluator.evaluate(&default_event(), &rules).is_some());
        let e = event([192, 168, 1, 1], [10, 0, 0, 1], Protocol::Tcp, 8080);
        assert!(evaluator.evaluate(&e, &rules).is_none());
    }

    #[test]
    fn test_legacy_condition_substring() {
        let rules = vec![rule(1, "legacy", "IP", "10.0.0", "Flag")];
        let mut evaluator = never();
        let mut generator = crate::detection::TrafficGenerator::seeded(11);

        for _ in 0..20 {
            assert!(evaluator.evaluate(&generator.generate(), &rules).is_some());
        }

        let other = vec![rule(1, "legacy", "IP", "172.16", "Flag")];
        assert!(evaluator.evaluate(&default_event(), &other).is_none());
    }

    #[test]
    fn test_signature_uses_probability_source() {
        let rules = vec![rule(1, "sig", "Signature", "malware", "Reject")];

        assert!(never().evaluate(&default_event(), &rules).is_none());
        let result = always().evaluate(&default_event(), &rules).unwrap();
        assert!(result.is_alert());
    }

    #[test]
    fn test_signature_rate_is_passed_through() {
        struct Recording(Vec<f64>);
        impl ProbabilitySource for Recording {
            fn chance(&mut self, rate: f64) -> bool {
                self.0.push(rate);
                false
            }
        }

        let rules = vec![rule(1, "sig", "Signature", "", "Flag")];
        let mut evaluator = RuleEvaluator::with_source(Recording(Vec::new()), 0.35);
        evaluator.evaluate(&default_event(), &rules);
        assert_eq!(evaluator.chance.0, vec![0.35]);
    }

    #[test]
    fn test_random_signature_rate_roughly_holds() {
        let rules = vec![rule(1, "sig", "Signature", "", "Flag")];
        let mut evaluator = RuleEvaluator::with_source(RandomChance::seeded(5), 0.2);

        let hits = (0..5000)
            .filter(|_| evaluator.evaluate(&default_event(), &rules).is_some())
            .count();
        assert!((800..1200).contains(&hits), "hits = {}", hits);
    }

    #[test]
    fn test_invalid_signature_rate_is_normalized() {
        let rules = vec![rule(1, "sig", "Signature", "", "Block")];

        let mut evaluator = RuleEvaluator::with_source(RandomChance::seeded(9), f64::NAN);
        assert_eq!(evaluator.signature_rate(), 0.0);
        assert!((0..100).all(|_| evaluator.evaluate(&default_event(), &rules).is_none()));

        let mut evaluator = RuleEvaluator::with_source(RandomChance::seeded(9), 7.5);
        assert_eq!(evaluator.signature_rate(), 1.0);
        assert!(evaluator.evaluate(&default_event(), &rules).is_some());

        assert_eq!(normalize_rate(-0.4), 0.0);
        assert_eq!(normalize_rate(f64::INFINITY), 1.0);
        assert!(!RandomChance::seeded(1).chance(f64::NAN));
    }

    #[test]
    fn test_unknown_kind_is_inert() {
        let rules = vec![
            rule(1, "geo", "Geo", "192.168", "Block"),
            rule(2, "fallback", "Port", "80", "Allow"),
        ];
        let result = always().evaluate(&default_event(), &rules).unwrap();
        assert_eq!(result.rule_name, "fallback");
        assert!(!result.is_alert());
    }

    #[test]
    fn test_custom_action_is_non_alerting() {
        let rules = vec![rule(1, "q", "Protocol", "TCP", "Quarantine")];
        let mut e = default_event();
        never().annotate(&mut e, &rules);
        assert_eq!(e.status.to_string(), "Quarantine (Rule: q)");
        assert!(!e.alert);
    }
}
