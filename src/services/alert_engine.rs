use crate::models::{Alert, BaseMetric, Delta, PoolMetric, Severity, ThresholdRule};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Triggers when change <= -threshold.
    Drop,
    /// Triggers when change >= +threshold.
    Spike,
}

impl Direction {
    pub fn triggers(self, change_percent: f64, threshold_percent: f64) -> bool {
        match self {
            Direction::Drop => change_percent <= -threshold_percent,
            Direction::Spike => change_percent >= threshold_percent,
        }
    }
}

/// Ascending (magnitude, label) tiers. Magnitudes below the first tier
/// classify as `Severity::Low`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityTable(Vec<(f64, Severity)>);

impl SeverityTable {
    pub fn new(mut tiers: Vec<(f64, Severity)>) -> Self {
        tiers.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self(tiers)
    }

    pub fn classify(&self, magnitude: f64) -> Severity {
        self.0
            .iter()
            .take_while(|(threshold, _)| magnitude >= *threshold)
            .last()
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Low)
    }
}

#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub base: BaseMetric,
    pub direction: Direction,
    pub severity: SeverityTable,
}

/// Turns deltas into alerts for a caller-supplied rule. Rule types are data:
/// register a new `RuleSpec` to support a new metric name.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    rules: HashMap<String, RuleSpec>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        use Severity::*;

        let mut engine = Self::empty();
        engine.register(
            "tvl_drop",
            RuleSpec {
                base: BaseMetric::Tvl,
                direction: Direction::Drop,
                severity: SeverityTable::new(vec![(20.0, Medium), (50.0, High), (75.0, Critical)]),
            },
        );
        engine.register(
            "tvl_spike",
            RuleSpec {
                base: BaseMetric::Tvl,
                direction: Direction::Spike,
                severity: SeverityTable::new(vec![(50.0, Medium), (100.0, High), (200.0, Critical)]),
            },
        );
        engine.register(
            "apy_spike",
            RuleSpec {
                base: BaseMetric::Apy,
                direction: Direction::Spike,
                severity: SeverityTable::new(vec![(50.0, Low), (100.0, Medium), (200.0, High)]),
            },
        );
        engine.register(
            "apy_drop",
            RuleSpec {
                base: BaseMetric::Apy,
                direction: Direction::Drop,
                severity: SeverityTable::new(vec![(30.0, Medium), (50.0, High), (75.0, Critical)]),
            },
        );
        engine
    }
}

impl AlertEngine {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn register(&mut self, metric: impl Into<String>, spec: RuleSpec) {
        self.rules.insert(metric.into(), spec);
    }

    pub fn rule(&self, metric: &str) -> Option<&RuleSpec> {
        self.rules.get(metric)
    }

    pub fn known_metrics(&self) -> Vec<&str> {
        let mut metrics: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        metrics.sort_unstable();
        metrics
    }

    pub fn evaluate(
        &self,
        current_metrics: &[PoolMetric],
        deltas: &[Delta],
        rule: &ThresholdRule,
    ) -> Vec<Alert> {
        self.evaluate_at(current_metrics, deltas, rule, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        current_metrics: &[PoolMetric],
        deltas: &[Delta],
        rule: &ThresholdRule,
        triggered_at: DateTime<Utc>,
    ) -> Vec<Alert> {
        let Some(spec) = self.rules.get(&rule.metric) else {
            tracing::warn!(metric = %rule.metric, "Unknown rule metric, no alerts evaluated");
            return Vec::new();
        };

        deltas
            .iter()
            .filter(|d| d.metric == spec.base && d.timeframe_minutes == rule.timeframe_minutes)
            .filter(|d| spec.direction.triggers(d.change_percent, rule.threshold_percent))
            .map(|delta| {
                let protocol = current_metrics
                    .iter()
                    .find(|m| m.pool_id == delta.pool_id)
                    .map(|m| m.protocol_id.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                let severity = spec.severity.classify(delta.change_percent.abs());

                tracing::info!(
                    pool_id = %delta.pool_id,
                    rule = %rule.metric,
                    change_percent = format!("{:.2}", delta.change_percent),
                    threshold_percent = rule.threshold_percent,
                    %severity,
                    "Alert triggered"
                );

                Alert {
                    pool_id: delta.pool_id.clone(),
                    protocol,
                    alert_type: rule.metric.clone(),
                    metric: spec.base,
                    threshold_percent: rule.threshold_percent,
                    actual_change_percent: delta.change_percent,
                    previous_value: delta.previous_value,
                    current_value: delta.current_value,
                    triggered_at,
                    severity,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tvl_delta(pool: &str, previous: f64, current: f64, timeframe: u32) -> Delta {
        Delta::between(pool, BaseMetric::Tvl, previous, current, timeframe).unwrap()
    }

    fn rule(metric: &str, threshold: f64, timeframe: u32) -> ThresholdRule {
        ThresholdRule {
            metric: metric.to_string(),
            threshold_percent: threshold,
            timeframe_minutes: timeframe,
        }
    }

    fn metrics() -> Vec<PoolMetric> {
        vec![
            PoolMetric::new("0xaaa", "uniswap-v2", 10.0, 400_000.0),
            PoolMetric::new("0xbbb", "curve", 4.0, 2_000_000.0),
        ]
    }

    #[test]
    fn tvl_drop_of_sixty_percent_is_high() {
        let engine = AlertEngine::default();
        let deltas = vec![tvl_delta("0xaaa", 1_000_000.0, 400_000.0, 60)];

        let alerts = engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", 20.0, 60));

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.actual_change_percent, -60.0);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.pool_id, "0xaaa");
        assert_eq!(alert.protocol, "uniswap-v2");
        assert_eq!(alert.metric, BaseMetric::Tvl);
        assert_eq!(alert.alert_type, "tvl_drop");
        assert_eq!(alert.previous_value, 1_000_000.0);
        assert_eq!(alert.current_value, 400_000.0);
    }

    #[test]
    fn tvl_drop_severity_tiers() {
        let engine = AlertEngine::default();
        let cases = [(20.0, Some(Severity::Critical)), (40.0, Some(Severity::High)), (75.0, Some(Severity::Medium)), (90.0, None)];

        for (current, expected) in cases {
            let deltas = vec![tvl_delta("0xaaa", 100.0, current, 60)];
            let alerts = engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", 20.0, 60));
            assert_eq!(alerts.first().map(|a| a.severity), expected, "current = {current}");
        }
    }

    #[test]
    fn alerts_resolve_the_owning_pool() {
        let engine = AlertEngine::default();
        let deltas = vec![
            tvl_delta("0xaaa", 100.0, 95.0, 15),
            tvl_delta("0xbbb", 100.0, 10.0, 15),
        ];

        let alerts = engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", 20.0, 15));

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].pool_id, "0xbbb");
        assert_eq!(alerts[0].protocol, "curve");
    }

    #[test]
    fn unknown_pool_reports_unknown_protocol() {
        let engine = AlertEngine::default();
        let deltas = vec![tvl_delta("0xccc", 100.0, 10.0, 5)];

        let alerts = engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", 20.0, 5));
        assert_eq!(alerts[0].protocol, "unknown");
    }

    #[test]
    fn timeframe_and_metric_must_match() {
        let engine = AlertEngine::default();
        let deltas = vec![
            tvl_delta("0xaaa", 100.0, 10.0, 5),
            Delta::between("0xaaa", BaseMetric::Apy, 10.0, 1.0, 60).unwrap(),
        ];

        assert!(engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", 20.0, 60)).is_empty());
        assert!(engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", 20.0, 30)).is_empty());
        assert_eq!(engine.evaluate(&metrics(), &deltas, &rule("apy_drop", 20.0, 60)).len(), 1);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let engine = AlertEngine::default();
        let drop = vec![tvl_delta("0xaaa", 100.0, 80.0, 60)];
        let spike = vec![tvl_delta("0xaaa", 100.0, 150.0, 60)];

        assert_eq!(engine.evaluate(&metrics(), &drop, &rule("tvl_drop", 20.0, 60)).len(), 1);
        assert_eq!(engine.evaluate(&metrics(), &spike, &rule("tvl_spike", 50.0, 60)).len(), 1);
        assert!(engine.evaluate(&metrics(), &spike, &rule("tvl_drop", 20.0, 60)).is_empty());
    }

    #[test]
    fn apy_spike_uses_low_tier() {
        let engine = AlertEngine::default();
        let deltas = vec![
            Delta::between("0xaaa", BaseMetric::Apy, 10.0, 14.0, 5).unwrap(),
            Delta::between("0xaaa", BaseMetric::Apy, 10.0, 16.0, 5).unwrap(),
            Delta::between("0xaaa", BaseMetric::Apy, 10.0, 35.0, 5).unwrap(),
        ];

        let alerts = engine.evaluate(&metrics(), &deltas, &rule("apy_spike", 30.0, 5));
        let severities: Vec<_> = alerts.iter().map(|a| a.severity).collect();
        assert_eq!(severities, vec![Severity::Low, Severity::Low, Severity::High]);
    }

    #[test]
    fn unknown_rule_metric_yields_nothing() {
        let engine = AlertEngine::default();
        let deltas = vec![tvl_delta("0xaaa", 100.0, 10.0, 60)];
        assert!(engine.evaluate(&metrics(), &deltas, &rule("fees_spike", 1.0, 60)).is_empty());
    }

    #[test]
    fn raising_threshold_never_adds_alerts() {
        let engine = AlertEngine::default();
        let deltas: Vec<Delta> = [95.0, 80.0, 60.0, 30.0, 5.0]
            .iter()
            .map(|current| tvl_delta("0xaaa", 100.0, *current, 60))
            .collect();

        let mut previous = usize::MAX;
        for threshold in [1.0, 10.0, 20.0, 40.0, 70.0, 99.0] {
            let count = engine.evaluate(&metrics(), &deltas, &rule("tvl_drop", threshold, 60)).len();
            assert!(count <= previous);
            previous = count;
        }
    }

    #[test]
    fn custom_rules_are_data() {
        let mut engine = AlertEngine::empty();
        engine.register(
            "tvl_move",
            RuleSpec {
                base: BaseMetric::Tvl,
                direction: Direction::Spike,
                severity: SeverityTable::new(vec![(10.0, Severity::Critical)]),
            },
        );

        let deltas = vec![tvl_delta("0xaaa", 100.0, 115.0, 5)];
        let alerts = engine.evaluate(&metrics(), &deltas, &rule("tvl_move", 5.0, 5));
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(engine.known_metrics(), vec!["tvl_move"]);
    }

    #[test]
    fn severity_table_sorts_tiers() {
        let table = SeverityTable::new(vec![(75.0, Severity::Critical), (20.0, Severity::Medium)]);
        assert_eq!(table.classify(10.0), Severity::Low);
        assert_eq!(table.classify(20.0), Severity::Medium);
        assert_eq!(table.classify(80.0), Severity::Critical);
    }
}
