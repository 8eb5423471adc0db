//! Relationship health scoring (pure math plus one snapshot writer).
//!
//! Components come from the engagement log over a look-back window; the
//! overall score is their weighted mean. One assessment is kept per
//! stakeholder per day, and momentum compares against the latest snapshot
//! from an earlier day.

use chrono::{Duration, NaiveDate};

use crate::db::{DbEngagement, DbError, DbHealthMetric, DbStakeholder, NewHealthMetric, StrategicDb};
use crate::entity::{MeetingFrequency, Momentum, RiskLevel};
use crate::types::{HealthWeights, ScoringConfig};

/// Tolerance for comparing score deltas against thresholds.
const EPSILON: f64 = 1e-9;

/// Cadence assumed for stakeholders without an explicit meeting frequency.
const DEFAULT_FREQUENCY: MeetingFrequency = MeetingFrequency::Monthly;

/// The four 0..=1 component scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthComponents {
    pub engagement_frequency: f64,
    pub engagement_quality: f64,
    pub responsiveness: f64,
    pub strategic_alignment: f64,
}

impl HealthComponents {
    pub fn zero() -> Self {
        Self {
            engagement_frequency: 0.0,
            engagement_quality: 0.0,
            responsiveness: 0.0,
            strategic_alignment: 0.0,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Score one stakeholder's engagements inside the window ending `today`.
///
/// - frequency: engagements held vs. engagements expected at the cadence
/// - quality: mean `engagement_quality` (0.5 when never rated)
/// - responsiveness: share of follow-ups due by today that were completed
///   (1.0 when none were due)
/// - alignment: mean engagement `strategic_value` weight (0.5 when unset)
///
/// No engagements at all scores zero across the board.
pub fn component_scores(
    engagements: &[DbEngagement],
    frequency: Option<MeetingFrequency>,
    window_days: i64,
    today: NaiveDate,
) -> HealthComponents {
    if engagements.is_empty() {
        return HealthComponents::zero();
    }
    let cadence = frequency.unwrap_or(DEFAULT_FREQUENCY).days();
    let expected = (window_days as f64 / cadence as f64).max(1.0);
    let engagement_frequency = (engagements.len() as f64 / expected).min(1.0);

    let engagement_quality = mean(engagements.iter().filter_map(|e| e.engagement_quality)).unwrap_or(0.5);

    let due: Vec<&DbEngagement> = engagements
        .iter()
        .filter(|e| e.follow_up_required && e.follow_up_date.map(|d| d <= today).unwrap_or(false))
        .collect();
    let responsiveness = if due.is_empty() {
        1.0
    } else {
        due.iter().filter(|e| e.follow_up_completed).count() as f64 / due.len() as f64
    };

    let strategic_alignment =
        mean(engagements.iter().filter_map(|e| e.strategic_value).map(|v| v.weight())).unwrap_or(0.5);

    HealthComponents {
        engagement_frequency,
        engagement_quality,
        responsiveness,
        strategic_alignment,
    }
}

/// Weighted mean of the components, clamped to 0..=1.
pub fn overall_score(components: &HealthComponents, weights: &HealthWeights) -> f64 {
    let total = weights.engagement_frequency
        + weights.engagement_quality
        + weights.responsiveness
        + weights.strategic_alignment;
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = components.engagement_frequency * weights.engagement_frequency
        + components.engagement_quality * weights.engagement_quality
        + components.responsiveness * weights.responsiveness
        + components.strategic_alignment * weights.strategic_alignment;
    (weighted / total).clamp(0.0, 1.0)
}

/// Trend against the prior snapshot. A score under the at-risk threshold
/// is `at_risk` whatever the trend.
pub fn momentum(current: f64, prior: Option<f64>, scoring: &ScoringConfig) -> Momentum {
    if current < scoring.at_risk_threshold {
        return Momentum::AtRisk;
    }
    let Some(prior) = prior else {
        return Momentum::Stable;
    };
    let delta = current - prior;
    if delta >= scoring.momentum_threshold - EPSILON {
        Momentum::Strengthening
    } else if delta <= -scoring.momentum_threshold + EPSILON {
        Momentum::Weakening
    } else {
        Momentum::Stable
    }
}

pub fn risk_level(score: f64) -> RiskLevel {
    if score >= 0.7 {
        RiskLevel::Low
    } else if score >= 0.5 {
        RiskLevel::Medium
    } else if score >= 0.3 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

/// Build (but do not store) today's assessment for one stakeholder.
pub fn assess_stakeholder(
    db: &StrategicDb,
    stakeholder: &DbStakeholder,
    today: NaiveDate,
    scoring: &ScoringConfig,
) -> Result<NewHealthMetric, DbError> {
    let since = today - Duration::days(scoring.assessment_window_days);
    let engagements = db.get_engagements_since(&stakeholder.stakeholder_key, since)?;
    let components = component_scores(
        &engagements,
        stakeholder.optimal_meeting_frequency,
        scoring.assessment_window_days,
        today,
    );
    let overall = overall_score(&components, &scoring.health_weights);
    let prior = db
        .get_health_metric_before(&stakeholder.stakeholder_key, today)?
        .map(|m| m.overall_health_score);

    Ok(NewHealthMetric {
        stakeholder_key: stakeholder.stakeholder_key.clone(),
        assessment_date: today,
        engagement_frequency: components.engagement_frequency,
        engagement_quality: components.engagement_quality,
        responsiveness: components.responsiveness,
        strategic_alignment: components.strategic_alignment,
        overall_health_score: overall,
        relationship_momentum: momentum(overall, prior, scoring),
        risk_level: risk_level(overall),
    })
}

/// Append today's snapshot for every active stakeholder not yet assessed
/// today. Returns only the rows written by this call.
pub fn record_health_snapshots(
    db: &StrategicDb,
    today: NaiveDate,
    scoring: &ScoringConfig,
) -> Result<Vec<DbHealthMetric>, DbError> {
    db.with_transaction(|tx| {
        let mut recorded = Vec::new();
        for stakeholder in tx.get_stakeholders(true)? {
            if tx
                .get_health_metric_on(&stakeholder.stakeholder_key, today)?
                .is_some()
            {
                continue;
            }
            let metric = assess_stakeholder(tx, &stakeholder, today, scoring)?;
            recorded.push(tx.insert_health_metric(&metric)?);
        }
        Ok(recorded)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::NewEngagement;
    use crate::entity::StrategicValue;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn test_identical_scores_are_stable() {
        let scoring = ScoringConfig::default();
        assert_eq!(momentum(0.62, Some(0.62), &scoring), Momentum::Stable);
        assert_eq!(momentum(0.62, None, &scoring), Momentum::Stable);
    }

    #[test]
    fn test_momentum_thresholds() {
        let scoring = ScoringConfig::default();
        assert_eq!(momentum(0.65, Some(0.60), &scoring), Momentum::Strengthening);
        assert_eq!(momentum(0.55, Some(0.60), &scoring), Momentum::Weakening);
        assert_eq!(momentum(0.62, Some(0.60), &scoring), Momentum::Stable);
        // At-risk wins over an improving trend
        assert_eq!(momentum(0.29, Some(0.10), &scoring), Momentum::AtRisk);
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(risk_level(0.9), RiskLevel::Low);
        assert_eq!(risk_level(0.5), RiskLevel::Medium);
        assert_eq!(risk_level(0.3), RiskLevel::High);
        assert_eq!(risk_level(0.1), RiskLevel::Critical);
    }

    #[test]
    fn test_default_weights_are_equal() {
        let components = HealthComponents {
            engagement_frequency: 1.0,
            engagement_quality: 0.5,
            responsiveness: 0.0,
            strategic_alignment: 0.5,
        };
        let score = overall_score(&components, &HealthWeights::default());
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_components_from_engagements() {
        let db = test_db();
        let mut first = NewEngagement::on("raghu", "1on1", day(1));
        first.engagement_quality = Some(0.8);
        first.strategic_value = Some(StrategicValue::High);
        first.follow_up_required = true;
        first.follow_up_date = Some(day(5));
        db.insert_engagement(&first).unwrap();
        let mut second = NewEngagement::on("raghu", "email", day(10));
        second.engagement_quality = Some(0.6);
        db.insert_engagement(&second).unwrap();

        let engagements = db.get_engagements_since("raghu", day(1)).unwrap();
        let c = component_scores(&engagements, Some(MeetingFrequency::Monthly), 90, day(19));
        assert!((c.engagement_frequency - 2.0 / 3.0).abs() < 1e-9);
        assert!((c.engagement_quality - 0.7).abs() < 1e-9);
        assert_eq!(c.responsiveness, 0.0);
        assert!((c.strategic_alignment - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_snapshots_with_same_history_are_stable() {
        let db = test_db();
        let mut e = NewEngagement::on("ana", "1on1", day(15));
        e.engagement_quality = Some(0.9);
        e.strategic_value = Some(StrategicValue::High);
        db.insert_engagement(&e).unwrap();
        let scoring = ScoringConfig::default();

        let first = record_health_snapshots(&db, day(19), &scoring).unwrap();
        let second = record_health_snapshots(&db, day(20), &scoring).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second[0].overall_health_score, first[0].overall_health_score);
        assert_eq!(second[0].relationship_momentum, Momentum::Stable);
        assert_eq!(db.get_recent_health_metrics("ana", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_repeated_passes_keep_one_snapshot_per_day() {
        let db = test_db();
        db.insert_engagement(&NewEngagement::on("ana", "1on1", day(15))).unwrap();
        let scoring = ScoringConfig::default();

        assert_eq!(record_health_snapshots(&db, day(19), &scoring).unwrap().len(), 1);
        for _ in 0..3 {
            assert!(record_health_snapshots(&db, day(19), &scoring).unwrap().is_empty());
        }
        assert_eq!(db.get_recent_health_metrics("ana", 10).unwrap().len(), 1);

        // A new engagement shows up in the next day's assessment
        db.insert_engagement(&NewEngagement::on("ana", "email", day(19))).unwrap();
        let next = record_health_snapshots(&db, day(20), &scoring).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(db.get_recent_health_metrics("ana", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_no_engagements_is_at_risk() {
        let db = test_db();
        db.ensure_stakeholder("ghost", "Ghost").unwrap();
        let snapshots = record_health_snapshots(&db, day(19), &ScoringConfig::default()).unwrap();
        assert_eq!(snapshots[0].relationship_momentum, Momentum::AtRisk);
        assert_eq!(snapshots[0].risk_level, RiskLevel::Critical);
    }
}
