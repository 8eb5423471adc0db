//! Engagement recommendation rules.
//!
//! Two triggers: a stakeholder overdue for contact at their preferred
//! cadence, and two consecutive weakening health snapshots. Each trigger
//! is upserted, so re-running a pass refreshes the single pending row
//! per (stakeholder, type) instead of stacking new ones. A type the user
//! has accepted or scheduled stays quiet, and a dismissal silences it for
//! one recommendation lifetime.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::db::{DbError, DbStakeholder, RecommendationDraft, StrategicDb, UpsertOutcome};
use crate::entity::{Momentum, RecommendationType, UrgencyLevel};
use crate::types::ScoringConfig;

/// Corroborating signals observed for one stakeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub overdue_interval: bool,
    pub declining_momentum: bool,
    pub open_high_priority_task: bool,
}

impl Signals {
    fn count(&self) -> u32 {
        [self.overdue_interval, self.declining_momentum, self.open_high_priority_task]
            .iter()
            .filter(|s| **s)
            .count() as u32
    }
}

/// 0.5 base plus one step per signal, capped.
pub fn confidence(signals: &Signals, scoring: &ScoringConfig) -> f64 {
    let raw = scoring.base_confidence + scoring.confidence_step * signals.count() as f64;
    raw.min(scoring.confidence_cap).clamp(0.0, 1.0)
}

/// Urgency for an overdue check-in, by how many intervals have elapsed.
pub fn overdue_urgency(days_since: i64, interval_days: i64) -> UrgencyLevel {
    let ratio = days_since as f64 / interval_days.max(1) as f64;
    if ratio >= 3.0 {
        UrgencyLevel::Critical
    } else if ratio >= 2.0 {
        UrgencyLevel::High
    } else {
        UrgencyLevel::Medium
    }
}

/// Counts from one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GenerationSummary {
    pub inserted: usize,
    pub refreshed: usize,
    /// Drafts skipped because the user already acted on that type.
    pub held: usize,
}

struct StakeholderState {
    days_since_contact: Option<(i64, i64)>,
    signals: Signals,
    weakening_twice: bool,
}

fn observe(
    db: &StrategicDb,
    stakeholder: &DbStakeholder,
    today: NaiveDate,
) -> Result<StakeholderState, DbError> {
    let key = &stakeholder.stakeholder_key;

    // Only stakeholders with a chosen cadence can be overdue
    let days_since_contact = match stakeholder.optimal_meeting_frequency {
        Some(freq) => {
            let last = db
                .get_last_engagement_date(key)?
                .unwrap_or_else(|| stakeholder.created_at.date_naive());
            let days = (today - last).num_days();
            (days > freq.days()).then_some((days, freq.days()))
        }
        None => None,
    };

    let recent = db.get_recent_health_metrics(key, 2)?;
    let declining_momentum = recent
        .first()
        .map(|m| matches!(m.relationship_momentum, Momentum::Weakening | Momentum::AtRisk))
        .unwrap_or(false);
    let weakening_twice = recent.len() == 2
        && recent.iter().all(|m| m.relationship_momentum == Momentum::Weakening);

    let open_high_priority_task = db
        .get_open_tasks_for_stakeholder(key)?
        .iter()
        .any(|t| t.priority.is_high_or_above());

    Ok(StakeholderState {
        days_since_contact,
        signals: Signals {
            overdue_interval: days_since_contact.is_some(),
            declining_momentum,
            open_high_priority_task,
        },
        weakening_twice,
    })
}

/// Drafts for one stakeholder; empty when no trigger fired.
pub fn drafts_for(
    db: &StrategicDb,
    stakeholder: &DbStakeholder,
    today: NaiveDate,
    now: DateTime<Utc>,
    scoring: &ScoringConfig,
) -> Result<Vec<RecommendationDraft>, DbError> {
    let state = observe(db, stakeholder, today)?;
    let confidence_score = confidence(&state.signals, scoring);
    let expires_at = now + Duration::days(scoring.recommendation_ttl_days);
    let mut drafts = Vec::new();

    if let Some((days, interval)) = state.days_since_contact {
        drafts.push(RecommendationDraft {
            stakeholder_key: stakeholder.stakeholder_key.clone(),
            recommendation_type: RecommendationType::OverdueCheckIn,
            urgency_level: overdue_urgency(days, interval),
            confidence_score,
            trigger_reason: format!(
                "No engagement in {} days (expected every {} days)",
                days, interval
            ),
            expires_at,
        });
    }
    if state.weakening_twice {
        drafts.push(RecommendationDraft {
            stakeholder_key: stakeholder.stakeholder_key.clone(),
            recommendation_type: RecommendationType::RelationshipMaintenance,
            urgency_level: UrgencyLevel::High,
            confidence_score,
            trigger_reason: "Relationship health weakened in two consecutive assessments".into(),
            expires_at,
        });
    }
    Ok(drafts)
}

/// Evaluate every active stakeholder and upsert what fired.
pub fn generate_recommendations(
    db: &StrategicDb,
    today: NaiveDate,
    now: DateTime<Utc>,
    scoring: &ScoringConfig,
) -> Result<GenerationSummary, DbError> {
    let mut summary = GenerationSummary::default();
    let dismissed_after = now - Duration::days(scoring.recommendation_ttl_days);
    for stakeholder in db.get_stakeholders(true)? {
        for draft in drafts_for(db, &stakeholder, today, now, scoring)? {
            if db.has_recommendation_hold(
                &draft.stakeholder_key,
                draft.recommendation_type,
                dismissed_after,
            )? {
                summary.held += 1;
                continue;
            }
            let (row, outcome) = db.upsert_pending_recommendation(&draft)?;
            match outcome {
                UpsertOutcome::Inserted => {
                    log::info!(
                        "Prioritization: new {} recommendation for '{}' ({})",
                        row.recommendation_type,
                        row.stakeholder_key,
                        row.urgency_level
                    );
                    summary.inserted += 1;
                }
                UpsertOutcome::Updated => summary.refreshed += 1,
            }
        }
    }
    Ok(summary)
}
