//! Prioritization engine.
//!
//! Read-side views over the store (overdue tasks, due follow-ups,
//! platform-impact ranking, active recommendations) plus the periodic pass
//! that appends health snapshots and refreshes recommendations. Views are
//! computed inside one deferred read transaction so they describe a single
//! consistent state while ingestion keeps writing.

pub mod health;
pub mod recommendations;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::db::{DbError, DbRecommendation, DbTask, StrategicDb};
use crate::types::ScoringConfig;

use recommendations::GenerationSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueTask {
    pub task: DbTask,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpDue {
    pub task: DbTask,
    pub days_since_due: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactRanked {
    pub task: DbTask,
    pub stakeholder_count: usize,
}

/// Everything a consumer (report, alert) reads in one go.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityViews {
    pub today: NaiveDate,
    pub overdue_tasks: Vec<OverdueTask>,
    pub follow_ups_due: Vec<FollowUpDue>,
    pub platform_impact: Vec<ImpactRanked>,
    pub recommendations: Vec<DbRecommendation>,
}

pub fn overdue_tasks(db: &StrategicDb, today: NaiveDate) -> Result<Vec<OverdueTask>, DbError> {
    let mut out: Vec<OverdueTask> = db
        .get_overdue_tasks(today)?
        .into_iter()
        .filter_map(|task| {
            let due = task.due_date?;
            Some(OverdueTask {
                days_overdue: (today - due).num_days(),
                task,
            })
        })
        .collect();
    out.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));
    Ok(out)
}

pub fn follow_ups_due(db: &StrategicDb, today: NaiveDate) -> Result<Vec<FollowUpDue>, DbError> {
    let mut out: Vec<FollowUpDue> = db
        .get_follow_ups_due(today)?
        .into_iter()
        .filter_map(|task| {
            let date = task.follow_up_date?;
            Some(FollowUpDue {
                days_since_due: (today - date).num_days(),
                task,
            })
        })
        .collect();
    out.sort_by(|a, b| b.days_since_due.cmp(&a.days_since_due));
    Ok(out)
}

/// Priority first (critical at the top), then breadth of involvement.
pub fn platform_impact_ranking(db: &StrategicDb) -> Result<Vec<ImpactRanked>, DbError> {
    let mut out: Vec<ImpactRanked> = db
        .get_platform_impact_tasks()?
        .into_iter()
        .map(|(task, stakeholder_count)| ImpactRanked {
            task,
            stakeholder_count,
        })
        .collect();
    out.sort_by(|a, b| {
        a.task
            .priority
            .rank()
            .cmp(&b.task.priority.rank())
            .then(b.stakeholder_count.cmp(&a.stakeholder_count))
            .then_with(|| a.task.task_key.cmp(&b.task.task_key))
    });
    Ok(out)
}

/// All views against one snapshot.
pub fn compute_views(
    db: &StrategicDb,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<PriorityViews, DbError> {
    db.read_snapshot(|snap| {
        Ok(PriorityViews {
            today,
            overdue_tasks: overdue_tasks(snap, today)?,
            follow_ups_due: follow_ups_due(snap, today)?,
            platform_impact: platform_impact_ranking(snap)?,
            recommendations: snap.get_active_recommendations(now)?,
        })
    })
}

/// What one periodic pass did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub expired_recommendations: usize,
    pub health_snapshots: usize,
    pub recommendations: GenerationSummary,
    pub overdue_tasks: usize,
    pub follow_ups_due: usize,
    pub platform_impact: usize,
    pub active_recommendations: usize,
}

/// Expire, assess, recommend, then read the views.
///
/// Health snapshots go first so the momentum signal seen by the
/// recommendation rules is today's.
pub fn run_prioritization_pass(
    db: &StrategicDb,
    today: NaiveDate,
    now: DateTime<Utc>,
    scoring: &ScoringConfig,
) -> Result<PassSummary, DbError> {
    let expired_recommendations = db.expire_recommendations(now)?;
    let health_snapshots = health::record_health_snapshots(db, today, scoring)?.len();
    let generated = recommendations::generate_recommendations(db, today, now, scoring)?;
    let views = compute_views(db, today, now)?;

    let summary = PassSummary {
        expired_recommendations,
        health_snapshots,
        recommendations: generated,
        overdue_tasks: views.overdue_tasks.len(),
        follow_ups_due: views.follow_ups_due.len(),
        platform_impact: views.platform_impact.len(),
        active_recommendations: views.recommendations.len(),
    };
    log::info!(
        "Prioritization: {} overdue, {} follow-ups due, {} platform-impact, {} active recommendations ({} new, {} held, {} expired), {} health snapshots",
        summary.overdue_tasks,
        summary.follow_ups_due,
        summary.platform_impact,
        summary.active_recommendations,
        summary.recommendations.inserted,
        summary.recommendations.held,
        summary.expired_recommendations,
        summary.health_snapshots
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::{NewEngagement, NewTask, RecommendationDraft, StakeholderPatch};
    use crate::entity::{
        ImpactScope, MeetingFrequency, Momentum, Priority, RecommendationType, TaskStatus,
        UrgencyLevel,
    };
    use crate::types::HealthWeights;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn test_overdue_task_leaves_view_once_completed() {
        let db = test_db();
        let mut task = NewTask::manual("Send board deck");
        task.due_date = Some(today() - Duration::days(1));
        let task = db.insert_task(&task).unwrap();

        let views = compute_views(&db, today(), Utc::now()).unwrap();
        assert_eq!(views.overdue_tasks.len(), 1);
        assert_eq!(views.overdue_tasks[0].days_overdue, 1);

        db.set_task_status(&task.task_key, TaskStatus::Completed, None, today(), task.version)
            .unwrap();
        let views = compute_views(&db, today(), Utc::now()).unwrap();
        assert!(views.overdue_tasks.is_empty());
    }

    #[test]
    fn test_overdue_ordering_and_due_today_excluded() {
        let db = test_db();
        for (title, days) in [("a", 2), ("b", 10), ("c", 0)] {
            let mut task = NewTask::manual(title);
            task.due_date = Some(today() - Duration::days(days));
            db.insert_task(&task).unwrap();
        }
        let overdue = overdue_tasks(&db, today()).unwrap();
        let titles: Vec<&str> = overdue.iter().map(|o| o.task.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
    }

    #[test]
    fn test_follow_ups_include_today() {
        let db = test_db();
        for (title, days) in [("today", 0), ("late", 3), ("future", -2)] {
            let mut task = NewTask::manual(title);
            task.follow_up_required = true;
            task.follow_up_date = Some(today() - Duration::days(days));
            db.insert_task(&task).unwrap();
        }
        let due = follow_ups_due(&db, today()).unwrap();
        let titles: Vec<&str> = due.iter().map(|f| f.task.title.as_str()).collect();
        assert_eq!(titles, vec!["late", "today"]);
    }

    #[test]
    fn test_platform_impact_ranking() {
        let db = test_db();
        let mut wide = NewTask::manual("Migrate auth");
        wide.priority = Priority::High;
        wide.impact_scope = ImpactScope::PlatformWide;
        wide.stakeholders = vec!["ana".into()];
        db.insert_task(&wide).unwrap();

        let mut cross = NewTask::manual("Align roadmaps");
        cross.priority = Priority::High;
        cross.impact_scope = ImpactScope::CrossTeam;
        cross.stakeholders = vec!["ana".into(), "lee".into(), "priya".into()];
        db.insert_task(&cross).unwrap();

        let mut critical = NewTask::manual("Fix outage");
        critical.priority = Priority::Critical;
        critical.impact_scope = ImpactScope::CrossTeam;
        db.insert_task(&critical).unwrap();

        db.insert_task(&NewTask::manual("Personal errand")).unwrap();

        let ranked = platform_impact_ranking(&db).unwrap();
        let titles: Vec<&str> = ranked.iter().map(|r| r.task.title.as_str()).collect();
        assert_eq!(titles, vec!["Fix outage", "Align roadmaps", "Migrate auth"]);
        assert_eq!(ranked[1].stakeholder_count, 3);
    }

    #[test]
    fn test_weakening_over_days_triggers_maintenance_despite_frequent_passes() {
        let db = test_db();
        db.ensure_stakeholder("lee", "Lee").unwrap();
        let profile = db.get_stakeholder("lee").unwrap().unwrap();
        let patch = StakeholderPatch {
            optimal_meeting_frequency: Some(MeetingFrequency::Weekly),
            ..Default::default()
        };
        db.update_stakeholder("lee", &patch, profile.version).unwrap();

        // Nine engagements that age out of the 90-day window one per day
        let window_start = today() - Duration::days(90);
        for offset in 0..9 {
            db.insert_engagement(&NewEngagement::on(
                "lee",
                "1on1",
                window_start + Duration::days(offset),
            ))
            .unwrap();
        }
        let scoring = ScoringConfig {
            health_weights: HealthWeights {
                engagement_frequency: 1.0,
                engagement_quality: 0.0,
                responsiveness: 0.0,
                strategic_alignment: 0.0,
            },
            ..ScoringConfig::default()
        };

        for day in 0..3 {
            for _ in 0..2 {
                run_prioritization_pass(&db, today() + Duration::days(day), Utc::now(), &scoring)
                    .unwrap();
            }
        }

        let snapshots = db.get_recent_health_metrics("lee", 10).unwrap();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].relationship_momentum, Momentum::Weakening);
        assert_eq!(snapshots[1].relationship_momentum, Momentum::Weakening);
        assert_eq!(snapshots[2].relationship_momentum, Momentum::Stable);

        let maintenance: Vec<_> = db
            .get_recommendations_for_stakeholder("lee")
            .unwrap()
            .into_iter()
            .filter(|r| r.recommendation_type == RecommendationType::RelationshipMaintenance)
            .collect();
        assert_eq!(maintenance.len(), 1);
        assert_eq!(maintenance[0].urgency_level, UrgencyLevel::High);
    }

    #[test]
    fn test_pass_expires_then_generates() {
        let db = test_db();
        db.ensure_stakeholder("priya", "Priya").unwrap();
        let profile = db.get_stakeholder("priya").unwrap().unwrap();
        let patch = StakeholderPatch {
            optimal_meeting_frequency: Some(MeetingFrequency::Monthly),
            ..Default::default()
        };
        db.update_stakeholder("priya", &patch, profile.version).unwrap();
        db.insert_engagement(&NewEngagement::on("priya", "1on1", today() - Duration::days(90)))
            .unwrap();

        // A stale pending row of another type is dismissed by the pass
        let past = Utc::now() - Duration::days(1);
        db.upsert_pending_recommendation(&RecommendationDraft {
            stakeholder_key: "priya".into(),
            recommendation_type: RecommendationType::ProjectUpdate,
            urgency_level: UrgencyLevel::Low,
            confidence_score: 0.5,
            trigger_reason: "old".into(),
            expires_at: past,
        })
        .unwrap();

        let scoring = ScoringConfig::default();
        let summary = run_prioritization_pass(&db, today(), Utc::now(), &scoring).unwrap();
        assert_eq!(summary.expired_recommendations, 1);
        assert_eq!(summary.health_snapshots, 1);
        assert_eq!(summary.recommendations.inserted, 1);
        assert_eq!(summary.active_recommendations, 1);

        let again = run_prioritization_pass(&db, today(), Utc::now(), &scoring).unwrap();
        assert_eq!(again.recommendations.inserted, 0);
        assert_eq!(again.active_recommendations, 1);
    }
}
