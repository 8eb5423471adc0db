// Recommendations service
// User actions on generated engagement recommendations.

use chrono::{DateTime, Utc};

use crate::db::{DbRecommendation, StrategicDb};
use crate::entity::RecommendationStatus;

/// Pending recommendations still eligible for surfacing at `now`.
pub fn list_active(db: &StrategicDb, now: DateTime<Utc>) -> Result<Vec<DbRecommendation>, String> {
    db.get_active_recommendations(now).map_err(|e| e.to_string())
}

pub fn accept(db: &StrategicDb, id: &str, expected_version: i64) -> Result<DbRecommendation, String> {
    transition(db, id, RecommendationStatus::Accepted, expected_version)
}

pub fn schedule(db: &StrategicDb, id: &str, expected_version: i64) -> Result<DbRecommendation, String> {
    transition(db, id, RecommendationStatus::Scheduled, expected_version)
}

pub fn complete(db: &StrategicDb, id: &str, expected_version: i64) -> Result<DbRecommendation, String> {
    transition(db, id, RecommendationStatus::Completed, expected_version)
}

pub fn dismiss(db: &StrategicDb, id: &str, expected_version: i64) -> Result<DbRecommendation, String> {
    transition(db, id, RecommendationStatus::Dismissed, expected_version)
}

fn transition(
    db: &StrategicDb,
    id: &str,
    next: RecommendationStatus,
    expected_version: i64,
) -> Result<DbRecommendation, String> {
    let rec = db
        .transition_recommendation(id, next, expected_version)
        .map_err(|e| e.to_string())?;
    log::info!(
        "Recommendations: {} for '{}' is now {}",
        rec.recommendation_type,
        rec.stakeholder_key,
        next
    );
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::RecommendationDraft;
    use crate::entity::{RecommendationType, UrgencyLevel};
    use chrono::Duration;

    fn draft(kind: RecommendationType) -> RecommendationDraft {
        RecommendationDraft {
            stakeholder_key: "priya".into(),
            recommendation_type: kind,
            urgency_level: UrgencyLevel::Medium,
            confidence_score: 0.6,
            trigger_reason: "test".into(),
            expires_at: Utc::now() + Duration::days(14),
        }
    }

    #[test]
    fn test_accept_schedule_complete() {
        let db = test_db();
        db.ensure_stakeholder("priya", "Priya").unwrap();
        let (rec, _) = db
            .upsert_pending_recommendation(&draft(RecommendationType::OverdueCheckIn))
            .unwrap();

        let accepted = accept(&db, &rec.id, rec.version).unwrap();
        let scheduled = schedule(&db, &rec.id, accepted.version).unwrap();
        let done = complete(&db, &rec.id, scheduled.version).unwrap();
        assert_eq!(done.recommendation_status, RecommendationStatus::Completed);
        assert!(list_active(&db, Utc::now()).unwrap().is_empty());

        // Completed is terminal
        assert!(dismiss(&db, &rec.id, done.version).is_err());
    }

    #[test]
    fn test_resolved_recommendation_allows_a_new_pending_one() {
        let db = test_db();
        db.ensure_stakeholder("priya", "Priya").unwrap();
        let (first, _) = db
            .upsert_pending_recommendation(&draft(RecommendationType::OverdueCheckIn))
            .unwrap();
        dismiss(&db, &first.id, first.version).unwrap();

        let (second, _) = db
            .upsert_pending_recommendation(&draft(RecommendationType::OverdueCheckIn))
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(list_active(&db, Utc::now()).unwrap().len(), 1);
    }
}
