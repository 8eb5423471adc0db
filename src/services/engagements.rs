// Engagements service
// The interaction log is append-only; only follow-up completion is editable.

use chrono::NaiveDate;

use crate::db::{DbEngagement, NewEngagement, StrategicDb};

/// Log an interaction. A follow-up flag needs a date to be actionable.
pub fn log_engagement(db: &StrategicDb, engagement: &NewEngagement) -> Result<DbEngagement, String> {
    if engagement.engagement_type.trim().is_empty() {
        return Err("Engagement type is required".to_string());
    }
    if engagement.follow_up_required && engagement.follow_up_date.is_none() {
        return Err("A follow-up needs a follow-up date".to_string());
    }
    let logged = db.insert_engagement(engagement).map_err(|e| e.to_string())?;
    log::info!(
        "Engagements: logged {} with '{}' on {}",
        logged.engagement_type,
        logged.stakeholder_key,
        logged.engagement_date
    );
    Ok(logged)
}

pub fn complete_follow_up(db: &StrategicDb, engagement_id: i64) -> Result<(), String> {
    db.mark_follow_up_completed(engagement_id)
        .map_err(|e| e.to_string())
}

pub fn engagement_history(
    db: &StrategicDb,
    stakeholder_key: &str,
    since: NaiveDate,
) -> Result<Vec<DbEngagement>, String> {
    db.get_engagements_since(stakeholder_key, since)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn test_log_creates_minimal_profile() {
        let db = test_db();
        let logged = log_engagement(&db, &NewEngagement::on("dana-li", "coffee", day(12))).unwrap();
        assert_eq!(logged.stakeholder_key, "dana-li");
        let profile = db.get_stakeholder("dana-li").unwrap().unwrap();
        assert_eq!(profile.display_name, "Dana Li");
    }

    #[test]
    fn test_follow_up_requires_date_then_completes() {
        let db = test_db();
        let mut engagement = NewEngagement::on("ana", "1on1", day(12));
        engagement.follow_up_required = true;
        assert!(log_engagement(&db, &engagement).is_err());

        engagement.follow_up_date = Some(day(15));
        let logged = log_engagement(&db, &engagement).unwrap();
        complete_follow_up(&db, logged.id).unwrap();

        let history = engagement_history(&db, "ana", day(1)).unwrap();
        assert!(history[0].follow_up_completed);
        assert!(complete_follow_up(&db, 9999).is_err());
    }

    #[test]
    fn test_quality_outside_unit_interval_is_rejected() {
        let db = test_db();
        let mut engagement = NewEngagement::on("ana", "1on1", day(12));
        engagement.engagement_quality = Some(1.5);
        let err = log_engagement(&db, &engagement).unwrap_err();
        assert!(err.contains("engagement_quality"));
    }
}
