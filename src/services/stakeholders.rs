// Stakeholders service
// Profile edits, aliases, archival, and a combined per-person view.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{
    DbHealthMetric, DbMeetingSession, DbRecommendation, DbStakeholder, DbTask, StakeholderPatch,
    StrategicDb,
};
use crate::entity::RecommendationStatus;

/// Everything known about one stakeholder at a glance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeholderOverview {
    pub profile: DbStakeholder,
    pub latest_health: Option<DbHealthMetric>,
    pub open_tasks: Vec<DbTask>,
    /// Sessions with this person, most recent first.
    pub meetings: Vec<DbMeetingSession>,
    pub pending_recommendations: Vec<DbRecommendation>,
}

pub fn list_stakeholders(db: &StrategicDb, active_only: bool) -> Result<Vec<DbStakeholder>, String> {
    db.get_stakeholders(active_only).map_err(|e| e.to_string())
}

pub fn overview(
    db: &StrategicDb,
    stakeholder_key: &str,
    now: DateTime<Utc>,
) -> Result<StakeholderOverview, String> {
    db.read_snapshot(|snap| {
        let Some(profile) = snap.get_stakeholder(stakeholder_key)? else {
            return Ok(None);
        };
        let latest_health = snap
            .get_recent_health_metrics(stakeholder_key, 1)?
            .into_iter()
            .next();
        let open_tasks = snap.get_open_tasks_for_stakeholder(stakeholder_key)?;
        let meetings = snap.get_meetings_for_stakeholder(stakeholder_key)?;
        let pending_recommendations = snap
            .get_recommendations_for_stakeholder(stakeholder_key)?
            .into_iter()
            .filter(|r| r.recommendation_status == RecommendationStatus::Pending && r.expires_at > now)
            .collect();
        Ok(Some(StakeholderOverview {
            profile,
            latest_health,
            open_tasks,
            meetings,
            pending_recommendations,
        }))
    })
    .map_err(|e| e.to_string())?
    .ok_or_else(|| format!("Stakeholder not found: {}", stakeholder_key))
}

pub fn update_profile(
    db: &StrategicDb,
    stakeholder_key: &str,
    patch: &StakeholderPatch,
    expected_version: i64,
) -> Result<DbStakeholder, String> {
    let updated = db
        .update_stakeholder(stakeholder_key, patch, expected_version)
        .map_err(|e| e.to_string())?;
    log::info!("Stakeholders: updated '{}'", stakeholder_key);
    Ok(updated)
}

pub fn add_alias(db: &StrategicDb, stakeholder_key: &str, alias: &str) -> Result<(), String> {
    if alias.trim().is_empty() {
        return Err("Alias is empty".to_string());
    }
    db.add_stakeholder_alias(stakeholder_key, alias)
        .map_err(|e| e.to_string())
}

/// Archive a profile. Archived stakeholders keep their history but drop out
/// of detection, health snapshots and recommendations.
pub fn deactivate(db: &StrategicDb, stakeholder_key: &str, expected_version: i64) -> Result<(), String> {
    db.set_stakeholder_active(stakeholder_key, false, expected_version)
        .map_err(|e| e.to_string())?;
    log::info!("Stakeholders: archived '{}'", stakeholder_key);
    Ok(())
}

pub fn reactivate(db: &StrategicDb, stakeholder_key: &str, expected_version: i64) -> Result<(), String> {
    db.set_stakeholder_active(stakeholder_key, true, expected_version)
        .map_err(|e| e.to_string())
}
