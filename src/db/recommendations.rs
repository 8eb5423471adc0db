use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::entity::{RecommendationStatus, RecommendationType};

const RECOMMENDATION_COLUMNS: &str = "id, stakeholder_key, recommendation_type, urgency_level,
     confidence_score, trigger_reason, recommendation_status, expires_at, version,
     created_at, updated_at";

impl StrategicDb {
    // =========================================================================
    // Engagement recommendations
    // =========================================================================

    /// Merge a generated recommendation into the table.
    ///
    /// At most one `pending` row exists per (stakeholder, type); a new trigger
    /// refreshes that row instead of adding a second one.
    pub fn upsert_pending_recommendation(
        &self,
        draft: &RecommendationDraft,
    ) -> Result<(DbRecommendation, UpsertOutcome), DbError> {
        if !(0.0..=1.0).contains(&draft.confidence_score) {
            return Err(DbError::InvalidInput(format!(
                "confidence_score must be within 0.0..=1.0, got {}",
                draft.confidence_score
            )));
        }
        self.with_transaction(|db| {
            let existing =
                db.get_pending_recommendation(&draft.stakeholder_key, draft.recommendation_type)?;
            let ts = now();
            match existing {
                Some(current) => {
                    let changed = db.conn.execute(
                        "UPDATE engagement_recommendations
                         SET urgency_level = ?1, confidence_score = ?2, trigger_reason = ?3,
                             expires_at = ?4, version = version + 1, updated_at = ?5
                         WHERE id = ?6 AND version = ?7",
                        params![
                            draft.urgency_level,
                            draft.confidence_score,
                            draft.trigger_reason,
                            draft.expires_at,
                            ts,
                            current.id,
                            current.version,
                        ],
                    )?;
                    if changed == 0 {
                        return Err(DbError::WriteConflict {
                            entity: "recommendation",
                            key: current.id,
                        });
                    }
                    let row = db
                        .get_recommendation(&current.id)?
                        .ok_or_else(|| DbError::not_found("recommendation", &current.id))?;
                    Ok((row, UpsertOutcome::Updated))
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    db.conn.execute(
                        "INSERT INTO engagement_recommendations (
                            id, stakeholder_key, recommendation_type, urgency_level,
                            confidence_score, trigger_reason, recommendation_status,
                            expires_at, created_at, updated_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                        params![
                            id,
                            draft.stakeholder_key,
                            draft.recommendation_type,
                            draft.urgency_level,
                            draft.confidence_score,
                            draft.trigger_reason,
                            RecommendationStatus::Pending,
                            draft.expires_at,
                            ts,
                        ],
                    )?;
                    let row = db
                        .get_recommendation(&id)?
                        .ok_or_else(|| DbError::not_found("recommendation", &id))?;
                    Ok((row, UpsertOutcome::Inserted))
                }
            }
        })
    }

    pub fn get_recommendation(&self, id: &str) -> Result<Option<DbRecommendation>, DbError> {
        let sql = format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM engagement_recommendations WHERE id = ?1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::map_recommendation_row)
            .optional()?)
    }

    pub fn get_pending_recommendation(
        &self,
        stakeholder_key: &str,
        recommendation_type: RecommendationType,
    ) -> Result<Option<DbRecommendation>, DbError> {
        let sql = format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM engagement_recommendations
             WHERE stakeholder_key = ?1 AND recommendation_type = ?2
               AND recommendation_status = ?3"
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![stakeholder_key, recommendation_type, RecommendationStatus::Pending],
                Self::map_recommendation_row,
            )
            .optional()?)
    }

    /// Whether the user's handling of an earlier row holds off new drafts of
    /// this type: accepted or scheduled rows always do, dismissals do when
    /// they happened after `dismissed_after`.
    pub fn has_recommendation_hold(
        &self,
        stakeholder_key: &str,
        recommendation_type: RecommendationType,
        dismissed_after: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM engagement_recommendations
                WHERE stakeholder_key = ?1 AND recommendation_type = ?2
                  AND (recommendation_status IN (?3, ?4)
                       OR (recommendation_status = ?5 AND updated_at > ?6))
             )",
            params![
                stakeholder_key,
                recommendation_type,
                RecommendationStatus::Accepted,
                RecommendationStatus::Scheduled,
                RecommendationStatus::Dismissed,
                dismissed_after,
            ],
            |row| row.get(0),
        )?)
    }

    /// Pending recommendations still eligible for surfacing at `at`,
    /// highest confidence first.
    pub fn get_active_recommendations(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<DbRecommendation>, DbError> {
        let sql = format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM engagement_recommendations
             WHERE recommendation_status = ?1 AND expires_at > ?2
             ORDER BY confidence_score DESC, created_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![RecommendationStatus::Pending, at],
            Self::map_recommendation_row,
        )?;
        collect_rows(rows)
    }

    /// Every recommendation ever generated for a stakeholder, newest first.
    pub fn get_recommendations_for_stakeholder(
        &self,
        stakeholder_key: &str,
    ) -> Result<Vec<DbRecommendation>, DbError> {
        let sql = format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM engagement_recommendations
             WHERE stakeholder_key = ?1 ORDER BY created_at DESC, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![stakeholder_key], Self::map_recommendation_row)?;
        collect_rows(rows)
    }

    /// Explicit user action on a recommendation.
    pub fn transition_recommendation(
        &self,
        id: &str,
        next: RecommendationStatus,
        expected_version: i64,
    ) -> Result<DbRecommendation, DbError> {
        let current = self
            .get_recommendation(id)?
            .ok_or_else(|| DbError::not_found("recommendation", id))?;
        if !current.recommendation_status.can_transition_to(next) {
            return Err(DbError::InvalidTransition {
                entity: "recommendation",
                from: current.recommendation_status.to_string(),
                to: next.to_string(),
            });
        }
        let changed = self.conn.execute(
            "UPDATE engagement_recommendations
             SET recommendation_status = ?1, version = version + 1, updated_at = ?2
             WHERE id = ?3 AND version = ?4",
            params![next, now(), id, expected_version],
        )?;
        if changed == 0 {
            return Err(DbError::WriteConflict {
                entity: "recommendation",
                key: id.to_string(),
            });
        }
        self.get_recommendation(id)?
            .ok_or_else(|| DbError::not_found("recommendation", id))
    }

    /// Dismiss pending recommendations whose `expires_at` has passed.
    /// Returns the number of rows expired.
    pub fn expire_recommendations(&self, at: DateTime<Utc>) -> Result<usize, DbError> {
        let expired = self.conn.execute(
            "UPDATE engagement_recommendations
             SET recommendation_status = ?1, version = version + 1, updated_at = ?2
             WHERE recommendation_status = ?3 AND expires_at <= ?2",
            params![RecommendationStatus::Dismissed, at, RecommendationStatus::Pending],
        )?;
        if expired > 0 {
            log::info!("Store: expired {} pending recommendation(s)", expired);
        }
        Ok(expired)
    }

    fn map_recommendation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbRecommendation> {
        Ok(DbRecommendation {
            id: row.get(0)?,
            stakeholder_key: row.get(1)?,
            recommendation_type: row.get(2)?,
            urgency_level: row.get(3)?,
            confidence_score: row.get(4)?,
            trigger_reason: row.get(5)?,
            recommendation_status: row.get(6)?,
            expires_at: row.get(7)?,
            version: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;
    use crate::entity::UrgencyLevel;
    use chrono::Duration;

    fn draft(confidence: f64, expires_at: DateTime<Utc>) -> RecommendationDraft {
        RecommendationDraft {
            stakeholder_key: "raghu".into(),
            recommendation_type: RecommendationType::OverdueCheckIn,
            urgency_level: UrgencyLevel::Medium,
            confidence_score: confidence,
            trigger_reason: "no engagement in 45 days".into(),
            expires_at,
        }
    }

    #[test]
    fn test_second_trigger_updates_pending_row() {
        let db = test_db();
        db.ensure_stakeholder("raghu", "Raghu").unwrap();
        let expires = Utc::now() + Duration::days(14);

        let (first, outcome) = db.upsert_pending_recommendation(&draft(0.5, expires)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        let (second, outcome) = db.upsert_pending_recommendation(&draft(0.7, expires)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(first.id, second.id);
        assert!((second.confidence_score - 0.7).abs() < 1e-9);
        assert_eq!(db.get_recommendations_for_stakeholder("raghu").unwrap().len(), 1);

        // Once resolved, a new trigger starts a fresh pending row
        db.transition_recommendation(&second.id, RecommendationStatus::Accepted, second.version)
            .unwrap();
        let (third, outcome) = db.upsert_pending_recommendation(&draft(0.5, expires)).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_ne!(third.id, first.id);
    }

    #[test]
    fn test_hold_after_user_action() {
        let db = test_db();
        db.ensure_stakeholder("raghu", "Raghu").unwrap();
        let expires = Utc::now() + Duration::days(14);
        let week_ago = Utc::now() - Duration::days(7);
        assert!(!db
            .has_recommendation_hold("raghu", RecommendationType::OverdueCheckIn, week_ago)
            .unwrap());

        let (rec, _) = db.upsert_pending_recommendation(&draft(0.5, expires)).unwrap();
        assert!(!db
            .has_recommendation_hold("raghu", RecommendationType::OverdueCheckIn, week_ago)
            .unwrap());

        let scheduled = db
            .transition_recommendation(&rec.id, RecommendationStatus::Scheduled, rec.version)
            .unwrap();
        assert!(db
            .has_recommendation_hold("raghu", RecommendationType::OverdueCheckIn, week_ago)
            .unwrap());
        assert!(!db
            .has_recommendation_hold("raghu", RecommendationType::EscalationNeeded, week_ago)
            .unwrap());

        db.transition_recommendation(&rec.id, RecommendationStatus::Dismissed, scheduled.version)
            .unwrap();
        assert!(db
            .has_recommendation_hold("raghu", RecommendationType::OverdueCheckIn, week_ago)
            .unwrap());
        // Dismissal older than the cutoff no longer holds
        assert!(!db
            .has_recommendation_hold(
                "raghu",
                RecommendationType::OverdueCheckIn,
                Utc::now() + Duration::hours(1)
            )
            .unwrap());
    }

    #[test]
    fn test_transitions_and_expiry() {
        let db = test_db();
        db.ensure_stakeholder("raghu", "Raghu").unwrap();
        let (rec, _) = db
            .upsert_pending_recommendation(&draft(0.5, Utc::now() - Duration::hours(1)))
            .unwrap();
        assert!(db.get_active_recommendations(Utc::now()).unwrap().is_empty());

        assert_eq!(db.expire_recommendations(Utc::now()).unwrap(), 1);
        let dismissed = db.get_recommendation(&rec.id).unwrap().unwrap();
        assert_eq!(dismissed.recommendation_status, RecommendationStatus::Dismissed);

        let err = db
            .transition_recommendation(&rec.id, RecommendationStatus::Accepted, dismissed.version)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));
    }
}
