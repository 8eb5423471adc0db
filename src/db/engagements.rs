use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::display_name_from_key;

const ENGAGEMENT_COLUMNS: &str = "id, stakeholder_key, engagement_type, engagement_date,
     engagement_quality, stakeholder_satisfaction, strategic_value, relationship_impact,
     follow_up_required, follow_up_date, follow_up_completed, notes, created_at";

fn check_unit_interval(name: &str, value: Option<f64>) -> Result<(), DbError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(DbError::InvalidInput(format!(
            "{name} must be within 0.0..=1.0, got {v}"
        ))),
        _ => Ok(()),
    }
}

impl StrategicDb {
    // =========================================================================
    // Engagements (append-only interaction log)
    // =========================================================================

    /// Log one interaction. An unknown stakeholder gets a minimal profile.
    pub fn insert_engagement(&self, engagement: &NewEngagement) -> Result<DbEngagement, DbError> {
        check_unit_interval("engagement_quality", engagement.engagement_quality)?;
        check_unit_interval("stakeholder_satisfaction", engagement.stakeholder_satisfaction)?;

        self.with_transaction(|db| {
            db.ensure_stakeholder(
                &engagement.stakeholder_key,
                &display_name_from_key(&engagement.stakeholder_key),
            )?;
            db.conn.execute(
                "INSERT INTO engagements (
                    stakeholder_key, engagement_type, engagement_date, engagement_quality,
                    stakeholder_satisfaction, strategic_value, relationship_impact,
                    follow_up_required, follow_up_date, notes, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    engagement.stakeholder_key,
                    engagement.engagement_type,
                    engagement.engagement_date,
                    engagement.engagement_quality,
                    engagement.stakeholder_satisfaction,
                    engagement.strategic_value,
                    engagement.relationship_impact,
                    engagement.follow_up_required,
                    engagement.follow_up_date,
                    engagement.notes,
                    now(),
                ],
            )?;
            let id = db.conn.last_insert_rowid();
            db.get_engagement(id)?
                .ok_or_else(|| DbError::not_found("engagement", &id.to_string()))
        })
    }

    pub fn get_engagement(&self, id: i64) -> Result<Option<DbEngagement>, DbError> {
        let sql = format!("SELECT {ENGAGEMENT_COLUMNS} FROM engagements WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::map_engagement_row)
            .optional()?)
    }

    /// Engagements on or after `since`, most recent first.
    pub fn get_engagements_since(
        &self,
        stakeholder_key: &str,
        since: NaiveDate,
    ) -> Result<Vec<DbEngagement>, DbError> {
        let sql = format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagements
             WHERE stakeholder_key = ?1 AND engagement_date >= ?2
             ORDER BY engagement_date DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![stakeholder_key, since], Self::map_engagement_row)?;
        collect_rows(rows)
    }

    pub fn get_last_engagement_date(&self, stakeholder_key: &str) -> Result<Option<NaiveDate>, DbError> {
        let date: Option<NaiveDate> = self.conn.query_row(
            "SELECT MAX(engagement_date) FROM engagements WHERE stakeholder_key = ?1",
            params![stakeholder_key],
            |row| row.get(0),
        )?;
        Ok(date)
    }

    /// The only permitted edit to a logged engagement.
    pub fn mark_follow_up_completed(&self, id: i64) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE engagements SET follow_up_completed = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(DbError::not_found("engagement", &id.to_string()));
        }
        Ok(())
    }

    fn map_engagement_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbEngagement> {
        Ok(DbEngagement {
            id: row.get(0)?,
            stakeholder_key: row.get(1)?,
            engagement_type: row.get(2)?,
            engagement_date: row.get(3)?,
            engagement_quality: row.get(4)?,
            stakeholder_satisfaction: row.get(5)?,
            strategic_value: row.get(6)?,
            relationship_impact: row.get(7)?,
            follow_up_required: row.get(8)?,
            follow_up_date: row.get(9)?,
            follow_up_completed: row.get(10)?,
            notes: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;
    use crate::entity::{RelationshipImpact, StrategicValue};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_engagement_log() {
        let db = test_db();
        let mut first = NewEngagement::on("raghu", "1on1", date("2026-09-01"));
        first.engagement_quality = Some(0.8);
        first.strategic_value = Some(StrategicValue::High);
        first.relationship_impact = Some(RelationshipImpact::Strengthened);
        first.follow_up_required = true;
        first.follow_up_date = Some(date("2026-09-08"));
        let saved = db.insert_engagement(&first).unwrap();
        db.insert_engagement(&NewEngagement::on("raghu", "email", date("2026-10-01")))
            .unwrap();

        assert!(db.get_stakeholder("raghu").unwrap().is_some());
        assert_eq!(
            db.get_last_engagement_date("raghu").unwrap(),
            Some(date("2026-10-01"))
        );
        assert_eq!(
            db.get_engagements_since("raghu", date("2026-09-15")).unwrap().len(),
            1
        );

        db.mark_follow_up_completed(saved.id).unwrap();
        assert!(db.get_engagement(saved.id).unwrap().unwrap().follow_up_completed);
        assert!(db.get_last_engagement_date("nobody").unwrap().is_none());
    }

    #[test]
    fn test_quality_outside_unit_interval_is_rejected() {
        let db = test_db();
        let mut bad = NewEngagement::on("raghu", "1on1", date("2026-09-01"));
        bad.engagement_quality = Some(1.5);
        assert!(matches!(
            db.insert_engagement(&bad).unwrap_err(),
            DbError::InvalidInput(_)
        ));
    }
}
