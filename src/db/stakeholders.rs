use rusqlite::{params, OptionalExtension};

use super::*;
use crate::entity::Importance;

const STAKEHOLDER_COLUMNS: &str = "stakeholder_key, display_name, role_title, strategic_importance,
     preferred_communication_channels, optimal_meeting_frequency, most_effective_personas,
     key_projects_interests, active, version, created_at, updated_at";

impl StrategicDb {
    // =========================================================================
    // Stakeholder profiles
    // =========================================================================

    /// Create-or-get a stakeholder. New profiles start at `medium` importance
    /// pending manual correction. Returns the profile and whether it was created.
    pub fn ensure_stakeholder(
        &self,
        stakeholder_key: &str,
        display_name: &str,
    ) -> Result<(DbStakeholder, bool), DbError> {
        if stakeholder_key.trim().is_empty() {
            return Err(DbError::InvalidInput("stakeholder key is empty".into()));
        }
        let ts = now();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO stakeholder_profiles
                (stakeholder_key, display_name, strategic_importance, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![stakeholder_key, display_name, Importance::Medium, ts],
        )?;
        if inserted > 0 {
            log::info!("Store: created stakeholder profile '{}'", stakeholder_key);
        }
        let profile = self
            .get_stakeholder(stakeholder_key)?
            .ok_or_else(|| DbError::not_found("stakeholder", stakeholder_key))?;
        Ok((profile, inserted > 0))
    }

    pub fn get_stakeholder(&self, stakeholder_key: &str) -> Result<Option<DbStakeholder>, DbError> {
        let sql = format!(
            "SELECT {STAKEHOLDER_COLUMNS} FROM stakeholder_profiles WHERE stakeholder_key = ?1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![stakeholder_key], Self::map_stakeholder_row)
            .optional()?)
    }

    pub fn get_stakeholders(&self, active_only: bool) -> Result<Vec<DbStakeholder>, DbError> {
        let sql = format!(
            "SELECT {STAKEHOLDER_COLUMNS} FROM stakeholder_profiles
             WHERE (?1 = 0 OR active = 1)
             ORDER BY stakeholder_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![active_only], Self::map_stakeholder_row)?;
        collect_rows(rows)
    }

    /// Apply a partial profile update, checked against the version the caller read.
    pub fn update_stakeholder(
        &self,
        stakeholder_key: &str,
        patch: &StakeholderPatch,
        expected_version: i64,
    ) -> Result<DbStakeholder, DbError> {
        let current = self
            .get_stakeholder(stakeholder_key)?
            .ok_or_else(|| DbError::not_found("stakeholder", stakeholder_key))?;

        let display_name = patch.display_name.clone().unwrap_or(current.display_name);
        let role_title = patch.role_title.clone().or(current.role_title);
        let importance = patch
            .strategic_importance
            .unwrap_or(current.strategic_importance);
        let channels = patch
            .preferred_communication_channels
            .clone()
            .unwrap_or(current.preferred_communication_channels);
        let frequency = patch
            .optimal_meeting_frequency
            .or(current.optimal_meeting_frequency);
        let personas = patch
            .most_effective_personas
            .clone()
            .unwrap_or(current.most_effective_personas);
        let interests = patch
            .key_projects_interests
            .clone()
            .unwrap_or(current.key_projects_interests);

        let changed = self.conn.execute(
            "UPDATE stakeholder_profiles
             SET display_name = ?1, role_title = ?2, strategic_importance = ?3,
                 preferred_communication_channels = ?4, optimal_meeting_frequency = ?5,
                 most_effective_personas = ?6, key_projects_interests = ?7,
                 version = version + 1, updated_at = ?8
             WHERE stakeholder_key = ?9 AND version = ?10",
            params![
                display_name,
                role_title,
                importance,
                to_json_column(&channels)?,
                frequency,
                to_json_column(&personas)?,
                to_json_column(&interests)?,
                now(),
                stakeholder_key,
                expected_version,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::WriteConflict {
                entity: "stakeholder",
                key: stakeholder_key.to_string(),
            });
        }
        self.get_stakeholder(stakeholder_key)?
            .ok_or_else(|| DbError::not_found("stakeholder", stakeholder_key))
    }

    /// Archive or restore a profile. Profiles are never deleted.
    pub fn set_stakeholder_active(
        &self,
        stakeholder_key: &str,
        active: bool,
        expected_version: i64,
    ) -> Result<(), DbError> {
        let changed = self.conn.execute(
            "UPDATE stakeholder_profiles
             SET active = ?1, version = version + 1, updated_at = ?2
             WHERE stakeholder_key = ?3 AND version = ?4",
            params![active, now(), stakeholder_key, expected_version],
        )?;
        if changed == 0 {
            if self.get_stakeholder(stakeholder_key)?.is_none() {
                return Err(DbError::not_found("stakeholder", stakeholder_key));
            }
            return Err(DbError::WriteConflict {
                entity: "stakeholder",
                key: stakeholder_key.to_string(),
            });
        }
        Ok(())
    }

    /// Register an alternate name used by content detection.
    pub fn add_stakeholder_alias(&self, stakeholder_key: &str, alias: &str) -> Result<(), DbError> {
        if self.get_stakeholder(stakeholder_key)?.is_none() {
            return Err(DbError::not_found("stakeholder", stakeholder_key));
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO stakeholder_aliases (alias, stakeholder_key) VALUES (?1, ?2)",
            params![alias.trim(), stakeholder_key],
        )?;
        Ok(())
    }

    /// (name, key) pairs for dictionary matching: display names, keys, and aliases
    /// of active stakeholders.
    pub fn get_stakeholder_dictionary(&self) -> Result<Vec<(String, String)>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT display_name, stakeholder_key FROM stakeholder_profiles WHERE active = 1
             UNION
             SELECT stakeholder_key, stakeholder_key FROM stakeholder_profiles WHERE active = 1
             UNION
             SELECT a.alias, a.stakeholder_key FROM stakeholder_aliases a
             JOIN stakeholder_profiles p ON p.stakeholder_key = a.stakeholder_key
             WHERE p.active = 1",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        collect_rows(rows)
    }

    fn map_stakeholder_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbStakeholder> {
        Ok(DbStakeholder {
            stakeholder_key: row.get(0)?,
            display_name: row.get(1)?,
            role_title: row.get(2)?,
            strategic_importance: row.get(3)?,
            preferred_communication_channels: json_column(row, 4)?,
            optimal_meeting_frequency: row.get(5)?,
            most_effective_personas: json_column(row, 6)?,
            key_projects_interests: json_column(row, 7)?,
            active: row.get(8)?,
            version: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;
    use crate::entity::MeetingFrequency;

    #[test]
    fn test_ensure_stakeholder_is_create_or_get() {
        let db = test_db();
        let (first, created) = db.ensure_stakeholder("raghu", "Raghu").unwrap();
        assert!(created);
        assert_eq!(first.strategic_importance, Importance::Medium);
        assert!(first.active);

        let (again, created) = db.ensure_stakeholder("raghu", "Someone Else").unwrap();
        assert!(!created);
        assert_eq!(again.display_name, "Raghu");
    }

    #[test]
    fn test_update_checks_version() {
        let db = test_db();
        let (profile, _) = db.ensure_stakeholder("priya", "Priya").unwrap();
        let patch = StakeholderPatch {
            strategic_importance: Some(Importance::Critical),
            optimal_meeting_frequency: Some(MeetingFrequency::Weekly),
            preferred_communication_channels: Some(vec!["slack".into()]),
            ..Default::default()
        };
        let updated = db
            .update_stakeholder("priya", &patch, profile.version)
            .unwrap();
        assert_eq!(updated.strategic_importance, Importance::Critical);
        assert_eq!(updated.optimal_meeting_frequency, Some(MeetingFrequency::Weekly));
        assert_eq!(updated.version, profile.version + 1);

        // Stale version loses
        let err = db
            .update_stakeholder("priya", &patch, profile.version)
            .unwrap_err();
        assert!(matches!(err, DbError::WriteConflict { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_dictionary_includes_aliases_of_active_profiles() {
        let db = test_db();
        let (raghu, _) = db.ensure_stakeholder("raghu", "Raghu Menon").unwrap();
        db.add_stakeholder_alias("raghu", "RM").unwrap();
        let (old, _) = db.ensure_stakeholder("old-vp", "Old VP").unwrap();
        db.set_stakeholder_active("old-vp", false, old.version).unwrap();

        let dict = db.get_stakeholder_dictionary().unwrap();
        assert!(dict.contains(&("Raghu Menon".to_string(), "raghu".to_string())));
        assert!(dict.contains(&("RM".to_string(), "raghu".to_string())));
        assert!(!dict.iter().any(|(_, key)| key == "old-vp"));
        assert_eq!(raghu.version, 1);
        assert_eq!(db.get_stakeholders(true).unwrap().len(), 1);
        assert_eq!(db.get_stakeholders(false).unwrap().len(), 2);
    }
}
