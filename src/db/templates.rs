use rusqlite::params;

use super::*;
use crate::templates::WorkspaceTemplate;

impl StrategicDb {
    // =========================================================================
    // Workspace templates (seed data mirrored for read-side consumers)
    // =========================================================================

    /// Mirror the loaded registry into `workspace_templates`. Templates no
    /// longer in the registry are removed. Returns the number written.
    pub fn sync_templates(&self, templates: &[WorkspaceTemplate]) -> Result<usize, DbError> {
        self.with_transaction(|db| {
            let ts = now();
            for template in templates {
                db.conn.execute(
                    "INSERT INTO workspace_templates
                        (template_id, name, trigger_pattern, definition_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(template_id) DO UPDATE SET
                        name = excluded.name,
                        trigger_pattern = excluded.trigger_pattern,
                        definition_json = excluded.definition_json,
                        updated_at = excluded.updated_at",
                    params![
                        template.id,
                        template.name,
                        template.trigger_pattern,
                        to_json_column(template)?,
                        ts,
                    ],
                )?;
            }
            let ids = to_json_column(&templates.iter().map(|t| t.id.as_str()).collect::<Vec<_>>())?;
            db.conn.execute(
                "DELETE FROM workspace_templates
                 WHERE template_id NOT IN (SELECT value FROM json_each(?1))",
                params![ids],
            )?;
            Ok(templates.len())
        })
    }

    pub fn get_templates(&self) -> Result<Vec<WorkspaceTemplate>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT definition_json FROM workspace_templates ORDER BY template_id")?;
        let rows = stmt.query_map([], |row| json_column::<WorkspaceTemplate>(row, 0))?;
        collect_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use crate::templates::loader::load_default_templates;

    #[test]
    fn test_sync_replaces_registry() {
        let db = test_db();
        let mut templates = load_default_templates().unwrap();
        let total = templates.len();
        db.sync_templates(&templates).unwrap();
        assert_eq!(db.get_templates().unwrap().len(), total);

        templates.truncate(2);
        templates[0].name = "Renamed".into();
        db.sync_templates(&templates).unwrap();
        let stored = db.get_templates().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|t| t.name == "Renamed"));
    }
}
