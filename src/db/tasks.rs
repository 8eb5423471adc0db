use std::collections::{HashSet, VecDeque};

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::*;
use crate::entity::{ImpactScope, TaskStatus};
use crate::util::display_name_from_key;

const TASK_COLUMNS: &str = "task_key, title, assigned_by, assigned_to, assignment_direction,
     category, priority, impact_scope, status, due_date, completed_date, follow_up_required,
     follow_up_date, follow_up_stakeholder, progress_percentage, source_type, source_ref,
     detection_confidence, version, created_at, updated_at, persona_activated";

impl StrategicDb {
    // =========================================================================
    // Tasks
    // =========================================================================

    /// Insert a task with its dependency edges and stakeholder links.
    ///
    /// Unknown stakeholder keys are created as minimal profiles rather than
    /// rejected. Dependencies must already exist.
    pub fn insert_task(&self, task: &NewTask) -> Result<DbTask, DbError> {
        if task.title.trim().is_empty() {
            return Err(DbError::InvalidInput("task title is empty".into()));
        }
        let task_key = task
            .task_key
            .clone()
            .unwrap_or_else(|| format!("task-{}", uuid::Uuid::new_v4()));

        self.with_transaction(|db| {
            for key in task
                .assigned_by
                .iter()
                .chain(task.assigned_to.iter())
                .chain(task.follow_up_stakeholder.iter())
                .chain(task.stakeholders.iter())
            {
                db.ensure_stakeholder(key, &display_name_from_key(key))?;
            }

            let ts = now();
            db.conn.execute(
                "INSERT INTO tasks (
                    task_key, title, assigned_by, assigned_to, assignment_direction, category,
                    priority, impact_scope, status, due_date, follow_up_required,
                    follow_up_date, follow_up_stakeholder, progress_percentage, source_type,
                    source_ref, detection_confidence, persona_activated, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?15, ?16, ?17, ?18, ?18)",
                params![
                    task_key,
                    task.title,
                    task.assigned_by,
                    task.assigned_to,
                    task.assignment_direction,
                    task.category,
                    task.priority,
                    task.impact_scope,
                    TaskStatus::Active,
                    task.due_date,
                    task.follow_up_required,
                    task.follow_up_date,
                    task.follow_up_stakeholder,
                    task.source_type,
                    task.source_ref,
                    task.detection_confidence,
                    to_json_column(&task.persona_activated)?,
                    ts,
                ],
            )?;

            for stakeholder in &task.stakeholders {
                db.conn.execute(
                    "INSERT OR IGNORE INTO task_stakeholders (task_key, stakeholder_key) VALUES (?1, ?2)",
                    params![task_key, stakeholder],
                )?;
            }
            for dep in &task.dependencies {
                db.add_task_dependency(&task_key, dep)?;
            }
            db.log_task_activity(&task_key, None, TaskStatus::Active, Some("created"))?;

            db.get_task(&task_key)?
                .ok_or_else(|| DbError::not_found("task", &task_key))
        })
    }

    pub fn get_task(&self, task_key: &str) -> Result<Option<DbTask>, DbError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_key = ?1");
        let task = self
            .conn
            .query_row(&sql, params![task_key], Self::map_task_row)
            .optional()?;
        match task {
            Some(mut t) => {
                t.dependencies = self.get_task_dependencies(&t.task_key)?;
                Ok(Some(t))
            }
            None => Ok(None),
        }
    }

    /// Tasks filtered by status (all when `None`), newest first.
    pub fn get_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<DbTask>, DbError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, task_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![status], Self::map_task_row)?;
        self.with_dependencies(collect_rows(rows)?)
    }

    /// Tasks derived from a meeting or change, in creation order.
    pub fn get_tasks_by_source(&self, source_ref: &str) -> Result<Vec<DbTask>, DbError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE source_ref = ?1 ORDER BY created_at, task_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![source_ref], Self::map_task_row)?;
        self.with_dependencies(collect_rows(rows)?)
    }

    /// Apply a partial update checked against the caller's version.
    ///
    /// Progress cannot reach 100 here: completion is a status transition.
    pub fn update_task(
        &self,
        task_key: &str,
        patch: &TaskPatch,
        expected_version: i64,
    ) -> Result<DbTask, DbError> {
        let current = self
            .get_task(task_key)?
            .ok_or_else(|| DbError::not_found("task", task_key))?;

        if let Some(progress) = patch.progress_percentage {
            if progress >= 100 {
                return Err(DbError::InvalidInput(
                    "progress 100 is set by completing the task".into(),
                ));
            }
            if current.status == TaskStatus::Completed {
                return Err(DbError::InvalidInput(
                    "completed tasks must be reopened before progress changes".into(),
                ));
            }
        }

        self.with_transaction(|db| {
            for key in patch
                .assigned_to
                .iter()
                .chain(patch.follow_up_stakeholder.iter())
            {
                db.ensure_stakeholder(key, &display_name_from_key(key))?;
            }

            let changed = db.conn.execute(
                "UPDATE tasks
                 SET title = ?1, assigned_to = ?2, priority = ?3, impact_scope = ?4,
                     due_date = ?5, follow_up_required = ?6, follow_up_date = ?7,
                     follow_up_stakeholder = ?8, progress_percentage = ?9,
                     version = version + 1, updated_at = ?10
                 WHERE task_key = ?11 AND version = ?12",
                params![
                    patch.title.as_ref().unwrap_or(&current.title),
                    patch.assigned_to.as_ref().or(current.assigned_to.as_ref()),
                    patch.priority.unwrap_or(current.priority),
                    patch.impact_scope.unwrap_or(current.impact_scope),
                    patch.due_date.unwrap_or(current.due_date),
                    patch.follow_up_required.unwrap_or(current.follow_up_required),
                    patch.follow_up_date.unwrap_or(current.follow_up_date),
                    patch
                        .follow_up_stakeholder
                        .as_ref()
                        .or(current.follow_up_stakeholder.as_ref()),
                    patch.progress_percentage.unwrap_or(current.progress_percentage),
                    now(),
                    task_key,
                    expected_version,
                ],
            )?;
            if changed == 0 {
                return Err(DbError::WriteConflict {
                    entity: "task",
                    key: task_key.to_string(),
                });
            }
            db.get_task(task_key)?
                .ok_or_else(|| DbError::not_found("task", task_key))
        })
    }

    /// Move a task along its state machine and log the transition.
    ///
    /// Completing stamps `completed_date = today` and progress 100.
    pub fn set_task_status(
        &self,
        task_key: &str,
        next: TaskStatus,
        note: Option<&str>,
        today: NaiveDate,
        expected_version: i64,
    ) -> Result<DbTask, DbError> {
        self.with_transaction(|db| {
            let current = db
                .get_task(task_key)?
                .ok_or_else(|| DbError::not_found("task", task_key))?;
            if !current.status.can_transition_to(next) {
                return Err(DbError::InvalidTransition {
                    entity: "task",
                    from: current.status.to_string(),
                    to: next.to_string(),
                });
            }

            let (progress, completed_date) = if next == TaskStatus::Completed {
                (100u8, Some(today))
            } else {
                (current.progress_percentage, None)
            };

            let changed = db.conn.execute(
                "UPDATE tasks
                 SET status = ?1, progress_percentage = ?2, completed_date = ?3,
                     version = version + 1, updated_at = ?4
                 WHERE task_key = ?5 AND version = ?6",
                params![next, progress, completed_date, now(), task_key, expected_version],
            )?;
            if changed == 0 {
                return Err(DbError::WriteConflict {
                    entity: "task",
                    key: task_key.to_string(),
                });
            }
            db.log_task_activity(task_key, Some(current.status), next, note)?;
            db.get_task(task_key)?
                .ok_or_else(|| DbError::not_found("task", task_key))
        })
    }

    /// Reopen a completed, cancelled or deferred task back to `active`.
    /// Progress resets to 0 and `completed_date` is cleared.
    pub fn reopen_task(
        &self,
        task_key: &str,
        note: Option<&str>,
        expected_version: i64,
    ) -> Result<DbTask, DbError> {
        self.with_transaction(|db| {
            let current = db
                .get_task(task_key)?
                .ok_or_else(|| DbError::not_found("task", task_key))?;
            if !current.status.is_reopenable() {
                return Err(DbError::InvalidTransition {
                    entity: "task",
                    from: current.status.to_string(),
                    to: TaskStatus::Active.to_string(),
                });
            }
            let changed = db.conn.execute(
                "UPDATE tasks
                 SET status = ?1, progress_percentage = 0, completed_date = NULL,
                     version = version + 1, updated_at = ?2
                 WHERE task_key = ?3 AND version = ?4",
                params![TaskStatus::Active, now(), task_key, expected_version],
            )?;
            if changed == 0 {
                return Err(DbError::WriteConflict {
                    entity: "task",
                    key: task_key.to_string(),
                });
            }
            db.log_task_activity(
                task_key,
                Some(current.status),
                TaskStatus::Active,
                Some(note.unwrap_or("reopened")),
            )?;
            db.get_task(task_key)?
                .ok_or_else(|| DbError::not_found("task", task_key))
        })
    }

    // =========================================================================
    // Dependencies
    // =========================================================================

    /// Add `task_key -> depends_on`. Rejects self-edges and any edge that
    /// would close a cycle.
    pub fn add_task_dependency(&self, task_key: &str, depends_on: &str) -> Result<(), DbError> {
        let cycle = || DbError::DependencyCycle {
            task: task_key.to_string(),
            depends_on: depends_on.to_string(),
        };
        if task_key == depends_on {
            return Err(cycle());
        }
        for key in [task_key, depends_on] {
            if self.get_task_status(key)?.is_none() {
                return Err(DbError::not_found("task", key));
            }
        }
        if self.dependency_reaches(depends_on, task_key)? {
            return Err(cycle());
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO task_dependencies (task_key, depends_on, created_at)
             VALUES (?1, ?2, ?3)",
            params![task_key, depends_on, now()],
        )?;
        Ok(())
    }

    pub fn remove_task_dependency(&self, task_key: &str, depends_on: &str) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM task_dependencies WHERE task_key = ?1 AND depends_on = ?2",
            params![task_key, depends_on],
        )?;
        Ok(removed > 0)
    }

    pub fn get_task_dependencies(&self, task_key: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT depends_on FROM task_dependencies WHERE task_key = ?1 ORDER BY created_at, depends_on",
        )?;
        let rows = stmt.query_map(params![task_key], |row| row.get(0))?;
        collect_rows(rows)
    }

    /// Breadth-first walk of `depends_on` edges from `start`. The visited set
    /// bounds the walk even if the stored graph were corrupt.
    fn dependency_reaches(&self, start: &str, target: &str) -> Result<bool, DbError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);
        while let Some(node) = queue.pop_front() {
            if node == target {
                return Ok(true);
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            for next in self.get_task_dependencies(&node)? {
                if !seen.contains(&next) {
                    queue.push_back(next);
                }
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Activity log
    // =========================================================================

    fn log_task_activity(
        &self,
        task_key: &str,
        from: Option<TaskStatus>,
        to: TaskStatus,
        note: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO task_activity (task_key, from_status, to_status, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![task_key, from, to, note, now()],
        )?;
        Ok(())
    }

    pub fn get_task_activity(&self, task_key: &str) -> Result<Vec<DbTaskActivity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_key, from_status, to_status, note, created_at
             FROM task_activity WHERE task_key = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![task_key], |row| {
            Ok(DbTaskActivity {
                id: row.get(0)?,
                task_key: row.get(1)?,
                from_status: row.get(2)?,
                to_status: row.get(3)?,
                note: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        collect_rows(rows)
    }

    // =========================================================================
    // Prioritization queries
    // =========================================================================

    /// Active tasks due before `today`, most overdue first.
    pub fn get_overdue_tasks(&self, today: NaiveDate) -> Result<Vec<DbTask>, DbError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = ?1 AND due_date IS NOT NULL AND due_date < ?2
             ORDER BY due_date ASC, task_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![TaskStatus::Active, today], Self::map_task_row)?;
        self.with_dependencies(collect_rows(rows)?)
    }

    /// Active tasks whose follow-up is due on or before `today`, longest waiting first.
    pub fn get_follow_ups_due(&self, today: NaiveDate) -> Result<Vec<DbTask>, DbError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = ?1 AND follow_up_required = 1
               AND follow_up_date IS NOT NULL AND follow_up_date <= ?2
             ORDER BY follow_up_date ASC, task_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![TaskStatus::Active, today], Self::map_task_row)?;
        self.with_dependencies(collect_rows(rows)?)
    }

    /// Active platform-wide and cross-team tasks with their distinct
    /// stakeholder counts. Ordering is left to the caller.
    pub fn get_platform_impact_tasks(&self) -> Result<Vec<(DbTask, usize)>, DbError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = ?1 AND impact_scope IN (?2, ?3)"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                TaskStatus::Active,
                ImpactScope::PlatformWide,
                ImpactScope::CrossTeam
            ],
            Self::map_task_row,
        )?;
        let mut out = Vec::new();
        for task in self.with_dependencies(collect_rows(rows)?)? {
            let count = self.get_task_stakeholders(&task)?.len();
            out.push((task, count));
        }
        Ok(out)
    }

    /// Distinct stakeholders touching a task: assigner, assignee, follow-up,
    /// and anyone linked through `task_stakeholders`.
    pub fn get_task_stakeholders(&self, task: &DbTask) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT stakeholder_key FROM task_stakeholders WHERE task_key = ?1 ORDER BY stakeholder_key",
        )?;
        let rows = stmt.query_map(params![task.task_key], |row| row.get::<_, String>(0))?;
        let mut keys: Vec<String> = Vec::new();
        let direct = task
            .assigned_by
            .iter()
            .chain(task.assigned_to.iter())
            .chain(task.follow_up_stakeholder.iter())
            .cloned();
        for key in direct.chain(collect_rows(rows)?) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Active or blocked tasks that involve a stakeholder in any role.
    pub fn get_open_tasks_for_stakeholder(&self, stakeholder_key: &str) -> Result<Vec<DbTask>, DbError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status IN (?1, ?2)
               AND (assigned_by = ?3 OR assigned_to = ?3 OR follow_up_stakeholder = ?3
                    OR EXISTS (SELECT 1 FROM task_stakeholders ts
                               WHERE ts.task_key = tasks.task_key AND ts.stakeholder_key = ?3))
             ORDER BY task_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![TaskStatus::Active, TaskStatus::Blocked, stakeholder_key],
            Self::map_task_row,
        )?;
        self.with_dependencies(collect_rows(rows)?)
    }

    fn get_task_status(&self, task_key: &str) -> Result<Option<TaskStatus>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT status FROM tasks WHERE task_key = ?1",
                params![task_key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn with_dependencies(&self, mut tasks: Vec<DbTask>) -> Result<Vec<DbTask>, DbError> {
        for task in &mut tasks {
            task.dependencies = self.get_task_dependencies(&task.task_key)?;
        }
        Ok(tasks)
    }

    fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbTask> {
        Ok(DbTask {
            task_key: row.get(0)?,
            title: row.get(1)?,
            assigned_by: row.get(2)?,
            assigned_to: row.get(3)?,
            assignment_direction: row.get(4)?,
            category: row.get(5)?,
            priority: row.get(6)?,
            impact_scope: row.get(7)?,
            status: row.get(8)?,
            due_date: row.get(9)?,
            completed_date: row.get(10)?,
            follow_up_required: row.get(11)?,
            follow_up_date: row.get(12)?,
            follow_up_stakeholder: row.get(13)?,
            progress_percentage: row.get(14)?,
            dependencies: Vec::new(),
            source_type: row.get(15)?,
            source_ref: row.get(16)?,
            persona_activated: json_column(row, 21)?,
            detection_confidence: row.get(17)?,
            version: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;
    use crate::entity::Priority;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn keyed(key: &str) -> NewTask {
        let mut t = NewTask::manual(format!("Task {key}"));
        t.task_key = Some(key.to_string());
        t
    }

    #[test]
    fn test_insert_creates_missing_stakeholders() {
        let db = test_db();
        let mut task = keyed("t1");
        task.assigned_by = Some("raghu".into());
        task.stakeholders = vec!["priya".into()];
        let saved = db.insert_task(&task).unwrap();
        assert_eq!(saved.status, TaskStatus::Active);
        assert_eq!(saved.progress_percentage, 0);
        assert!(db.get_stakeholder("raghu").unwrap().is_some());
        assert!(db.get_stakeholder("priya").unwrap().is_some());

        let activity = db.get_task_activity("t1").unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].from_status, None);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let db = test_db();
        for key in ["a", "b", "c"] {
            db.insert_task(&keyed(key)).unwrap();
        }
        db.add_task_dependency("a", "b").unwrap();
        db.add_task_dependency("b", "c").unwrap();

        let err = db.add_task_dependency("c", "a").unwrap_err();
        assert!(matches!(err, DbError::DependencyCycle { .. }));
        let err = db.add_task_dependency("a", "a").unwrap_err();
        assert!(matches!(err, DbError::DependencyCycle { .. }));

        // Diamond is fine
        db.add_task_dependency("a", "c").unwrap();
        assert_eq!(db.get_task("a").unwrap().unwrap().dependencies, vec!["b", "c"]);
    }

    #[test]
    fn test_complete_and_reopen() {
        let db = test_db();
        let today = date("2026-10-19");
        let task = db.insert_task(&keyed("t1")).unwrap();
        let done = db
            .set_task_status("t1", TaskStatus::Completed, None, today, task.version)
            .unwrap();
        assert_eq!(done.progress_percentage, 100);
        assert_eq!(done.completed_date, Some(today));

        let err = db
            .set_task_status("t1", TaskStatus::Active, None, today, done.version)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        let reopened = db.reopen_task("t1", None, done.version).unwrap();
        assert_eq!(reopened.status, TaskStatus::Active);
        assert_eq!(reopened.progress_percentage, 0);
        assert!(reopened.completed_date.is_none());

        let statuses: Vec<TaskStatus> = db
            .get_task_activity("t1")
            .unwrap()
            .iter()
            .map(|a| a.to_status)
            .collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Active, TaskStatus::Completed, TaskStatus::Active]
        );
    }

    #[test]
    fn test_patch_rejects_full_progress_and_stale_version() {
        let db = test_db();
        let task = db.insert_task(&keyed("t1")).unwrap();
        let err = db
            .update_task(
                "t1",
                &TaskPatch {
                    progress_percentage: Some(100),
                    ..Default::default()
                },
                task.version,
            )
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));

        let patch = TaskPatch {
            progress_percentage: Some(40),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let updated = db.update_task("t1", &patch, task.version).unwrap();
        assert_eq!(updated.progress_percentage, 40);
        let err = db.update_task("t1", &patch, task.version).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_patch_sets_and_clears_dates() {
        let db = test_db();
        let mut task = keyed("t1");
        task.due_date = NaiveDate::from_ymd_opt(2026, 10, 30);
        task.follow_up_required = true;
        task.follow_up_date = NaiveDate::from_ymd_opt(2026, 10, 25);
        let task = db.insert_task(&task).unwrap();

        let moved = db
            .update_task(
                "t1",
                &TaskPatch {
                    due_date: Some(NaiveDate::from_ymd_opt(2026, 11, 6)),
                    ..Default::default()
                },
                task.version,
            )
            .unwrap();
        assert_eq!(moved.due_date, NaiveDate::from_ymd_opt(2026, 11, 6));
        assert_eq!(moved.follow_up_date, NaiveDate::from_ymd_opt(2026, 10, 25));

        let cleared = db
            .update_task(
                "t1",
                &TaskPatch {
                    due_date: Some(None),
                    follow_up_required: Some(false),
                    follow_up_date: Some(None),
                    ..Default::default()
                },
                moved.version,
            )
            .unwrap();
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.follow_up_date, None);
        assert!(!cleared.follow_up_required);
    }

    #[test]
    fn test_platform_impact_counts_distinct_stakeholders() {
        let db = test_db();
        let mut task = keyed("t1");
        task.impact_scope = ImpactScope::PlatformWide;
        task.assigned_by = Some("raghu".into());
        task.assigned_to = Some("raghu".into());
        task.stakeholders = vec!["priya".into(), "raghu".into()];
        db.insert_task(&task).unwrap();
        db.insert_task(&keyed("individual")).unwrap();

        let ranked = db.get_platform_impact_tasks().unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].1, 2);
        assert_eq!(db.get_open_tasks_for_stakeholder("priya").unwrap().len(), 1);
    }
}
