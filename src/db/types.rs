//! Shared type definitions for the database layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{
    ActionItemStatus, AssignmentDirection, ChangeType, EntityKind, ImpactScope, Importance,
    MeetingFrequency, MeetingStatus, MeetingType, Momentum, Priority, RecommendationStatus,
    RecommendationType, RelationshipImpact, RiskLevel, SourceType, StrategicValue, TaskStatus,
    UrgencyLevel,
};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Failed to encode column: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Write conflict on {entity} '{key}': row changed since it was read")]
    WriteConflict { entity: &'static str, key: String },

    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("Dependency {task} -> {depends_on} would create a cycle")]
    DependencyCycle { task: String, depends_on: String },

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// Conflicts and lock contention clear up on a fresh read + retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::WriteConflict { .. } => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: &str) -> Self {
        DbError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// A row from the `workspace_changes` audit log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbWorkspaceChange {
    pub id: i64,
    pub change_type: ChangeType,
    pub path_full: String,
    pub path_relative: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub stakeholders_detected: Vec<String>,
    pub projects_detected: Vec<String>,
    pub meeting_type_detected: Option<MeetingType>,
    pub content_summary: Option<String>,
    pub strategic_value: Option<StrategicValue>,
    pub confidence: Option<f64>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub memory_stored_at: Option<DateTime<Utc>>,
}

/// Extraction results written back onto a change row.
#[derive(Debug, Clone, Default)]
pub struct ChangeExtraction {
    pub stakeholders_detected: Vec<String>,
    pub projects_detected: Vec<String>,
    pub content_summary: String,
    pub strategic_value: Option<StrategicValue>,
    pub confidence: f64,
}

/// An action item recorded on a meeting session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub status: ActionItemStatus,
}

/// A row from the `meeting_sessions` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMeetingSession {
    pub meeting_key: String,
    pub meeting_type: MeetingType,
    pub stakeholder_primary: Option<String>,
    pub stakeholder_secondary: Vec<String>,
    pub meeting_date: NaiveDate,
    pub meeting_status: MeetingStatus,
    pub agenda_items: Vec<String>,
    pub preparation_notes: Option<String>,
    pub meeting_outcomes: Option<String>,
    pub action_items: Vec<ActionItem>,
    pub persona_activated: Vec<String>,
    pub strategic_themes: Vec<String>,
    /// Original session when this one was spawned by a reschedule.
    pub rescheduled_from: Option<String>,
    pub source_path: Option<String>,
    pub detection_confidence: Option<f64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a meeting session.
#[derive(Debug, Clone)]
pub struct NewMeetingSession {
    pub meeting_key: String,
    pub meeting_type: MeetingType,
    pub stakeholder_primary: Option<String>,
    pub stakeholder_secondary: Vec<String>,
    pub meeting_date: NaiveDate,
    pub agenda_items: Vec<String>,
    pub preparation_notes: Option<String>,
    pub action_items: Vec<ActionItem>,
    pub persona_activated: Vec<String>,
    pub strategic_themes: Vec<String>,
    pub rescheduled_from: Option<String>,
    pub source_path: Option<String>,
    pub detection_confidence: Option<f64>,
}

impl NewMeetingSession {
    pub fn stub(meeting_key: String, meeting_type: MeetingType, meeting_date: NaiveDate) -> Self {
        Self {
            meeting_key,
            meeting_type,
            stakeholder_primary: None,
            stakeholder_secondary: Vec::new(),
            meeting_date,
            agenda_items: Vec::new(),
            preparation_notes: None,
            action_items: Vec::new(),
            persona_activated: Vec::new(),
            strategic_themes: Vec::new(),
            rescheduled_from: None,
            source_path: None,
            detection_confidence: None,
        }
    }
}

/// A row from the `stakeholder_profiles` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStakeholder {
    pub stakeholder_key: String,
    pub display_name: String,
    pub role_title: Option<String>,
    pub strategic_importance: Importance,
    pub preferred_communication_channels: Vec<String>,
    pub optimal_meeting_frequency: Option<MeetingFrequency>,
    pub most_effective_personas: Vec<String>,
    pub key_projects_interests: Vec<String>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a stakeholder profile. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct StakeholderPatch {
    pub display_name: Option<String>,
    pub role_title: Option<String>,
    pub strategic_importance: Option<Importance>,
    pub preferred_communication_channels: Option<Vec<String>>,
    pub optimal_meeting_frequency: Option<MeetingFrequency>,
    pub most_effective_personas: Option<Vec<String>>,
    pub key_projects_interests: Option<Vec<String>>,
}

/// A row from the `tasks` table, with its dependency edges.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTask {
    pub task_key: String,
    pub title: String,
    pub assigned_by: Option<String>,
    pub assigned_to: Option<String>,
    pub assignment_direction: AssignmentDirection,
    pub category: Option<String>,
    pub priority: Priority,
    pub impact_scope: ImpactScope,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_stakeholder: Option<String>,
    pub progress_percentage: u8,
    pub dependencies: Vec<String>,
    pub source_type: SourceType,
    /// Meeting key or change id the task was derived from.
    pub source_ref: Option<String>,
    pub persona_activated: Vec<String>,
    pub detection_confidence: Option<f64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_key: Option<String>,
    pub title: String,
    pub assigned_by: Option<String>,
    pub assigned_to: Option<String>,
    pub assignment_direction: AssignmentDirection,
    pub category: Option<String>,
    pub priority: Priority,
    pub impact_scope: ImpactScope,
    pub due_date: Option<NaiveDate>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_stakeholder: Option<String>,
    pub dependencies: Vec<String>,
    /// Extra stakeholders involved beyond assigner/assignee/follow-up.
    pub stakeholders: Vec<String>,
    pub source_type: SourceType,
    pub source_ref: Option<String>,
    pub persona_activated: Vec<String>,
    pub detection_confidence: Option<f64>,
}

impl NewTask {
    /// A self-assigned, medium-priority manual task.
    pub fn manual(title: impl Into<String>) -> Self {
        Self {
            task_key: None,
            title: title.into(),
            assigned_by: None,
            assigned_to: None,
            assignment_direction: AssignmentDirection::SelfAssigned,
            category: None,
            priority: Priority::Medium,
            impact_scope: ImpactScope::Individual,
            due_date: None,
            follow_up_required: false,
            follow_up_date: None,
            follow_up_stakeholder: None,
            dependencies: Vec::new(),
            stakeholders: Vec::new(),
            source_type: SourceType::Manual,
            source_ref: None,
            persona_activated: Vec::new(),
            detection_confidence: None,
        }
    }
}

/// Partial update for a task. Status changes go through transitions, not here.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub assigned_to: Option<String>,
    pub priority: Option<Priority>,
    pub impact_scope: Option<ImpactScope>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<NaiveDate>>,
    pub follow_up_required: Option<bool>,
    /// `Some(None)` clears the follow-up date.
    pub follow_up_date: Option<Option<NaiveDate>>,
    pub follow_up_stakeholder: Option<String>,
    pub progress_percentage: Option<u8>,
}

/// A row from the `task_activity` log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTaskActivity {
    pub id: i64,
    pub task_key: String,
    pub from_status: Option<TaskStatus>,
    pub to_status: TaskStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `engagements` interaction log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEngagement {
    pub id: i64,
    pub stakeholder_key: String,
    pub engagement_type: String,
    pub engagement_date: NaiveDate,
    pub engagement_quality: Option<f64>,
    pub stakeholder_satisfaction: Option<f64>,
    pub strategic_value: Option<StrategicValue>,
    pub relationship_impact: Option<RelationshipImpact>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_completed: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an engagement.
#[derive(Debug, Clone)]
pub struct NewEngagement {
    pub stakeholder_key: String,
    pub engagement_type: String,
    pub engagement_date: NaiveDate,
    pub engagement_quality: Option<f64>,
    pub stakeholder_satisfaction: Option<f64>,
    pub strategic_value: Option<StrategicValue>,
    pub relationship_impact: Option<RelationshipImpact>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewEngagement {
    pub fn on(stakeholder_key: impl Into<String>, engagement_type: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            stakeholder_key: stakeholder_key.into(),
            engagement_type: engagement_type.into(),
            engagement_date: date,
            engagement_quality: None,
            stakeholder_satisfaction: None,
            strategic_value: None,
            relationship_impact: None,
            follow_up_required: false,
            follow_up_date: None,
            notes: None,
        }
    }
}

/// A row from the `engagement_recommendations` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRecommendation {
    pub id: String,
    pub stakeholder_key: String,
    pub recommendation_type: RecommendationType,
    pub urgency_level: UrgencyLevel,
    pub confidence_score: f64,
    pub trigger_reason: String,
    pub recommendation_status: RecommendationStatus,
    pub expires_at: DateTime<Utc>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A generated recommendation before it is merged into the table.
#[derive(Debug, Clone)]
pub struct RecommendationDraft {
    pub stakeholder_key: String,
    pub recommendation_type: RecommendationType,
    pub urgency_level: UrgencyLevel,
    pub confidence_score: f64,
    pub trigger_reason: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of merging a recommendation draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A row from the `relationship_health_metrics` time series.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbHealthMetric {
    pub id: i64,
    pub stakeholder_key: String,
    pub assessment_date: NaiveDate,
    pub engagement_frequency: f64,
    pub engagement_quality: f64,
    pub responsiveness: f64,
    pub strategic_alignment: f64,
    pub overall_health_score: f64,
    pub relationship_momentum: Momentum,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

/// One health assessment ready to append.
#[derive(Debug, Clone)]
pub struct NewHealthMetric {
    pub stakeholder_key: String,
    pub assessment_date: NaiveDate,
    pub engagement_frequency: f64,
    pub engagement_quality: f64,
    pub responsiveness: f64,
    pub strategic_alignment: f64,
    pub overall_health_score: f64,
    pub relationship_momentum: Momentum,
    pub risk_level: RiskLevel,
}

/// Result of a ledger lookup for an ingested change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub dedup_key: String,
    pub entity_kind: EntityKind,
    pub entity_key: String,
    pub change_id: i64,
}
