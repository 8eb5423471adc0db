//! Strongly typed vocabulary for the strategic store.
//!
//! Every enum here has exactly one string form, shared by serde (config and
//! API payloads) and SQLite (TEXT columns). The `sql_enum!` macro keeps the
//! three representations from drifting apart.

use serde::{Deserialize, Serialize};

macro_rules! sql_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// String label for SQL storage.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!("Unknown {}: {}", stringify!($name), other)),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

sql_enum! {
    /// Kind of filesystem event observed under the workspace root.
    pub enum ChangeType {
        DirectoryCreated => "directory_created",
        FileCreated => "file_created",
        FileModified => "file_modified",
        FileDeleted => "file_deleted",
    }
}

impl ChangeType {
    /// Whether the event can carry readable content.
    pub fn has_content(&self) -> bool {
        matches!(self, ChangeType::FileCreated | ChangeType::FileModified)
    }
}

sql_enum! {
    pub enum StrategicValue {
        High => "high",
        Medium => "medium",
        Low => "low",
        None => "none",
    }
}

impl StrategicValue {
    /// Numeric weight used by the alignment component of health scoring.
    pub fn weight(&self) -> f64 {
        match self {
            StrategicValue::High => 1.0,
            StrategicValue::Medium => 0.66,
            StrategicValue::Low => 0.33,
            StrategicValue::None => 0.0,
        }
    }
}

sql_enum! {
    pub enum MeetingType {
        OneOnOneReports => "1on1_reports",
        VpOneOnOne => "vp_1on1",
        SltReview => "slt_review",
        CrossTeam => "cross_team",
        Vendor => "vendor",
        StrategicPlanning => "strategic_planning",
    }
}

sql_enum! {
    pub enum MeetingStatus {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
        Rescheduled => "rescheduled",
    }
}

impl MeetingStatus {
    /// Only a scheduled meeting may move, and only forward.
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        matches!(
            (self, next),
            (
                MeetingStatus::Scheduled,
                MeetingStatus::Completed | MeetingStatus::Cancelled | MeetingStatus::Rescheduled
            )
        )
    }
}

sql_enum! {
    pub enum ActionItemStatus {
        Open => "open",
        Done => "done",
    }
}

sql_enum! {
    pub enum Importance {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

sql_enum! {
    pub enum MeetingFrequency {
        Weekly => "weekly",
        Biweekly => "biweekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
    }
}

impl MeetingFrequency {
    /// Staleness threshold in days for the overdue check-in rule.
    pub fn days(&self) -> i64 {
        match self {
            MeetingFrequency::Weekly => 7,
            MeetingFrequency::Biweekly => 14,
            MeetingFrequency::Monthly => 30,
            MeetingFrequency::Quarterly => 90,
        }
    }
}

sql_enum! {
    pub enum AssignmentDirection {
        Incoming => "incoming",
        Outgoing => "outgoing",
        SelfAssigned => "self_assigned",
    }
}

sql_enum! {
    pub enum Priority {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

impl Priority {
    /// Sort rank: lower is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn is_high_or_above(&self) -> bool {
        self.rank() <= Priority::High.rank()
    }
}

sql_enum! {
    pub enum ImpactScope {
        PlatformWide => "platform_wide",
        CrossTeam => "cross_team",
        SingleTeam => "single_team",
        Individual => "individual",
    }
}

sql_enum! {
    pub enum TaskStatus {
        Active => "active",
        Blocked => "blocked",
        Completed => "completed",
        Cancelled => "cancelled",
        Deferred => "deferred",
    }
}

impl TaskStatus {
    /// Forward-only transitions, except blocked <-> active. Leaving a
    /// terminal state goes through an explicit reopen instead.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Active, Blocked | Completed | Cancelled | Deferred)
                | (Blocked, Active | Completed | Cancelled | Deferred)
                | (Deferred, Cancelled)
        )
    }

    pub fn is_reopenable(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Deferred
        )
    }
}

sql_enum! {
    pub enum SourceType {
        Meeting => "meeting",
        Email => "email",
        Manual => "manual",
        AutoDetected => "auto_detected",
    }
}

sql_enum! {
    pub enum RelationshipImpact {
        Strengthened => "strengthened",
        Maintained => "maintained",
        Neutral => "neutral",
        Weakened => "weakened",
    }
}

sql_enum! {
    pub enum RecommendationType {
        OverdueCheckIn => "overdue_check_in",
        StrategicOpportunity => "strategic_opportunity",
        RelationshipMaintenance => "relationship_maintenance",
        ProjectUpdate => "project_update",
        EscalationNeeded => "escalation_needed",
    }
}

sql_enum! {
    pub enum UrgencyLevel {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

sql_enum! {
    pub enum RecommendationStatus {
        Pending => "pending",
        Accepted => "accepted",
        Scheduled => "scheduled",
        Completed => "completed",
        Dismissed => "dismissed",
    }
}

impl RecommendationStatus {
    pub fn can_transition_to(&self, next: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted | Scheduled | Completed | Dismissed)
                | (Accepted, Scheduled | Completed | Dismissed)
                | (Scheduled, Completed | Dismissed)
        )
    }
}

sql_enum! {
    pub enum Momentum {
        Strengthening => "strengthening",
        Stable => "stable",
        Weakening => "weakening",
        AtRisk => "at_risk",
    }
}

sql_enum! {
    pub enum RiskLevel {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

sql_enum! {
    /// Which derived record a template or ingestion step produces.
    pub enum EntityKind {
        Meeting => "meeting",
        Task => "task",
    }
}
