use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, ImpactScope, MeetingType, Priority};

/// A declarative workspace template: when a new directory's name matches
/// `trigger_pattern`, the skeleton is laid down and a stub record created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Case-insensitive regex matched against the new directory's name.
    pub trigger_pattern: String,
    /// Subdirectories to create, relative to the matched directory.
    #[serde(default)]
    pub directory_structure: Vec<String>,
    #[serde(default)]
    pub default_files: Vec<TemplateFile>,
    pub memory_integration: MemoryIntegration,
    #[serde(default)]
    pub persona_activation: Vec<String>,
}

/// A skeleton file. `{{title}}` and `{{date}}` are substituted on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

/// Which stub record a template application produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryIntegration {
    pub entity: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_type: Option<MeetingType>,
    /// Denominator of extraction confidence for content under this template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_entities: Option<u32>,
    #[serde(default)]
    pub strategic_themes: Vec<String>,
    /// Task stubs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_scope: Option<ImpactScope>,
}

/// One entry of the ordered path-classifier table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierRule {
    /// Case-insensitive regex matched against single path segments.
    pub pattern: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_type: Option<MeetingType>,
}
