use std::path::{Component, Path};

use regex::RegexBuilder;

use super::embedded;
use super::schema::{ClassifierRule, WorkspaceTemplate};
use crate::entity::EntityKind;

/// Load the built-in template registry.
pub fn load_default_templates() -> Result<Vec<WorkspaceTemplate>, String> {
    let templates: Vec<WorkspaceTemplate> = serde_json::from_str(embedded::default_templates())
        .map_err(|e| format!("Failed to parse embedded templates: {}", e))?;
    validate_templates(&templates)?;
    Ok(templates)
}

/// Load a custom template registry from a file path.
pub fn load_custom_templates(path: &Path) -> Result<Vec<WorkspaceTemplate>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read template file: {}", e))?;
    let templates: Vec<WorkspaceTemplate> =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse templates: {}", e))?;
    validate_templates(&templates)?;
    Ok(templates)
}

/// Custom file when configured, embedded defaults otherwise.
pub fn load_templates(custom: Option<&Path>) -> Result<Vec<WorkspaceTemplate>, String> {
    match custom {
        Some(path) => load_custom_templates(path),
        None => load_default_templates(),
    }
}

pub fn load_default_classifier_rules() -> Result<Vec<ClassifierRule>, String> {
    let rules: Vec<ClassifierRule> = serde_json::from_str(embedded::default_classifier_rules())
        .map_err(|e| format!("Failed to parse embedded classifier rules: {}", e))?;
    validate_rules(&rules)?;
    Ok(rules)
}

pub fn load_custom_classifier_rules(path: &Path) -> Result<Vec<ClassifierRule>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read classifier rule file: {}", e))?;
    let rules: Vec<ClassifierRule> = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse classifier rules: {}", e))?;
    validate_rules(&rules)?;
    Ok(rules)
}

pub fn load_classifier_rules(custom: Option<&Path>) -> Result<Vec<ClassifierRule>, String> {
    match custom {
        Some(path) => load_custom_classifier_rules(path),
        None => load_default_classifier_rules(),
    }
}

fn check_pattern(pattern: &str) -> Result<(), String> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(|_| ())
        .map_err(|e| format!("Invalid pattern '{}': {}", pattern, e))
}

/// Skeleton paths must stay inside the matched directory.
fn check_relative(path: &str) -> Result<(), String> {
    let p = Path::new(path);
    if path.is_empty() || p.is_absolute() {
        return Err(format!("Skeleton path '{}' must be relative", path));
    }
    if p.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(format!("Skeleton path '{}' must not leave its directory", path));
    }
    Ok(())
}

/// Validate a template has required fields and a usable skeleton.
pub fn validate_template(template: &WorkspaceTemplate) -> Result<(), String> {
    if template.id.is_empty() {
        return Err("Template id is required".into());
    }
    if template.name.is_empty() {
        return Err(format!("Template '{}' needs a name", template.id));
    }
    check_pattern(&template.trigger_pattern)?;
    for dir in &template.directory_structure {
        check_relative(dir)?;
    }
    for file in &template.default_files {
        check_relative(&file.path)?;
    }
    let integration = &template.memory_integration;
    if integration.entity == EntityKind::Meeting && integration.meeting_type.is_none() {
        return Err(format!(
            "Template '{}' creates meetings but declares no meetingType",
            template.id
        ));
    }
    if integration.expected_entities == Some(0) {
        return Err(format!("Template '{}' expects zero entities", template.id));
    }
    Ok(())
}

pub fn validate_templates(templates: &[WorkspaceTemplate]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for template in templates {
        validate_template(template)?;
        if !seen.insert(template.id.as_str()) {
            return Err(format!("Duplicate template id: {}", template.id));
        }
    }
    Ok(())
}

pub fn validate_rules(rules: &[ClassifierRule]) -> Result<(), String> {
    for rule in rules {
        if rule.category.is_empty() {
            return Err(format!("Rule '{}' needs a category", rule.pattern));
        }
        check_pattern(&rule.pattern)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MeetingType;

    #[test]
    fn test_embedded_defaults_load_and_validate() {
        let templates = load_default_templates().expect("templates");
        assert!(templates.iter().any(|t| t.id == "vp-1on1-prep"));
        let rules = load_default_classifier_rules().expect("rules");
        assert_eq!(rules[0].meeting_type, Some(MeetingType::VpOneOnOne));
    }

    #[test]
    fn test_default_skeletons_have_no_list_items() {
        // Skeleton files must not be mistaken for real agenda content
        for template in load_default_templates().unwrap() {
            for file in &template.default_files {
                for line in file.content.lines() {
                    let t = line.trim_start();
                    assert!(
                        !(t.starts_with("- ") || t.starts_with("* ")),
                        "template '{}' file '{}' has a list item",
                        template.id,
                        file.path
                    );
                }
            }
        }
    }

    #[test]
    fn test_vp_rule_precedes_generic_1on1() {
        let rules = load_default_classifier_rules().unwrap();
        let vp = rules
            .iter()
            .position(|r| r.meeting_type == Some(MeetingType::VpOneOnOne))
            .unwrap();
        let generic = rules
            .iter()
            .position(|r| r.meeting_type == Some(MeetingType::OneOnOneReports))
            .unwrap();
        assert!(vp < generic);
    }

    #[test]
    fn test_validate_rejects_escaping_paths() {
        let mut template = load_default_templates().unwrap().remove(0);
        template.default_files[0].path = "../outside.md".into();
        assert!(validate_template(&template).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut template = load_default_templates().unwrap().remove(0);
        template.trigger_pattern = "(unclosed".into();
        assert!(validate_template(&template).is_err());
    }

    #[test]
    fn test_custom_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{ "pattern": "^board$", "category": "meetings", "meetingType": "slt_review" }]"#,
        )
        .unwrap();
        let rules = load_classifier_rules(Some(&path)).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].subcategory, None);

        std::fs::write(&path, r#"[{ "pattern": "x", "category": "" }]"#).unwrap();
        assert!(load_classifier_rules(Some(&path)).is_err());
    }
}
