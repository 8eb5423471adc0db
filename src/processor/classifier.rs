//! Pattern-based path classification for workspace changes.
//!
//! Classifies a path by matching an ordered rule table against its
//! segments. No content is read here. The table is data loaded from
//! the template registry; this module only knows how to evaluate it.

use std::path::{Component, Path};

use regex::{Regex, RegexBuilder};

use crate::entity::MeetingType;
use crate::error::IngestError;
use crate::templates::{ClassifierRule, WorkspaceTemplate};

/// Category of a path no rule matches.
pub const UNCATEGORIZED: &str = "uncategorized";
/// Category of files that are not UTF-8 text.
pub const UNSUPPORTED: &str = "unsupported";

/// Classification result for a workspace path.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub subcategory: Option<String>,
    pub meeting_type: Option<MeetingType>,
    /// Template whose trigger matches the path's last segment.
    pub template: Option<WorkspaceTemplate>,
    /// The segment that satisfied the winning rule.
    pub matched_segment: Option<String>,
}

impl Classification {
    pub fn uncategorized() -> Self {
        Self {
            category: UNCATEGORIZED.to_string(),
            subcategory: None,
            meeting_type: None,
            template: None,
            matched_segment: None,
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category == UNCATEGORIZED
    }
}

struct CompiledRule {
    rule: ClassifierRule,
    regex: Regex,
}

struct CompiledTemplate {
    template: WorkspaceTemplate,
    regex: Regex,
}

/// The compiled, ordered rule table plus template triggers.
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    templates: Vec<CompiledTemplate>,
}

fn compile(pattern: &str) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| format!("Invalid pattern '{}': {}", pattern, e))
}

impl RuleSet {
    pub fn compile(
        rules: Vec<ClassifierRule>,
        templates: Vec<WorkspaceTemplate>,
    ) -> Result<Self, String> {
        let rules = rules
            .into_iter()
            .map(|rule| -> Result<CompiledRule, String> {
                Ok(CompiledRule {
                    regex: compile(&rule.pattern)?,
                    rule,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        let templates = templates
            .into_iter()
            .map(|template| -> Result<CompiledTemplate, String> {
                Ok(CompiledTemplate {
                    regex: compile(&template.trigger_pattern)?,
                    template,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self { rules, templates })
    }

    pub fn templates(&self) -> Vec<WorkspaceTemplate> {
        self.templates.iter().map(|t| t.template.clone()).collect()
    }

    /// Classify a workspace-relative path.
    ///
    /// Rules are tried in table order; for each rule the segments are tried
    /// deepest first. The first rule that matches any segment wins, so a
    /// more specific rule placed earlier always beats a generic one.
    pub fn classify(&self, relative: &Path) -> Result<Classification, IngestError> {
        let segments = path_segments(relative)?;

        let template = segments
            .last()
            .and_then(|leaf| self.template_for_segment(leaf))
            .cloned();

        for compiled in &self.rules {
            if let Some(segment) = segments.iter().rev().find(|s| compiled.regex.is_match(s)) {
                return Ok(Classification {
                    category: compiled.rule.category.clone(),
                    subcategory: compiled.rule.subcategory.clone(),
                    meeting_type: compiled.rule.meeting_type,
                    template,
                    matched_segment: Some(segment.clone()),
                });
            }
        }

        Ok(Classification {
            template,
            ..Classification::uncategorized()
        })
    }

    /// Template governing content under this path: the deepest directory
    /// segment that matches a trigger.
    pub fn context_template(&self, relative: &Path) -> Option<&WorkspaceTemplate> {
        let segments = path_segments(relative).ok()?;
        segments
            .iter()
            .rev()
            .find_map(|segment| self.template_for_segment(segment))
    }

    fn template_for_segment(&self, segment: &str) -> Option<&WorkspaceTemplate> {
        self.templates
            .iter()
            .find(|t| t.regex.is_match(segment))
            .map(|t| &t.template)
    }
}

/// Normal path segments, with the extension stripped from the last one.
pub fn path_segments(relative: &Path) -> Result<Vec<String>, IngestError> {
    let malformed = |reason: &str| IngestError::Classification {
        path: relative.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let s = part.to_str().ok_or_else(|| malformed("path is not valid UTF-8"))?;
                segments.push(s.to_string());
            }
            Component::ParentDir => return Err(malformed("path escapes the workspace")),
            _ => {}
        }
    }

    let Some(leaf) = segments.pop() else {
        return Err(malformed("path has no segments"));
    };
    let stem = Path::new(&leaf)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(&leaf)
        .to_string();
    segments.push(stem);
    Ok(segments)
}
