//! Template skeleton creation.
//!
//! All-or-nothing per application: every entry created by this invocation
//! is removed again if a later one fails. Entries that already exist are
//! never touched.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::IngestError;
use crate::templates::WorkspaceTemplate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkeletonOutcome {
    /// Entries created, in creation order.
    Created(Vec<PathBuf>),
    /// At least one planned entry already existed; nothing was written.
    AlreadyPresent,
}

/// Substitute `{{title}}` and `{{date}}` in a skeleton file.
pub fn render(content: &str, title: &str, date: NaiveDate) -> String {
    content
        .replace("{{title}}", title)
        .replace("{{date}}", &date.format("%Y-%m-%d").to_string())
}

/// Every path the template would create under `dir`.
fn planned_entries(dir: &Path, template: &WorkspaceTemplate) -> Vec<PathBuf> {
    template
        .directory_structure
        .iter()
        .map(|d| dir.join(d))
        .chain(template.default_files.iter().map(|f| dir.join(&f.path)))
        .collect()
}

/// Lay down the template's directories and files under `dir`.
pub fn apply_skeleton(
    dir: &Path,
    template: &WorkspaceTemplate,
    title: &str,
    date: NaiveDate,
) -> Result<SkeletonOutcome, IngestError> {
    if planned_entries(dir, template).iter().any(|p| p.exists()) {
        log::debug!(
            "Instantiator: '{}' already has entries from template '{}', leaving it alone",
            dir.display(),
            template.id
        );
        return Ok(SkeletonOutcome::AlreadyPresent);
    }

    let mut created: Vec<PathBuf> = Vec::new();
    match write_entries(dir, template, title, date, &mut created) {
        Ok(()) => Ok(SkeletonOutcome::Created(created)),
        Err(e) => {
            let leftovers = rollback(&created);
            let mut reason = e.to_string();
            if !leftovers.is_empty() {
                reason.push_str(&format!("; could not remove {}", leftovers.join(", ")));
            }
            Err(IngestError::TemplateInstantiation {
                template: template.id.clone(),
                path: dir.to_path_buf(),
                reason,
            })
        }
    }
}

fn write_entries(
    dir: &Path,
    template: &WorkspaceTemplate,
    title: &str,
    date: NaiveDate,
    created: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for sub in &template.directory_structure {
        create_dirs(dir, &dir.join(sub), created)?;
    }
    for file in &template.default_files {
        let path = dir.join(&file.path);
        if let Some(parent) = path.parent() {
            create_dirs(dir, parent, created)?;
        }
        let mut handle = OpenOptions::new().write(true).create_new(true).open(&path)?;
        created.push(path);
        handle.write_all(render(&file.content, title, date).as_bytes())?;
    }
    Ok(())
}

/// Create `target` and any missing ancestors below `base`, recording each.
fn create_dirs(base: &Path, target: &Path, created: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut missing: Vec<&Path> = target
        .ancestors()
        .take_while(|p| *p != base && !p.exists())
        .collect();
    missing.reverse();
    for path in missing {
        fs::create_dir(path)?;
        created.push(path.to_path_buf());
    }
    Ok(())
}

/// Remove created entries newest first. Returns whatever could not be removed.
fn rollback(created: &[PathBuf]) -> Vec<String> {
    let mut leftovers = Vec::new();
    for path in created.iter().rev() {
        let result = if path.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        if result.is_err() {
            leftovers.push(path.display().to_string());
        }
    }
    leftovers
}
