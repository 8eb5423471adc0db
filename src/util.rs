use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Convert a display name to a URL-safe kebab-case slug.
///
/// Example: "Acme Corp" → "acme-corp"
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Derive a display name from a stakeholder key or handle (best-effort).
///
/// Example: "raghu.menon" → "Raghu Menon"
pub fn display_name_from_key(key: &str) -> String {
    key.split(|c: char| c == '.' || c == '_' || c == '-')
        .filter(|s| !s.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a file through SHA-256, keeping at most `keep` leading bytes.
///
/// The hash covers the whole file; only the head is held in memory.
pub fn hash_file_head(path: &Path, keep: usize) -> io::Result<(String, Vec<u8>)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut head = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        let take = keep.saturating_sub(head.len()).min(n);
        head.extend_from_slice(&buf[..take]);
    }
    Ok((hex::encode(hasher.finalize()), head))
}

/// Path relative to the workspace root, with `/` separators.
///
/// Paths outside the root are returned as-is.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().into_owned();
    };
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
    }

    #[test]
    fn test_slugify_multi_word() {
        assert_eq!(slugify("Q2 Platform Migration"), "q2-platform-migration");
    }

    #[test]
    fn test_slugify_special_chars() {
        assert_eq!(slugify("Weekly Sync - Team Alpha"), "weekly-sync-team-alpha");
    }

    #[test]
    fn test_display_name_from_key() {
        assert_eq!(display_name_from_key("raghu.menon"), "Raghu Menon");
        assert_eq!(display_name_from_key("priya"), "Priya");
        assert_eq!(display_name_from_key("jo_ann-lee"), "Jo Ann Lee");
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_file_head_covers_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.md");
        let body = "- line\n".repeat(40_000);
        std::fs::write(&path, &body).unwrap();

        let (hash, head) = hash_file_head(&path, 1_000).unwrap();
        assert_eq!(hash, sha256_hex(body.as_bytes()));
        assert_eq!(head.len(), 1_000);
        assert_eq!(&head[..], &body.as_bytes()[..1_000]);

        let (_, all) = hash_file_head(&path, usize::MAX).unwrap();
        assert_eq!(all.len(), body.len());
    }

    #[test]
    fn test_relative_path() {
        let root = PathBuf::from("/ws");
        assert_eq!(
            relative_path(&root, &PathBuf::from("/ws/meeting-prep/vp-1on1/notes.md")),
            "meeting-prep/vp-1on1/notes.md"
        );
        assert_eq!(relative_path(&root, &PathBuf::from("/other/x.md")), "/other/x.md");
    }
}
