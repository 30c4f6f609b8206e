//! Named pointer-path sets persisted as JSON.
//!
//! Lets a tool ship a versioned catalog of known paths (one per watched
//! value) and reload it between runs. Expressions are stored as text and
//! validated on load, so a set file edited by hand fails loudly instead of
//! at first evaluation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::path::PointerPath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    pub name: String,
    pub expression: String,
}

impl PathEntry {
    pub fn parse(&self) -> Result<PointerPath> {
        PointerPath::parse(&self.expression).map_err(|source| Error::InvalidPathEntry {
            name: self.name.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSet {
    pub version: String,
    pub entries: Vec<PathEntry>,
}

impl PathSet {
    pub fn entry(&self, name: &str) -> Option<&PathEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Check that every entry holds a parseable expression.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            entry.parse()?;
        }
        Ok(())
    }
}

pub fn load_paths<P: AsRef<Path>>(path: P) -> Result<PathSet> {
    let content = fs::read_to_string(&path)?;
    let set: PathSet = serde_json::from_str(&content)?;
    set.validate()?;
    Ok(set)
}

/// Like [`load_paths`], but a missing file yields an empty set instead of
/// an error. Any other failure (unreadable file, bad JSON, invalid
/// expression) still surfaces.
pub fn load_paths_or_default<P: AsRef<Path>>(path: P) -> Result<PathSet> {
    match load_paths(path) {
        Err(e) if e.is_not_found() => Ok(PathSet::default()),
        other => other,
    }
}

pub fn save_paths<P: AsRef<Path>>(path: P, set: &PathSet) -> Result<()> {
    let content = serde_json::to_string_pretty(set)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> PathSet {
        PathSet {
            version: "1".to_string(),
            entries: vec![
                PathEntry {
                    name: "player_hp".to_string(),
                    expression: "game.exe+1F016644,13,A0".to_string(),
                },
                PathEntry {
                    name: "gold".to_string(),
                    expression: "1F016644,13".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_entry_lookup_is_case_insensitive() {
        let set = sample_set();
        assert!(set.entry("PLAYER_HP").is_some());
        assert!(set.entry("missing").is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("paths.json");

        let set = sample_set();
        save_paths(&file, &set).unwrap();
        let loaded = load_paths(&file).unwrap();

        assert_eq!(loaded.version, "1");
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].expression, set.entries[0].expression);
    }

    #[test]
    fn test_load_or_default_tolerates_missing_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let set = load_paths_or_default(&missing).unwrap();
        assert!(set.entries.is_empty());

        // A present but malformed file still fails.
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{").unwrap();
        assert!(load_paths_or_default(&broken).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_expression() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("paths.json");
        fs::write(
            &file,
            r#"{"version":"1","entries":[{"name":"bad","expression":"1F++2"}]}"#,
        )
        .unwrap();

        let err = load_paths(&file).unwrap_err();
        assert!(matches!(err, Error::InvalidPathEntry { ref name, .. } if name == "bad"));
    }
}
