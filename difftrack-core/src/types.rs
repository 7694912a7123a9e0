//! Domain types shared by the status aggregator and the active-file engine.
//!
//! All path fields use `PathBuf`; the empty path is the "no active file" sentinel.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Kind tag reported by a version-controlled tree (`hg`, `git`, `snapshot`, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryKind(pub String);

impl RepositoryKind {
    pub fn hg() -> Self {
        Self::from("hg")
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepositoryKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepositoryKind {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Raw, backend-specific status letter as reported by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub char);

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<char> for StatusCode {
    fn from(c: char) -> Self {
        Self(c)
    }
}

// ---------------------------------------------------------------------------
// Change status
// ---------------------------------------------------------------------------

/// Classification of a path's change relative to its repository baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Missing,
    Removed,
    Untracked,
    Ignored,
}

impl ChangeStatus {
    /// Map a backend status letter. Codes with no entry (clean files, unknown
    /// letters) return `None` and are left out of the change map.
    pub fn from_code(code: StatusCode) -> Option<Self> {
        match code.0 {
            'A' => Some(ChangeStatus::Added),
            'M' => Some(ChangeStatus::Modified),
            '!' => Some(ChangeStatus::Missing),
            'R' => Some(ChangeStatus::Removed),
            '?' => Some(ChangeStatus::Untracked),
            'I' => Some(ChangeStatus::Ignored),
            _ => None,
        }
    }

    pub fn code(self) -> StatusCode {
        StatusCode(match self {
            ChangeStatus::Added => 'A',
            ChangeStatus::Modified => 'M',
            ChangeStatus::Missing => '!',
            ChangeStatus::Removed => 'R',
            ChangeStatus::Untracked => '?',
            ChangeStatus::Ignored => 'I',
        })
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Added => write!(f, "added"),
            ChangeStatus::Modified => write!(f, "modified"),
            ChangeStatus::Missing => write!(f, "missing"),
            ChangeStatus::Removed => write!(f, "removed"),
            ChangeStatus::Untracked => write!(f, "untracked"),
            ChangeStatus::Ignored => write!(f, "ignored"),
        }
    }
}

/// Aggregated absolute path → status mapping across every subscribed tree.
pub type FileChangeMap = BTreeMap<PathBuf, ChangeStatus>;

// ---------------------------------------------------------------------------
// Active file state
// ---------------------------------------------------------------------------

/// Opaque, provider-supplied overlay attached to a diff state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overlay(pub serde_json::Value);

impl From<serde_json::Value> for Overlay {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Snapshot of the active file's diff state.
///
/// Published to subscribers behind an `Arc`; never mutated once handed out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDiffState {
    pub file_path: PathBuf,
    pub old_contents: String,
    pub new_contents: String,
    /// `None` while annotations are still being composed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Overlay>>,
}

impl FileDiffState {
    /// State with no active file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// State for a freshly activated file, before any content has arrived.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            ..Self::default()
        }
    }

    pub fn has_active_file(&self) -> bool {
        self.file_path != Path::new("")
    }
}

/// Result of a storage `stat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
}

impl FileStat {
    pub fn file() -> Self {
        Self {
            is_file: true,
            is_directory: false,
        }
    }

    pub fn directory() -> Self {
        Self {
            is_file: false,
            is_directory: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case('A', Some(ChangeStatus::Added))]
    #[case('M', Some(ChangeStatus::Modified))]
    #[case('!', Some(ChangeStatus::Missing))]
    #[case('R', Some(ChangeStatus::Removed))]
    #[case('?', Some(ChangeStatus::Untracked))]
    #[case('I', Some(ChangeStatus::Ignored))]
    #[case('C', None)]
    #[case('x', None)]
    fn status_code_mapping(#[case] code: char, #[case] expected: Option<ChangeStatus>) {
        assert_eq!(ChangeStatus::from_code(StatusCode(code)), expected);
    }

    #[test]
    fn status_code_survives_mapping_back() {
        for status in [ChangeStatus::Added, ChangeStatus::Missing, ChangeStatus::Untracked] {
            assert_eq!(ChangeStatus::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn empty_state_has_no_active_file() {
        let state = FileDiffState::empty();
        assert!(!state.has_active_file());
        assert!(state.old_contents.is_empty());
        assert!(state.new_contents.is_empty());
        assert!(state.annotations.is_none());
    }

    #[test]
    fn for_path_starts_without_content() {
        let state = FileDiffState::for_path("/repo/src/main.rs");
        assert!(state.has_active_file());
        assert_eq!(state.file_path, PathBuf::from("/repo/src/main.rs"));
        assert!(state.new_contents.is_empty());
    }

    #[test]
    fn diff_state_json_omits_pending_annotations() {
        let state = FileDiffState::for_path("/repo/a.txt");
        let json = serde_json::to_value(&state).expect("serialize");
        assert!(json.get("annotations").is_none());
        assert_eq!(json["file_path"], "/repo/a.txt");
    }

    #[test]
    fn kind_display() {
        assert_eq!(RepositoryKind::hg().to_string(), "hg");
        assert_eq!(ChangeStatus::Untracked.to_string(), "untracked");
    }
}
