//! Conflict-marker annotations.
//!
//! Flags Git-style merge conflict regions left in the working copy:
//!
//! ```text
//! <<<<<<< ours
//! ...
//! ||||||| base        (optional, diff3 style)
//! ...
//! =======
//! ...
//! >>>>>>> theirs
//! ```

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use difftrack_core::{AnnotationProvider, Overlay};

const MARKER_START: &str = "<<<<<<<";
const MARKER_BASE: &str = "|||||||";
const MARKER_SEPARATOR: &str = "=======";
const MARKER_END: &str = ">>>>>>>";

/// One overlay per complete conflict region, with 1-based line numbers.
#[derive(Debug, Default)]
pub struct ConflictMarkerProvider;

#[async_trait]
impl AnnotationProvider for ConflictMarkerProvider {
    fn name(&self) -> &str {
        "conflict-markers"
    }

    async fn provide(&self, path: &Path) -> anyhow::Result<Vec<Overlay>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(conflict_regions(&contents)
            .into_iter()
            .map(|region| {
                Overlay(json!({
                    "kind": "conflict",
                    "start_line": region.start,
                    "separator_line": region.separator,
                    "end_line": region.end,
                }))
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    start: usize,
    separator: usize,
    end: usize,
}

/// Unterminated or out-of-order markers are ignored.
fn conflict_regions(contents: &str) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut start = None;
    let mut separator = None;
    for (index, line) in contents.lines().enumerate() {
        let number = index + 1;
        if line.starts_with(MARKER_START) {
            start = Some(number);
            separator = None;
        } else if line.starts_with(MARKER_BASE) {
            continue;
        } else if line == MARKER_SEPARATOR || line.starts_with(&format!("{MARKER_SEPARATOR} ")) {
            if start.is_some() {
                separator = Some(number);
            }
        } else if line.starts_with(MARKER_END) {
            if let (Some(start), Some(separator)) = (start, separator) {
                regions.push(Region {
                    start,
                    separator,
                    end: number,
                });
            }
            start = None;
            separator = None;
        }
    }
    regions
}
