//! Prefix sources and the prefix file format
//!
//! The wire format is a UTF-8 text file with one path prefix per line. Blank
//! lines and lines whose first non-whitespace byte is `#` are ignored.
//! Entries are normalized to a single leading `/` with no trailing `/`.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Well-known relative path of the prefix file on a remote repository.
pub const PREFIX_FILE_PATH: &str = ".meta/prefixes.txt";

/// The set of path prefixes a repository is known to serve, or the explicit
/// absence of that knowledge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrefixSource {
    /// No prefix list has been fetched/published, or the remote serves none.
    #[default]
    Absent,
    Published {
        entries: BTreeSet<String>,
        updated_at: DateTime<Utc>,
    },
}

impl PrefixSource {
    /// Build a published source from raw entries, normalizing each.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PrefixSource::Published {
            entries: entries
                .into_iter()
                .filter_map(|e| normalize_prefix(e.as_ref()))
                .collect(),
            updated_at: Utc::now(),
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self, PrefixSource::Published { .. })
    }

    /// Entries in sorted order; empty for an absent source.
    pub fn read_entries(&self) -> Vec<String> {
        match self {
            PrefixSource::Absent => Vec::new(),
            PrefixSource::Published { entries, .. } => entries.iter().cloned().collect(),
        }
    }

    /// Whether a path falls under any published prefix. An absent source
    /// matches everything: no knowledge must never hide content.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PrefixSource::Absent => true,
            PrefixSource::Published { entries, .. } => {
                let path = normalize_prefix(path).unwrap_or_else(|| "/".to_string());
                entries.iter().any(|prefix| {
                    prefix == "/"
                        || path == *prefix
                        || path.starts_with(&format!("{prefix}/"))
                })
            }
        }
    }

    /// Union of several sources. Exists only if every input exists; one
    /// member without a prefix list degrades the whole view to unknown.
    pub fn merged<'a>(sources: impl IntoIterator<Item = &'a PrefixSource>) -> PrefixSource {
        let mut entries = BTreeSet::new();
        for source in sources {
            match source {
                PrefixSource::Absent => return PrefixSource::Absent,
                PrefixSource::Published { entries: e, .. } => entries.extend(e.iter().cloned()),
            }
        }
        PrefixSource::Published {
            entries,
            updated_at: Utc::now(),
        }
    }
}

/// Parse the prefix file body into normalized entries.
pub fn parse_prefix_file(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(normalize_prefix)
        .collect()
}

/// Normalize one raw prefix; `None` for entries that reduce to nothing.
fn normalize_prefix(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}
