//! File-level change detection.
//!
//! A file is re-indexed when it is new, when its fingerprint differs from the recorded one, or
//! when the caller forces it. This runs before any chunking or embedding work.

use std::fmt;

/// What the sync loop should do with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// No fingerprint on record
    New,
    /// Recorded fingerprint matches and the caller did not force
    Unchanged,
    /// Recorded fingerprint differs from the current content
    Modified,
    /// Recorded fingerprint matches but the caller forced re-indexing
    Forced,
}

impl ChangeDecision {
    #[inline]
    pub fn needs_indexing(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Whether vectors already stored for matching chunk hashes may be reused
    #[inline]
    pub fn reuses_stored_vectors(self) -> bool {
        matches!(self, Self::Modified)
    }
}

impl fmt::Display for ChangeDecision {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChangeDecision::New => write!(f, "new"),
            ChangeDecision::Unchanged => write!(f, "unchanged"),
            ChangeDecision::Modified => write!(f, "modified"),
            ChangeDecision::Forced => write!(f, "forced"),
        }
    }
}

/// Compare a file's recorded fingerprint with its current one
#[inline]
pub fn detect(stored: Option<&str>, current: &str, force: bool) -> ChangeDecision {
    match stored {
        None => ChangeDecision::New,
        Some(stored) if stored != current => ChangeDecision::Modified,
        Some(_) if force => ChangeDecision::Forced,
        Some(_) => ChangeDecision::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        assert_eq!(detect(None, "h1", false), ChangeDecision::New);
        assert_eq!(detect(None, "h1", true), ChangeDecision::New);
        assert_eq!(detect(Some("h1"), "h1", false), ChangeDecision::Unchanged);
        assert_eq!(detect(Some("h1"), "h1", true), ChangeDecision::Forced);
        assert_eq!(detect(Some("h1"), "h2", false), ChangeDecision::Modified);
        assert_eq!(detect(Some("h1"), "h2", true), ChangeDecision::Modified);
    }

    #[test]
    fn only_unchanged_is_skipped() {
        assert!(ChangeDecision::New.needs_indexing());
        assert!(ChangeDecision::Modified.needs_indexing());
        assert!(ChangeDecision::Forced.needs_indexing());
        assert!(!ChangeDecision::Unchanged.needs_indexing());
    }

    #[test]
    fn forced_files_re_embed_everything() {
        assert!(ChangeDecision::Modified.reuses_stored_vectors());
        assert!(!ChangeDecision::Forced.reuses_stored_vectors());
        assert!(!ChangeDecision::New.reuses_stored_vectors());
    }
}
