//! Glob-style exclusion patterns
//!
//! Patterns are relative paths with `*` (anything inside one segment), `?`
//! (one character inside a segment), `**` (any number of segments), `[ab]`
//! classes and `{a,b}` alternatives, compiled into one `globset::GlobSet`.
//! Matching is case-insensitive and always runs against a forward-slash
//! relative path, so a pattern written on the server behaves the same on a
//! Windows client.
//!
//! A pattern that names a directory excludes the whole subtree: the catalog
//! walk prunes at the first excluded ancestor, and flat remote catalogs are
//! filtered with [`ExclusionSet::matches_prefix`].

use std::sync::Arc;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use modsync_fs::NormalizedPath;

use crate::{Error, Result};

/// An ordered, compiled list of exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    globs: GlobSet,
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            globs: GlobSet::empty(),
        }
    }
}

impl ExclusionSet {
    /// A set that excludes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every pattern, failing on the first malformed one.
    pub fn compile<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut sources = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = check_pattern(pattern)?;

            // `dir/**` also names `dir` itself.
            let mut variants = vec![glob.as_str()];
            if let Some(dir) = glob.strip_suffix("/**") {
                variants.push(dir);
            }
            for variant in variants {
                let compiled = GlobBuilder::new(variant)
                    .literal_separator(true)
                    .case_insensitive(true)
                    .backslash_escape(false)
                    .build()
                    .map_err(|e| Error::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: e.kind().to_string(),
                    })?;
                builder.add(compiled);
            }
            sources.push(pattern.to_string());
        }

        let globs = builder.build().map_err(|e| Error::InvalidPattern {
            pattern: e.glob().unwrap_or_default().to_string(),
            reason: e.kind().to_string(),
        })?;
        tracing::debug!(count = sources.len(), "Compiled exclusion patterns");
        Ok(Self {
            patterns: sources,
            globs,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `relative` itself matches any pattern.
    pub fn matches(&self, relative: &str) -> bool {
        if self.globs.is_empty() {
            return false;
        }
        self.globs.is_match(normalize(relative))
    }

    /// Whether `relative` or any of its ancestors matches a pattern.
    ///
    /// Used on flat catalogs, where the pruning a directory walk would do has
    /// to be reproduced per entry.
    pub fn matches_prefix(&self, relative: &str) -> bool {
        if self.globs.is_empty() {
            return false;
        }
        let relative = normalize(relative);
        let mut end = 0;
        for segment in relative.split('/') {
            end += segment.len();
            if self.globs.is_match(&relative[..end]) {
                return true;
            }
            end += 1;
        }
        false
    }
}

/// An [`ExclusionSet`] bound to the directory its patterns are relative to.
///
/// Server-global exclusions are evaluated against the sync root; mod-local
/// exclusions for an identity overlay are evaluated against the overlay root.
/// The compiled patterns are shared, only the base differs.
#[derive(Debug, Clone)]
pub struct ExclusionMatcher {
    base: NormalizedPath,
    sets: Vec<Arc<ExclusionSet>>,
}

impl ExclusionMatcher {
    /// Evaluate `set` relative to the sync root.
    pub fn global(root: &NormalizedPath, set: Arc<ExclusionSet>) -> Self {
        Self {
            base: root.clone(),
            sets: vec![set],
        }
    }

    /// Evaluate `set` relative to an overlay directory that mirrors the root.
    pub fn mod_local(overlay_root: &NormalizedPath, set: Arc<ExclusionSet>) -> Self {
        Self {
            base: overlay_root.clone(),
            sets: vec![set],
        }
    }

    /// Also exclude whatever `set` matches, relative to the same base.
    pub fn with_set(mut self, set: Arc<ExclusionSet>) -> Self {
        self.sets.push(set);
        self
    }

    pub fn base(&self) -> &NormalizedPath {
        &self.base
    }

    /// Match a path already relative to [`base`](Self::base).
    pub fn matches(&self, relative: &str) -> bool {
        self.sets.iter().any(|set| set.matches(relative))
    }

    /// Whether `path` or any of its ancestors below the base is excluded.
    ///
    /// Used before walking a sync path, whose root the walk itself never
    /// tests.
    pub fn excludes_tree(&self, path: &NormalizedPath) -> bool {
        match path.strip_base(&self.base) {
            Some(relative) if !relative.is_empty() => {
                self.sets.iter().any(|set| set.matches_prefix(&relative))
            }
            _ => false,
        }
    }

    /// Match an absolute path. Paths outside the base never match.
    pub fn matches_path(&self, path: &NormalizedPath) -> bool {
        match path.strip_base(&self.base) {
            Some(relative) if !relative.is_empty() => self.matches(&relative),
            _ => false,
        }
    }
}

fn normalize(relative: &str) -> String {
    let unified = relative.replace('\\', "/");
    unified
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}

/// Reject patterns that could never match a relative path, returning the
/// slash-normalized glob.
fn check_pattern(pattern: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let glob = pattern.replace('\\', "/");
    let glob = glob.trim_end_matches('/');
    if glob.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }
    let bytes = glob.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if glob.starts_with('/') || has_drive {
        return Err(invalid("pattern must be relative"));
    }
    if glob.split('/').any(|segment| segment == "..") {
        return Err(invalid("pattern must not contain '..'"));
    }
    if glob.contains("***") {
        return Err(invalid("'***' is not a valid wildcard"));
    }
    Ok(glob.to_string())
}
