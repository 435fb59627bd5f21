//! Normalized path handling for cross-platform compatibility
//!
//! Sync paths travel between Windows clients and arbitrary servers, so every
//! path is held internally with forward slashes and converted to the host
//! convention only at I/O boundaries.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A path normalized to use forward slashes internally.
///
/// Dot segments are resolved on construction. A `..` that would climb above
/// an absolute root is dropped; a leading `..` on a relative path is dropped
/// as well, so a relative `NormalizedPath` can never point above its base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let raw = path.as_ref().to_string_lossy();
        Self { inner: clean(&raw) }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Join this path with a segment, resolving dot segments.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.replace('\\', "/");
        let joined = if self.inner.is_empty() {
            segment
        } else if self.inner.ends_with('/') {
            format!("{}{}", self.inner, segment)
        } else {
            format!("{}/{}", self.inner, segment)
        };
        Self {
            inner: clean(&joined),
        }
    }

    /// Extension of the last segment, if it has one. Dotfiles have none.
    pub fn extension(&self) -> Option<&str> {
        let name = self.inner.trim_end_matches('/').rsplit('/').next()?;
        let idx = name.rfind('.')?;
        if idx == 0 { None } else { Some(&name[idx + 1..]) }
    }

    /// Strip `base` from the front of this path, yielding the relative rest.
    ///
    /// Returns `None` when the path is not underneath `base`. The result is
    /// empty when both paths are equal.
    pub fn strip_base(&self, base: &NormalizedPath) -> Option<String> {
        relative_to(&self.inner, &base.inner).map(str::to_string)
    }

    /// Check if this path exists on the filesystem.
    pub fn exists(&self) -> bool {
        self.to_native().exists()
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.to_native().is_dir()
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.to_native().is_file()
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

/// Split off a root prefix (`/`, `//` for network shares, or `C:/`).
fn split_root(path: &str) -> (&str, &str) {
    if path.starts_with("//") && !path.starts_with("///") {
        return ("//", &path[2..]);
    }
    if path.starts_with('/') {
        return ("/", path.trim_start_matches('/'));
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let rest = path[2..].trim_start_matches('/');
        return (&path[..2], rest);
    }
    ("", path)
}

fn clean(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let (root, rest) = split_root(&unified);

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    match root {
        "" => body,
        "/" | "//" => format!("{root}{body}"),
        drive => format!("{drive}/{body}"),
    }
}

fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() {
        return path.strip_prefix('/');
    }
    let rest = path.strip_prefix(trimmed)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Sanitize a root-relative path received from an untrusted party.
///
/// Backslashes become forward slashes and `.` segments are dropped. Absolute
/// paths, drive-qualified paths, NUL bytes and any `..` that would climb out
/// of the root are rejected as [`Error::PathTraversal`] without touching the
/// filesystem.
pub fn sanitize_relative(input: &str) -> Result<String> {
    let unified = input.replace('\\', "/");

    let (root, rest) = split_root(&unified);
    if !root.is_empty() || unified.contains('\0') {
        return Err(Error::PathTraversal {
            path: input.to_string(),
        });
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::PathTraversal {
                        path: input.to_string(),
                    });
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(Error::InvalidPath {
            path: input.to_string(),
            reason: "path is empty".into(),
        });
    }

    Ok(segments.join("/"))
}

/// Fold a relative path into its case-insensitive identity key.
pub fn fold_key(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Validate that `name` can be used as a single directory name.
///
/// Used for per-identity overlay directories, where the name comes from a
/// request header.
pub fn validate_path_identifier(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(Error::InvalidIdentifier {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.len() > 255 {
        return reject("must be at most 255 bytes");
    }
    if name.starts_with('.') {
        return reject("must not start with '.'");
    }
    if name
        .chars()
        .any(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return reject("contains a reserved character");
    }
    if name.ends_with(' ') {
        return reject("must not end with a space");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backslashes_are_normalized() {
        let path = NormalizedPath::new(r"BepInEx\plugins\a.dll");
        assert_eq!(path.as_str(), "BepInEx/plugins/a.dll");
    }

    #[test]
    fn drive_letters_keep_their_root() {
        let path = NormalizedPath::new(r"C:\Games\..\SPT");
        assert_eq!(path.as_str(), "C:/SPT");
    }

    #[test]
    fn strip_base_is_segment_aware() {
        let base = NormalizedPath::new("/srv/BepInEx/plugins");
        let inside = NormalizedPath::new("/srv/BepInEx/plugins/a.dll");
        let sibling = NormalizedPath::new("/srv/BepInEx/plugins2/a.dll");

        assert_eq!(inside.strip_base(&base).as_deref(), Some("a.dll"));
        assert_eq!(sibling.strip_base(&base), None);
        assert_eq!(base.strip_base(&base).as_deref(), Some(""));
    }

    #[test]
    fn sanitize_keeps_inner_dots() {
        assert_eq!(
            sanitize_relative("BepInEx/./plugins/../config/x.cfg").unwrap(),
            "BepInEx/config/x.cfg"
        );
    }

    #[test]
    fn sanitize_rejects_escape() {
        assert!(matches!(
            sanitize_relative("BepInEx/../../etc/passwd"),
            Err(Error::PathTraversal { .. })
        ));
    }

    #[test]
    fn identifier_rules() {
        assert!(validate_path_identifier("Player_One").is_ok());
        assert!(validate_path_identifier("..").is_err());
        assert!(validate_path_identifier("a/b").is_err());
        assert!(validate_path_identifier("").is_err());
    }
}
