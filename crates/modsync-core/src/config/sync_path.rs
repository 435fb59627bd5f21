//! Named, policy-tagged sync roots

use std::collections::HashSet;

use modsync_fs::{fold_key, sanitize_relative};
use serde::{Deserialize, Serialize};

use crate::{Error, ExclusionSet, Result};

/// Characters that may not appear in a sync path's display name.
const RESERVED_NAME_CHARS: &[char] = &['\n', '\t', '\\', '"', '\'', '[', ']'];

/// A named root, relative to the install root, whose contents are kept in
/// step with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPathSpec {
    /// Root-relative path with forward slashes
    pub path: String,
    /// Display name; empty means "use the path"
    #[serde(default)]
    pub name: String,
    /// Default for the client-side toggle
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Clients cannot opt out, and local exclusions do not apply
    #[serde(default)]
    pub enforced: bool,
    /// Changes apply without asking
    #[serde(default)]
    pub silent: bool,
    /// Changes are staged for the external updater
    #[serde(default = "default_true")]
    pub restart_required: bool,
}

fn default_true() -> bool {
    true
}

impl SyncPathSpec {
    /// A spec with the defaults an operator gets for a table entry.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into().replace('\\', "/");
        Self {
            name: path.clone(),
            path,
            enabled: true,
            enforced: false,
            silent: false,
            restart_required: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn enforced(mut self, enforced: bool) -> Self {
        self.enforced = enforced;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn restart_required(mut self, restart_required: bool) -> Self {
        self.restart_required = restart_required;
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.path
        } else {
            &self.name
        }
    }

    /// Case-insensitive identity of this path.
    pub fn key(&self) -> String {
        fold_key(self.path.trim_end_matches(['/', '\\']))
    }

    /// Effective enablement given the user's toggle, if any.
    pub fn is_enabled_with(&self, toggle: Option<bool>) -> bool {
        self.enforced || toggle.unwrap_or(self.enabled)
    }

    /// Check that the path is relative and stays inside the install root.
    ///
    /// Returns the path in its cleaned, forward-slash form.
    pub fn validate_location(&self) -> Result<String> {
        sanitize_relative(&self.path).map_err(|e| Error::InvalidSyncPath {
            path: self.path.clone(),
            reason: match e {
                modsync_fs::Error::PathTraversal { .. } => {
                    "sync paths must be relative to and inside the install root".into()
                }
                other => other.to_string(),
            },
        })
    }
}

/// Validate a full sync path list against the configured exclusions.
///
/// Rejects duplicate paths, absolute or escaping paths, names with reserved
/// characters and paths that are also listed verbatim as exclusions.
pub fn validate_sync_paths(specs: &[SyncPathSpec], exclusions: &[String]) -> Result<()> {
    let invalid = |spec: &SyncPathSpec, reason: String| Error::InvalidSyncPath {
        path: spec.path.clone(),
        reason,
    };

    ExclusionSet::compile(exclusions)?;

    let mut seen = HashSet::new();
    for spec in specs {
        spec.validate_location()?;

        if spec.name.contains(RESERVED_NAME_CHARS) {
            return Err(invalid(
                spec,
                format!(
                    "name '{}' contains a reserved character (newline, tab, \\ \" ' [ ])",
                    spec.name
                ),
            ));
        }

        if !seen.insert(spec.key()) {
            return Err(invalid(spec, "sync paths must be unique".into()));
        }

        if exclusions.iter().any(|e| e == &spec.path) {
            return Err(invalid(
                spec,
                "path is both a sync path and an exclusion; remove it from one of the lists".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_shape_is_camel_case() {
        let spec = SyncPathSpec::new("BepInEx/plugins").restart_required(false);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "BepInEx/plugins",
                "name": "BepInEx/plugins",
                "enabled": true,
                "enforced": false,
                "silent": false,
                "restartRequired": false,
            })
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let spec: SyncPathSpec = serde_json::from_str(r#"{"path": "user/mods"}"#).unwrap();
        assert!(spec.enabled);
        assert!(spec.restart_required);
        assert!(!spec.enforced);
        assert_eq!(spec.display_name(), "user/mods");
    }

    #[test]
    fn enforced_paths_ignore_the_toggle() {
        let optional = SyncPathSpec::new("user/mods").enabled(false);
        assert!(!optional.is_enabled_with(None));
        assert!(optional.is_enabled_with(Some(true)));

        let enforced = SyncPathSpec::new("BepInEx/plugins").enforced(true);
        assert!(enforced.is_enabled_with(Some(false)));
    }

    #[test]
    fn validation_rejects_each_class_of_mistake() {
        let no_exclusions: Vec<String> = Vec::new();
        let cases = [
            vec![SyncPathSpec::new("/abs/path")],
            vec![SyncPathSpec::new("../outside")],
            vec![SyncPathSpec::new("a"), SyncPathSpec::new("A")],
            vec![SyncPathSpec::new("a").with_name("bad [name]")],
        ];
        for specs in cases {
            assert!(validate_sync_paths(&specs, &no_exclusions).is_err(), "{specs:?}");
        }

        let clash = vec![SyncPathSpec::new("user/mods")];
        assert!(validate_sync_paths(&clash, &["user/mods".to_string()]).is_err());

        let bad_glob = vec![SyncPathSpec::new("user/mods")];
        assert!(matches!(
            validate_sync_paths(&bad_glob, &["a/***".to_string()]),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn validation_accepts_nested_paths() {
        let specs = vec![
            SyncPathSpec::new("BepInEx/plugins/Corter-ModSync.dll"),
            SyncPathSpec::new("BepInEx/plugins"),
        ];
        validate_sync_paths(&specs, &["BepInEx/plugins/spt".to_string()]).unwrap();
    }
}
