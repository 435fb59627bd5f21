//! Canned responses for clients that predate the current wire format
//!
//! Old clients cannot parse today's sync path or catalog shapes, but they
//! can still be told to update the updater and the plugin. Payloads are
//! keyed by the client's semantic version; a client that sends no version at
//! all predates version reporting and gets the legacy payload.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, Result};

/// Bodies for `/sync/paths` and `/sync/hashes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPayload {
    /// Client version this payload is for; `None` for clients that send no
    /// version header
    #[serde(default)]
    pub version: Option<Version>,
    pub sync_paths: Value,
    pub hashes: Value,
}

#[derive(Debug, Clone)]
pub struct FallbackRegistry {
    baseline: Version,
    legacy: Option<FallbackPayload>,
    versions: BTreeMap<Version, FallbackPayload>,
}

impl FallbackRegistry {
    /// An empty registry: every client with a version at or above `baseline`
    /// gets live data.
    pub fn new(baseline: Version) -> Self {
        Self {
            baseline,
            legacy: None,
            versions: BTreeMap::new(),
        }
    }

    /// Payloads for the releases before the current wire format.
    pub fn with_builtins(baseline: Version) -> Self {
        let mut registry = Self::new(baseline);
        for payload in builtin_payloads() {
            registry.register(payload);
        }
        registry
    }

    /// Add or replace a payload.
    pub fn register(&mut self, payload: FallbackPayload) {
        match payload.version.clone() {
            Some(version) => {
                self.versions.insert(version, payload);
            }
            None => self.legacy = Some(payload),
        }
    }

    pub fn baseline(&self) -> &Version {
        &self.baseline
    }

    /// The payload to serve instead of live data, if any.
    ///
    /// # Errors
    ///
    /// A header that is present but not a semantic version is rejected
    /// rather than guessed at.
    pub fn resolve(&self, header: Option<&str>) -> Result<Option<&FallbackPayload>> {
        let Some(raw) = header else {
            return Ok(self.legacy.as_ref());
        };

        let trimmed = raw.trim();
        let version = Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).map_err(|e| {
            Error::InvalidVersion {
                version: raw.to_string(),
                reason: e.to_string(),
            }
        })?;

        if version >= self.baseline {
            return Ok(None);
        }

        Ok(self
            .versions
            .range(..=version)
            .next_back()
            .map(|(_, payload)| payload)
            .or(self.legacy.as_ref()))
    }
}

/// Old releases only knew about the plugin and the updater. Their catalogs
/// carry a hash no real file has, so they always download both.
fn builtin_payloads() -> Vec<FallbackPayload> {
    let legacy = FallbackPayload {
        version: None,
        sync_paths: json!([
            "BepInEx\\plugins\\Corter-ModSync.dll",
            "ModSync.Updater.exe",
        ]),
        hashes: json!({
            "BepInEx\\plugins\\Corter-ModSync.dll": { "crc": 999999999 },
            "ModSync.Updater.exe": { "crc": 999999999 },
        }),
    };

    let tagged_paths = json!([
        {
            "enabled": true,
            "enforced": true,
            "path": "BepInEx\\plugins\\Corter-ModSync.dll",
            "restartRequired": true,
            "silent": false,
        },
        {
            "enabled": true,
            "enforced": true,
            "path": "ModSync.Updater.exe",
            "restartRequired": false,
            "silent": false,
        },
    ]);
    let tagged_hashes = json!({
        "BepInEx\\plugins\\Corter-ModSync.dll": {
            "BepInEx\\plugins\\Corter-ModSync.dll": { "crc": 999999999, "nosync": false },
        },
        "ModSync.Updater.exe": {
            "ModSync.Updater.exe": { "crc": 999999999, "nosync": false },
        },
    });

    let mut payloads = vec![legacy];
    for patch in 0..=2 {
        payloads.push(FallbackPayload {
            version: Some(Version::new(0, 8, patch)),
            sync_paths: tagged_paths.clone(),
            hashes: tagged_hashes.clone(),
        });
    }
    payloads
}
