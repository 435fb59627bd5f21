//! Settings and state files: JSON for `ModSync_Data`, TOML for the server

use crate::{Error, NormalizedPath, Result, io};
use serde::{Serialize, de::DeserializeOwned};

/// On-disk format of a settings or state file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// The format for `path`, matched case-insensitively on its extension.
    pub fn for_path(path: &NormalizedPath) -> Result<Self> {
        let extension = path.extension().unwrap_or("");
        match extension.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            _ => Err(Error::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Toml => "TOML",
        }
    }

    fn parse<T: DeserializeOwned>(self, path: &NormalizedPath, content: &str) -> Result<T> {
        // Files edited on Windows often carry a UTF-8 byte order mark.
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let parsed = match self {
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| Error::ConfigParse {
            path: path.to_native(),
            format: self.name().into(),
            message,
        })
    }

    fn render<T: Serialize>(self, path: &NormalizedPath, value: &T) -> Result<String> {
        let rendered = match self {
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
        };
        rendered.map_err(|message| Error::ConfigSerialize {
            path: path.to_native(),
            format: self.name().into(),
            message,
        })
    }
}

/// Reads and atomically rewrites settings and state files.
///
/// Writes go through [`io::write_atomic`], so a crash mid-save leaves the
/// previous file intact and concurrent saves of one file are serialized.
#[derive(Debug, Default)]
pub struct ConfigStore {
    robustness: io::RobustnessConfig,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a file that must exist.
    pub fn load<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<T> {
        let format = Format::for_path(path)?;
        let content = io::read_text(path)?;
        format.parse(path, &content)
    }

    /// Load a file, or `None` when it is absent. A file that exists but does
    /// not parse is still an error.
    pub fn load_if_exists<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<Option<T>> {
        if path.exists() {
            self.load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Load a file, falling back to `T::default()` when it is absent.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, path: &NormalizedPath) -> Result<T> {
        Ok(self.load_if_exists(path)?.unwrap_or_default())
    }

    /// Load a file, first writing `init()` to it when it is absent so the
    /// operator has something to edit.
    pub fn load_or_init<T, F>(&self, path: &NormalizedPath, init: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.load_if_exists(path)? {
            return Ok(value);
        }

        let value = init();
        self.save(path, &value)?;
        tracing::info!(path = %path, "Wrote default file");
        Ok(value)
    }

    /// Save `value` in the format named by the extension.
    pub fn save<T: Serialize>(&self, path: &NormalizedPath, value: &T) -> Result<()> {
        let format = Format::for_path(path)?;
        let content = format.render(path, value)?;
        io::write_atomic(path, content.as_bytes(), self.robustness)
    }
}
