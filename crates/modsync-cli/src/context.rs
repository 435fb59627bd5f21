//! Install root and settings resolution

use std::path::Path;

use modsync_core::{ClientSettings, DataDir, PersistedSyncState};
use modsync_fs::NormalizedPath;

use crate::cli::Cli;
use crate::error::Result;

/// Version sent to the server and compared with its reported version.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the client operates and with which settings.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: NormalizedPath,
    pub layout: DataDir,
    pub settings: ClientSettings,
}

impl Context {
    /// Resolve the install root and load `Settings.json`, applying any
    /// command-line overrides on top.
    pub fn resolve(cli: &Cli, cwd: &Path) -> Result<Self> {
        let root = match &cli.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd.join(root),
            None => cwd.to_path_buf(),
        };
        let root = dunce::canonicalize(&root).map_err(|e| modsync_fs::Error::io(&root, e))?;
        let root = NormalizedPath::new(root);
        let layout = DataDir::for_root(&root);

        let mut settings = ClientSettings::load(&layout.settings())?;
        if let Some(server) = &cli.server {
            settings.server = server.clone();
        }
        if let Some(identity) = &cli.identity {
            settings.identity = Some(identity.clone());
        }

        tracing::debug!(root = %root, server = %settings.server, "Resolved client context");
        Ok(Self {
            root,
            layout,
            settings,
        })
    }

    pub fn state(&self) -> PersistedSyncState {
        PersistedSyncState::new(self.layout.clone())
    }
}
