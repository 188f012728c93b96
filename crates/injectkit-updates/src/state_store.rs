use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use injectkit_core::ScriptPayload;
use tracing::warn;

/// Last installed payload on disk. Single process, single writer.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    path: PathBuf,
}

impl LocalStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Option<ScriptPayload> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "no local script state recorded yet");
                return None;
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "local script state is unreadable; treating it as absent"
                );
                return None;
            }
        };

        match serde_json::from_str::<ScriptPayload>(&raw) {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "local script state is invalid (was it edited?); it will be overwritten"
                );
                None
            }
        }
    }

    pub fn write(&self, payload: &ScriptPayload) -> Result<()> {
        let content = serde_json::to_string_pretty(payload).with_context(|| {
            format!("failed serializing local script state: {}", self.path.display())
        })?;
        fs::write(&self.path, content).with_context(|| {
            format!("failed writing local script state: {}", self.path.display())
        })
    }

    pub fn create_dir_and_write(&self, payload: &ScriptPayload) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory: {}", parent.display())
            })?;
        }
        self.write(payload)
    }
}
