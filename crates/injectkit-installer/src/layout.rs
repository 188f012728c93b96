use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const STATE_DIR_NAME: &str = "injectkit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn script_state_path(&self) -> PathBuf {
        self.root.join("script-state.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}

pub fn default_state_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state directory")?;
        return Ok(PathBuf::from(app_data).join(STATE_DIR_NAME));
    }

    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(config_home).join(STATE_DIR_NAME));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state directory")?;
    Ok(PathBuf::from(home).join(".config").join(STATE_DIR_NAME))
}
