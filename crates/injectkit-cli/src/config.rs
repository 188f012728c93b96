use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use injectkit_core::{InjectionWrapper, TargetLayout};
use serde::Deserialize;

pub(crate) const DEFAULT_SCRIPT_URL: &str =
    "https://api.github.com/repos/MWR1/discord-transparency/contents/main/startup-with-discord.js";
pub(crate) const DEFAULT_USER_AGENT: &str = "injectkit-request";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct InjectkitConfig {
    pub(crate) source: SourceConfig,
    pub(crate) lock: LockConfig,
    pub(crate) wrapper: WrapperConfig,
    pub(crate) layout: LayoutConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SourceConfig {
    pub(crate) url: String,
    pub(crate) user_agent: String,
    pub(crate) timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SCRIPT_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LockConfig {
    pub(crate) max_wait_ms: u64,
    pub(crate) poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 10_000,
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct WrapperConfig {
    pub(crate) precondition: String,
    pub(crate) poll_interval_ms: u64,
    pub(crate) handle: String,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        let wrapper = InjectionWrapper::default();
        Self {
            precondition: wrapper.precondition().to_string(),
            poll_interval_ms: wrapper.poll_interval_ms(),
            handle: wrapper.handle().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LayoutConfig {
    pub(crate) archive_dir: Option<PathBuf>,
    pub(crate) archive_file: String,
    pub(crate) unpacked_dir: String,
    pub(crate) target_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let layout = TargetLayout::default();
        Self {
            archive_dir: None,
            archive_file: layout.archive_file().to_string(),
            unpacked_dir: layout.unpacked_dir().to_string(),
            target_file: layout.target_file().to_string(),
        }
    }
}

impl InjectkitConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source.url must not be empty"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(anyhow!("source.user_agent must not be empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(anyhow!("source.timeout_secs must be > 0"));
        }
        if self.lock.poll_interval_ms == 0 {
            return Err(anyhow!("lock.poll_interval_ms must be > 0"));
        }
        if self.lock.max_wait_ms < self.lock.poll_interval_ms {
            return Err(anyhow!(
                "lock.max_wait_ms ({}) must be >= lock.poll_interval_ms ({})",
                self.lock.max_wait_ms,
                self.lock.poll_interval_ms
            ));
        }
        self.injection_wrapper().context("invalid [wrapper] section")?;
        self.target_layout().context("invalid [layout] section")?;
        Ok(())
    }

    pub(crate) fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    pub(crate) fn lock_max_wait(&self) -> Duration {
        Duration::from_millis(self.lock.max_wait_ms)
    }

    pub(crate) fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock.poll_interval_ms)
    }

    pub(crate) fn injection_wrapper(&self) -> Result<InjectionWrapper> {
        InjectionWrapper::new(
            &self.wrapper.precondition,
            self.wrapper.poll_interval_ms,
            &self.wrapper.handle,
        )
    }

    pub(crate) fn target_layout(&self) -> Result<TargetLayout> {
        TargetLayout::new(
            &self.layout.archive_file,
            &self.layout.unpacked_dir,
            &self.layout.target_file,
        )
    }
}

pub(crate) fn parse_config(content: &str) -> Result<InjectkitConfig> {
    let config =
        toml::from_str::<InjectkitConfig>(content).context("failed parsing injectkit config")?;
    config.validate()?;
    Ok(config)
}

/// A missing file yields the defaults.
pub(crate) fn load_config(path: &Path) -> Result<InjectkitConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(InjectkitConfig::default()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed reading config file: {}", path.display()))
        }
    };
    parse_config(&content).with_context(|| format!("invalid config file: {}", path.display()))
}
