use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Result};

pub const DEFAULT_ARCHIVE_FILE: &str = "core.asar";
pub const DEFAULT_UNPACKED_DIR: &str = "__unpacked";
pub const DEFAULT_TARGET_FILE: &str = "app/mainScreen.js";

/// Names of the archive, its unpack directory, and the injected file, all
/// relative to the resolved installation directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    archive_file: String,
    unpacked_dir: String,
    target_file: String,
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self {
            archive_file: DEFAULT_ARCHIVE_FILE.to_string(),
            unpacked_dir: DEFAULT_UNPACKED_DIR.to_string(),
            target_file: DEFAULT_TARGET_FILE.to_string(),
        }
    }
}

impl TargetLayout {
    pub fn new(archive_file: &str, unpacked_dir: &str, target_file: &str) -> Result<Self> {
        validate_relative(archive_file, "archive_file")?;
        validate_relative(unpacked_dir, "unpacked_dir")?;
        validate_relative(target_file, "target_file")?;
        if normalized(archive_file).starts_with(normalized(unpacked_dir)) {
            return Err(anyhow!(
                "invalid unpacked_dir '{unpacked_dir}': must not contain archive_file '{archive_file}'"
            ));
        }
        Ok(Self {
            archive_file: archive_file.to_string(),
            unpacked_dir: unpacked_dir.to_string(),
            target_file: target_file.to_string(),
        })
    }

    pub fn archive_file(&self) -> &str {
        &self.archive_file
    }

    pub fn unpacked_dir(&self) -> &str {
        &self.unpacked_dir
    }

    pub fn target_file(&self) -> &str {
        &self.target_file
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionTarget {
    pub archive_path: PathBuf,
    pub unpacked_dir: PathBuf,
    pub target_file: PathBuf,
}

impl InjectionTarget {
    pub fn from_archive_dir(archive_dir: &Path, layout: &TargetLayout) -> Self {
        let unpacked_dir = archive_dir.join(&layout.unpacked_dir);
        Self {
            archive_path: archive_dir.join(&layout.archive_file),
            target_file: unpacked_dir.join(&layout.target_file),
            unpacked_dir,
        }
    }
}

fn validate_relative(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("invalid {label}: must not be empty"));
    }
    let escapes = Path::new(value)
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(anyhow!("invalid {label} '{value}': must be a relative path without '..'"));
    }
    if normalized(value).as_os_str().is_empty() {
        return Err(anyhow!("invalid {label} '{value}': must name an entry below the directory"));
    }
    Ok(())
}

fn normalized(value: &str) -> PathBuf {
    Path::new(value)
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect()
}
