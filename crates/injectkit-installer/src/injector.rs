use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use injectkit_core::{splice_injection, ArchiveCodec, InjectionTarget, InjectionWrapper};
use tracing::debug;

use crate::lock::{ExclusiveOpenProbe, FileLockWaiter, LockProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionStep {
    WaitForArchiveUnlock,
    Unpack,
    WaitForTargetUnlock,
    MutateTarget,
    Pack,
}

impl InjectionStep {
    pub const ALL: [InjectionStep; 5] = [
        Self::WaitForArchiveUnlock,
        Self::Unpack,
        Self::WaitForTargetUnlock,
        Self::MutateTarget,
        Self::Pack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitForArchiveUnlock => "wait-archive",
            Self::Unpack => "unpack",
            Self::WaitForTargetUnlock => "wait-target",
            Self::MutateTarget => "mutate",
            Self::Pack => "pack",
        }
    }

    pub fn position(self) -> u64 {
        match self {
            Self::WaitForArchiveUnlock => 1,
            Self::Unpack => 2,
            Self::WaitForTargetUnlock => 3,
            Self::MutateTarget => 4,
            Self::Pack => 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("{} is still in use after {attempts} checks", path.display())]
    LockTimeout {
        step: InjectionStep,
        path: PathBuf,
        attempts: u64,
    },
    #[error("failed to unpack the archive: {0:#}")]
    Unpack(anyhow::Error),
    #[error("failed to {action} {}: {source}", path.display())]
    Mutate {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to pack the archive: {0:#}")]
    Pack(anyhow::Error),
}

impl InjectError {
    pub fn step(&self) -> InjectionStep {
        match self {
            Self::LockTimeout { step, .. } => *step,
            Self::Unpack(_) => InjectionStep::Unpack,
            Self::Mutate { .. } => InjectionStep::MutateTarget,
            Self::Pack(_) => InjectionStep::Pack,
        }
    }
}

/// Runs the injection steps strictly in order. The first failure stops the
/// run; completed steps are not rolled back.
#[derive(Debug, Clone)]
pub struct ScriptInjector<C, P = ExclusiveOpenProbe> {
    codec: C,
    waiter: FileLockWaiter<P>,
    max_wait: Duration,
    wrapper: InjectionWrapper,
}

impl<C: ArchiveCodec, P: LockProbe> ScriptInjector<C, P> {
    pub fn new(
        codec: C,
        waiter: FileLockWaiter<P>,
        max_wait: Duration,
        wrapper: InjectionWrapper,
    ) -> Self {
        Self {
            codec,
            waiter,
            max_wait,
            wrapper,
        }
    }

    pub fn inject(&self, target: &InjectionTarget, script: &str) -> Result<(), InjectError> {
        self.inject_with_progress(target, script, |_| {})
    }

    pub fn inject_with_progress(
        &self,
        target: &InjectionTarget,
        script: &str,
        mut on_step: impl FnMut(InjectionStep),
    ) -> Result<(), InjectError> {
        on_step(InjectionStep::WaitForArchiveUnlock);
        self.wait_unlocked(InjectionStep::WaitForArchiveUnlock, &target.archive_path)?;

        on_step(InjectionStep::Unpack);
        self.codec
            .unpack(&target.archive_path, &target.unpacked_dir)
            .map_err(InjectError::Unpack)?;
        debug!(
            archive = %target.archive_path.display(),
            dest = %target.unpacked_dir.display(),
            "archive unpacked"
        );

        // The unpack itself may briefly keep a handle on the target open.
        on_step(InjectionStep::WaitForTargetUnlock);
        self.wait_unlocked(InjectionStep::WaitForTargetUnlock, &target.target_file)?;

        on_step(InjectionStep::MutateTarget);
        self.write_script_to_target(&target.target_file, script)?;

        on_step(InjectionStep::Pack);
        self.codec
            .pack(&target.unpacked_dir, &target.archive_path)
            .map_err(InjectError::Pack)?;
        debug!(archive = %target.archive_path.display(), "archive repacked");

        Ok(())
    }

    fn wait_unlocked(&self, step: InjectionStep, path: &Path) -> Result<(), InjectError> {
        if self.waiter.wait_for_unlock(path, self.max_wait) {
            return Ok(());
        }
        Err(InjectError::LockTimeout {
            step,
            path: path.to_path_buf(),
            attempts: self.waiter.max_attempts(self.max_wait),
        })
    }

    // Full truncate-and-rewrite so a shorter result leaves no stale bytes.
    // Not transactional.
    fn write_script_to_target(&self, path: &Path, script: &str) -> Result<(), InjectError> {
        let source = fs::read_to_string(path).map_err(|source| InjectError::Mutate {
            action: "read",
            path: path.to_path_buf(),
            source,
        })?;

        let spliced = splice_injection(&source, &self.wrapper.render(script));
        fs::write(path, spliced).map_err(|source| InjectError::Mutate {
            action: "write",
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "script written to target");
        Ok(())
    }
}
