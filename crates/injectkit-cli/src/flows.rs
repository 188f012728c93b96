use std::path::Path;

use anyhow::{anyhow, Context, Result};
use injectkit_core::{ArchiveCodec, InjectionTarget, ScriptPayload};
use injectkit_installer::{
    ExclusiveOpenProbe, InjectionStep, LockProbe, ScriptInjector, StateLayout,
};
use injectkit_updates::{LocalStateStore, ScriptSource, UpdateDecision, UpdateSession};
use tracing::debug;

use crate::render::TerminalRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InstallOutcome {
    UpToDate,
    Installed { content_hash: String },
}

/// One run's update session plus the pieces it drives. The session lives as
/// long as the pipeline.
pub(crate) struct Pipeline<S, C, P = ExclusiveOpenProbe> {
    source: S,
    store: LocalStateStore,
    session: UpdateSession,
    injector: ScriptInjector<C, P>,
    target: Option<InjectionTarget>,
}

impl<S: ScriptSource, C: ArchiveCodec, P: LockProbe> Pipeline<S, C, P> {
    pub(crate) fn new(
        source: S,
        store: LocalStateStore,
        injector: ScriptInjector<C, P>,
        target: Option<InjectionTarget>,
    ) -> Self {
        Self {
            source,
            store,
            session: UpdateSession::new(),
            injector,
            target,
        }
    }

    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn store(&self) -> &LocalStateStore {
        &self.store
    }

    pub(crate) fn target(&self) -> Option<&InjectionTarget> {
        self.target.as_ref()
    }

    pub(crate) fn check(&mut self, force: bool) -> UpdateDecision {
        self.session
            .check_for_updates(&self.source, &self.store, force)
    }

    pub(crate) fn install_update(
        &mut self,
        on_step: impl FnMut(InjectionStep),
    ) -> Result<InstallOutcome> {
        let target = self.require_target()?.clone();

        let decision = self.check(false);
        if decision.errored {
            return Err(anyhow!("could not determine whether a script update is available"));
        }
        if !decision.available {
            return Ok(InstallOutcome::UpToDate);
        }

        let payload = match self.session.last_fetched() {
            Some(payload) => payload.clone(),
            None => self
                .source
                .fetch()
                .context("failed fetching script data")?,
        };
        let script = payload.decode_script()?;

        // Local state names the injected script before the archive changes.
        self.store.write(&payload)?;
        self.inject(&target, &script, on_step)?;
        self.session.mark_installed();

        Ok(InstallOutcome::Installed {
            content_hash: payload.content_hash,
        })
    }

    pub(crate) fn reinstall_script(
        &mut self,
        on_step: impl FnMut(InjectionStep),
    ) -> Result<String> {
        let target = self.require_target()?.clone();
        let payload = self
            .session
            .resolve_script(&self.source, &self.store)?;
        let script = payload.decode_script()?;
        self.inject(&target, &script, on_step)?;
        Ok(payload.content_hash)
    }

    fn inject(
        &self,
        target: &InjectionTarget,
        script: &str,
        on_step: impl FnMut(InjectionStep),
    ) -> Result<()> {
        debug!(archive = %target.archive_path.display(), "injecting script");
        self.injector
            .inject_with_progress(target, script, on_step)
            .map_err(|err| {
                let step = err.step();
                anyhow::Error::new(err)
                    .context(format!("injection stopped at step '{}'", step.as_str()))
            })
    }

    fn require_target(&self) -> Result<&InjectionTarget> {
        self.target.as_ref().ok_or_else(|| {
            anyhow!("no archive directory configured; pass --archive-dir or set layout.archive_dir")
        })
    }
}

pub(crate) fn run_check_command<S: ScriptSource, C: ArchiveCodec, P: LockProbe>(
    pipeline: &mut Pipeline<S, C, P>,
    renderer: TerminalRenderer,
    force: bool,
) -> bool {
    let decision = pipeline.check(force);
    let (status, message) = format_check_outcome(decision);
    renderer.print_status(status, message);
    !decision.errored
}

pub(crate) fn run_install_command<S: ScriptSource, C: ArchiveCodec, P: LockProbe>(
    pipeline: &mut Pipeline<S, C, P>,
    renderer: TerminalRenderer,
) -> bool {
    let mut progress = renderer.start_injection();
    let result = pipeline.install_update(|step| progress.step(step));
    progress.finish(matches!(result, Ok(InstallOutcome::Installed { .. })));

    match result {
        Ok(InstallOutcome::UpToDate) => {
            renderer.print_status("ok", "no updates available; the installed script is current");
            true
        }
        Ok(InstallOutcome::Installed { content_hash }) => {
            renderer.print_status("ok", &format!("installed script {content_hash}"));
            true
        }
        Err(err) => {
            renderer.print_status("error", &format!("install failed: {err:#}"));
            false
        }
    }
}

pub(crate) fn run_reinstall_command<S: ScriptSource, C: ArchiveCodec, P: LockProbe>(
    pipeline: &mut Pipeline<S, C, P>,
    renderer: TerminalRenderer,
) -> bool {
    let mut progress = renderer.start_injection();
    let result = pipeline.reinstall_script(|step| progress.step(step));
    progress.finish(result.is_ok());

    match result {
        Ok(content_hash) => {
            renderer.print_status("ok", &format!("reinstalled script {content_hash}"));
            true
        }
        Err(err) => {
            renderer.print_status("error", &format!("reinstall failed: {err:#}"));
            false
        }
    }
}

pub(crate) fn format_check_outcome(decision: UpdateDecision) -> (&'static str, &'static str) {
    match (decision.errored, decision.available) {
        (true, _) => ("error", "could not check for script updates"),
        (false, true) => ("ok", "a script update is available"),
        (false, false) => ("ok", "the installed script is up to date"),
    }
}

pub(crate) fn format_doctor_lines(
    state: &StateLayout,
    config_path: &Path,
    source_url: &str,
    target: Option<&InjectionTarget>,
    recorded: Option<&ScriptPayload>,
) -> Vec<String> {
    let mut lines = vec![
        format!("state dir: {}", state.root().display()),
        format!("state file: {}", state.script_state_path().display()),
        format!("config: {}", config_path.display()),
        format!("script source: {source_url}"),
    ];
    match target {
        Some(target) => {
            lines.push(format!("archive: {}", target.archive_path.display()));
            lines.push(format!("unpacked dir: {}", target.unpacked_dir.display()));
            lines.push(format!("target file: {}", target.target_file.display()));
        }
        None => lines.push("archive: (not configured)".to_string()),
    }
    lines.push(format!(
        "recorded script: {}",
        recorded
            .map(|payload| payload.content_hash.as_str())
            .unwrap_or("(none)")
    ));
    lines
}
