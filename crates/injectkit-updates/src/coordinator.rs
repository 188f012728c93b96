use anyhow::{Context, Result};
use injectkit_core::ScriptPayload;
use tracing::{debug, error, info};

use crate::{LocalStateStore, ScriptSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateDecision {
    pub available: bool,
    pub errored: bool,
}

impl UpdateDecision {
    fn available(available: bool) -> Self {
        Self {
            available,
            errored: false,
        }
    }
}

/// Per-run memory of the last update decision and the last fetched payload,
/// so one session fetches at most once unless forced.
#[derive(Debug, Default)]
pub struct UpdateSession {
    last_available: Option<bool>,
    last_fetched: Option<ScriptPayload>,
}

impl UpdateSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_fetched(&self) -> Option<&ScriptPayload> {
        self.last_fetched.as_ref()
    }

    pub fn cached_decision(&self) -> Option<UpdateDecision> {
        self.last_available.map(UpdateDecision::available)
    }

    pub fn check_for_updates<S: ScriptSource + ?Sized>(
        &mut self,
        source: &S,
        store: &LocalStateStore,
        force: bool,
    ) -> UpdateDecision {
        if let (Some(available), false) = (self.last_available, force) {
            debug!(available, "using cached update decision");
            return UpdateDecision::available(available);
        }

        let fetched = match source.fetch() {
            Ok(fetched) => fetched,
            Err(err) => {
                self.last_fetched = None;
                error!("failed fetching script data: {err:#}");
                return UpdateDecision {
                    available: false,
                    errored: true,
                };
            }
        };
        self.last_fetched = Some(fetched.clone());

        let Some(local) = store.read() else {
            info!(
                path = %store.path().display(),
                "no local script state; recording fetched script"
            );
            if let Err(err) = store.create_dir_and_write(&fetched) {
                error!("failed recording local script state: {err:#}");
                return UpdateDecision {
                    available: true,
                    errored: true,
                };
            }
            self.last_available = Some(true);
            return UpdateDecision::available(true);
        };

        let available = !local.same_version(&fetched);
        debug!(
            local_sha = %local.content_hash,
            remote_sha = %fetched.content_hash,
            available,
            "compared script versions"
        );
        self.last_available = Some(available);
        UpdateDecision::available(available)
    }

    /// Local state now matches the installed script.
    pub fn mark_installed(&mut self) {
        self.last_available = Some(false);
    }

    /// Script for an unconditional reinstall: the recorded payload when one
    /// exists, otherwise a fresh fetch that is recorded first.
    pub fn resolve_script<S: ScriptSource + ?Sized>(
        &mut self,
        source: &S,
        store: &LocalStateStore,
    ) -> Result<ScriptPayload> {
        if let Some(local) = store.read() {
            return Ok(local);
        }

        debug!("no local script state; pulling script from source");
        let fetched = source.fetch().context("failed fetching script data")?;
        self.last_fetched = Some(fetched.clone());
        store
            .create_dir_and_write(&fetched)
            .context("failed recording local script state")?;
        Ok(fetched)
    }
}
