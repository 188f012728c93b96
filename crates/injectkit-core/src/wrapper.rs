use anyhow::{anyhow, Result};

pub const DEFAULT_PRECONDITION: &str = "mainWindow";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_HANDLE: &str = "__INJECTKIT_INTERVAL__";

/// Polls in the target's runtime until the precondition object exists, then
/// runs the script body once and clears its own interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionWrapper {
    precondition: String,
    poll_interval_ms: u64,
    handle: String,
}

impl Default for InjectionWrapper {
    fn default() -> Self {
        Self {
            precondition: DEFAULT_PRECONDITION.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            handle: DEFAULT_HANDLE.to_string(),
        }
    }
}

impl InjectionWrapper {
    pub fn new(precondition: &str, poll_interval_ms: u64, handle: &str) -> Result<Self> {
        validate_js_identifier(precondition, "precondition")?;
        validate_js_identifier(handle, "interval handle")?;
        if poll_interval_ms == 0 {
            return Err(anyhow!("wrapper poll interval must be greater than zero"));
        }

        Ok(Self {
            precondition: precondition.to_string(),
            poll_interval_ms,
            handle: handle.to_string(),
        })
    }

    pub fn precondition(&self) -> &str {
        &self.precondition
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    // Leading newline keeps the wrapper off the delimiter's comment line.
    pub fn render(&self, script: &str) -> String {
        format!(
            "\nconst {handle}=setInterval(() => {{if({precondition}) {{ clearInterval({handle});{script}}} }}, {interval});",
            handle = self.handle,
            precondition = self.precondition,
            script = script,
            interval = self.poll_interval_ms,
        )
    }
}

pub(crate) fn validate_js_identifier(value: &str, label: &str) -> Result<()> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(anyhow!("invalid {label}: must not be empty"));
    };
    let valid_start = first.is_ascii_alphabetic() || first == '_' || first == '$';
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid_start || !valid_rest {
        return Err(anyhow!(
            "invalid {label} '{value}': use ASCII letters, digits, '_' or '$', not starting with a digit"
        ));
    }
    Ok(())
}
