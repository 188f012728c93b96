mod coordinator;
mod source;
mod state_store;

pub use coordinator::{UpdateDecision, UpdateSession};
pub use source::{parse_script_payload, HttpScriptSource, ScriptSource};
pub use state_store::LocalStateStore;
