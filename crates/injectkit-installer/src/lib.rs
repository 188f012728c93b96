mod injector;
mod layout;
mod lock;

pub use injector::{InjectError, InjectionStep, ScriptInjector};
pub use layout::{default_state_dir, StateLayout};
pub use lock::{
    ExclusiveOpenProbe, FileLockWaiter, LockProbe, DEFAULT_LOCK_MAX_WAIT,
    DEFAULT_LOCK_POLL_INTERVAL,
};
