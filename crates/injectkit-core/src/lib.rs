mod codec;
mod payload;
mod splice;
mod target;
mod wrapper;

pub use codec::ArchiveCodec;
pub use payload::ScriptPayload;
pub use splice::{count_delimiters, splice_injection, split_injection, SCRIPT_DELIMITER};
pub use target::{InjectionTarget, TargetLayout};
pub use wrapper::InjectionWrapper;
