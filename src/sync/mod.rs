pub mod engine;
pub mod status;

#[cfg(test)]
mod test_remote;

pub use engine::{SyncEngine, SyncHandle, DEFAULT_DEBOUNCE};
pub use status::{SyncPhase, SyncStatus};
