pub mod api;
pub mod countdown;
pub mod error;
pub mod state;
pub mod sync;

// Convenience re-exports
pub use api::backend::{Cloud, RemoteStore};
pub use api::client::SupabaseClient;
pub use error::{KeepsakeError, Result};
pub use state::{AppState, AppStore, CoupleId, Identity};
pub use sync::{SyncEngine, SyncHandle, SyncStatus};
