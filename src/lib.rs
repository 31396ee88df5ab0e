mod config;
mod directory;
mod flags;
mod handler;
mod item;
mod memory;
mod observer;
mod queue;
#[cfg(not(target_arch = "wasm32"))]
mod sync;

#[cfg(feature = "web")]
mod web;

use std::io::Result;

pub use config::{
	ConfigError, QueueConfig, DEFAULT_MAX_ITEMS, DEFAULT_STORAGE_KEY, DEFAULT_SYNC_INTERVAL,
};
pub use directory::{DirectoryConfig, DirectoryStorage};
pub use flags::{FeatureFlags, StaticFlags, OFFLINE_QUEUE_V2};
pub use handler::{Handler, HandlerError, HandlerRegistry};
pub use item::{kinds, NewAction, Payload, QueueItem};
pub use memory::MemoryStorage;
pub use observer::{NoopObserver, QueueEvent, QueueObserver};
pub use queue::{FlushReport, MutationQueue};
#[cfg(not(target_arch = "wasm32"))]
pub use sync::{BackgroundSync, SyncHandle, SyncSlot};

// MaybeSend trait - allows Send bound on native, but is a no-op on WASM
// since WASM is single-threaded and doesn't need Send.
//
// This enables WebStorage (which holds a web_sys::Storage handle) to work with
// MutationQueue on WASM targets while still requiring Send on native targets
// where multi-threaded access is possible.

/// A trait that requires `Send` on native targets but is automatically
/// implemented for all types on WASM targets.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

#[cfg(feature = "web")]
pub use web::{PersistenceState, WebStorage};

/// A synchronous key-value medium holding serialized queue blobs.
///
/// The queue only ever reads and writes whole values under a single key, so
/// backends don't need partial updates or transactions. Implementations report
/// failures through `io::Result`; the queue decides whether to swallow them.
///
/// This trait requires `MaybeSend`, which means:
/// - On native targets: implementations must be `Send` (thread-safe)
/// - On WASM targets: no restrictions (single-threaded environment)
pub trait Storage: MaybeSend {
	/// Returns the value stored under `key`, or `None` if nothing is stored.
	fn load(&self, key: &str) -> Result<Option<String>>;

	/// Replaces the value stored under `key`.
	fn save(&mut self, key: &str, data: &str) -> Result<()>;

	/// Deletes the value stored under `key`. Deleting a missing key is not an error.
	fn remove(&mut self, key: &str) -> Result<()>;
}
