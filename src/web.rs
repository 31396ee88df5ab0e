//! WebStorage - Browser-based persistent storage using `localStorage`
//!
//! This module provides a Storage implementation for WASM targets that:
//! - Reads and writes the queue blob through `window.localStorage`
//! - Falls back to an in-memory map when `localStorage` is unavailable
//!   (private browsing, storage blocked by policy, sandboxed iframes)
//!
//! `localStorage` is synchronous, so unlike IndexedDB no write-behind task is
//! needed: a save is durable once `set_item` returns.

use crate::{MemoryStorage, Storage};
use std::io::{Error, Result};
use wasm_bindgen::JsValue;

/// Indicates the persistence state of the WebStorage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceState {
	/// `localStorage` is available. Queued actions survive page reloads.
	Persisted,
	/// `localStorage` is unavailable. Queued actions are held in memory only
	/// and are lost on reload.
	///
	/// When in this state, callers should consider flushing more often to
	/// shrink the window in which a reload loses pending writes.
	MemoryOnly,
}

/// A browser storage backend over `window.localStorage`.
pub struct WebStorage {
	local: Option<web_sys::Storage>,
	fallback: MemoryStorage,
}

impl Default for WebStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl WebStorage {
	/// Opens `localStorage`, falling back to memory-only mode with a console
	/// warning if it cannot be reached.
	pub fn new() -> Self {
		let local = match Self::open_local_storage() {
			Ok(storage) => Some(storage),
			Err(e) => {
				web_sys::console::warn_1(
					&format!(
						"localStorage unavailable ({}), falling back to memory-only storage. \
                         Queued actions will not persist across page reloads.",
						e
					)
					.into(),
				);
				None
			}
		};

		Self {
			local,
			fallback: MemoryStorage::new(),
		}
	}

	/// Returns the current persistence state of the store.
	pub fn persistence_state(&self) -> PersistenceState {
		if self.local.is_some() {
			PersistenceState::Persisted
		} else {
			PersistenceState::MemoryOnly
		}
	}

	pub fn is_persisted(&self) -> bool {
		self.persistence_state() == PersistenceState::Persisted
	}

	fn open_local_storage() -> Result<web_sys::Storage> {
		let window = web_sys::window().ok_or_else(|| Error::other("No window object"))?;
		window
			.local_storage()
			.map_err(js_error)?
			.ok_or_else(|| Error::other("localStorage not available"))
	}
}

fn js_error(e: JsValue) -> Error {
	Error::other(format!("localStorage error: {:?}", e))
}

impl Storage for WebStorage {
	fn load(&self, key: &str) -> Result<Option<String>> {
		match &self.local {
			Some(local) => local.get_item(key).map_err(js_error),
			None => self.fallback.load(key),
		}
	}

	fn save(&mut self, key: &str, data: &str) -> Result<()> {
		match &self.local {
			// Quota exceeded surfaces here as a JS exception.
			Some(local) => local.set_item(key, data).map_err(js_error),
			None => self.fallback.save(key, data),
		}
	}

	fn remove(&mut self, key: &str) -> Result<()> {
		match &self.local {
			Some(local) => local.remove_item(key).map_err(js_error),
			None => self.fallback.remove(key),
		}
	}
}
