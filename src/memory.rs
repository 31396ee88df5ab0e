use crate::Storage;
use std::collections::HashMap;
use std::io::{Error, Result};

/// An in-process storage backend.
///
/// Nothing survives the process, which makes this the backend for tests and
/// for clients that only need the queue to outlive a dropped connection.
/// `set_available(false)` makes every call fail, the way browser storage
/// behaves when it is disabled.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
	entries: HashMap<String, String>,
	available: bool,
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			entries: HashMap::new(),
			available: true,
		}
	}

	/// Toggles simulated storage availability.
	pub fn set_available(&mut self, available: bool) {
		self.available = available;
	}

	/// Creates a store that refuses every read and write.
	pub fn unavailable() -> Self {
		Self {
			entries: HashMap::new(),
			available: false,
		}
	}

	fn check(&self) -> Result<()> {
		if self.available {
			Ok(())
		} else {
			Err(Error::other("storage unavailable"))
		}
	}
}

impl Storage for MemoryStorage {
	fn load(&self, key: &str) -> Result<Option<String>> {
		self.check()?;
		Ok(self.entries.get(key).cloned())
	}

	fn save(&mut self, key: &str, data: &str) -> Result<()> {
		self.check()?;
		self.entries.insert(key.to_string(), data.to_string());
		Ok(())
	}

	fn remove(&mut self, key: &str) -> Result<()> {
		self.check()?;
		self.entries.remove(key);
		Ok(())
	}
}
