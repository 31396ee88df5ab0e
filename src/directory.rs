use crate::Storage;
use std::fs;
use std::io::{ErrorKind, Result, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Configuration for the file-backed storage.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
	/// Directory holding one `<key>.json` file per storage key.
	pub storage_location: PathBuf,
}

/// Persists each key as a JSON file inside a directory.
///
/// This is the native counterpart of browser local storage: values survive
/// process restarts, and each save replaces the whole file. Writes go to a
/// temporary file in the same directory which is then renamed over the
/// target, so readers never observe a half-written queue.
#[derive(Debug)]
pub struct DirectoryStorage {
	config: DirectoryConfig,
}

impl DirectoryStorage {
	/// Creates the storage, creating the directory if needed.
	pub fn new(config: DirectoryConfig) -> Result<Self> {
		fs::create_dir_all(&config.storage_location)?;
		Ok(Self { config })
	}

	pub fn location(&self) -> &Path {
		&self.config.storage_location
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let name: String = key
			.chars()
			.map(|c| match c {
				'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
				_ => '_',
			})
			.collect();
		self.config.storage_location.join(format!("{name}.json"))
	}
}

impl Storage for DirectoryStorage {
	fn load(&self, key: &str) -> Result<Option<String>> {
		match fs::read_to_string(self.path_for(key)) {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e),
		}
	}

	fn save(&mut self, key: &str, data: &str) -> Result<()> {
		let mut tmp = NamedTempFile::new_in(&self.config.storage_location)?;
		tmp.write_all(data.as_bytes())?;
		tmp.as_file().sync_all()?;
		tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
		Ok(())
	}

	fn remove(&mut self, key: &str) -> Result<()> {
		match fs::remove_file(self.path_for(key)) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn setup() -> (TempDir, DirectoryStorage) {
		let dir = TempDir::new().unwrap();
		let store = DirectoryStorage::new(DirectoryConfig {
			storage_location: dir.path().to_path_buf(),
		})
		.unwrap();
		(dir, store)
	}

	#[test]
	fn test_basic_operations() {
		let (_dir, mut store) = setup();
		assert_eq!(store.load("offline_queue_v1").unwrap(), None);

		store.save("offline_queue_v1", "[]").unwrap();
		assert_eq!(
			store.load("offline_queue_v1").unwrap().as_deref(),
			Some("[]")
		);

		store.remove("offline_queue_v1").unwrap();
		assert_eq!(store.load("offline_queue_v1").unwrap(), None);
		store.remove("offline_queue_v1").unwrap();
	}

	#[test]
	fn test_overwrite_leaves_no_temp_files() {
		let (dir, mut store) = setup();
		for i in 0..5 {
			store.save("queue", &format!("[{i}]")).unwrap();
		}
		assert_eq!(store.load("queue").unwrap().as_deref(), Some("[4]"));

		let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
		assert_eq!(files.len(), 1);
	}

	#[test]
	fn test_persists_across_instances() {
		let dir = TempDir::new().unwrap();
		let config = DirectoryConfig {
			storage_location: dir.path().to_path_buf(),
		};

		{
			let mut store = DirectoryStorage::new(config.clone()).unwrap();
			store.save("queue", r#"[{"a":1}]"#).unwrap();
		}

		let store = DirectoryStorage::new(config).unwrap();
		assert_eq!(store.load("queue").unwrap().as_deref(), Some(r#"[{"a":1}]"#));
	}

	#[test]
	fn test_key_is_sanitized() {
		let (_dir, mut store) = setup();
		store.save("../escape/key", "[]").unwrap();
		assert!(store.path_for("../escape/key").starts_with(store.location()));
		assert_eq!(store.load("../escape/key").unwrap().as_deref(), Some("[]"));
	}

	#[test]
	fn test_creates_missing_directory() {
		let dir = TempDir::new().unwrap();
		let nested = dir.path().join("a").join("b");
		let store = DirectoryStorage::new(DirectoryConfig {
			storage_location: nested.clone(),
		})
		.unwrap();
		assert!(nested.is_dir());
		assert_eq!(store.load("queue").unwrap(), None);
	}
}
