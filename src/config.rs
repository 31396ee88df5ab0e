use crate::OFFLINE_QUEUE_V2;
use serde::Deserialize;
use std::time::Duration;

/// Storage key the queue blob lives under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "offline_queue_v1";
/// Items kept at rest; older ones are discarded on write.
pub const DEFAULT_MAX_ITEMS: usize = 500;

/// Background flush period unless configured otherwise.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(60_000);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("invalid queue config: {0}")]
	Parse(#[from] toml_edit::de::Error),

	#[error("{field} must be greater than zero")]
	Zero { field: &'static str },

	#[error("storage_key must not be empty")]
	EmptyStorageKey,
}

/// Settings for a [`MutationQueue`](crate::MutationQueue).
///
/// Every field has a default, so an empty TOML document is a valid config:
///
/// ```
/// use offlinequeue::QueueConfig;
///
/// let config = QueueConfig::from_toml_str("max_items = 50").unwrap();
/// assert_eq!(config.max_items, 50);
/// assert_eq!(config.storage_key, "offline_queue_v1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
	pub storage_key: String,
	pub max_items: usize,
	/// Period of the background flush loop.
	pub sync_interval_ms: u64,
	/// Flag consulted before attaching `idempotencyKey` to payloads.
	pub idempotency_flag: String,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			storage_key: DEFAULT_STORAGE_KEY.to_string(),
			max_items: DEFAULT_MAX_ITEMS,
			sync_interval_ms: DEFAULT_SYNC_INTERVAL.as_millis() as u64,
			idempotency_flag: OFFLINE_QUEUE_V2.to_string(),
		}
	}
}

impl QueueConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml_edit::de::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.storage_key.is_empty() {
			return Err(ConfigError::EmptyStorageKey);
		}
		if self.max_items == 0 {
			return Err(ConfigError::Zero { field: "max_items" });
		}
		if self.sync_interval_ms == 0 {
			return Err(ConfigError::Zero {
				field: "sync_interval_ms",
			});
		}
		Ok(())
	}

	/// Period [`BackgroundSync`](crate::BackgroundSync) uses when started without
	/// an explicit interval.
	pub fn sync_interval(&self) -> Duration {
		Duration::from_millis(self.sync_interval_ms)
	}
}
