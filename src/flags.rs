use std::collections::HashSet;

/// Flag that makes `flush` attach `idempotencyKey` to forwarded payloads.
pub const OFFLINE_QUEUE_V2: &str = "offline_queue_v2";

/// Synchronous boolean lookup for named feature flags.
pub trait FeatureFlags: Send + Sync {
	fn is_enabled(&self, name: &str) -> bool;
}

/// Every flag disabled.
impl FeatureFlags for () {
	fn is_enabled(&self, _name: &str) -> bool {
		false
	}
}

impl<F> FeatureFlags for F
where
	F: Fn(&str) -> bool + Send + Sync,
{
	fn is_enabled(&self, name: &str) -> bool {
		self(name)
	}
}

/// A fixed set of enabled flag names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticFlags {
	enabled: HashSet<String>,
}

impl StaticFlags {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn enable(mut self, name: impl Into<String>) -> Self {
		self.enabled.insert(name.into());
		self
	}
}

impl<S: Into<String>> FromIterator<S> for StaticFlags {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		Self {
			enabled: iter.into_iter().map(Into::into).collect(),
		}
	}
}

impl FeatureFlags for StaticFlags {
	fn is_enabled(&self, name: &str) -> bool {
		self.enabled.contains(name)
	}
}
