use crate::item::now_millis;
use crate::{
	FeatureFlags, HandlerRegistry, NewAction, NoopObserver, QueueConfig, QueueEvent, QueueItem,
	QueueObserver, Storage,
};
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of one [`MutationQueue::flush`] pass, by item id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Handler succeeded; removed from the queue.
	pub processed: Vec<String>,
	/// Handler failed; still queued.
	pub failed: Vec<String>,
	/// No handler registered; removed from the queue.
	pub dropped: Vec<String>,
}

impl FlushReport {
	/// Number of items the pass looked at.
	pub fn attempted(&self) -> usize {
		self.processed.len() + self.failed.len() + self.dropped.len()
	}
}

/// A durable queue of pending remote writes, replayed against async handlers.
///
/// The whole queue is stored as one JSON array under a single storage key and
/// is read and rewritten on every operation. Storage access is serialized by an
/// internal mutex, and flush passes are serialized by an async lock, so a
/// timer-driven flush and a manual flush never interleave their writes.
///
/// Nothing here returns an error to the caller. Storage failures, corrupt data,
/// overflow and failing handlers all degrade to "empty", "skip" or "retry
/// later", and are reported to the configured [`QueueObserver`].
///
/// # Examples
/// ```
/// use offlinequeue::{MemoryStorage, MutationQueue, NewAction};
/// use serde_json::json;
///
/// let queue = MutationQueue::new(MemoryStorage::new());
/// let id = queue.enqueue(NewAction::from_json("start_trip", json!({"trip_id": 7})));
///
/// assert!(id.starts_with("start_trip:"));
/// assert_eq!(queue.len(), 1);
/// ```
pub struct MutationQueue {
	#[cfg(not(target_arch = "wasm32"))]
	store: Mutex<Box<dyn Storage + Send>>,

	#[cfg(target_arch = "wasm32")]
	store: Mutex<Box<dyn Storage>>,

	flush_lock: tokio::sync::Mutex<()>,
	config: QueueConfig,
	flags: Arc<dyn FeatureFlags>,
	observer: Arc<dyn QueueObserver>,
}

// SAFETY: On WASM32, there are no threads. Send and Sync are vacuously satisfied
// because there's nowhere to send to and nothing to synchronize with.
//
// This allows WebStorage (which holds a JS-backed web_sys::Storage) to be used
// with MutationQueue on WASM targets.
#[cfg(target_arch = "wasm32")]
unsafe impl Send for MutationQueue {}

#[cfg(target_arch = "wasm32")]
unsafe impl Sync for MutationQueue {}

impl MutationQueue {
	/// Creates a queue over `storage` with the default configuration,
	/// all feature flags off, and no observer.
	#[cfg(not(target_arch = "wasm32"))]
	pub fn new(storage: impl Storage + Send + 'static) -> Self {
		Self::with_config(storage, QueueConfig::default())
	}

	/// Creates a queue over `storage` with the default configuration,
	/// all feature flags off, and no observer.
	#[cfg(target_arch = "wasm32")]
	pub fn new(storage: impl Storage + 'static) -> Self {
		Self::with_config(storage, QueueConfig::default())
	}

	/// Creates a queue over `storage` with `config`.
	///
	/// # Panics
	/// * If `config` fails [`QueueConfig::validate`] (zero `max_items`, zero
	///   `sync_interval_ms` or an empty `storage_key`)
	#[cfg(not(target_arch = "wasm32"))]
	pub fn with_config(storage: impl Storage + Send + 'static, config: QueueConfig) -> Self {
		Self::from_parts(Box::new(storage), config)
	}

	/// Creates a queue over `storage` with `config`.
	///
	/// # Panics
	/// * If `config` fails [`QueueConfig::validate`]
	#[cfg(target_arch = "wasm32")]
	pub fn with_config(storage: impl Storage + 'static, config: QueueConfig) -> Self {
		Self::from_parts(Box::new(storage), config)
	}

	#[cfg(not(target_arch = "wasm32"))]
	fn from_parts(store: Box<dyn Storage + Send>, config: QueueConfig) -> Self {
		if let Err(e) = config.validate() {
			panic!("invalid queue config: {e}");
		}
		Self {
			store: Mutex::new(store),
			flush_lock: tokio::sync::Mutex::new(()),
			config,
			flags: Arc::new(()),
			observer: Arc::new(NoopObserver),
		}
	}

	#[cfg(target_arch = "wasm32")]
	fn from_parts(store: Box<dyn Storage>, config: QueueConfig) -> Self {
		if let Err(e) = config.validate() {
			panic!("invalid queue config: {e}");
		}
		Self {
			store: Mutex::new(store),
			flush_lock: tokio::sync::Mutex::new(()),
			config,
			flags: Arc::new(()),
			observer: Arc::new(NoopObserver),
		}
	}

	/// Sets the flag source consulted on every flush.
	pub fn with_flags(mut self, flags: impl FeatureFlags + 'static) -> Self {
		self.flags = Arc::new(flags);
		self
	}

	pub fn with_observer(mut self, observer: impl QueueObserver + 'static) -> Self {
		self.observer = Arc::new(observer);
		self
	}

	pub fn config(&self) -> &QueueConfig {
		&self.config
	}

	/// Adds `action` unless an item with the same id is already queued, and
	/// returns the item's id.
	///
	/// Calling this twice with the same explicit id stores the first action
	/// only. Never fails: if storage is unavailable the id is still returned
	/// but nothing is persisted. A blob that cannot be read is left alone
	/// rather than overwritten; a corrupt one is replaced.
	pub fn enqueue(&self, action: NewAction) -> String {
		let item = action.into_item(now_millis());
		let id = item.id.clone();

		let mut events = Vec::new();
		{
			let mut store = self.lock_store();
			let mut items = match self.load_items(&**store, &mut events) {
				Ok(items) => items,
				Err(LoadFailure::Corrupt) => Vec::new(),
				Err(LoadFailure::Unreadable) => {
					warn!(id = %id, "offline queue unreadable, action not persisted");
					drop(store);
					self.emit_all(events);
					return id;
				}
			};

			if items.iter().any(|existing| existing.id == id) {
				debug!(id = %id, "duplicate enqueue ignored");
			} else {
				debug!(id = %id, kind = %item.kind, "enqueued");
				items.push(item);
				self.write_items(&mut **store, items, &mut events);
			}
		}
		self.emit_all(events);
		id
	}

	/// Replays every queued item, oldest first, against `handlers`.
	///
	/// Items are attempted one at a time. An item is removed when its handler
	/// returns `Ok`, kept when the handler fails or panics, and removed without
	/// being attempted when no handler is registered for its type. When the
	/// idempotency flag is on, each payload carries the item id as
	/// `idempotencyKey`.
	///
	/// Items enqueued while the pass is running are kept. Concurrent calls
	/// wait for each other.
	pub async fn flush(&self, handlers: &HandlerRegistry) -> FlushReport {
		let _pass = self.flush_lock.lock().await;

		let snapshot = self.items();
		let mut report = FlushReport::default();
		if snapshot.is_empty() {
			return report;
		}

		let attach_key = self.flags.is_enabled(&self.config.idempotency_flag);
		let mut retained = Vec::new();
		for item in snapshot {
			let Some(handler) = handlers.get(&item.kind) else {
				warn!(id = %item.id, kind = %item.kind, "no handler registered, dropping item");
				self.emit(QueueEvent::Dropped {
					id: item.id.clone(),
					kind: item.kind.clone(),
				});
				report.dropped.push(item.id);
				continue;
			};

			let call = handler.call(item.outgoing_payload(attach_key));
			let error = match AssertUnwindSafe(call).catch_unwind().await {
				Ok(Ok(())) => None,
				Ok(Err(e)) => Some(e.to_string()),
				Err(panic) => Some(panic_message(panic.as_ref())),
			};

			match error {
				None => {
					debug!(id = %item.id, kind = %item.kind, "replayed");
					report.processed.push(item.id);
				}
				Some(error) => {
					debug!(id = %item.id, kind = %item.kind, %error, "replay failed, keeping item");
					self.emit(QueueEvent::HandlerFailed {
						id: item.id.clone(),
						kind: item.kind.clone(),
						error,
					});
					report.failed.push(item.id.clone());
					retained.push(item);
				}
			}
		}

		if report.processed.len() + report.dropped.len() > 0 {
			let settled: HashSet<&str> = report
				.processed
				.iter()
				.chain(report.dropped.iter())
				.map(String::as_str)
				.collect();

			let mut events = Vec::new();
			{
				let mut store = self.lock_store();
				// Fall back to the pass's own retained items when the current
				// blob can't be read, so failed items are never written away.
				let mut items = match self.load_items(&**store, &mut events) {
					Ok(items) => items,
					Err(_) => {
						warn!("offline queue unreadable after flush, writing retained items");
						retained
					}
				};
				items.retain(|item| !settled.contains(item.id.as_str()));
				self.write_items(&mut **store, items, &mut events);
			}
			self.emit_all(events);
		}

		info!(
			processed = report.processed.len(),
			failed = report.failed.len(),
			dropped = report.dropped.len(),
			"flush complete"
		);
		report
	}

	/// Number of queued items, read fresh from storage.
	pub fn len(&self) -> usize {
		self.items().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Snapshot of the queued items, oldest first.
	pub fn items(&self) -> Vec<QueueItem> {
		let mut events = Vec::new();
		let items = {
			let store = self.lock_store();
			self.load_items(&**store, &mut events).unwrap_or_default()
		};
		self.emit_all(events);
		items
	}

	/// Deletes every queued item.
	pub fn clear(&self) {
		let result = self.lock_store().remove(&self.config.storage_key);
		if let Err(e) = result {
			warn!(error = %e, "failed to clear offline queue");
			self.emit(QueueEvent::StorageWriteFailed {
				error: e.to_string(),
			});
		}
	}

	#[cfg(not(target_arch = "wasm32"))]
	fn lock_store(&self) -> MutexGuard<'_, Box<dyn Storage + Send>> {
		self.store.lock().unwrap_or_else(PoisonError::into_inner)
	}

	#[cfg(target_arch = "wasm32")]
	fn lock_store(&self) -> MutexGuard<'_, Box<dyn Storage>> {
		self.store.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Loads the stored queue. `Ok(vec![])` means nothing is stored; read
	/// errors and unparsable blobs are reported as [`LoadFailure`].
	///
	/// Events are buffered in `events` so the caller can emit them after
	/// releasing the store lock.
	fn load_items(
		&self,
		store: &dyn Storage,
		events: &mut Vec<QueueEvent>,
	) -> Result<Vec<QueueItem>, LoadFailure> {
		let raw = match store.load(&self.config.storage_key) {
			Ok(Some(raw)) => raw,
			Ok(None) => return Ok(Vec::new()),
			Err(e) => {
				warn!(error = %e, "offline queue unreadable, treating as empty");
				events.push(QueueEvent::StorageReadFailed {
					error: e.to_string(),
				});
				return Err(LoadFailure::Unreadable);
			}
		};

		serde_json::from_str(&raw).map_err(|e| {
			warn!(error = %e, "offline queue corrupt, treating as empty");
			events.push(QueueEvent::CorruptQueue {
				error: e.to_string(),
			});
			LoadFailure::Corrupt
		})
	}

	fn write_items(
		&self,
		store: &mut dyn Storage,
		mut items: Vec<QueueItem>,
		events: &mut Vec<QueueEvent>,
	) {
		if items.len() > self.config.max_items {
			let excess = items.len() - self.config.max_items;
			let dropped: Vec<String> = items.drain(..excess).map(|item| item.id).collect();
			warn!(count = dropped.len(), "offline queue full, discarding oldest items");
			events.push(QueueEvent::Overflow { dropped });
		}

		let result = serde_json::to_string(&items)
			.map_err(std::io::Error::other)
			.and_then(|data| store.save(&self.config.storage_key, &data));
		if let Err(e) = result {
			warn!(error = %e, "failed to persist offline queue");
			events.push(QueueEvent::StorageWriteFailed {
				error: e.to_string(),
			});
		}
	}

	fn emit_all(&self, events: Vec<QueueEvent>) {
		for event in &events {
			self.observer.on_event(event);
		}
	}

	fn emit(&self, event: QueueEvent) {
		self.observer.on_event(&event);
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadFailure {
	/// The storage medium returned an error.
	Unreadable,
	/// The stored blob is not a queue.
	Corrupt,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		format!("handler panicked: {s}")
	} else if let Some(s) = panic.downcast_ref::<String>() {
		format!("handler panicked: {s}")
	} else {
		"handler panicked".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::MemoryStorage;
	use serde_json::json;
	use std::io;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::{Mutex as StdMutex, OnceLock, Weak};

	/// Memory storage whose n-th `load` calls (1-based) fail.
	struct FlakyStorage {
		inner: MemoryStorage,
		loads: AtomicUsize,
		failing: Vec<usize>,
	}

	impl FlakyStorage {
		fn failing_loads(failing: &[usize]) -> Self {
			Self {
				inner: MemoryStorage::new(),
				loads: AtomicUsize::new(0),
				failing: failing.to_vec(),
			}
		}
	}

	impl Storage for FlakyStorage {
		fn load(&self, key: &str) -> io::Result<Option<String>> {
			let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
			if self.failing.contains(&n) {
				return Err(io::Error::other("read interrupted"));
			}
			self.inner.load(key)
		}

		fn save(&mut self, key: &str, data: &str) -> io::Result<()> {
			self.inner.save(key, data)
		}

		fn remove(&mut self, key: &str) -> io::Result<()> {
			self.inner.remove(key)
		}
	}

	fn recording_queue(storage: MemoryStorage) -> (MutationQueue, Arc<StdMutex<Vec<QueueEvent>>>) {
		let events = Arc::new(StdMutex::new(Vec::new()));
		let sink = events.clone();
		let queue = MutationQueue::new(storage)
			.with_observer(move |event: &QueueEvent| sink.lock().unwrap().push(event.clone()));
		(queue, events)
	}

	fn corrupt_storage() -> MemoryStorage {
		let mut storage = MemoryStorage::new();
		storage.save("offline_queue_v1", "{not json").unwrap();
		storage
	}

	#[test]
	fn test_corrupt_blob_reads_as_empty() {
		let (queue, events) = recording_queue(corrupt_storage());
		assert_eq!(queue.len(), 0);
		assert!(queue.items().is_empty());
		let events = events.lock().unwrap();
		assert!(!events.is_empty());
		assert!(events
			.iter()
			.all(|e| matches!(e, QueueEvent::CorruptQueue { .. })));
	}

	#[test]
	fn test_enqueue_over_corrupt_blob_replaces_it() {
		let queue = MutationQueue::new(corrupt_storage());
		queue.enqueue(NewAction::from_json("checkpoint", json!({})).with_id("c1"));
		let items = queue.items();
		assert_eq!(items.len(), 1);
		assert_eq!(items[0].id, "c1");
	}

	#[test]
	fn test_unavailable_storage_degrades() {
		let (queue, events) = recording_queue(MemoryStorage::unavailable());
		let id = queue.enqueue(NewAction::from_json("ticket_scan", json!({"code": "x"})));
		assert!(id.starts_with("ticket_scan:"));
		assert_eq!(queue.len(), 0);
		queue.clear();

		let events = events.lock().unwrap();
		assert!(events
			.iter()
			.any(|e| matches!(e, QueueEvent::StorageReadFailed { .. })));
		assert!(events
			.iter()
			.any(|e| matches!(e, QueueEvent::StorageWriteFailed { .. })));
	}

	#[test]
	fn test_overflow_reports_dropped_ids() {
		let config = QueueConfig {
			max_items: 2,
			..QueueConfig::default()
		};
		let events = Arc::new(StdMutex::new(Vec::new()));
		let sink = events.clone();
		let queue = MutationQueue::with_config(MemoryStorage::new(), config)
			.with_observer(move |event: &QueueEvent| sink.lock().unwrap().push(event.clone()));

		for i in 0..3 {
			queue.enqueue(NewAction::from_json("checkpoint", json!({"i": i})).with_id(format!("c{i}")));
		}

		let ids: Vec<String> = queue.items().into_iter().map(|item| item.id).collect();
		assert_eq!(ids, vec!["c1", "c2"]);
		assert_eq!(
			events.lock().unwrap().as_slice(),
			&[QueueEvent::Overflow {
				dropped: vec!["c0".to_string()]
			}]
		);
	}

	#[test]
	fn test_custom_storage_key() {
		let config = QueueConfig {
			storage_key: "fleet_queue".to_string(),
			..QueueConfig::default()
		};
		let queue = MutationQueue::with_config(MemoryStorage::new(), config);
		queue.enqueue(NewAction::from_json("start_trip", json!({})).with_id("t1"));
		assert_eq!(queue.len(), 1);
		assert_eq!(queue.config().storage_key, "fleet_queue");
	}

	#[test]
	fn test_clear() {
		let queue = MutationQueue::new(MemoryStorage::new());
		queue.enqueue(NewAction::from_json("start_trip", json!({})));
		queue.enqueue(NewAction::from_json("end_trip", json!({})));
		assert_eq!(queue.len(), 2);
		queue.clear();
		assert!(queue.is_empty());
	}

	#[tokio::test]
	async fn test_panicking_handler_keeps_item() {
		let queue = MutationQueue::new(MemoryStorage::new());
		queue.enqueue(NewAction::from_json("end_trip", json!({})).with_id("e1"));

		let handlers = HandlerRegistry::new().with("end_trip", |_p: crate::Payload| async {
			if true {
				panic!("boom");
			}
			Ok::<(), crate::HandlerError>(())
		});

		let report = queue.flush(&handlers).await;
		assert_eq!(report.failed, vec!["e1"]);
		assert_eq!(queue.len(), 1);
	}

	#[tokio::test]
	async fn test_failed_reread_after_flush_keeps_failed_items() {
		// loads: enqueue a, enqueue b, flush snapshot, flush re-read
		let queue = MutationQueue::new(FlakyStorage::failing_loads(&[4]));
		queue.enqueue(NewAction::from_json("start_trip", json!({})).with_id("a"));
		queue.enqueue(NewAction::from_json("end_trip", json!({})).with_id("b"));

		let handlers = HandlerRegistry::new()
			.with("start_trip", |_p: crate::Payload| async {
				Err::<(), crate::HandlerError>("offline".into())
			})
			.with("end_trip", |_p: crate::Payload| async { Ok::<(), crate::HandlerError>(()) });

		let report = queue.flush(&handlers).await;
		assert_eq!(report.processed, vec!["b"]);
		assert_eq!(report.failed, vec!["a"]);

		let ids: Vec<String> = queue.items().into_iter().map(|item| item.id).collect();
		assert_eq!(ids, vec!["a"]);
	}

	#[test]
	fn test_unreadable_queue_is_not_overwritten_by_enqueue() {
		let queue = MutationQueue::new(FlakyStorage::failing_loads(&[3]));
		queue.enqueue(NewAction::from_json("checkpoint", json!({})).with_id("c1"));
		queue.enqueue(NewAction::from_json("checkpoint", json!({})).with_id("c2"));

		// third load fails: c3 is not persisted, c1 and c2 survive
		let id = queue.enqueue(NewAction::from_json("checkpoint", json!({})).with_id("c3"));
		assert_eq!(id, "c3");

		let ids: Vec<String> = queue.items().into_iter().map(|item| item.id).collect();
		assert_eq!(ids, vec!["c1", "c2"]);
	}

	#[test]
	fn test_observer_can_read_queue() {
		let config = QueueConfig {
			max_items: 1,
			..QueueConfig::default()
		};
		let handle: Arc<OnceLock<Weak<MutationQueue>>> = Arc::new(OnceLock::new());
		let seen = Arc::new(StdMutex::new(Vec::new()));

		let (queue_ref, sink) = (handle.clone(), seen.clone());
		let queue = Arc::new(MutationQueue::with_config(MemoryStorage::new(), config).with_observer(
			move |_event: &QueueEvent| {
				if let Some(queue) = queue_ref.get().and_then(Weak::upgrade) {
					sink.lock().unwrap().push(queue.len());
				}
			},
		));
		handle.set(Arc::downgrade(&queue)).unwrap();

		queue.enqueue(NewAction::from_json("checkpoint", json!({})).with_id("c1"));
		queue.enqueue(NewAction::from_json("checkpoint", json!({})).with_id("c2"));

		assert_eq!(*seen.lock().unwrap(), vec![1]);
	}

	#[test]
	#[should_panic(expected = "max_items must be greater than zero")]
	fn test_rejects_invalid_config() {
		let config = QueueConfig {
			max_items: 0,
			..QueueConfig::default()
		};
		let _queue = MutationQueue::with_config(MemoryStorage::new(), config);
	}

	#[test]
	fn test_panic_message() {
		let boxed: Box<dyn Any + Send> = Box::new("boom");
		assert_eq!(panic_message(boxed.as_ref()), "handler panicked: boom");
		let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
		assert_eq!(panic_message(boxed.as_ref()), "handler panicked: bang");
		let boxed: Box<dyn Any + Send> = Box::new(7u8);
		assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
	}
}
