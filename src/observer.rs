/// Conditions the queue recovers from without telling its caller.
///
/// None of these make `enqueue` or `flush` fail. An observer is the opt-in
/// way to see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
	/// Reading the stored queue failed; it was treated as empty and not
	/// overwritten.
	StorageReadFailed { error: String },
	/// Persisting the queue failed; the write was skipped.
	StorageWriteFailed { error: String },
	/// The stored blob did not parse; it was treated as empty.
	CorruptQueue { error: String },
	/// Writing would exceed the capacity; the oldest items were discarded.
	Overflow { dropped: Vec<String> },
	/// No handler was registered for the item's type; it was removed.
	Dropped { id: String, kind: String },
	/// The handler returned an error; the item stays queued.
	HandlerFailed {
		id: String,
		kind: String,
		error: String,
	},
}

/// Receives [`QueueEvent`]s. Called synchronously from queue operations after
/// the storage lock is released, so implementations may read the queue but
/// should return quickly.
pub trait QueueObserver: Send + Sync {
	fn on_event(&self, event: &QueueEvent);
}

/// Ignores everything. The default observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl QueueObserver for NoopObserver {
	fn on_event(&self, _event: &QueueEvent) {}
}

impl<F> QueueObserver for F
where
	F: Fn(&QueueEvent) + Send + Sync,
{
	fn on_event(&self, event: &QueueEvent) {
		self(event)
	}
}
