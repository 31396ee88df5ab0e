//! Periodic background replay of a [`MutationQueue`].
//!
//! [`BackgroundSync::start`] spawns a tokio task that flushes the queue every
//! interval and returns a [`SyncHandle`] owning that task. Dropping or stopping
//! the handle cancels the loop. [`SyncSlot`] holds at most one handle, so a
//! page or app session that restarts its sync loop replaces the old one
//! instead of stacking timers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::{HandlerRegistry, MutationQueue};

/// Spawns background flush loops.
pub struct BackgroundSync;

impl BackgroundSync {
	/// Starts flushing `queue` against `handlers` every `interval`, or every
	/// [`QueueConfig::sync_interval`](crate::QueueConfig::sync_interval) of the
	/// queue when `interval` is `None`.
	///
	/// The first flush happens one full interval after the call. Must be
	/// called from within a tokio runtime.
	///
	/// # Panics
	/// * If `interval` is zero
	#[must_use = "dropping the handle stops the sync loop"]
	pub fn start(
		queue: Arc<MutationQueue>,
		handlers: Arc<HandlerRegistry>,
		interval: Option<Duration>,
	) -> SyncHandle {
		let interval = interval.unwrap_or_else(|| queue.config().sync_interval());
		assert!(!interval.is_zero(), "sync interval must be non-zero");

		let cancel = CancellationToken::new();
		let task = tokio::spawn(
			Self::run(queue, handlers, interval, cancel.clone())
				.instrument(info_span!("offline_sync", interval_ms = interval.as_millis() as u64)),
		);

		SyncHandle {
			cancel,
			join_handle: Some(task),
		}
	}

	async fn run(
		queue: Arc<MutationQueue>,
		handlers: Arc<HandlerRegistry>,
		interval: Duration,
		cancel: CancellationToken,
	) {
		let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		info!("background sync started");

		loop {
			tokio::select! {
				() = cancel.cancelled() => {
					info!("background sync stopped");
					return;
				}
				_ = ticker.tick() => {}
			}

			let report = queue.flush(&handlers).await;
			debug!(attempted = report.attempted(), "background flush finished");
		}
	}
}

/// Owns a running sync loop. Cancels it when dropped.
#[derive(Debug)]
pub struct SyncHandle {
	cancel: CancellationToken,
	join_handle: Option<JoinHandle<()>>,
}

impl Drop for SyncHandle {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl SyncHandle {
	/// Prevents any further ticks. A flush already running finishes on its own.
	/// Calling this more than once is harmless.
	pub fn stop(&self) {
		self.cancel.cancel();
	}

	pub fn is_running(&self) -> bool {
		!self.cancel.is_cancelled()
			&& self
				.join_handle
				.as_ref()
				.is_some_and(|handle| !handle.is_finished())
	}

	/// Stops the loop and waits for its task to exit, including any flush in progress.
	pub async fn shutdown(mut self) {
		self.cancel.cancel();
		if let Some(handle) = self.join_handle.take() {
			let _ = handle.await;
		}
	}
}

/// Holds at most one running sync loop.
///
/// Starting a loop through the slot stops whichever one it held before.
#[derive(Debug, Default)]
pub struct SyncSlot {
	current: Mutex<Option<SyncHandle>>,
}

impl SyncSlot {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the slot's loop with a new one. `interval` as in
	/// [`BackgroundSync::start`].
	pub fn start(
		&self,
		queue: Arc<MutationQueue>,
		handlers: Arc<HandlerRegistry>,
		interval: Option<Duration>,
	) {
		let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(previous) = current.take() {
			previous.stop();
		}
		*current = Some(BackgroundSync::start(queue, handlers, interval));
	}

	/// Stops the held loop, if any.
	pub fn stop(&self) {
		let previous = self
			.current
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		if let Some(previous) = previous {
			previous.stop();
		}
	}

	pub fn is_running(&self) -> bool {
		self.current
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.is_some_and(SyncHandle::is_running)
	}
}
