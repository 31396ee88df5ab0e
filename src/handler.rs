use crate::Payload;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error returned by a handler. Any failure keeps the item queued.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Performs the remote write for one action type.
///
/// Implemented for any `Fn(Payload) -> impl Future<Output = Result<(), E>>`,
/// so most callers register closures.
pub trait Handler: Send + Sync {
	fn call(&self, payload: Payload) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<F, Fut, E> Handler for F
where
	F: Fn(Payload) -> Fut + Send + Sync,
	Fut: Future<Output = Result<(), E>> + Send + 'static,
	E: Into<HandlerError> + 'static,
{
	fn call(&self, payload: Payload) -> BoxFuture<'static, Result<(), HandlerError>> {
		let fut = self(payload);
		Box::pin(async move { fut.await.map_err(Into::into) })
	}
}

/// Maps action types to the handlers that replay them.
///
/// Built fresh by each call site; nothing here is persisted.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
	handlers: HashMap<String, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
		kinds.sort_unstable();
		f.debug_struct("HandlerRegistry")
			.field("kinds", &kinds)
			.finish()
	}
}

impl HandlerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` for `kind`, replacing any previous one.
	pub fn register(&mut self, kind: impl Into<String>, handler: impl Handler + 'static) {
		self.handlers.insert(kind.into(), Arc::new(handler));
	}

	/// Builder form of [`register`](Self::register).
	pub fn with(mut self, kind: impl Into<String>, handler: impl Handler + 'static) -> Self {
		self.register(kind, handler);
		self
	}

	pub fn get(&self, kind: &str) -> Option<Arc<dyn Handler>> {
		self.handlers.get(kind).cloned()
	}

	pub fn contains(&self, kind: &str) -> bool {
		self.handlers.contains_key(kind)
	}

	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}
}
