use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The data a handler needs to perform its remote write.
pub type Payload = Map<String, Value>;

const SUFFIX_LEN: usize = 8;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Action types enqueued by the booking and trip screens.
///
/// The queue never interprets these; they only have to match the keys of the
/// handler registry passed to `flush`.
pub mod kinds {
	pub const CREATE_BOOKING: &str = "create_booking";
	pub const CREATE_BOOKING_WITH_PAYMENT: &str = "create_booking_with_payment";
	pub const TICKET_SCAN: &str = "ticket_scan";
	pub const START_TRIP: &str = "start_trip";
	pub const END_TRIP: &str = "end_trip";
	pub const CHECKPOINT: &str = "checkpoint";
}

/// A single pending action awaiting remote execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
	/// Idempotency key. Unique within the queue.
	pub id: String,
	/// Name of the handler that processes this item.
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub payload: Payload,
	/// Creation time in milliseconds since the Unix epoch.
	pub ts: i64,
}

impl QueueItem {
	/// Returns the payload to hand to the handler.
	///
	/// With `attach_key` set, the item id is merged in as `idempotencyKey`,
	/// overriding any field of that name already in the payload.
	pub fn outgoing_payload(&self, attach_key: bool) -> Payload {
		let mut payload = self.payload.clone();
		if attach_key {
			payload.insert("idempotencyKey".to_string(), Value::String(self.id.clone()));
		}
		payload
	}
}

/// Input to `MutationQueue::enqueue`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
	pub kind: String,
	pub payload: Payload,
	/// Caller-chosen idempotency key. Generated when `None`.
	pub id: Option<String>,
}

impl NewAction {
	pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
		Self {
			kind: kind.into(),
			payload,
			id: None,
		}
	}

	/// Builds an action from a JSON value. Non-object values become an empty payload.
	pub fn from_json(kind: impl Into<String>, payload: Value) -> Self {
		let payload = match payload {
			Value::Object(map) => map,
			_ => Payload::new(),
		};
		Self::new(kind, payload)
	}

	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	/// Turns the action into a stored item, generating an id if none was given.
	pub(crate) fn into_item(self, now_millis: i64) -> QueueItem {
		let id = self
			.id
			.unwrap_or_else(|| generate_id(&self.kind, now_millis));
		QueueItem {
			id,
			kind: self.kind,
			payload: self.payload,
			ts: now_millis,
		}
	}
}

/// Builds `{kind}:{now_millis}:{suffix}` with a random base36 suffix.
///
/// Unique enough for a single client enqueueing within the same millisecond;
/// not meant to be unguessable.
pub(crate) fn generate_id(kind: &str, now_millis: i64) -> String {
	let mut rng = rand::rng();
	let suffix: String = (0..SUFFIX_LEN)
		.map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
		.collect();
	format!("{kind}:{now_millis}:{suffix}")
}

pub(crate) fn now_millis() -> i64 {
	chrono::Utc::now().timestamp_millis()
}
