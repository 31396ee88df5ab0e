//! WASM tests for MutationQueue with the WebStorage backend
//!
//! These run in a browser and check that the queue persists through
//! `localStorage` and that the MaybeSend relaxation lets a JS-backed
//! storage handle live inside the queue.

#![cfg(all(target_arch = "wasm32", feature = "web"))]

use offlinequeue::{
	HandlerError, HandlerRegistry, MutationQueue, NewAction, Payload, QueueConfig, WebStorage,
};
use serde_json::json;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn test_queue(key: &str) -> MutationQueue {
	let queue = MutationQueue::with_config(
		WebStorage::new(),
		QueueConfig {
			storage_key: key.to_string(),
			..QueueConfig::default()
		},
	);
	queue.clear();
	queue
}

// =============================================================================
// Basic Operations
// =============================================================================

#[wasm_bindgen_test]
fn test_queue_creation() {
	let queue = test_queue("offlinequeue-web-empty");
	assert!(queue.is_empty(), "New queue should be empty");
}

#[wasm_bindgen_test]
fn test_enqueue_and_dedupe() {
	let queue = test_queue("offlinequeue-web-dedupe");

	queue.enqueue(NewAction::from_json("ticket_scan", json!({"code": "A"})).with_id("scan-a"));
	queue.enqueue(NewAction::from_json("ticket_scan", json!({"code": "B"})).with_id("scan-a"));

	let items = queue.items();
	assert_eq!(items.len(), 1);
	assert_eq!(items[0].payload["code"], "A");
}

#[wasm_bindgen_test]
fn test_survives_reload() {
	let key = "offlinequeue-web-reload";
	{
		let queue = test_queue(key);
		queue.enqueue(NewAction::from_json("start_trip", json!({"trip_id": 3})).with_id("trip-3"));
	}

	let storage = WebStorage::new();
	if !storage.is_persisted() {
		web_sys::console::log_1(&"Skipping reload test - no persistence".into());
		return;
	}

	let queue = MutationQueue::with_config(
		storage,
		QueueConfig {
			storage_key: key.to_string(),
			..QueueConfig::default()
		},
	);
	assert_eq!(queue.len(), 1);
	assert_eq!(queue.items()[0].id, "trip-3");
	queue.clear();
}

// =============================================================================
// Replay
// =============================================================================

#[wasm_bindgen_test]
async fn test_flush_removes_processed_items() {
	let queue = test_queue("offlinequeue-web-flush");
	queue.enqueue(NewAction::from_json("end_trip", json!({"trip_id": 1})).with_id("end-1"));
	queue.enqueue(NewAction::from_json("checkpoint", json!({"stop": 2})).with_id("cp-2"));

	let handlers = HandlerRegistry::new()
		.with("end_trip", |_p: Payload| async { Ok::<(), HandlerError>(()) })
		.with("checkpoint", |_p: Payload| async {
			Err::<(), HandlerError>("offline".into())
		});

	let report = queue.flush(&handlers).await;
	assert_eq!(report.processed, vec!["end-1"]);
	assert_eq!(report.failed, vec!["cp-2"]);
	assert_eq!(queue.len(), 1);
	queue.clear();
}
