use std::sync::{Arc, Mutex, atomic::AtomicUsize};

use vox_service::RegisterNoteRequest;
use vox_storage::queries;
use vox_worker::worker::{WorkerState, process_queue_once};

use super::{RecordingNotifier, SpyExtractor, StubStt};

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn a_job_runs_end_to_end_and_charges_the_wallet() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping a_job_runs_end_to_end_and_charges_the_wallet; set VOX_PG_DSN to run.");

		return;
	};
	let objects = tempfile::tempdir().expect("Failed to create objects dir.");
	let scratch = tempfile::tempdir().expect("Failed to create scratch dir.");
	let scratch_dir = scratch.path().to_str().expect("Scratch path must be UTF-8.").to_string();

	std::fs::write(objects.path().join("memo.wav"), b"RIFF fake audio payload")
		.expect("Failed to write audio object.");

	let stt_calls = Arc::new(AtomicUsize::new(0));
	let extractor_calls = Arc::new(AtomicUsize::new(0));
	let sent = Arc::new(Mutex::new(Vec::new()));
	let providers = super::providers_with(
		Arc::new(StubStt {
			text: "We agreed to cut the release on Friday.".to_string(),
			duration_ms: Some(90_000),
			no_speech: false,
			calls: stt_calls.clone(),
		}),
		Arc::new(SpyExtractor {
			calls: extractor_calls.clone(),
			payload: super::default_extraction_payload(),
		}),
		Arc::new(RecordingNotifier { sent: sent.clone() }),
	);
	let cfg = super::test_config(test_db.dsn().to_string(), scratch_dir.clone());
	let service = super::build_service(cfg, providers, objects.path())
		.await
		.expect("Failed to build service.");
	let account = super::seed_account(&service.db, Some("device-token-1")).await;
	let response = service
		.register_note(RegisterNoteRequest {
			account_id: account.account_id,
			audio_reference: "store://memo.wav".to_string(),
			language_hints: vec!["en".to_string()],
			stt_model_hint: None,
			document_refs: Vec::new(),
			image_refs: Vec::new(),
		})
		.await
		.expect("Failed to register note.");
	let state = WorkerState { service };
	let processed = process_queue_once(&state).await.expect("Worker pass failed.");

	assert!(processed, "The worker must find the registered job.");

	let note = queries::fetch_note(&state.service.db, response.note_id)
		.await
		.expect("Failed to fetch note.")
		.expect("Note must exist.");

	assert_eq!(note.status, "DONE");
	assert_eq!(note.transcript.as_deref(), Some("We agreed to cut the release on Friday."));
	assert_eq!(note.title.as_deref(), Some("Sprint planning recap"));
	assert_eq!(note.priority.as_deref(), Some("high"));
	assert!(note.summary.as_deref().unwrap_or_default().contains("release"));
	assert!(note.processing_duration_ms.is_some());
	assert!(note.failure_reason.is_none());

	// One task materialized, with its intent actions attached.
	let (task_count, actions): (i64, serde_json::Value) = {
		let count: i64 =
			sqlx::query_scalar("SELECT count(*) FROM tasks WHERE note_id = $1")
				.bind(note.note_id)
				.fetch_one(&state.service.db.pool)
				.await
				.expect("Failed to count tasks.");
		let actions: serde_json::Value = sqlx::query_scalar(
			"SELECT suggested_actions FROM tasks WHERE note_id = $1 LIMIT 1",
		)
		.bind(note.note_id)
		.fetch_one(&state.service.db.pool)
		.await
		.expect("Failed to fetch actions.");

		(count, actions)
	};

	assert_eq!(task_count, 1);

	let kinds: Vec<&str> = actions
		.as_array()
		.expect("Actions must be an array.")
		.iter()
		.filter_map(|action| action.get("kind").and_then(|k| k.as_str()))
		.collect();

	assert!(kinds.contains(&"search"));
	assert!(kinds.contains(&"call"), "The vendor phone number must produce a call action.");
	assert!(kinds.contains(&"assistant_prompt"));

	// The accepted engine's transcript copy is kept for audit.
	let engine: String =
		sqlx::query_scalar("SELECT engine FROM note_transcripts WHERE note_id = $1")
			.bind(note.note_id)
			.fetch_one(&state.service.db.pool)
			.await
			.expect("Failed to fetch transcript copy.");

	assert_eq!(engine, "primary");

	// 90 s at 10 credits/min rounds up to 20 credits.
	let (balance, usage_amount): (i64, i64) = {
		let balance: i64 =
			sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1")
				.bind(account.account_id)
				.fetch_one(&state.service.db.pool)
				.await
				.expect("Failed to read balance.");
		let usage_amount: i64 = sqlx::query_scalar(
			"\
SELECT t.amount
FROM wallet_transactions t
JOIN wallets w ON w.wallet_id = t.wallet_id
WHERE w.account_id = $1 AND t.type = 'USAGE'",
		)
		.bind(account.account_id)
		.fetch_one(&state.service.db.pool)
		.await
		.expect("Failed to read usage row.");

		(balance, usage_amount)
	};

	assert_eq!(usage_amount, -20);
	assert_eq!(balance, 2_980);

	// Status events for the fan-out, partitioned by account.
	let statuses: Vec<String> = sqlx::query_scalar(
		"\
SELECT payload->>'status'
FROM pipeline_events
WHERE account_id = $1 AND event_type = 'STATUS_CHANGED'
ORDER BY created_at ASC",
	)
	.bind(account.account_id)
	.fetch_all(&state.service.db.pool)
	.await
	.expect("Failed to read events.");

	assert_eq!(statuses, vec!["PROCESSING".to_string(), "DONE".to_string()]);

	let task_events: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM pipeline_events WHERE note_id = $1 AND event_type = 'TASK_CREATED'",
	)
	.bind(note.note_id)
	.fetch_one(&state.service.db.pool)
	.await
	.expect("Failed to count task events.");

	assert_eq!(task_events, 1);
	assert_eq!(sent.lock().expect("Notifier lock poisoned.").len(), 1);
	assert!(super::scratch_is_clean(&scratch_dir), "Ephemeral files must be gone.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
