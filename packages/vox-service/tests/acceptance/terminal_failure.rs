use std::sync::{Arc, Mutex, atomic::AtomicUsize};

use vox_service::RegisterNoteRequest;
use vox_storage::queries;
use vox_worker::worker::{WorkerState, process_queue_once};

use super::{FailingExtractor, RecordingNotifier, StubStt};

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn a_permanent_error_parks_the_job_with_its_reason_and_never_retries() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping a_permanent_error_parks_the_job_with_its_reason_and_never_retries; set VOX_PG_DSN to run."
		);

		return;
	};
	let objects = tempfile::tempdir().expect("Failed to create objects dir.");
	let scratch = tempfile::tempdir().expect("Failed to create scratch dir.");
	let scratch_dir = scratch.path().to_str().expect("Scratch path must be UTF-8.").to_string();

	std::fs::write(objects.path().join("memo.wav"), b"RIFF fake audio payload")
		.expect("Failed to write audio object.");

	let providers = super::providers_with(
		Arc::new(StubStt {
			text: "Some speech.".to_string(),
			duration_ms: Some(5_000),
			no_speech: false,
			calls: Arc::new(AtomicUsize::new(0)),
		}),
		Arc::new(FailingExtractor {
			reason: "Provider response failed schema validation.".to_string(),
		}),
		Arc::new(RecordingNotifier { sent: Arc::new(Mutex::new(Vec::new())) }),
	);
	let cfg = super::test_config(test_db.dsn().to_string(), scratch_dir.clone());
	let service = super::build_service(cfg, providers, objects.path())
		.await
		.expect("Failed to build service.");
	let account = super::seed_account(&service.db, None).await;
	let response = service
		.register_note(RegisterNoteRequest {
			account_id: account.account_id,
			audio_reference: "store://memo.wav".to_string(),
			language_hints: Vec::new(),
			stt_model_hint: None,
			document_refs: Vec::new(),
			image_refs: Vec::new(),
		})
		.await
		.expect("Failed to register note.");
	let state = WorkerState { service };

	process_queue_once(&state).await.expect("Worker pass failed.");

	let note = queries::fetch_note(&state.service.db, response.note_id)
		.await
		.expect("Failed to fetch note.")
		.expect("Note must exist.");

	assert_eq!(note.status, "DELAYED");
	assert!(
		note.failure_reason.as_deref().unwrap_or_default().contains("schema validation"),
		"The stored reason must describe the failure."
	);

	let delayed_events: i64 = sqlx::query_scalar(
		"\
SELECT count(*)
FROM pipeline_events
WHERE note_id = $1 AND event_type = 'STATUS_CHANGED' AND payload->>'status' = 'DELAYED'",
	)
	.bind(note.note_id)
	.fetch_one(&state.service.db.pool)
	.await
	.expect("Failed to count events.");

	assert_eq!(delayed_events, 1);

	// No second delivery: the entry left the queue on the first pass.
	let more = process_queue_once(&state).await.expect("Worker pass failed.");

	assert!(!more);
	assert!(super::scratch_is_clean(&scratch_dir));

	// No charge was taken for a job that produced no content.
	let usage_rows: i64 = sqlx::query_scalar(
		"\
SELECT count(*)
FROM wallet_transactions t
JOIN wallets w ON w.wallet_id = t.wallet_id
WHERE w.account_id = $1 AND t.type = 'USAGE'",
	)
	.bind(account.account_id)
	.fetch_one(&state.service.db.pool)
	.await
	.expect("Failed to count usage rows.");

	assert_eq!(usage_rows, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
