use std::sync::{Arc, Mutex, atomic::AtomicUsize};

use vox_service::RegisterNoteRequest;
use vox_storage::queries;
use vox_worker::worker::{WorkerState, process_queue_once};

use super::{EngineSelectiveStt, RecordingNotifier, SpyExtractor};

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn a_failing_primary_engine_falls_back_to_the_secondary() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping a_failing_primary_engine_falls_back_to_the_secondary; set VOX_PG_DSN to run."
		);

		return;
	};
	let objects = tempfile::tempdir().expect("Failed to create objects dir.");
	let scratch = tempfile::tempdir().expect("Failed to create scratch dir.");
	let scratch_dir = scratch.path().to_str().expect("Scratch path must be UTF-8.").to_string();

	std::fs::write(objects.path().join("memo.wav"), b"RIFF fake audio payload")
		.expect("Failed to write audio object.");

	let providers = super::providers_with(
		Arc::new(EngineSelectiveStt {
			fail_engine: "primary".to_string(),
			text: "Fallback transcript.".to_string(),
			fail_all: false,
		}),
		Arc::new(SpyExtractor {
			calls: Arc::new(AtomicUsize::new(0)),
			payload: super::default_extraction_payload(),
		}),
		Arc::new(RecordingNotifier { sent: Arc::new(Mutex::new(Vec::new())) }),
	);
	let cfg = super::test_config(test_db.dsn().to_string(), scratch_dir);
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

	assert_eq!(note.status, "DONE");
	assert_eq!(note.transcript.as_deref(), Some("Fallback transcript."));

	// The audit copy names the engine that actually won.
	let engine: String =
		sqlx::query_scalar("SELECT engine FROM note_transcripts WHERE note_id = $1")
			.bind(note.note_id)
			.fetch_one(&state.service.db.pool)
			.await
			.expect("Failed to fetch transcript copy.");

	assert_eq!(engine, "backup");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn exhausting_every_engine_parks_the_job_without_retry() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping exhausting_every_engine_parks_the_job_without_retry; set VOX_PG_DSN to run."
		);

		return;
	};
	let objects = tempfile::tempdir().expect("Failed to create objects dir.");
	let scratch = tempfile::tempdir().expect("Failed to create scratch dir.");
	let scratch_dir = scratch.path().to_str().expect("Scratch path must be UTF-8.").to_string();

	std::fs::write(objects.path().join("memo.wav"), b"RIFF fake audio payload")
		.expect("Failed to write audio object.");

	let providers = super::providers_with(
		Arc::new(EngineSelectiveStt {
			fail_engine: String::new(),
			text: String::new(),
			fail_all: true,
		}),
		Arc::new(SpyExtractor {
			calls: Arc::new(AtomicUsize::new(0)),
			payload: super::default_extraction_payload(),
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

	// Retrying unconfigured or dead engines will never succeed, so this is
	// terminal on the first attempt.
	assert_eq!(note.status, "DELAYED");
	assert!(
		note.failure_reason
			.as_deref()
			.unwrap_or_default()
			.contains("All transcription engines unavailable")
	);

	let attempts: i32 =
		sqlx::query_scalar("SELECT attempts FROM processing_queue WHERE queue_id = $1")
			.bind(response.queue_id)
			.fetch_one(&state.service.db.pool)
			.await
			.expect("Failed to read attempts.");

	assert_eq!(attempts, 0, "A terminal failure must not consume retry attempts.");

	let more = process_queue_once(&state).await.expect("Worker pass failed.");

	assert!(!more, "The dead entry must not be redelivered.");
	assert!(super::scratch_is_clean(&scratch_dir));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
