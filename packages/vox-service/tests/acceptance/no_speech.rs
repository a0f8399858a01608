use std::sync::{Arc, Mutex, atomic::{AtomicUsize, Ordering}};

use vox_service::{RegisterNoteRequest, pipeline::NO_SPEECH_SUMMARY};
use vox_storage::queries;
use vox_worker::worker::{WorkerState, process_queue_once};

use super::{RecordingNotifier, SpyExtractor, StubStt};

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn silence_completes_the_job_instead_of_failing_it() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping silence_completes_the_job_instead_of_failing_it; set VOX_PG_DSN to run.");

		return;
	};
	let objects = tempfile::tempdir().expect("Failed to create objects dir.");
	let scratch = tempfile::tempdir().expect("Failed to create scratch dir.");
	let scratch_dir = scratch.path().to_str().expect("Scratch path must be UTF-8.").to_string();

	std::fs::write(objects.path().join("memo.wav"), b"RIFF silent audio")
		.expect("Failed to write audio object.");

	let extractor_calls = Arc::new(AtomicUsize::new(0));
	let providers = super::providers_with(
		Arc::new(StubStt {
			text: String::new(),
			duration_ms: Some(4_000),
			no_speech: true,
			calls: Arc::new(AtomicUsize::new(0)),
		}),
		Arc::new(SpyExtractor {
			calls: extractor_calls.clone(),
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

	assert_eq!(note.status, "DONE", "No speech is an expected outcome, never DELAYED.");
	assert_eq!(note.summary.as_deref(), Some(NO_SPEECH_SUMMARY));
	assert!(!note.summary.as_deref().unwrap_or_default().is_empty());
	assert!(note.failure_reason.is_none());
	assert_eq!(
		extractor_calls.load(Ordering::SeqCst),
		0,
		"Silence must short-circuit before the extraction call."
	);

	let task_count: i64 = sqlx::query_scalar("SELECT count(*) FROM tasks WHERE note_id = $1")
		.bind(note.note_id)
		.fetch_one(&state.service.db.pool)
		.await
		.expect("Failed to count tasks.");

	assert_eq!(task_count, 0);

	// 4 s of audio still rounds up to one billed minute.
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

	assert_eq!(usage_amount, -10);
	assert!(super::scratch_is_clean(&scratch_dir));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
