use std::sync::{Arc, Mutex, atomic::AtomicUsize};

use vox_service::{RegisterNoteRequest, cascade};
use vox_storage::queries;
use vox_worker::worker::{WorkerState, process_queue_once};

use super::{RecordingNotifier, SpyExtractor, StubStt};

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn soft_delete_cascades_once_and_restores_symmetrically() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping soft_delete_cascades_once_and_restores_symmetrically; set VOX_PG_DSN to run."
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
			text: "Plan the offsite.".to_string(),
			duration_ms: Some(20_000),
			no_speech: false,
			calls: Arc::new(AtomicUsize::new(0)),
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

	// Account + note + task, all stamped in one transaction.
	let stamped = cascade::soft_delete_account(&state.service, account.account_id)
		.await
		.expect("Cascade failed.");

	assert_eq!(stamped, 3);

	let note = queries::fetch_note(&state.service.db, response.note_id)
		.await
		.expect("Failed to fetch note.")
		.expect("Note must exist.");

	assert!(note.deleted_at.is_some());

	// A second cascade finds nothing left to stamp.
	let again = cascade::soft_delete_account(&state.service, account.account_id)
		.await
		.expect("Cascade failed.");

	assert_eq!(again, 0);

	let restored = cascade::restore_account(&state.service, account.account_id)
		.await
		.expect("Restore failed.");

	assert_eq!(restored, 3);

	let note = queries::fetch_note(&state.service.db, response.note_id)
		.await
		.expect("Failed to fetch note.")
		.expect("Note must exist.");

	assert!(note.deleted_at.is_none());

	let live_tasks: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM tasks WHERE account_id = $1 AND deleted_at IS NULL",
	)
	.bind(account.account_id)
	.fetch_one(&state.service.db.pool)
	.await
	.expect("Failed to count tasks.");

	assert_eq!(live_tasks, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
