use std::sync::{Arc, Mutex, atomic::AtomicUsize};

use vox_service::RegisterNoteRequest;
use vox_storage::queries;
use vox_worker::worker::{WorkerState, process_queue_once};

use super::{RecordingNotifier, SpyExtractor, StubStt};

#[tokio::test]
#[ignore = "Requires external Postgres. Set VOX_PG_DSN to run."]
async fn an_unpayable_charge_never_touches_the_finished_content() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping an_unpayable_charge_never_touches_the_finished_content; set VOX_PG_DSN to run."
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
			text: "A long planning discussion.".to_string(),
			duration_ms: Some(600_000),
			no_speech: false,
			calls: Arc::new(AtomicUsize::new(0)),
		}),
		Arc::new(SpyExtractor {
			calls: Arc::new(AtomicUsize::new(0)),
			payload: super::default_extraction_payload(),
		}),
		Arc::new(RecordingNotifier { sent: Arc::new(Mutex::new(Vec::new())) }),
	);
	let mut cfg = super::test_config(test_db.dsn().to_string(), scratch_dir);

	// A starter balance far below the 10-minute charge.
	cfg.billing.starter_balance = 5;

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

	// Content success is independent of monetization success.
	assert_eq!(note.status, "DONE");
	assert_eq!(note.transcript.as_deref(), Some("A long planning discussion."));
	assert!(!note.summary.as_deref().unwrap_or_default().is_empty());

	let (balance, usage_rows): (i64, i64) = {
		let balance: i64 =
			sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1")
				.bind(account.account_id)
				.fetch_one(&state.service.db.pool)
				.await
				.expect("Failed to read balance.");
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

		(balance, usage_rows)
	};

	assert_eq!(balance, 5, "The refused charge must not partially deduct.");
	assert_eq!(usage_rows, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
