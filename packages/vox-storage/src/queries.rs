use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{Account, Note, SimilarNote, Task},
};

pub async fn insert_account(db: &Db, account: &Account) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO accounts (
	account_id,
	role_context,
	custom_instructions,
	vocabulary,
	timezone,
	device_token,
	rate_per_minute,
	deleted_at,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
	)
	.bind(account.account_id)
	.bind(account.role_context.as_str())
	.bind(account.custom_instructions.as_deref())
	.bind(&account.vocabulary)
	.bind(account.timezone.as_str())
	.bind(account.device_token.as_deref())
	.bind(account.rate_per_minute)
	.bind(account.deleted_at)
	.bind(account.created_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn fetch_account(db: &Db, account_id: Uuid) -> Result<Option<Account>> {
	let account =
		sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE account_id = $1")
			.bind(account_id)
			.fetch_optional(&db.pool)
			.await?;

	Ok(account)
}

pub async fn insert_note_tx(tx: &mut Transaction<'_, Postgres>, note: &Note) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO notes (
	note_id,
	account_id,
	status,
	audio_reference,
	transcript,
	summary,
	title,
	priority,
	tags,
	embedding_version,
	processing_duration_ms,
	failure_reason,
	conflicts,
	deleted_at,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
	)
	.bind(note.note_id)
	.bind(note.account_id)
	.bind(note.status.as_str())
	.bind(note.audio_reference.as_str())
	.bind(note.transcript.as_deref())
	.bind(note.summary.as_deref())
	.bind(note.title.as_deref())
	.bind(note.priority.as_deref())
	.bind(&note.tags)
	.bind(note.embedding_version.as_deref())
	.bind(note.processing_duration_ms)
	.bind(note.failure_reason.as_deref())
	.bind(&note.conflicts)
	.bind(note.deleted_at)
	.bind(note.created_at)
	.bind(note.updated_at)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

pub async fn fetch_note(db: &Db, note_id: Uuid) -> Result<Option<Note>> {
	let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE note_id = $1")
		.bind(note_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(note)
}

/// Moves a note into PROCESSING. Returns false when the note is already in
/// a terminal state or soft-deleted; a retried invocation finds the note
/// in PROCESSING and passes.
pub async fn begin_processing(db: &Db, note_id: Uuid, now: OffsetDateTime) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE notes
SET status = 'PROCESSING', updated_at = $2
WHERE note_id = $1 AND status IN ('PENDING', 'PROCESSING') AND deleted_at IS NULL",
	)
	.bind(note_id)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Parks a job permanently. Accepts PENDING as well: a validation failure
/// can strike before the job ever entered PROCESSING, and it still needs
/// its reason recorded. Terminal states stay final.
pub async fn mark_note_delayed(
	db: &Db,
	note_id: Uuid,
	reason: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE notes
SET status = 'DELAYED', failure_reason = $2, updated_at = $3
WHERE note_id = $1 AND status IN ('PENDING', 'PROCESSING')",
	)
	.bind(note_id)
	.bind(reason)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub struct NoteCompletion<'a> {
	pub transcript: &'a str,
	pub summary: &'a str,
	pub title: Option<&'a str>,
	pub priority: Option<&'a str>,
	pub tags: &'a Value,
	pub embedding_version: Option<&'a str>,
	pub processing_duration_ms: i64,
}

pub async fn finalize_note_done_tx(
	tx: &mut Transaction<'_, Postgres>,
	note_id: Uuid,
	completion: NoteCompletion<'_>,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE notes
SET
	status = 'DONE',
	transcript = $2,
	summary = $3,
	title = $4,
	priority = $5,
	tags = $6,
	embedding_version = $7,
	processing_duration_ms = $8,
	failure_reason = NULL,
	updated_at = $9
WHERE note_id = $1 AND status = 'PROCESSING'",
	)
	.bind(note_id)
	.bind(completion.transcript)
	.bind(completion.summary)
	.bind(completion.title)
	.bind(completion.priority)
	.bind(completion.tags)
	.bind(completion.embedding_version)
	.bind(completion.processing_duration_ms)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Keeps one transcript copy per engine so a failover's accepted output can
/// be audited against whatever the other engine produced.
pub async fn upsert_note_transcript(
	db: &Db,
	note_id: Uuid,
	engine: &str,
	transcript: &str,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO note_transcripts (note_id, engine, transcript)
VALUES ($1, $2, $3)
ON CONFLICT (note_id, engine) DO UPDATE
SET transcript = EXCLUDED.transcript, created_at = now()",
	)
	.bind(note_id)
	.bind(engine)
	.bind(transcript)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn upsert_note_embedding(
	db: &Db,
	note_id: Uuid,
	embedding_version: &str,
	embedding_dim: i32,
	vec_text: &str,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO note_embeddings (note_id, embedding_version, embedding_dim, vec)
VALUES ($1, $2, $3, $4::text::vector)
ON CONFLICT (note_id) DO UPDATE
SET
	embedding_version = EXCLUDED.embedding_version,
	embedding_dim = EXCLUDED.embedding_dim,
	vec = EXCLUDED.vec,
	created_at = now()",
	)
	.bind(note_id)
	.bind(embedding_version)
	.bind(embedding_dim)
	.bind(vec_text)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn similar_notes(
	db: &Db,
	account_id: Uuid,
	exclude_note_id: Uuid,
	vec_text: &str,
	embedding_version: &str,
	limit: i64,
) -> Result<Vec<SimilarNote>> {
	let rows = sqlx::query_as::<_, SimilarNote>(
		"\
SELECT
	n.note_id,
	(1 - (e.vec <=> $1::text::vector))::real AS similarity,
	n.title,
	n.summary
FROM note_embeddings e
JOIN notes n ON n.note_id = e.note_id
WHERE n.account_id = $2
	AND n.note_id <> $3
	AND n.status = 'DONE'
	AND n.deleted_at IS NULL
	AND e.embedding_version = $4
ORDER BY e.vec <=> $1::text::vector ASC
LIMIT $5",
	)
	.bind(vec_text)
	.bind(account_id)
	.bind(exclude_note_id)
	.bind(embedding_version)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn insert_note_link(
	db: &Db,
	note_id: Uuid,
	related_note_id: Uuid,
	similarity: f32,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO note_links (note_id, related_note_id, similarity)
VALUES ($1, $2, $3)
ON CONFLICT (note_id, related_note_id) DO NOTHING",
	)
	.bind(note_id)
	.bind(related_note_id)
	.bind(similarity)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn set_note_conflicts(db: &Db, note_id: Uuid, conflicts: &Value) -> Result<()> {
	sqlx::query("UPDATE notes SET conflicts = $2, updated_at = now() WHERE note_id = $1")
		.bind(note_id)
		.bind(conflicts)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn insert_event(
	db: &Db,
	account_id: Uuid,
	note_id: Uuid,
	event_type: &str,
	payload: &Value,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO pipeline_events (event_id, account_id, note_id, event_type, payload)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(Uuid::new_v4())
	.bind(account_id)
	.bind(note_id)
	.bind(event_type)
	.bind(payload)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Candidate rows for the task deduplicator's fingerprint comparison.
/// Title normalization happens in the caller; `IS NOT DISTINCT FROM`
/// makes NULL note ids and NULL deadlines compare as equal.
pub async fn find_tasks_for_dedup_tx(
	tx: &mut Transaction<'_, Postgres>,
	account_id: Uuid,
	note_id: Option<Uuid>,
	deadline: Option<OffsetDateTime>,
) -> Result<Vec<Task>> {
	let tasks = sqlx::query_as::<_, Task>(
		"\
SELECT *
FROM tasks
WHERE account_id = $1
	AND note_id IS NOT DISTINCT FROM $2
	AND deadline IS NOT DISTINCT FROM $3
	AND deleted_at IS NULL",
	)
	.bind(account_id)
	.bind(note_id)
	.bind(deadline)
	.fetch_all(&mut **tx)
	.await?;

	Ok(tasks)
}

pub async fn insert_task_tx(tx: &mut Transaction<'_, Postgres>, task: &Task) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO tasks (
	task_id,
	account_id,
	note_id,
	title,
	description,
	priority,
	deadline,
	suggested_actions,
	deleted_at,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
	)
	.bind(task.task_id)
	.bind(task.account_id)
	.bind(task.note_id)
	.bind(task.title.as_str())
	.bind(task.description.as_str())
	.bind(task.priority.as_str())
	.bind(task.deadline)
	.bind(&task.suggested_actions)
	.bind(task.deleted_at)
	.bind(task.created_at)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

/// Stamps the whole aggregate with one timestamp so the restore side can
/// recognize exactly the rows this cascade touched.
pub async fn soft_delete_account_tx(
	tx: &mut Transaction<'_, Postgres>,
	account_id: Uuid,
	stamp: OffsetDateTime,
) -> Result<u64> {
	let accounts = sqlx::query(
		"UPDATE accounts SET deleted_at = $2 WHERE account_id = $1 AND deleted_at IS NULL",
	)
	.bind(account_id)
	.bind(stamp)
	.execute(&mut **tx)
	.await?;
	let notes = sqlx::query(
		"\
UPDATE notes SET deleted_at = $2, updated_at = $2
WHERE account_id = $1 AND deleted_at IS NULL",
	)
	.bind(account_id)
	.bind(stamp)
	.execute(&mut **tx)
	.await?;
	let tasks = sqlx::query(
		"UPDATE tasks SET deleted_at = $2 WHERE account_id = $1 AND deleted_at IS NULL",
	)
	.bind(account_id)
	.bind(stamp)
	.execute(&mut **tx)
	.await?;

	Ok(accounts.rows_affected() + notes.rows_affected() + tasks.rows_affected())
}

pub async fn restore_account_tx(
	tx: &mut Transaction<'_, Postgres>,
	account_id: Uuid,
	stamp: OffsetDateTime,
) -> Result<u64> {
	let tasks = sqlx::query(
		"UPDATE tasks SET deleted_at = NULL WHERE account_id = $1 AND deleted_at = $2",
	)
	.bind(account_id)
	.bind(stamp)
	.execute(&mut **tx)
	.await?;
	let notes = sqlx::query(
		"\
UPDATE notes SET deleted_at = NULL, updated_at = now()
WHERE account_id = $1 AND deleted_at = $2",
	)
	.bind(account_id)
	.bind(stamp)
	.execute(&mut **tx)
	.await?;
	let accounts = sqlx::query(
		"UPDATE accounts SET deleted_at = NULL WHERE account_id = $1 AND deleted_at = $2",
	)
	.bind(account_id)
	.bind(stamp)
	.execute(&mut **tx)
	.await?;

	Ok(accounts.rows_affected() + notes.rows_affected() + tasks.rows_affected())
}
