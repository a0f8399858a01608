use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::QueueEntry};

/// Registers a job for the worker fleet. Lives in the same transaction as
/// the note insert so a job can never reference a note that was rolled
/// back.
pub async fn enqueue_tx(
	tx: &mut Transaction<'_, Postgres>,
	note_id: Uuid,
	payload: &Value,
	now: OffsetDateTime,
) -> Result<Uuid> {
	let queue_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO processing_queue (
	queue_id,
	note_id,
	payload,
	status,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, 'PENDING', $4, $4, $4)",
	)
	.bind(queue_id)
	.bind(note_id)
	.bind(payload)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(queue_id)
}

/// Claims the next due entry with a short lease. `FOR UPDATE SKIP LOCKED`
/// keeps parallel worker slots from double-claiming; a crashed worker's
/// claim resurfaces when the lease expires, which is where the queue's
/// at-least-once behavior comes from.
pub async fn claim_next(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<QueueEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, QueueEntry>(
		"\
SELECT *
FROM processing_queue
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let entry = if let Some(mut entry) = row {
		let lease_until = now + Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE processing_queue SET available_at = $1, updated_at = $2 WHERE queue_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(entry.queue_id)
		.execute(&mut *tx)
		.await?;

		entry.available_at = lease_until;
		entry.updated_at = now;

		Some(entry)
	} else {
		None
	};

	tx.commit().await?;

	Ok(entry)
}

pub async fn mark_done(db: &Db, queue_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"UPDATE processing_queue SET status = 'DONE', updated_at = $1 WHERE queue_id = $2",
	)
	.bind(now)
	.bind(queue_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Consumes an entry that will never be retried, keeping the final error
/// text for operators.
pub async fn mark_dead(db: &Db, queue_id: Uuid, error_text: &str, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
UPDATE processing_queue
SET status = 'DONE', last_error = $1, updated_at = $2
WHERE queue_id = $3",
	)
	.bind(error_text)
	.bind(now)
	.bind(queue_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Manual requeue-with-backoff for a transient failure.
pub async fn requeue(
	db: &Db,
	queue_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE processing_queue
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE queue_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(queue_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
