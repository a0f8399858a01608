use time::OffsetDateTime;
use uuid::Uuid;

use vox_storage::{Result, queries};

use crate::Service;

/// Soft-deletes the whole aggregate (account, its notes, their tasks) in
/// one transaction under one timestamp. Returns the number of rows
/// stamped.
pub async fn soft_delete_account(service: &Service, account_id: Uuid) -> Result<u64> {
	let stamp = OffsetDateTime::now_utc();
	let mut tx = service.db.pool.begin().await?;
	let stamped = queries::soft_delete_account_tx(&mut tx, account_id, stamp).await?;

	tx.commit().await?;

	tracing::info!(account_id = %account_id, rows = stamped, "Account soft-deleted.");

	Ok(stamped)
}

/// Symmetric restore: clears exactly the rows carrying the cascade's
/// stamp, so rows the user had deleted individually before the cascade
/// stay deleted.
pub async fn restore_account(service: &Service, account_id: Uuid) -> Result<u64> {
	let stamp: Option<OffsetDateTime> =
		sqlx::query_scalar("SELECT deleted_at FROM accounts WHERE account_id = $1")
			.bind(account_id)
			.fetch_optional(&service.db.pool)
			.await?
			.flatten();
	let Some(stamp) = stamp else {
		return Ok(0);
	};
	let mut tx = service.db.pool.begin().await?;
	let restored = queries::restore_account_tx(&mut tx, account_id, stamp).await?;

	tx.commit().await?;

	tracing::info!(account_id = %account_id, rows = restored, "Account restored.");

	Ok(restored)
}
