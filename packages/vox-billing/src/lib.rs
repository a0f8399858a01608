mod error;

pub use error::{Error, Result};

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use vox_storage::models::Wallet;

const MS_PER_MINUTE: i64 = 60_000;

/// Ledger entry kinds. The string forms are a persisted contract that
/// external reporting reads; do not rename them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
	Deposit,
	Usage,
	Refund,
	Bonus,
	AdminCredit,
	AdminDebit,
}
impl TransactionType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Deposit => "DEPOSIT",
			Self::Usage => "USAGE",
			Self::Refund => "REFUND",
			Self::Bonus => "BONUS",
			Self::AdminCredit => "ADMIN_CREDIT",
			Self::AdminDebit => "ADMIN_DEBIT",
		}
	}
}

/// What a charge is denominated in: an explicit credit amount, or an audio
/// duration converted at the account's per-minute rate.
#[derive(Debug, Clone, Copy)]
pub enum ChargeAmount {
	Credits(i64),
	Duration { duration_ms: i64, rate_per_minute: i64 },
}
impl ChargeAmount {
	pub fn credits(self) -> Result<i64> {
		match self {
			Self::Credits(credits) if credits < 0 =>
				Err(Error::InvalidAmount(format!("Charge amount {credits} must not be negative."))),
			Self::Credits(credits) => Ok(credits),
			Self::Duration { rate_per_minute, .. } if rate_per_minute <= 0 => Err(
				Error::InvalidAmount(format!("Rate {rate_per_minute} must be positive.")),
			),
			Self::Duration { duration_ms, rate_per_minute } =>
				Ok(cost_for_duration(duration_ms, rate_per_minute)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditSource {
	Deposit,
	Refund,
	Bonus,
}
impl CreditSource {
	fn transaction_type(self) -> TransactionType {
		match self {
			Self::Deposit => TransactionType::Deposit,
			Self::Refund => TransactionType::Refund,
			Self::Bonus => TransactionType::Bonus,
		}
	}
}

/// Partial minutes bill as whole minutes; sub-zero durations bill nothing.
pub fn cost_for_duration(duration_ms: i64, rate_per_minute: i64) -> i64 {
	if duration_ms <= 0 {
		return 0;
	}

	let minutes = (duration_ms as u64).div_ceil(MS_PER_MINUTE as u64) as i64;

	minutes * rate_per_minute
}

/// Owns wallet balances and their append-only transaction history. Every
/// mutation re-reads the wallet row under `FOR UPDATE` inside one database
/// transaction, which is what makes concurrent charges land on an exact
/// count instead of a race.
pub struct Ledger {
	pool: PgPool,
}
impl Ledger {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// First access provisions the wallet with the starter balance and a
	/// paired BONUS entry; later calls return the existing row untouched.
	pub async fn get_or_create_wallet(
		&self,
		account_id: Uuid,
		starter_balance: i64,
		currency: &str,
	) -> Result<Wallet> {
		let mut tx = self.pool.begin().await?;
		let inserted = sqlx::query(
			"\
INSERT INTO wallets (wallet_id, account_id, balance, currency)
VALUES ($1, $2, $3, $4)
ON CONFLICT (account_id) DO NOTHING",
		)
		.bind(Uuid::new_v4())
		.bind(account_id)
		.bind(starter_balance)
		.bind(currency)
		.execute(&mut *tx)
		.await?;
		let wallet = fetch_wallet_tx(&mut tx, account_id)
			.await?
			.ok_or(Error::WalletNotFound(account_id))?;

		if inserted.rows_affected() > 0 && starter_balance > 0 {
			insert_transaction_tx(
				&mut tx,
				wallet.wallet_id,
				starter_balance,
				wallet.balance,
				TransactionType::Bonus,
				"Starter credit grant",
				None,
			)
			.await?;
		}

		tx.commit().await?;

		Ok(wallet)
	}

	/// Pre-flight gate with the same locking semantics as `charge`, so a
	/// caller that checks and then immediately charges does not race a
	/// concurrent spender into a double-spend.
	pub async fn check_balance(&self, account_id: Uuid, amount: i64) -> Result<bool> {
		let mut tx = self.pool.begin().await?;
		let wallet = fetch_wallet_for_update_tx(&mut tx, account_id).await?;
		let ok = match wallet {
			Some(wallet) => !wallet.is_frozen && wallet.balance >= amount,
			None => false,
		};

		tx.commit().await?;

		Ok(ok)
	}

	/// Returns false, without mutating anything, when the wallet is frozen
	/// or the balance does not cover the cost.
	pub async fn charge(
		&self,
		account_id: Uuid,
		amount: ChargeAmount,
		description: &str,
		reference_id: Option<&str>,
	) -> Result<bool> {
		let credits = amount.credits()?;

		if credits == 0 {
			return Ok(true);
		}

		let mut tx = self.pool.begin().await?;
		let wallet = fetch_wallet_for_update_tx(&mut tx, account_id)
			.await?
			.ok_or(Error::WalletNotFound(account_id))?;

		if wallet.is_frozen || wallet.balance < credits {
			return Ok(false);
		}

		let balance_after =
			debit_wallet_tx(&mut tx, wallet.wallet_id, credits).await?;

		insert_transaction_tx(
			&mut tx,
			wallet.wallet_id,
			-credits,
			balance_after,
			TransactionType::Usage,
			description,
			reference_id,
		)
		.await?;
		tx.commit().await?;

		Ok(true)
	}

	pub async fn credit(
		&self,
		account_id: Uuid,
		amount: i64,
		source: CreditSource,
		description: &str,
		reference_id: Option<&str>,
	) -> Result<Wallet> {
		if amount <= 0 {
			return Err(Error::InvalidAmount(format!(
				"Credit amount {amount} must be positive."
			)));
		}

		let mut tx = self.pool.begin().await?;
		let wallet = fetch_wallet_for_update_tx(&mut tx, account_id)
			.await?
			.ok_or(Error::WalletNotFound(account_id))?;
		let balance_after = credit_wallet_tx(&mut tx, wallet.wallet_id, amount).await?;

		insert_transaction_tx(
			&mut tx,
			wallet.wallet_id,
			amount,
			balance_after,
			source.transaction_type(),
			description,
			reference_id,
		)
		.await?;
		tx.commit().await?;

		fetch_wallet_committed(&self.pool, account_id).await
	}

	/// Administrative override. A negative delta is the one path allowed
	/// to drive a balance below zero.
	pub async fn admin_adjust(
		&self,
		account_id: Uuid,
		delta: i64,
		description: &str,
		reference_id: Option<&str>,
	) -> Result<Wallet> {
		if delta == 0 {
			return Err(Error::InvalidAmount("Adjustment delta must be non-zero.".to_string()));
		}

		let mut tx = self.pool.begin().await?;
		let wallet = fetch_wallet_for_update_tx(&mut tx, account_id)
			.await?
			.ok_or(Error::WalletNotFound(account_id))?;
		let balance_after = credit_wallet_tx(&mut tx, wallet.wallet_id, delta).await?;
		let kind = if delta > 0 { TransactionType::AdminCredit } else { TransactionType::AdminDebit };

		insert_transaction_tx(
			&mut tx,
			wallet.wallet_id,
			delta,
			balance_after,
			kind,
			description,
			reference_id,
		)
		.await?;
		tx.commit().await?;

		fetch_wallet_committed(&self.pool, account_id).await
	}
}

async fn fetch_wallet_tx(
	tx: &mut Transaction<'_, Postgres>,
	account_id: Uuid,
) -> Result<Option<Wallet>> {
	let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE account_id = $1")
		.bind(account_id)
		.fetch_optional(&mut **tx)
		.await?;

	Ok(wallet)
}

async fn fetch_wallet_for_update_tx(
	tx: &mut Transaction<'_, Postgres>,
	account_id: Uuid,
) -> Result<Option<Wallet>> {
	let wallet =
		sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE account_id = $1 FOR UPDATE")
			.bind(account_id)
			.fetch_optional(&mut **tx)
			.await?;

	Ok(wallet)
}

async fn fetch_wallet_committed(pool: &PgPool, account_id: Uuid) -> Result<Wallet> {
	let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE account_id = $1")
		.bind(account_id)
		.fetch_optional(pool)
		.await?;

	wallet.ok_or(Error::WalletNotFound(account_id))
}

async fn debit_wallet_tx(
	tx: &mut Transaction<'_, Postgres>,
	wallet_id: Uuid,
	credits: i64,
) -> Result<i64> {
	let balance_after: i64 = sqlx::query_scalar(
		"\
UPDATE wallets
SET balance = balance - $2, updated_at = now()
WHERE wallet_id = $1
RETURNING balance",
	)
	.bind(wallet_id)
	.bind(credits)
	.fetch_one(&mut **tx)
	.await?;

	Ok(balance_after)
}

async fn credit_wallet_tx(
	tx: &mut Transaction<'_, Postgres>,
	wallet_id: Uuid,
	delta: i64,
) -> Result<i64> {
	let balance_after: i64 = sqlx::query_scalar(
		"\
UPDATE wallets
SET balance = balance + $2, updated_at = now()
WHERE wallet_id = $1
RETURNING balance",
	)
	.bind(wallet_id)
	.bind(delta)
	.fetch_one(&mut **tx)
	.await?;

	Ok(balance_after)
}

async fn insert_transaction_tx(
	tx: &mut Transaction<'_, Postgres>,
	wallet_id: Uuid,
	amount: i64,
	balance_after: i64,
	kind: TransactionType,
	description: &str,
	reference_id: Option<&str>,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO wallet_transactions (
	id,
	wallet_id,
	amount,
	balance_after,
	type,
	description,
	reference_id
)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(Uuid::new_v4())
	.bind(wallet_id)
	.bind(amount)
	.bind(balance_after)
	.bind(kind.as_str())
	.bind(description)
	.bind(reference_id)
	.execute(&mut **tx)
	.await?;

	Ok(())
}
