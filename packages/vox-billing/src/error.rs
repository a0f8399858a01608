pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Wallet not found for account {0}.")]
	WalletNotFound(uuid::Uuid),
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
}
