use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Forward-only lifecycle of a note under processing.
pub const NOTE_STATUS_PENDING: &str = "PENDING";
pub const NOTE_STATUS_PROCESSING: &str = "PROCESSING";
pub const NOTE_STATUS_DONE: &str = "DONE";
pub const NOTE_STATUS_DELAYED: &str = "DELAYED";

#[derive(Debug, sqlx::FromRow)]
pub struct Account {
	pub account_id: Uuid,
	pub role_context: String,
	pub custom_instructions: Option<String>,
	pub vocabulary: Value,
	pub timezone: String,
	pub device_token: Option<String>,
	pub rate_per_minute: Option<i64>,
	pub deleted_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct Note {
	pub note_id: Uuid,
	pub account_id: Uuid,
	pub status: String,
	pub audio_reference: String,
	pub transcript: Option<String>,
	pub summary: Option<String>,
	pub title: Option<String>,
	pub priority: Option<String>,
	pub tags: Value,
	pub embedding_version: Option<String>,
	pub processing_duration_ms: Option<i64>,
	pub failure_reason: Option<String>,
	pub conflicts: Value,
	pub deleted_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct Task {
	pub task_id: Uuid,
	pub account_id: Uuid,
	pub note_id: Option<Uuid>,
	pub title: String,
	pub description: String,
	pub priority: String,
	pub deadline: Option<OffsetDateTime>,
	pub suggested_actions: Value,
	pub deleted_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct Wallet {
	pub wallet_id: Uuid,
	pub account_id: Uuid,
	pub balance: i64,
	pub currency: String,
	pub is_frozen: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct WalletTransaction {
	pub id: Uuid,
	pub wallet_id: Uuid,
	pub amount: i64,
	pub balance_after: i64,
	pub r#type: String,
	pub description: String,
	pub reference_id: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct QueueEntry {
	pub queue_id: Uuid,
	pub note_id: Uuid,
	pub payload: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// A note surfaced by the pgvector similarity scan, with just the fields
/// the pipeline grounds extraction and conflict detection on.
#[derive(Debug, sqlx::FromRow)]
pub struct SimilarNote {
	pub note_id: Uuid,
	pub similarity: f32,
	pub title: Option<String>,
	pub summary: Option<String>,
}
