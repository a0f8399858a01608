use serde_json::Value;
use uuid::Uuid;

use vox_storage::queries;

use crate::Service;

/// Event kinds on the status channel the real-time fan-out consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
	StatusChanged,
	StepProgress,
	TaskCreated,
	AiResponse,
}
impl EventType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::StatusChanged => "STATUS_CHANGED",
			Self::StepProgress => "STEP_PROGRESS",
			Self::TaskCreated => "TASK_CREATED",
			Self::AiResponse => "AI_RESPONSE",
		}
	}
}

/// Best-effort append to the event feed. A job never fails because its
/// progress could not be broadcast.
pub(crate) async fn emit(
	service: &Service,
	account_id: Uuid,
	note_id: Uuid,
	event_type: EventType,
	payload: Value,
) {
	if let Err(err) =
		queries::insert_event(&service.db, account_id, note_id, event_type.as_str(), &payload).await
	{
		tracing::warn!(
			note_id = %note_id,
			event_type = event_type.as_str(),
			error = %err,
			"Failed to emit pipeline event."
		);
	}
}

pub(crate) async fn emit_status(service: &Service, account_id: Uuid, note_id: Uuid, status: &str) {
	emit(
		service,
		account_id,
		note_id,
		EventType::StatusChanged,
		serde_json::json!({ "status": status }),
	)
	.await;
}

pub(crate) async fn emit_step(service: &Service, account_id: Uuid, note_id: Uuid, step: &str) {
	emit(
		service,
		account_id,
		note_id,
		EventType::StepProgress,
		serde_json::json!({ "step": step }),
	)
	.await;
}
