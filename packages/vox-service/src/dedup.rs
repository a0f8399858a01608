use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use vox_domain::{actions, fingerprint};
use vox_storage::{models::Task, queries};

use crate::{StageResult, extract::CandidateTask};

pub struct MaterializedTask {
	pub task: Task,
	pub created: bool,
}

/// Returns the existing task for this fingerprint untouched, or creates a
/// new one with its suggested actions materialized. Extraction is
/// non-deterministic across redeliveries of the same note, so this lookup
/// is what keeps N deliveries from minting N ghost copies of one task.
pub async fn materialize_or_get(
	tx: &mut Transaction<'_, Postgres>,
	account_id: Uuid,
	note_id: Option<Uuid>,
	candidate: &CandidateTask,
	now: OffsetDateTime,
) -> StageResult<MaterializedTask> {
	let wanted = fingerprint::Fingerprint::new(&candidate.title, candidate.deadline);
	let existing = queries::find_tasks_for_dedup_tx(tx, account_id, note_id, candidate.deadline)
		.await?
		.into_iter()
		.find(|task| fingerprint::Fingerprint::new(&task.title, task.deadline) == wanted);

	if let Some(task) = existing {
		return Ok(MaterializedTask { task, created: false });
	}

	let suggested = actions::suggest_actions(&candidate.title, &candidate.description);
	let suggested_actions: Value =
		serde_json::to_value(&suggested).unwrap_or_else(|_| Value::Array(Vec::new()));
	let task = Task {
		task_id: Uuid::new_v4(),
		account_id,
		note_id,
		title: candidate.title.clone(),
		description: candidate.description.clone(),
		priority: candidate.priority.clone(),
		deadline: candidate.deadline,
		suggested_actions,
		deleted_at: None,
		created_at: now,
	};

	queries::insert_task_tx(tx, &task).await?;

	Ok(MaterializedTask { task, created: true })
}
