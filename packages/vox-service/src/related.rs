use serde_json::Value;

use vox_storage::{
	models::{Account, Note, SimilarNote},
	queries, vector_to_pg,
};

use crate::{Service, StageResult, embedding_version, events};

/// Embeds a text and returns the same-account DONE notes inside the
/// similarity threshold. Used twice per invocation: once over the
/// transcript to ground extraction, once over the produced summary to
/// store the embedding and discover linkage.
pub(crate) async fn similar_to_text(
	service: &Service,
	note: &Note,
	text: &str,
	threshold: f32,
	store: bool,
) -> StageResult<Vec<SimilarNote>> {
	let vectors =
		service.providers.embedder.embed(&service.cfg.providers.embedding, &[text.to_string()]).await?;
	let Some(vec) = vectors.into_iter().next() else {
		return Err(crate::PipelineError::terminal(
			"Embedding provider returned no vectors.".to_string(),
		));
	};

	if vec.len() != service.cfg.storage.vector_dim as usize {
		return Err(crate::PipelineError::terminal(
			"Embedding vector dimension mismatch.".to_string(),
		));
	}

	let vec_text = vector_to_pg(&vec);
	let version = embedding_version(&service.cfg);

	if store {
		queries::upsert_note_embedding(
			&service.db,
			note.note_id,
			&version,
			vec.len() as i32,
			&vec_text,
		)
		.await?;
	}

	let candidates = queries::similar_notes(
		&service.db,
		note.account_id,
		note.note_id,
		&vec_text,
		&version,
		i64::from(service.cfg.pipeline.max_related),
	)
	.await?;

	Ok(candidates.into_iter().filter(|candidate| candidate.similarity >= threshold).collect())
}

/// Persists linkage rows for the discovered related notes. Best-effort:
/// a failed insert costs a link, not the job.
pub(crate) async fn link_related(service: &Service, note: &Note, related: &[SimilarNote]) {
	for candidate in related {
		if let Err(err) = queries::insert_note_link(
			&service.db,
			note.note_id,
			candidate.note_id,
			candidate.similarity,
		)
		.await
		{
			tracing::warn!(
				note_id = %note.note_id,
				related_note_id = %candidate.note_id,
				error = %err,
				"Failed to store note link."
			);
		}
	}
}

/// Read-only, informational conflict detection against the most similar
/// prior notes. Detected contradictions are attached to the note and
/// pushed to the device; any failure in here is logged and swallowed.
pub(crate) async fn detect_conflicts(
	service: &Service,
	note: &Note,
	account: &Account,
	summary: &str,
	related: &[SimilarNote],
) {
	let candidates: Vec<&SimilarNote> = related
		.iter()
		.filter(|candidate| candidate.similarity >= service.cfg.pipeline.conflict_threshold)
		.collect();

	if candidates.is_empty() {
		return;
	}

	let messages = build_conflict_messages(summary, &candidates);
	let response = match service
		.providers
		.extractor
		.extract(&service.cfg.providers.llm_extractor, &messages)
		.await
	{
		Ok(response) => response,
		Err(err) => {
			tracing::warn!(note_id = %note.note_id, error = %err, "Conflict detection failed.");

			return;
		},
	};
	let conflicts = parse_conflicts(&response);

	if conflicts.is_empty() {
		return;
	}

	tracing::info!(note_id = %note.note_id, count = conflicts.len(), "Contradictions detected.");

	if let Err(err) =
		queries::set_note_conflicts(&service.db, note.note_id, &Value::Array(conflicts.clone()))
			.await
	{
		tracing::warn!(note_id = %note.note_id, error = %err, "Failed to store conflicts.");

		return;
	}

	events::emit(
		service,
		note.account_id,
		note.note_id,
		events::EventType::AiResponse,
		serde_json::json!({ "conflicts": conflicts }),
	)
	.await;

	if let (Some(push), Some(token)) =
		(service.cfg.providers.push.as_ref(), account.device_token.as_deref())
	{
		let data = serde_json::json!({ "note_id": note.note_id, "kind": "conflict" });

		if let Err(err) = service
			.providers
			.notifier
			.send(
				push,
				token,
				"Possible contradiction found",
				"A new note disagrees with something you said earlier.",
				&data,
			)
			.await
		{
			tracing::warn!(note_id = %note.note_id, error = %err, "Conflict notification failed.");
		}
	}
}

fn build_conflict_messages(summary: &str, candidates: &[&SimilarNote]) -> Vec<Value> {
	let mut prior = String::new();

	for candidate in candidates {
		let title = candidate.title.as_deref().unwrap_or("Untitled");
		let text = candidate.summary.as_deref().unwrap_or("");

		prior.push_str(&format!("\n- [{}] {title}: {text}", candidate.note_id));
	}

	vec![
		serde_json::json!({
			"role": "system",
			"content": "You compare a new note summary against prior notes and report factual \
			            contradictions as JSON: {\"conflicts\": [{\"note_id\", \"statement\", \
			            \"conflicting_statement\"}]}. Respond with JSON only. Report an empty \
			            array when nothing truly contradicts.",
		}),
		serde_json::json!({
			"role": "user",
			"content": format!("New summary:\n{summary}\n\nPrior notes:{prior}"),
		}),
	]
}

pub(crate) fn parse_conflicts(value: &Value) -> Vec<Value> {
	value
		.get("conflicts")
		.and_then(|v| v.as_array())
		.map(|arr| arr.iter().filter(|entry| entry.is_object()).cloned().collect())
		.unwrap_or_default()
}
