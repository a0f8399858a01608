use std::time::Instant;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use vox_billing::ChargeAmount;
use vox_storage::{
	models::{
		Account, NOTE_STATUS_DELAYED, NOTE_STATUS_DONE, NOTE_STATUS_PENDING,
		NOTE_STATUS_PROCESSING, Note, QueueEntry,
	},
	queries::{self, NoteCompletion},
	queue,
};

use crate::{
	PipelineError, Service, StageResult,
	audio::{self, ScratchGuard},
	dedup,
	events::{self, EventType},
	extract, related, transcribe,
};

pub const NO_SPEECH_SUMMARY: &str =
	"No speech was detected in this recording. If the memo did contain audio, try re-recording \
	 closer to the microphone.";

// PCM16 mono at 16 kHz, used only when the engine reports no duration.
const FALLBACK_AUDIO_BYTES_PER_MS: i64 = 32;

/// The queue contract: what an upload or batch-sync collaborator enqueues
/// for the worker fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
	pub job_id: Uuid,
	pub audio_reference: String,
	#[serde(default)]
	pub account_role_context: String,
	#[serde(default)]
	pub document_refs: Vec<String>,
	#[serde(default)]
	pub image_refs: Vec<String>,
	#[serde(default)]
	pub language_hints: Vec<String>,
	#[serde(default)]
	pub stt_model_hint: Option<String>,
}

#[derive(Debug)]
pub struct PipelineOutcome {
	pub note_id: Uuid,
	pub engine_used: Option<String>,
	pub no_speech: bool,
	pub tasks_created: usize,
	/// True when a redelivered entry found the note already DONE or
	/// DELAYED and nothing ran.
	pub already_terminal: bool,
}

#[derive(Debug, Clone)]
pub struct RegisterNoteRequest {
	pub account_id: Uuid,
	pub audio_reference: String,
	pub language_hints: Vec<String>,
	pub stt_model_hint: Option<String>,
	pub document_refs: Vec<String>,
	pub image_refs: Vec<String>,
}

#[derive(Debug)]
pub struct RegisterNoteResponse {
	pub note_id: Uuid,
	pub queue_id: Uuid,
}

impl Service {
	/// Registers a PENDING note and its queue entry in one transaction.
	/// This is the entry point the upload collaborator calls; the note is
	/// mutated exclusively by the pipeline from here on.
	pub async fn register_note(
		&self,
		request: RegisterNoteRequest,
	) -> StageResult<RegisterNoteResponse> {
		let account = queries::fetch_account(&self.db, request.account_id)
			.await?
			.filter(|account| account.deleted_at.is_none())
			.ok_or_else(|| PipelineError::terminal("Account missing or deleted."))?;
		let now = OffsetDateTime::now_utc();
		let note_id = Uuid::new_v4();
		let note = Note {
			note_id,
			account_id: account.account_id,
			status: NOTE_STATUS_PENDING.to_string(),
			audio_reference: request.audio_reference.clone(),
			transcript: None,
			summary: None,
			title: None,
			priority: None,
			tags: serde_json::json!([]),
			embedding_version: None,
			processing_duration_ms: None,
			failure_reason: None,
			conflicts: serde_json::json!([]),
			deleted_at: None,
			created_at: now,
			updated_at: now,
		};
		let payload = serde_json::to_value(JobPayload {
			job_id: note_id,
			audio_reference: request.audio_reference,
			account_role_context: account.role_context.clone(),
			document_refs: request.document_refs,
			image_refs: request.image_refs,
			language_hints: request.language_hints,
			stt_model_hint: request.stt_model_hint,
		})
		.map_err(|err| PipelineError::terminal(format!("Failed to encode job payload: {err}")))?;
		let mut tx = self.db.pool.begin().await?;

		queries::insert_note_tx(&mut tx, &note).await?;

		let queue_id = queue::enqueue_tx(&mut tx, note_id, &payload, now).await?;

		tx.commit().await?;

		Ok(RegisterNoteResponse { note_id, queue_id })
	}

	/// One pipeline invocation for one claimed queue entry. Transient
	/// failures bubble out for the worker to requeue; terminal ones for it
	/// to park the job as DELAYED. Scratch files ride a drop guard, so
	/// every exit path below releases them.
	pub async fn process(&self, entry: &QueueEntry) -> StageResult<PipelineOutcome> {
		let payload: JobPayload = serde_json::from_value(entry.payload.clone())
			.map_err(|err| PipelineError::terminal(format!("Malformed queue payload: {err}")))?;
		let started = Instant::now();
		let note = queries::fetch_note(&self.db, payload.job_id)
			.await?
			.ok_or_else(|| PipelineError::terminal(format!("Note {} not found.", payload.job_id)))?;

		if note.status == NOTE_STATUS_DONE || note.status == NOTE_STATUS_DELAYED {
			tracing::info!(note_id = %note.note_id, status = note.status.as_str(), "Redelivered entry for a finished job. Skipping.");

			return Ok(PipelineOutcome {
				note_id: note.note_id,
				engine_used: None,
				no_speech: false,
				tasks_created: 0,
				already_terminal: true,
			});
		}

		let account = queries::fetch_account(&self.db, note.account_id)
			.await?
			.filter(|account| account.deleted_at.is_none())
			.ok_or_else(|| PipelineError::terminal("Owning account missing or deleted."))?;

		if !queries::begin_processing(&self.db, note.note_id, OffsetDateTime::now_utc()).await? {
			return Ok(PipelineOutcome {
				note_id: note.note_id,
				engine_used: None,
				no_speech: false,
				tasks_created: 0,
				already_terminal: true,
			});
		}

		events::emit_status(self, note.account_id, note.note_id, NOTE_STATUS_PROCESSING).await;

		let scratch = ScratchGuard::new(&self.cfg.pipeline.scratch_dir, note.note_id)?;

		self.run_stages(&payload, &note, &account, &scratch, started).await
	}

	/// Parks a job as DELAYED with its (already truncated) failure reason.
	/// Called by the worker once retries are exhausted or the failure is
	/// terminal; the conditional update keeps terminal states final.
	pub async fn park_delayed(&self, note_id: Uuid, reason: &str) -> StageResult<bool> {
		let delayed =
			queries::mark_note_delayed(&self.db, note_id, reason, OffsetDateTime::now_utc())
				.await?;

		if delayed
			&& let Some(note) = queries::fetch_note(&self.db, note_id).await?
		{
			events::emit_status(self, note.account_id, note.note_id, NOTE_STATUS_DELAYED).await;
		}

		Ok(delayed)
	}

	async fn run_stages(
		&self,
		payload: &JobPayload,
		note: &Note,
		account: &Account,
		scratch: &ScratchGuard,
		started: Instant,
	) -> StageResult<PipelineOutcome> {
		events::emit_step(self, note.account_id, note.note_id, "audio").await;

		let source = audio::resolve_audio(self, &payload.audio_reference, scratch).await?;
		let cleaned = scratch.claim("cleaned.audio");

		self.preprocessor.preprocess(&source, &cleaned).await?;

		let bytes = tokio::fs::read(&cleaned).await?;

		events::emit_step(self, note.account_id, note.note_id, "transcription").await;

		let (transcript, engine) = transcribe::select_transcript(
			self,
			&bytes,
			&payload.language_hints,
			payload.stt_model_hint.as_deref(),
		)
		.await?;

		queries::upsert_note_transcript(&self.db, note.note_id, &engine, &transcript.text).await?;

		let audio_duration_ms =
			transcript.duration_ms.unwrap_or(bytes.len() as i64 / FALLBACK_AUDIO_BYTES_PER_MS);

		if transcript.no_speech {
			return self
				.finish_no_speech(note, account, &engine, audio_duration_ms, started)
				.await;
		}

		events::emit_step(self, note.account_id, note.note_id, "extraction").await;

		// Grounding context is degradable; only infrastructure blips are
		// worth retrying the invocation for.
		let context = match related::similar_to_text(self, note, &transcript.text, 0.0, false).await
		{
			Ok(context) => context,
			Err(err) if err.is_transient() => return Err(err),
			Err(err) => {
				tracing::warn!(note_id = %note.note_id, error = %err, "Context retrieval failed; extracting without history.");

				Vec::new()
			},
		};
		let messages = extract::build_messages(&transcript.text, account, &context, note.created_at);
		let raw = self
			.providers
			.extractor
			.extract(&self.cfg.providers.llm_extractor, &messages)
			.await?;
		let result = extract::parse_extraction(&raw, &transcript.text);

		events::emit(
			self,
			note.account_id,
			note.note_id,
			EventType::AiResponse,
			serde_json::json!({
				"title": result.title,
				"summary": result.summary,
				"priority": result.priority,
				"task_count": result.tasks.len(),
				"leads": result
					.leads
					.iter()
					.map(|lead| {
						serde_json::json!({
							"name": lead.name,
							"company": lead.company,
							"details": lead.details,
						})
					})
					.collect::<Vec<_>>(),
			}),
		)
		.await;
		events::emit_step(self, note.account_id, note.note_id, "embedding").await;

		// Summary embedding, storage, and linkage discovery must not block
		// success.
		let (embedding_version, related_notes) = match related::similar_to_text(
			self,
			note,
			&result.summary,
			self.cfg.pipeline.related_threshold,
			true,
		)
		.await
		{
			Ok(related_notes) => (Some(crate::embedding_version(&self.cfg)), related_notes),
			Err(err) => {
				tracing::warn!(note_id = %note.note_id, error = %err, "Embedding stage failed; related-note discovery skipped.");

				(None, Vec::new())
			},
		};

		related::link_related(self, note, &related_notes).await;
		events::emit_step(self, note.account_id, note.note_id, "persistence").await;

		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let mut created_tasks = Vec::new();

		for candidate in &result.tasks {
			let materialized =
				dedup::materialize_or_get(&mut tx, note.account_id, Some(note.note_id), candidate, now)
					.await?;

			if materialized.created {
				created_tasks.push(materialized.task);
			}
		}

		// Extraction sometimes returns no tags; the transcript's own topic
		// heatmap is a serviceable fallback.
		let tag_list: Vec<String> = if result.tags.is_empty() {
			vox_domain::analytics::topic_heatmap(&transcript.text, &self.cfg.analytics)
				.into_iter()
				.map(|(token, _)| token)
				.take(5)
				.collect()
		} else {
			result.tags.clone()
		};
		let tags = serde_json::to_value(&tag_list).unwrap_or_else(|_| serde_json::json!([]));
		let finalized = queries::finalize_note_done_tx(
			&mut tx,
			note.note_id,
			NoteCompletion {
				transcript: &transcript.text,
				summary: &result.summary,
				title: result.title.as_deref(),
				priority: Some(result.priority.as_str()),
				tags: &tags,
				embedding_version: embedding_version.as_deref(),
				processing_duration_ms: started.elapsed().as_millis() as i64,
			},
			now,
		)
		.await?;

		tx.commit().await?;

		if !finalized {
			tracing::warn!(note_id = %note.note_id, "Note reached a terminal state concurrently. Skipping side effects.");

			return Ok(PipelineOutcome {
				note_id: note.note_id,
				engine_used: Some(engine),
				no_speech: false,
				tasks_created: 0,
				already_terminal: true,
			});
		}

		for task in &created_tasks {
			events::emit(
				self,
				note.account_id,
				note.note_id,
				EventType::TaskCreated,
				serde_json::json!({ "task_id": task.task_id, "title": task.title }),
			)
			.await;
		}

		events::emit_status(self, note.account_id, note.note_id, NOTE_STATUS_DONE).await;
		events::emit_step(self, note.account_id, note.note_id, "billing").await;
		self.charge_for_audio(note, account, audio_duration_ms).await;
		events::emit_step(self, note.account_id, note.note_id, "conflicts").await;
		related::detect_conflicts(self, note, account, &result.summary, &related_notes).await;
		self.notify_ready(note, account, result.title.as_deref()).await;

		Ok(PipelineOutcome {
			note_id: note.note_id,
			engine_used: Some(engine),
			no_speech: false,
			tasks_created: created_tasks.len(),
			already_terminal: false,
		})
	}

	/// "Nothing was said" is an expected domain outcome, not a failure:
	/// the note completes with an explanatory summary and no extraction.
	async fn finish_no_speech(
		&self,
		note: &Note,
		account: &Account,
		engine: &str,
		audio_duration_ms: i64,
		started: Instant,
	) -> StageResult<PipelineOutcome> {
		let now = OffsetDateTime::now_utc();
		let tags = serde_json::json!([]);
		let mut tx = self.db.pool.begin().await?;
		let finalized = queries::finalize_note_done_tx(
			&mut tx,
			note.note_id,
			NoteCompletion {
				transcript: "",
				summary: NO_SPEECH_SUMMARY,
				title: None,
				priority: None,
				tags: &tags,
				embedding_version: None,
				processing_duration_ms: started.elapsed().as_millis() as i64,
			},
			now,
		)
		.await?;

		tx.commit().await?;

		if finalized {
			events::emit_status(self, note.account_id, note.note_id, NOTE_STATUS_DONE).await;
			self.charge_for_audio(note, account, audio_duration_ms).await;
			self.notify_ready(note, account, None).await;
		}

		tracing::info!(note_id = %note.note_id, engine, "Job completed with no detected speech.");

		Ok(PipelineOutcome {
			note_id: note.note_id,
			engine_used: Some(engine.to_string()),
			no_speech: true,
			tasks_created: 0,
			already_terminal: !finalized,
		})
	}

	/// Billing is best-effort once content exists: the user keeps their
	/// transcript and summary even when monetization fails.
	async fn charge_for_audio(&self, note: &Note, account: &Account, audio_duration_ms: i64) {
		let wallet = self
			.ledger
			.get_or_create_wallet(
				account.account_id,
				self.cfg.billing.starter_balance,
				&self.cfg.billing.currency,
			)
			.await;

		if let Err(err) = wallet {
			tracing::error!(note_id = %note.note_id, error = %err, "Wallet provisioning failed; charge skipped.");

			return;
		}

		let rate = account.rate_per_minute.unwrap_or(self.cfg.billing.rate_per_minute);
		let reference = note.note_id.to_string();
		let charge = self
			.ledger
			.charge(
				account.account_id,
				ChargeAmount::Duration { duration_ms: audio_duration_ms, rate_per_minute: rate },
				"Voice note processing",
				Some(reference.as_str()),
			)
			.await;

		match charge {
			Ok(true) => {
				tracing::debug!(note_id = %note.note_id, "Processing charge applied.");
			},
			Ok(false) => {
				tracing::warn!(note_id = %note.note_id, account_id = %account.account_id, "Insufficient balance; note kept, charge skipped.");
			},
			Err(err) => {
				tracing::error!(note_id = %note.note_id, error = %err, "Billing charge failed.");
			},
		}
	}

	async fn notify_ready(&self, note: &Note, account: &Account, title: Option<&str>) {
		let (Some(push), Some(token)) =
			(self.cfg.providers.push.as_ref(), account.device_token.as_deref())
		else {
			return;
		};
		let body = match title {
			Some(title) => format!("\"{title}\" is ready to review."),
			None => "Your voice note is ready to review.".to_string(),
		};
		let data = serde_json::json!({ "note_id": note.note_id, "kind": "note_ready" });

		if let Err(err) =
			self.providers.notifier.send(push, token, "Note processed", &body, &data).await
		{
			tracing::warn!(note_id = %note.note_id, error = %err, "Ready notification failed.");
		}
	}
}
