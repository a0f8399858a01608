use std::time::Duration as StdDuration;

use color_eyre::Result;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use vox_service::{PipelineError, Service};
use vox_storage::{models::QueueEntry, queue};

const POLL_INTERVAL_MS: u64 = 500;
const CLAIM_LEASE_MARGIN_SECONDS: i64 = 30;
const MAX_BACKOFF_SHIFT: u32 = 6;

pub struct WorkerState {
	pub service: Service,
}

/// One worker slot: claim, process, settle, repeat. Multiple slots run
/// this loop across the fleet; the queue's row locks keep them off each
/// other's jobs.
pub async fn run_worker(state: &WorkerState) -> Result<()> {
	loop {
		match process_queue_once(state).await {
			Ok(true) => {},
			Ok(false) => {
				tokio_time::sleep(StdDuration::from_millis(POLL_INTERVAL_MS)).await;
			},
			Err(err) => {
				tracing::error!(error = %err, "Queue processing failed.");
				tokio_time::sleep(StdDuration::from_millis(POLL_INTERVAL_MS)).await;
			},
		}
	}
}

/// Claims and settles at most one queue entry. Returns whether an entry
/// was found, so the loop can drain a backlog without sleeping.
pub async fn process_queue_once(state: &WorkerState) -> Result<bool> {
	let service = &state.service;
	let now = OffsetDateTime::now_utc();
	// The lease must outlive the invocation budget, or a slow job would be
	// handed to a second slot while the first still runs it.
	let lease_seconds =
		(service.cfg.pipeline.invocation_timeout_ms / 1_000) as i64 + CLAIM_LEASE_MARGIN_SECONDS;
	let Some(entry) = queue::claim_next(&service.db, now, lease_seconds).await? else {
		return Ok(false);
	};
	let budget = StdDuration::from_millis(service.cfg.pipeline.invocation_timeout_ms);
	let result = match tokio_time::timeout(budget, service.process(&entry)).await {
		Ok(result) => result,
		Err(_) => Err(PipelineError::transient(format!(
			"Invocation exceeded its {}ms wall-clock budget.",
			service.cfg.pipeline.invocation_timeout_ms
		))),
	};

	match result {
		Ok(outcome) => {
			queue::mark_done(&service.db, entry.queue_id, OffsetDateTime::now_utc()).await?;
			tracing::info!(
				note_id = %outcome.note_id,
				engine = outcome.engine_used.as_deref().unwrap_or("-"),
				tasks_created = outcome.tasks_created,
				no_speech = outcome.no_speech,
				redelivery = outcome.already_terminal,
				"Job settled."
			);
		},
		Err(err) => {
			settle_failure(service, &entry, err).await?;
		},
	}

	Ok(true)
}

async fn settle_failure(service: &Service, entry: &QueueEntry, err: PipelineError) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let attempts = entry.attempts.saturating_add(1);
	let max_chars = service.cfg.pipeline.failure_reason_max_chars as usize;
	let reason = sanitize_failure_reason(&err.to_string(), max_chars);

	if err.is_transient() && (attempts as u32) < service.cfg.pipeline.max_attempts {
		let backoff = backoff_for_attempt(
			attempts,
			service.cfg.pipeline.base_backoff_ms,
			service.cfg.pipeline.max_backoff_ms,
		);

		queue::requeue(&service.db, entry.queue_id, attempts, &reason, now + backoff, now).await?;
		tracing::warn!(
			note_id = %entry.note_id,
			attempts,
			backoff_ms = backoff.whole_milliseconds() as i64,
			error = %reason,
			"Transient failure. Requeued with backoff."
		);

		return Ok(());
	}

	// Terminal failure, or a transient one out of attempts: the job parks
	// as DELAYED with its reason and the entry leaves the queue.
	service.park_delayed(entry.note_id, &reason).await?;
	queue::mark_dead(&service.db, entry.queue_id, &reason, now).await?;
	tracing::error!(note_id = %entry.note_id, attempts, error = %reason, "Job parked as DELAYED.");

	Ok(())
}

pub fn backoff_for_attempt(attempt: i32, base_ms: i64, max_ms: i64) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
	let capped = base_ms.saturating_mul(1 << exp).min(max_ms);

	Duration::milliseconds(capped)
}

/// Failure reasons end up user- and operator-visible; scrub anything that
/// looks like a credential and bound the length before it is stored.
pub fn sanitize_failure_reason(text: &str, max_chars: usize) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > max_chars {
		out = out.chars().take(max_chars).collect();
		out.push_str("...");
	}

	out
}
