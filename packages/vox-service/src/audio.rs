use std::path::{Path, PathBuf};

use tokio::time as tokio_time;
use uuid::Uuid;

use crate::{PipelineError, Service, StageResult};

pub const REMOTE_PREFIX: &str = "store://";

/// Ephemeral workspace for one pipeline invocation. Dropping the guard
/// removes the whole directory, which is what guarantees cleanup on every
/// exit path: success, transient retry, terminal failure, and panic alike.
pub struct ScratchGuard {
	dir: PathBuf,
}
impl ScratchGuard {
	pub fn new(base: &str, note_id: Uuid) -> StageResult<Self> {
		let dir =
			PathBuf::from(base).join(format!("job-{note_id}-{}", Uuid::new_v4().simple()));

		std::fs::create_dir_all(&dir)?;

		Ok(Self { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Reserves a file path inside the guarded directory.
	pub fn claim(&self, name: &str) -> PathBuf {
		self.dir.join(name)
	}
}
impl Drop for ScratchGuard {
	fn drop(&mut self) {
		if let Err(err) = std::fs::remove_dir_all(&self.dir) {
			if err.kind() != std::io::ErrorKind::NotFound {
				tracing::warn!(dir = %self.dir.display(), error = %err, "Failed to remove scratch directory.");
			}
		}
	}
}

pub fn is_remote(reference: &str) -> bool {
	reference.starts_with(REMOTE_PREFIX)
}

/// Resolves the job's audio reference to a local artifact. Remote
/// references download into the scratch directory; a missing or
/// zero-length artifact gets a bounded eventual-consistency poll and then
/// exactly one recovery fetch from the configured origin before the job is
/// declared unrecoverable.
pub(crate) async fn resolve_audio(
	service: &Service,
	reference: &str,
	scratch: &ScratchGuard,
) -> StageResult<PathBuf> {
	let cfg = &service.cfg.pipeline;
	let remote = is_remote(reference);
	let local = if remote { scratch.claim("source.audio") } else { PathBuf::from(reference) };

	for attempt in 0..cfg.audio_poll_attempts {
		if remote {
			if let Err(err) = service.object_store.fetch(reference, &local).await {
				tracing::debug!(reference, attempt, error = %err, "Audio fetch attempt failed.");
			}
		}
		if is_nonempty(&local).await {
			return Ok(local);
		}

		tokio_time::sleep(std::time::Duration::from_millis(cfg.audio_poll_interval_ms)).await;
	}

	if let Some(origin) = cfg.recovery_origin_url.as_deref() {
		let recovered = scratch.claim("recovered.audio");

		if recovery_fetch(origin, reference, &recovered).await.is_ok()
			&& is_nonempty(&recovered).await
		{
			tracing::info!(reference, "Audio artifact recovered from origin.");

			return Ok(recovered);
		}
	}

	Err(PipelineError::terminal(format!(
		"Audio artifact {reference} missing after recovery attempt."
	)))
}

async fn recovery_fetch(origin: &str, reference: &str, dest: &Path) -> StageResult<()> {
	let key = reference.strip_prefix(REMOTE_PREFIX).unwrap_or(reference);
	let url = format!("{}/{}", origin.trim_end_matches('/'), key.trim_start_matches('/'));
	let bytes = reqwest::get(&url)
		.await
		.and_then(|res| res.error_for_status())
		.map_err(|err| PipelineError::terminal(format!("Recovery fetch failed: {err}")))?
		.bytes()
		.await
		.map_err(|err| PipelineError::terminal(format!("Recovery fetch failed: {err}")))?;

	tokio::fs::write(dest, &bytes).await?;

	Ok(())
}

async fn is_nonempty(path: &Path) -> bool {
	match tokio::fs::metadata(path).await {
		Ok(meta) => meta.len() > 0,
		Err(_) => false,
	}
}
