use crate::{PipelineError, Service, StageResult, TranscriptOutcome};

/// Tries the primary engine, falls back to the secondary, and reports
/// which engine produced the accepted transcript. Exhausting the engine
/// list is terminal by design: retrying an unconfigured or rejecting
/// provider will never start succeeding on its own.
pub(crate) async fn select_transcript(
	service: &Service,
	audio: &[u8],
	language_hints: &[String],
	model_hint: Option<&str>,
) -> StageResult<(TranscriptOutcome, String)> {
	let engines = [
		service.cfg.providers.stt_primary.as_ref(),
		service.cfg.providers.stt_secondary.as_ref(),
	];
	let mut last_error: Option<PipelineError> = None;

	for cfg in engines.into_iter().flatten() {
		match service.providers.stt.transcribe(cfg, audio, language_hints, model_hint).await {
			Ok(outcome) => {
				tracing::info!(engine = cfg.engine_id.as_str(), "Transcription accepted.");

				return Ok((outcome, cfg.engine_id.clone()));
			},
			Err(err) => {
				tracing::warn!(
					engine = cfg.engine_id.as_str(),
					error = %err,
					"Transcription engine failed; trying the next one."
				);

				last_error = Some(err);
			},
		}
	}

	let reason = match last_error {
		Some(err) => format!("All transcription engines unavailable. Last failure: {err}"),
		None => "All transcription engines unavailable: none configured.".to_string(),
	};

	Err(PipelineError::terminal(reason))
}
