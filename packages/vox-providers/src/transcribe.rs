use std::time::Duration;

use base64::Engine as _;
use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

/// What a speech-to-text engine reported for one artifact. `no_speech`
/// covers both an explicit engine flag and an empty transcript body; the
/// caller decides that this is a domain outcome, not an error.
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
	pub text: String,
	pub no_speech: bool,
	pub duration_ms: Option<i64>,
}

pub async fn transcribe(
	cfg: &vox_config::SttEngineConfig,
	audio: &[u8],
	language_hints: &[String],
	model_hint: Option<&str>,
) -> Result<TranscriptOutcome> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let model = model_hint.unwrap_or(cfg.model.as_str());
	let body = serde_json::json!({
		"model": model,
		"audio": base64::engine::general_purpose::STANDARD.encode(audio),
		"language_hints": language_hints,
		"response_format": "verbose_json",
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_transcribe_response(json)
}

fn parse_transcribe_response(json: Value) -> Result<TranscriptOutcome> {
	let Some(text) = json.get("text").and_then(|v| v.as_str()) else {
		return Err(eyre::eyre!("Transcription response is missing a text field."));
	};
	let no_speech_flag = json.get("no_speech").and_then(|v| v.as_bool()).unwrap_or(false);
	let duration_ms = json
		.get("duration_ms")
		.and_then(|v| v.as_i64())
		.or_else(|| json.get("duration").and_then(|v| v.as_f64()).map(|s| (s * 1_000.0) as i64));
	let trimmed = text.trim();

	Ok(TranscriptOutcome {
		text: trimmed.to_string(),
		no_speech: no_speech_flag || trimmed.is_empty(),
		duration_ms,
	})
}
