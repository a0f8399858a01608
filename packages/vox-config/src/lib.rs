mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Analytics, Billing, Config, EmbeddingProviderConfig, LlmProviderConfig, Pipeline, Postgres,
	Providers, PushProviderConfig, Service, Storage, SttEngineConfig,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector_dim.".to_string(),
		});
	}
	if cfg.pipeline.max_attempts == 0 {
		return Err(Error::Validation {
			message: "pipeline.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.base_backoff_ms <= 0 {
		return Err(Error::Validation {
			message: "pipeline.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.max_backoff_ms < cfg.pipeline.base_backoff_ms {
		return Err(Error::Validation {
			message: "pipeline.max_backoff_ms must be at least pipeline.base_backoff_ms."
				.to_string(),
		});
	}
	if cfg.pipeline.invocation_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "pipeline.invocation_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.audio_poll_attempts == 0 {
		return Err(Error::Validation {
			message: "pipeline.audio_poll_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.pipeline.scratch_dir.trim().is_empty() {
		return Err(Error::Validation {
			message: "pipeline.scratch_dir must be non-empty.".to_string(),
		});
	}
	if cfg.pipeline.failure_reason_max_chars == 0 {
		return Err(Error::Validation {
			message: "pipeline.failure_reason_max_chars must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("pipeline.related_threshold", cfg.pipeline.related_threshold),
		("pipeline.conflict_threshold", cfg.pipeline.conflict_threshold),
	] {
		if !value.is_finite() {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number."),
			});
		}
		if !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if cfg.billing.starter_balance < 0 {
		return Err(Error::Validation {
			message: "billing.starter_balance must be zero or greater.".to_string(),
		});
	}
	if cfg.billing.rate_per_minute <= 0 {
		return Err(Error::Validation {
			message: "billing.rate_per_minute must be greater than zero.".to_string(),
		});
	}
	if cfg.billing.currency.trim().is_empty() {
		return Err(Error::Validation {
			message: "billing.currency must be non-empty.".to_string(),
		});
	}
	if cfg.analytics.words_per_hour <= 0.0 || !cfg.analytics.words_per_hour.is_finite() {
		return Err(Error::Validation {
			message: "analytics.words_per_hour must be a positive finite number.".to_string(),
		});
	}
	if cfg.analytics.heatmap_top_k == 0 {
		return Err(Error::Validation {
			message: "analytics.heatmap_top_k must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("llm_extractor", &cfg.providers.llm_extractor.api_key),
		("embedding", &cfg.providers.embedding.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	for engine in [cfg.providers.stt_primary.as_ref(), cfg.providers.stt_secondary.as_ref()]
		.into_iter()
		.flatten()
	{
		if engine.engine_id.trim().is_empty() {
			return Err(Error::Validation {
				message: "STT engine_id must be non-empty.".to_string(),
			});
		}
		if engine.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("STT engine {} api_key must be non-empty.", engine.engine_id),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.pipeline
		.recovery_origin_url
		.as_deref()
		.map(|url| url.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.pipeline.recovery_origin_url = None;
	}
	if cfg
		.providers
		.stt_primary
		.as_ref()
		.map(|engine| engine.api_base.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.stt_primary = None;
	}
	if cfg
		.providers
		.stt_secondary
		.as_ref()
		.map(|engine| engine.api_base.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.stt_secondary = None;
	}
}
