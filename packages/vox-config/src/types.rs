use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub pipeline: Pipeline,
	pub billing: Billing,
	#[serde(default)]
	pub analytics: Analytics,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// Dimension of the pgvector column holding note summary embeddings.
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub stt_primary: Option<SttEngineConfig>,
	pub stt_secondary: Option<SttEngineConfig>,
	pub llm_extractor: LlmProviderConfig,
	pub embedding: EmbeddingProviderConfig,
	pub push: Option<PushProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SttEngineConfig {
	pub engine_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct PushProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Pipeline {
	/// Total attempts per job, counting the first one.
	pub max_attempts: u32,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub invocation_timeout_ms: u64,
	pub audio_poll_attempts: u32,
	pub audio_poll_interval_ms: u64,
	pub scratch_dir: String,
	/// Base URL for the one-shot recovery fetch when a referenced audio
	/// artifact never materializes locally.
	pub recovery_origin_url: Option<String>,
	pub related_threshold: f32,
	pub conflict_threshold: f32,
	pub max_related: u32,
	pub failure_reason_max_chars: u32,
}

#[derive(Debug, Deserialize)]
pub struct Billing {
	/// Credits granted to a wallet on first access, in minor units.
	pub starter_balance: i64,
	/// Default per-minute processing rate; an account row may override it.
	pub rate_per_minute: i64,
	pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Analytics {
	/// Speech-pace divisor used by the meeting ROI estimate. Inherited
	/// from the original product with unclear provenance; configurable
	/// rather than corrected.
	pub words_per_hour: f32,
	pub heatmap_top_k: u32,
	pub stop_words: Vec<String>,
}
impl Default for Analytics {
	fn default() -> Self {
		Self {
			words_per_hour: 9_000.0,
			heatmap_top_k: 12,
			stop_words: [
				"a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "is",
				"it", "of", "on", "or", "so", "that", "the", "then", "this", "to", "was", "we",
				"with", "you",
			]
			.iter()
			.map(|word| word.to_string())
			.collect(),
		}
	}
}
