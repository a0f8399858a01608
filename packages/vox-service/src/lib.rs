pub mod audio;
pub mod cascade;
pub mod dedup;
pub mod events;
pub mod extract;
pub mod pipeline;
pub mod related;
pub mod transcribe;

use std::{future::Future, path::Path, pin::Pin, sync::Arc};

use serde_json::Value;

use vox_billing::Ledger;
use vox_config::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, PushProviderConfig, SttEngineConfig,
};
use vox_providers::{embedding, extractor, notify, transcribe as stt};
use vox_storage::db::Db;

pub use pipeline::{JobPayload, PipelineOutcome, RegisterNoteRequest, RegisterNoteResponse};
pub use vox_providers::transcribe::TranscriptOutcome;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type StageResult<T> = Result<T, PipelineError>;

/// The orchestrator's whole failure taxonomy. Classification happens here,
/// at the pipeline boundary, so retry decisions live in exactly one place:
/// a `Transient` error requeues the invocation with backoff, a `Terminal`
/// one parks the job as DELAYED with the reason recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
	Transient { message: String },
	Terminal { reason: String },
}
impl PipelineError {
	pub fn transient(message: impl Into<String>) -> Self {
		Self::Transient { message: message.into() }
	}

	pub fn terminal(reason: impl Into<String>) -> Self {
		Self::Terminal { reason: reason.into() }
	}

	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient { .. })
	}
}
impl std::fmt::Display for PipelineError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Transient { message } => write!(f, "Transient failure: {message}"),
			Self::Terminal { reason } => write!(f, "Terminal failure: {reason}"),
		}
	}
}
impl std::error::Error for PipelineError {}
impl From<sqlx::Error> for PipelineError {
	fn from(err: sqlx::Error) -> Self {
		Self::Transient { message: format!("Database error: {err}") }
	}
}
impl From<vox_storage::Error> for PipelineError {
	fn from(err: vox_storage::Error) -> Self {
		match err {
			vox_storage::Error::Sqlx(err) => err.into(),
			other => Self::Terminal { reason: other.to_string() },
		}
	}
}
impl From<std::io::Error> for PipelineError {
	fn from(err: std::io::Error) -> Self {
		Self::Transient { message: format!("I/O error: {err}") }
	}
}

/// Maps a provider-layer failure onto the taxonomy. Timeouts, connection
/// failures, and overloaded upstreams come back; malformed responses and
/// client-side rejections do not.
pub fn classify_provider_error(err: &color_eyre::Report) -> PipelineError {
	if let Some(req) = err.downcast_ref::<reqwest::Error>() {
		if req.is_timeout() || req.is_connect() {
			return PipelineError::transient(format!("Provider unreachable: {req}"));
		}
		if let Some(status) = req.status() {
			if status.is_server_error() || status.as_u16() == 429 {
				return PipelineError::transient(format!("Provider returned {status}."));
			}

			return PipelineError::terminal(format!("Provider rejected the request: {status}."));
		}

		return PipelineError::transient(format!("Provider request failed: {req}"));
	}
	if err.downcast_ref::<std::io::Error>().is_some() {
		return PipelineError::transient(format!("I/O error: {err}"));
	}

	PipelineError::terminal(format!("Provider response invalid: {err}"))
}

pub trait SpeechToText
where
	Self: Send + Sync,
{
	fn transcribe<'a>(
		&'a self,
		cfg: &'a SttEngineConfig,
		audio: &'a [u8],
		language_hints: &'a [String],
		model_hint: Option<&'a str>,
	) -> BoxFuture<'a, StageResult<TranscriptOutcome>>;
}

pub trait Extractor
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, StageResult<Value>>;
}

pub trait Embedder
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, StageResult<Vec<Vec<f32>>>>;
}

pub trait Notifier
where
	Self: Send + Sync,
{
	fn send<'a>(
		&'a self,
		cfg: &'a PushProviderConfig,
		device_token: &'a str,
		title: &'a str,
		body: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, StageResult<()>>;
}

/// Resolves a remote storage reference into a local file. The real
/// object-storage mechanics live outside this system; the default reads
/// from a plain directory.
pub trait ObjectStore
where
	Self: Send + Sync,
{
	fn fetch<'a>(&'a self, reference: &'a str, dest: &'a Path) -> BoxFuture<'a, StageResult<()>>;
}

/// External audio cleanup step. The default copies the artifact through
/// unchanged.
pub trait AudioPreprocessor
where
	Self: Send + Sync,
{
	fn preprocess<'a>(
		&'a self,
		input: &'a Path,
		output: &'a Path,
	) -> BoxFuture<'a, StageResult<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub stt: Arc<dyn SpeechToText>,
	pub extractor: Arc<dyn Extractor>,
	pub embedder: Arc<dyn Embedder>,
	pub notifier: Arc<dyn Notifier>,
}
impl Providers {
	pub fn new(
		stt: Arc<dyn SpeechToText>,
		extractor: Arc<dyn Extractor>,
		embedder: Arc<dyn Embedder>,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self { stt, extractor, embedder, notifier }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			stt: provider.clone(),
			extractor: provider.clone(),
			embedder: provider.clone(),
			notifier: provider,
		}
	}
}

struct DefaultProviders;
impl SpeechToText for DefaultProviders {
	fn transcribe<'a>(
		&'a self,
		cfg: &'a SttEngineConfig,
		audio: &'a [u8],
		language_hints: &'a [String],
		model_hint: Option<&'a str>,
	) -> BoxFuture<'a, StageResult<TranscriptOutcome>> {
		Box::pin(async move {
			stt::transcribe(cfg, audio, language_hints, model_hint)
				.await
				.map_err(|err| classify_provider_error(&err))
		})
	}
}
impl Extractor for DefaultProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, StageResult<Value>> {
		Box::pin(async move {
			extractor::extract(cfg, messages).await.map_err(|err| classify_provider_error(&err))
		})
	}
}
impl Embedder for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, StageResult<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding::embed(cfg, texts).await.map_err(|err| classify_provider_error(&err))
		})
	}
}
impl Notifier for DefaultProviders {
	fn send<'a>(
		&'a self,
		cfg: &'a PushProviderConfig,
		device_token: &'a str,
		title: &'a str,
		body: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, StageResult<()>> {
		Box::pin(async move {
			notify::send(cfg, device_token, title, body, data)
				.await
				.map_err(|err| classify_provider_error(&err))
		})
	}
}

pub struct FsObjectStore {
	base: std::path::PathBuf,
}
impl FsObjectStore {
	pub fn new(base: impl Into<std::path::PathBuf>) -> Self {
		Self { base: base.into() }
	}
}
impl ObjectStore for FsObjectStore {
	fn fetch<'a>(&'a self, reference: &'a str, dest: &'a Path) -> BoxFuture<'a, StageResult<()>> {
		Box::pin(async move {
			let key = reference.strip_prefix(audio::REMOTE_PREFIX).unwrap_or(reference);
			let src = self.base.join(key);

			tokio::fs::copy(&src, dest).await?;

			Ok(())
		})
	}
}

pub struct PassthroughPreprocessor;
impl AudioPreprocessor for PassthroughPreprocessor {
	fn preprocess<'a>(
		&'a self,
		input: &'a Path,
		output: &'a Path,
	) -> BoxFuture<'a, StageResult<()>> {
		Box::pin(async move {
			tokio::fs::copy(input, output).await?;

			Ok(())
		})
	}
}

pub struct Service {
	pub cfg: Config,
	pub db: Db,
	pub ledger: Ledger,
	pub providers: Providers,
	pub object_store: Arc<dyn ObjectStore>,
	pub preprocessor: Arc<dyn AudioPreprocessor>,
}
impl Service {
	pub fn new(cfg: Config, db: Db, ledger: Ledger) -> Self {
		let scratch = cfg.pipeline.scratch_dir.clone();

		Self {
			cfg,
			db,
			ledger,
			providers: Providers::default(),
			object_store: Arc::new(FsObjectStore::new(scratch)),
			preprocessor: Arc::new(PassthroughPreprocessor),
		}
	}

	pub fn with_collaborators(
		cfg: Config,
		db: Db,
		ledger: Ledger,
		providers: Providers,
		object_store: Arc<dyn ObjectStore>,
		preprocessor: Arc<dyn AudioPreprocessor>,
	) -> Self {
		Self { cfg, db, ledger, providers, object_store, preprocessor }
	}
}

pub(crate) fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id, cfg.providers.embedding.model, cfg.storage.vector_dim
	)
}
