use std::time::Duration;

use color_eyre::Result;
use reqwest::Client;
use serde_json::Value;

/// Fire-and-forget push dispatch. The caller logs failures; nothing here
/// is allowed to become fatal to a job.
pub async fn send(
	cfg: &vox_config::PushProviderConfig,
	device_token: &str,
	title: &str,
	body: &str,
	data: &Value,
) -> Result<()> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let payload = serde_json::json!({
		"device_token": device_token,
		"title": title,
		"body": body,
		"data": data,
	});

	client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&payload)
		.send()
		.await?
		.error_for_status()?;

	Ok(())
}
