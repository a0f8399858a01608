use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use vox_storage::models::{Account, SimilarNote};

const SUMMARY_FALLBACK_CHARS: usize = 280;

/// Structured result of the extraction pass. Everything is best-effort:
/// a malformed candidate is dropped, a missing summary falls back to a
/// transcript prefix, and the pipeline keeps going either way.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
	pub title: Option<String>,
	pub summary: String,
	pub priority: String,
	pub tags: Vec<String>,
	pub tasks: Vec<CandidateTask>,
	pub leads: Vec<CandidateLead>,
}

#[derive(Debug, Clone)]
pub struct CandidateTask {
	pub title: String,
	pub description: String,
	pub priority: String,
	pub deadline: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct CandidateLead {
	pub name: String,
	pub company: Option<String>,
	pub details: Option<String>,
}

/// Builds the grounded chat payload: the transcript plus the account's own
/// context and the closest prior notes, so the model stays anchored to
/// this user instead of drifting into generic hallucination.
pub(crate) fn build_messages(
	transcript: &str,
	account: &Account,
	related: &[SimilarNote],
	recorded_at: OffsetDateTime,
) -> Vec<Value> {
	let mut system = String::from(
		"You turn a voice memo transcript into JSON with the fields: \
		 title, summary, priority (low|normal|high|urgent), tags (array of strings), \
		 tasks (array of {title, description, priority, deadline}), \
		 leads (array of {name, company, details}). \
		 Respond with JSON only. Only extract what the transcript supports.",
	);

	if !account.role_context.trim().is_empty() {
		system.push_str(&format!("\nThe speaker's role: {}.", account.role_context.trim()));
	}
	if let Some(instructions) = account.custom_instructions.as_deref()
		&& !instructions.trim().is_empty()
	{
		system.push_str(&format!("\nSpeaker instructions: {}", instructions.trim()));
	}
	if let Some(vocabulary) = account.vocabulary.as_array()
		&& !vocabulary.is_empty()
	{
		let hints: Vec<&str> = vocabulary.iter().filter_map(|v| v.as_str()).collect();

		if !hints.is_empty() {
			system.push_str(&format!("\nDomain vocabulary: {}.", hints.join(", ")));
		}
	}

	let recorded = recorded_at.format(&Rfc3339).unwrap_or_default();
	let mut user = format!(
		"Recorded at {recorded} ({timezone}).\n\nTranscript:\n{transcript}",
		timezone = account.timezone,
	);

	if !related.is_empty() {
		user.push_str("\n\nRecent related notes for context (do not re-extract their content):");

		for note in related {
			let title = note.title.as_deref().unwrap_or("Untitled");
			let summary = note.summary.as_deref().unwrap_or("");

			user.push_str(&format!("\n- {title}: {summary}"));
		}
	}

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

pub(crate) fn parse_extraction(value: &Value, transcript: &str) -> ExtractionResult {
	let title = value
		.get("title")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|t| !t.is_empty())
		.map(ToString::to_string);
	let summary = value
		.get("summary")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(ToString::to_string)
		.unwrap_or_else(|| summary_fallback(transcript));
	let priority = normalize_priority(value.get("priority").and_then(|v| v.as_str()));
	let tags = value
		.get("tags")
		.and_then(|v| v.as_array())
		.map(|arr| {
			arr.iter()
				.filter_map(|v| v.as_str())
				.map(str::trim)
				.filter(|t| !t.is_empty())
				.map(ToString::to_string)
				.collect()
		})
		.unwrap_or_default();
	let mut tasks = Vec::new();

	if let Some(entries) = value.get("tasks").and_then(|v| v.as_array()) {
		for entry in entries {
			match parse_task(entry) {
				Some(task) => tasks.push(task),
				None => {
					tracing::warn!("Skipping malformed task candidate in extraction result.");
				},
			}
		}
	}

	let mut leads = Vec::new();

	if let Some(entries) = value.get("leads").and_then(|v| v.as_array()) {
		for entry in entries {
			match parse_lead(entry) {
				Some(lead) => leads.push(lead),
				None => {
					tracing::warn!("Skipping malformed lead candidate in extraction result.");
				},
			}
		}
	}

	ExtractionResult { title, summary, priority, tags, tasks, leads }
}

fn parse_task(entry: &Value) -> Option<CandidateTask> {
	let title = entry.get("title")?.as_str()?.trim();

	if title.is_empty() {
		return None;
	}

	let description =
		entry.get("description").and_then(|v| v.as_str()).unwrap_or_default().trim().to_string();
	let priority = normalize_priority(entry.get("priority").and_then(|v| v.as_str()));
	let deadline = entry.get("deadline").and_then(|v| v.as_str()).and_then(parse_deadline);

	Some(CandidateTask { title: title.to_string(), description, priority, deadline })
}

fn parse_lead(entry: &Value) -> Option<CandidateLead> {
	let name = entry.get("name")?.as_str()?.trim();

	if name.is_empty() {
		return None;
	}

	let company = entry
		.get("company")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|c| !c.is_empty())
		.map(ToString::to_string);
	let details = entry
		.get("details")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|d| !d.is_empty())
		.map(ToString::to_string);

	Some(CandidateLead { name: name.to_string(), company, details })
}

fn parse_deadline(raw: &str) -> Option<OffsetDateTime> {
	OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

fn normalize_priority(raw: Option<&str>) -> String {
	match raw.map(|p| p.trim().to_lowercase()).as_deref() {
		Some("low") => "low".to_string(),
		Some("high") => "high".to_string(),
		Some("urgent") => "urgent".to_string(),
		_ => "normal".to_string(),
	}
}

fn summary_fallback(transcript: &str) -> String {
	let trimmed = transcript.trim();

	if trimmed.chars().count() <= SUMMARY_FALLBACK_CHARS {
		return trimmed.to_string();
	}

	let prefix: String = trimmed.chars().take(SUMMARY_FALLBACK_CHARS).collect();

	format!("{prefix}...")
}
