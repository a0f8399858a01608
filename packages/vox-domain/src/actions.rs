use regex::Regex;

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const PHONE_PATTERN: &str = r"\+?\(?[0-9][0-9()\s./-]{6,}[0-9]";

const LOCATION_CUES: [&str; 8] =
	["address", "directions", "office", "venue", "meet at", "location", "restaurant", "airport"];

/// One variant per intent kind a task can carry. Exhaustive at every call
/// site; at most one action of each kind is attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestedAction {
	Search { query: String },
	Email { mailto: String },
	Call { tel: String },
	Map { query: String },
	AssistantPrompt { prompt: String },
}

/// Materializes the static action transforms for an accepted task. Search
/// and assistant-prompt actions are always produced; email, call, and map
/// actions only when the task text signals that intent.
pub fn suggest_actions(title: &str, description: &str) -> Vec<SuggestedAction> {
	let combined = format!("{title} {description}");
	let mut actions = vec![SuggestedAction::Search { query: collapse_whitespace(title) }];

	if let Some(address) = first_match(EMAIL_PATTERN, &combined) {
		actions.push(SuggestedAction::Email { mailto: format!("mailto:{address}") });
	}
	if let Some(number) = first_match(PHONE_PATTERN, &combined) {
		let digits = normalize_phone(&number);

		if digits.len() >= 7 {
			actions.push(SuggestedAction::Call { tel: format!("tel:{digits}") });
		}
	}
	if has_location_cue(&combined) {
		actions.push(SuggestedAction::Map { query: collapse_whitespace(title) });
	}

	actions.push(SuggestedAction::AssistantPrompt { prompt: assistant_prompt(title, description) });

	actions
}

fn assistant_prompt(title: &str, description: &str) -> String {
	let title = collapse_whitespace(title);
	let description = collapse_whitespace(description);

	if description.is_empty() {
		format!("Help me complete this task: {title}.")
	} else {
		format!("Help me complete this task: {title}. Context: {description}")
	}
}

fn first_match(pattern: &str, text: &str) -> Option<String> {
	Regex::new(pattern)
		.ok()
		.and_then(|re| re.find(text))
		.map(|found| found.as_str().to_string())
}

fn has_location_cue(text: &str) -> bool {
	let lowered = text.to_lowercase();

	LOCATION_CUES.iter().any(|cue| lowered.contains(cue))
}

fn normalize_phone(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for (idx, ch) in raw.chars().enumerate() {
		if ch == '+' && idx == 0 {
			out.push(ch);
		} else if ch.is_ascii_digit() {
			out.push(ch);
		}
	}

	out
}

fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}
