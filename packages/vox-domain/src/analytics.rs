use std::collections::HashMap;

use vox_config::Analytics;

/// Estimated cost of the meeting a memo records, in the same minor units
/// as `hourly_cost_minor`. The words-per-hour divisor comes from config;
/// its original value was inherited, not derived.
pub fn meeting_roi(
	word_count: u32,
	attendee_count: u32,
	hourly_cost_minor: i64,
	cfg: &Analytics,
) -> i64 {
	if word_count == 0 || attendee_count == 0 {
		return 0;
	}

	let hours = f64::from(word_count) / f64::from(cfg.words_per_hour);
	let cost = hours * attendee_count as f64 * hourly_cost_minor as f64;

	cost.round() as i64
}

/// Top-K non-stopword token frequencies for a transcript, casefolded.
/// Ties break alphabetically so the output is stable across runs.
pub fn topic_heatmap(text: &str, cfg: &Analytics) -> Vec<(String, u32)> {
	let mut counts: HashMap<String, u32> = HashMap::new();

	for raw in text.split(|ch: char| !ch.is_alphanumeric()) {
		let token = raw.to_lowercase();

		if token.len() < 3 {
			continue;
		}
		if cfg.stop_words.iter().any(|stop| stop == &token) {
			continue;
		}

		*counts.entry(token).or_insert(0) += 1;
	}

	let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();

	ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
	ranked.truncate(cfg.heatmap_top_k as usize);

	ranked
}
