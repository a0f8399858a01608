use time::OffsetDateTime;

/// The identity a task is deduplicated on. Titles are derived text from a
/// non-deterministic extraction pass, so equality is defined over the
/// normalized form rather than the raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
	pub title: String,
	pub deadline: Option<OffsetDateTime>,
}

impl Fingerprint {
	pub fn new(title: &str, deadline: Option<OffsetDateTime>) -> Self {
		Self { title: normalize_title(title), deadline }
	}
}

/// Trims, casefolds, and collapses internal whitespace so that retries of
/// the same extraction land on the same fingerprint.
pub fn normalize_title(title: &str) -> String {
	title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
