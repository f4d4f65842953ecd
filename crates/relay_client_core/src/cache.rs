#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use relay_domain::MessageId;

/// Default bound on cached message bodies.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Returned for ids that were never cached or have been evicted.
pub const MISSING_PREVIEW: &str = "No content available";

/// Reply previews are clipped to this many characters.
const PREVIEW_MAX_CHARS: usize = 50;

/// Bounded map of recently seen message bodies, keyed by id.
///
/// Eviction is by insertion order: once the bound is exceeded the oldest
/// inserted entry goes first. Used only for reply-preview lookups; a miss
/// yields a placeholder, never an error.
#[derive(Debug)]
pub struct RecencyCache {
	entries: HashMap<MessageId, String>,
	order: VecDeque<MessageId>,
	capacity: usize,
}

impl Default for RecencyCache {
	fn default() -> Self {
		Self::new(DEFAULT_CACHE_CAPACITY)
	}
}

impl RecencyCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			entries: HashMap::with_capacity(capacity),
			order: VecDeque::with_capacity(capacity),
			capacity: capacity.max(1),
		}
	}

	/// Insert a body under `id`, evicting the oldest entry past the bound.
	///
	/// Re-inserting an existing id replaces the body but keeps the id's
	/// original position in the eviction order.
	pub fn insert(&mut self, id: MessageId, body: String) {
		if self.entries.insert(id, body).is_some() {
			return;
		}

		self.order.push_back(id);
		while self.order.len() > self.capacity {
			if let Some(evicted) = self.order.pop_front() {
				self.entries.remove(&evicted);
			}
		}
	}

	pub fn get(&self, id: MessageId) -> Option<&str> {
		self.entries.get(&id).map(String::as_str)
	}

	/// Preview text for `id`: the cached body clipped to a snippet, or the
	/// placeholder when the id is unknown.
	pub fn preview(&self, id: MessageId) -> String {
		match self.get(id) {
			Some(body) => snippet(body),
			None => MISSING_PREVIEW.to_string(),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

fn snippet(body: &str) -> String {
	let mut chars = body.char_indices();
	match chars.nth(PREVIEW_MAX_CHARS) {
		Some((cut, _)) => format!("{}...", &body[..cut]),
		None => body.to_string(),
	}
}
