use parking_lot::Mutex;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

pub const APP_TITLE: &str = "WikiWalker";

/// Characters `encodeURIComponent` escapes: everything except
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// One `pushState` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub state: String,
    pub title: String,
    pub url: String,
}

impl HistoryEntry {
    /// Entry for a submitted search; the empty query maps to the bare path.
    pub fn for_query(search_path: &str, query: &str) -> Self {
        if query.is_empty() {
            return Self {
                state: String::new(),
                title: APP_TITLE.to_string(),
                url: search_path.to_string(),
            };
        }
        Self {
            state: query.to_string(),
            title: format!("{APP_TITLE}: '{query}'"),
            url: format!("{search_path}?q={}", encode_uri_component(query)),
        }
    }
}

pub trait History: Send + Sync {
    fn supports_push_state(&self) -> bool {
        true
    }

    fn push_state(&self, entry: HistoryEntry);
}

/// Records pushed entries in memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    pub fn current(&self) -> Option<HistoryEntry> {
        self.entries.lock().last().cloned()
    }
}

impl History for MemoryHistory {
    fn push_state(&self, entry: HistoryEntry) {
        self.entries.lock().push(entry);
    }
}

/// A browser without the history API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl History for NoHistory {
    fn supports_push_state(&self) -> bool {
        false
    }

    fn push_state(&self, _entry: HistoryEntry) {}
}
