//! External web search for selected text.

#[cfg(any(test, feature = "testing"))]
use std::cell::RefCell;
use std::fmt;
#[cfg(any(test, feature = "testing"))]
use std::rc::Rc;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    Google,
    Wikipedia,
}

impl SearchEngine {
    fn base_url(self) -> &'static str {
        match self {
            SearchEngine::Google => "https://www.google.com/search?q=",
            SearchEngine::Wikipedia => "https://en.wikipedia.org/wiki/Special:Search?search=",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchEngine::Google => "Google",
            SearchEngine::Wikipedia => "Wikipedia",
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Build the search URL for `text`, whitespace-normalised and percent-encoded.
pub fn query_url(engine: SearchEngine, text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{}{}", engine.base_url(), utf8_percent_encode(&normalized, NON_ALPHANUMERIC))
}

/// Opens URLs in a browsing context outside the reader (system browser, in-app browser tab).
pub trait ExternalBrowser: fmt::Debug {
    fn open(&mut self, url: &str);
}

/// Browser stand-in that records every URL it was asked to open. Clones share the record.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone, Default)]
pub struct RecordingBrowser {
    opened: Rc<RefCell<Vec<String>>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }
}

#[cfg(any(test, feature = "testing"))]
impl ExternalBrowser for RecordingBrowser {
    fn open(&mut self, url: &str) {
        self.opened.borrow_mut().push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_query_is_encoded() {
        assert_eq!(
            query_url(SearchEngine::Google, "Captain  Blood\n& co"),
            "https://www.google.com/search?q=Captain%20Blood%20%26%20co"
        );
    }

    #[test]
    fn wikipedia_query_uses_special_search() {
        let url = query_url(SearchEngine::Wikipedia, "Ivanhoe");
        assert_eq!(url, "https://en.wikipedia.org/wiki/Special:Search?search=Ivanhoe");
    }

    #[test]
    fn recording_browser_clones_share_history() {
        let browser = RecordingBrowser::new();
        let mut handle = browser.clone();
        handle.open("https://example.org");
        assert_eq!(browser.opened(), vec!["https://example.org".to_string()]);
    }

    #[test]
    fn non_ascii_text_is_utf8_encoded() {
        let url = query_url(SearchEngine::Google, "café");
        assert!(url.ends_with("caf%C3%A9"));
    }
}
