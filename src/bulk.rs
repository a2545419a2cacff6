use regex::Regex;
use serde::Serialize;

use crate::engine::Engine;
use crate::error::RuleLoadError;
use crate::models::compile_regex;

const URL_IN_TEXT: &str = r#"(?i)\bhttps?://[^\s<>"'`]+"#;

/// Characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub output: String,
    pub urls_found: usize,
    pub urls_modified: usize,
}

/// Finds URLs inside free text and cleans each one through an [`Engine`].
#[derive(Clone)]
pub struct BulkCleaner {
    engine: Engine,
    url_finder: Regex,
}

impl BulkCleaner {
    pub fn new(engine: Engine) -> Result<Self, RuleLoadError> {
        Ok(Self {
            engine,
            url_finder: compile_regex(URL_IN_TEXT, false)?,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn clean_text(&self, text: &str) -> BulkReport {
        let mut output = String::with_capacity(text.len());
        let mut urls_found = 0;
        let mut urls_modified = 0;
        let mut last = 0;

        for m in self.url_finder.find_iter(text) {
            let candidate = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            if candidate.is_empty() {
                continue;
            }
            urls_found += 1;

            let outcome = self.engine.process(candidate);
            output.push_str(&text[last..m.start()]);
            if outcome.changed {
                urls_modified += 1;
                output.push_str(&outcome.cleaned_url);
            } else {
                output.push_str(candidate);
            }
            last = m.start() + candidate.len();
        }
        output.push_str(&text[last..]);

        BulkReport {
            output,
            urls_found,
            urls_modified,
        }
    }
}
