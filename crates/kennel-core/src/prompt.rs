use std::path::Path;

use crate::models::{Listing, compute_hash};

/// Longest description, in characters, substituted into a prompt.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

const DEFAULT_TEMPLATE: &str = "\
Evaluate the dog's suitability for apartment living with a cat based *only* on the text below.
Dog: {dog_name}
Description: {raw_text}
On a scale of 0 to 100, where 100 is a perfect match, how suitable is this dog for a small apartment with a resident cat?
Provide only the integer score, without any extra text or explanation.
";

/// Scoring prompt with `{dog_name}` and `{raw_text}` placeholders.
///
/// The template text is what gets fingerprinted, so editing the prompt
/// invalidates every cached score computed with the old one.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    fingerprint: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let fingerprint = compute_hash(&template);
        Self {
            template,
            fingerprint,
        }
    }

    /// Read the template from `path`, falling back to the built-in prompt
    /// when the file is missing, unreadable or blank.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(path = %path.display(), "Loaded scoring prompt");
                Self::new(text)
            }
            Ok(_) => {
                tracing::warn!(path = %path.display(), "Prompt file is empty, using default prompt");
                Self::default()
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Prompt file unavailable, using default prompt");
                Self::default()
            }
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// SHA-256 hex digest of the template text.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn render(&self, listing: &Listing) -> String {
        let description = truncate_chars(&listing.description, MAX_DESCRIPTION_CHARS);
        self.template
            .replace("{dog_name}", &listing.name)
            .replace("{raw_text}", description)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// First run of ASCII digits in an evaluator response.
pub fn parse_score(response: &str) -> Option<i64> {
    let start = response.find(|c: char| c.is_ascii_digit())?;
    let digits: String = response[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
