//! Query preprocessing before semantic search.
//!
//! The document corpus was indexed with Vietnamese compound words joined by `_`
//! ("công_đoàn"), so queries must be segmented the same way before embedding and
//! retrieved passages are restored for display.

use crate::config::PreprocessConfig;
use crate::error::ConfigError;
use std::collections::HashSet;
use std::sync::Arc;

/// Separator joining the syllables of a compound word.
pub const COMPOUND_JOINER: &str = "_";

/// Normalizes query text before retrieval and undoes it on retrieved text.
pub trait QueryPreprocessor: Send + Sync {
    /// Rewrite query text into the form the corpus was indexed in.
    fn segment(&self, text: &str) -> String;

    /// Turn indexed text back into display form.
    fn restore(&self, text: &str) -> String;
}

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl QueryPreprocessor for Passthrough {
    fn segment(&self, text: &str) -> String {
        text.to_string()
    }

    fn restore(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Greedy longest-match compound segmenter over a fixed lexicon.
///
/// Matching is case-insensitive; the original casing of each syllable is kept.
/// Punctuation around a token does not block a match: `công đoàn?` becomes
/// `công_đoàn?`. A compound never spans punctuation inside the run (`công, đoàn`).
#[derive(Debug, Clone, Default)]
pub struct CompoundSegmenter {
    compounds: HashSet<Vec<String>>,
    max_syllables: usize,
}

impl CompoundSegmenter {
    pub fn new<I, S>(lexicon: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segmenter = Self::default();
        for entry in lexicon {
            let syllables: Vec<String> = entry
                .as_ref()
                .split_whitespace()
                .map(str::to_lowercase)
                .collect();
            if syllables.len() < 2 {
                continue;
            }
            segmenter.max_syllables = segmenter.max_syllables.max(syllables.len());
            segmenter.compounds.insert(syllables);
        }
        segmenter
    }

    /// Load a lexicon file with one compound per line. Blank lines and lines starting
    /// with `#` are skipped.
    pub fn from_lexicon_text(text: &str) -> Self {
        Self::new(lexicon_lines(text))
    }

    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }

    fn longest_match(&self, tokens: &[Token<'_>]) -> usize {
        let upper = self.max_syllables.min(tokens.len());
        (2..=upper)
            .rev()
            .find(|&n| {
                let run = &tokens[..n];
                let joinable = run.iter().all(|t| !t.core.is_empty())
                    && run[..n - 1].iter().all(|t| t.trail.is_empty())
                    && run[1..].iter().all(|t| t.lead.is_empty());
                joinable && {
                    let key: Vec<String> = run.iter().map(|t| t.core.to_lowercase()).collect();
                    self.compounds.contains(&key)
                }
            })
            .unwrap_or(1)
    }
}

/// A whitespace-separated token split into surrounding punctuation and the word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    lead: &'a str,
    core: &'a str,
    trail: &'a str,
}

impl<'a> Token<'a> {
    fn split(raw: &'a str) -> Self {
        let Some(start) = raw.find(char::is_alphanumeric) else {
            return Self {
                lead: raw,
                core: "",
                trail: "",
            };
        };
        let end = raw
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_alphanumeric())
            .map_or(raw.len(), |(i, c)| i + c.len_utf8());
        Self {
            lead: &raw[..start],
            core: &raw[start..end],
            trail: &raw[end..],
        }
    }
}

fn lexicon_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

impl QueryPreprocessor for CompoundSegmenter {
    fn segment(&self, text: &str) -> String {
        let tokens: Vec<Token<'_>> = text.split_whitespace().map(Token::split).collect();
        let mut words = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let n = self.longest_match(&tokens[i..]);
            let run = &tokens[i..i + n];
            let cores: Vec<&str> = run.iter().map(|t| t.core).collect();
            words.push(format!(
                "{}{}{}",
                run[0].lead,
                cores.join(COMPOUND_JOINER),
                run[n - 1].trail
            ));
            i += n;
        }
        words.join(" ")
    }

    fn restore(&self, text: &str) -> String {
        text.replace(COMPOUND_JOINER, " ")
    }
}

/// Create a preprocessor from configuration.
pub fn create_preprocessor(
    config: &PreprocessConfig,
) -> Result<Arc<dyn QueryPreprocessor>, ConfigError> {
    match config.segmenter.as_str() {
        "passthrough" | "" => Ok(Arc::new(Passthrough)),
        "compound" => {
            let mut entries = config.lexicon.clone();
            if let Some(path) = &config.lexicon_path {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
                    message: format!("cannot read lexicon {}: {e}", path.display()),
                })?;
                entries.extend(lexicon_lines(&text).map(String::from));
            }
            Ok(Arc::new(CompoundSegmenter::new(entries)))
        }
        other => Err(ConfigError::Invalid {
            message: format!("unknown segmenter '{other}'"),
        }),
    }
}
