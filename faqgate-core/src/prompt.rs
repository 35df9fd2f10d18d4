//! The prompt sent to the generator on the fallback path.
//!
//! A single module owns the wire format: `PromptEnvelope::render` serializes it,
//! `parse_prompt` reads it back, and `strip_markers` removes every structural marker
//! from text (model output, retrieved passages).

use crate::context::AssembledContext;
use crate::types::Query;
use regex::Regex;
use std::sync::LazyLock;

/// Line separating context passages.
pub const FRAGMENT_DELIMITER: &str = "---";

/// Heading introducing the caller's extra instructions.
pub const INSTRUCTION_HEADING: &str = "Hãy tuân theo các yêu cầu sau đây:";

const QUESTION_TAG: &str = "question";
const CONTEXT_TAG: &str = "context";
const REFERENCE_TAG: &str = "reference";

/// Tag names treated as structural markers. `tag` is what older prompts wrapped the
/// question in and models still echo.
const MARKER_TAGS: &[&str] = &[QUESTION_TAG, CONTEXT_TAG, REFERENCE_TAG, "tag"];

static MARKER_TAG_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(question|context|reference|tag)\s*>").ok()
});

/// Fixed instructions placed before the question.
pub fn default_preamble(language: &str) -> String {
    format!(
        "You will be provided with a question and a context, each delimited by XML tags named \
         after it ({QUESTION_TAG}, {CONTEXT_TAG}). The context contains passages separated by \
         triple dashes and at most one reference answer delimited by {REFERENCE_TAG} tags. \
         Answer the question using only the information in the context. If the context does \
         not contain the answer, say so. Write the answer in the language of the question \
         (language code: {language})."
    )
}

pub(crate) fn open_tag(name: &str) -> String {
    format!("<{name}>")
}

pub(crate) fn close_tag(name: &str) -> String {
    format!("</{name}>")
}

pub(crate) fn reference_block(answer: &str) -> String {
    format!(
        "{}\n{answer}\n{}",
        open_tag(REFERENCE_TAG),
        close_tag(REFERENCE_TAG)
    )
}

fn is_delimiter_line(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && t.chars().all(|c| c == '-')
}

/// Remove every structural marker: tags and delimiter lines.
///
/// Tag matching tolerates case and inner whitespace (`< /Reference >`). Removal
/// repeats until the text is stable, since dropping one marker can join the pieces of
/// another (`<que<tag>stion>`).
pub fn strip_markers(text: &str) -> String {
    let mut current = strip_once(text);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let without_tags = match MARKER_TAG_RE.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => MARKER_TAGS.iter().fold(text.to_string(), |acc, tag| {
            acc.replace(&open_tag(tag), "").replace(&close_tag(tag), "")
        }),
    };

    without_tags
        .lines()
        .filter(|line| !is_delimiter_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// The structured prompt for one fallback generation.
#[derive(Debug, Clone)]
pub struct PromptEnvelope<'a> {
    pub instruction_preamble: String,
    pub query: &'a str,
    pub context: &'a AssembledContext,
    pub user_instruction: Option<&'a str>,
}

impl<'a> PromptEnvelope<'a> {
    pub fn new(query: &'a Query, context: &'a AssembledContext) -> Self {
        Self {
            instruction_preamble: default_preamble(query.language()),
            query: query.text(),
            context,
            user_instruction: query.user_instruction(),
        }
    }

    /// Replace the user instruction (e.g. from per-call options).
    pub fn with_user_instruction(mut self, instruction: Option<&'a str>) -> Self {
        if let Some(i) = instruction.filter(|i| !i.trim().is_empty()) {
            self.user_instruction = Some(i);
        }
        self
    }

    /// Serialize to the text sent to the model. The user instruction always comes last.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.instruction_preamble.len() + self.query.len() + self.context.text().len() + 128,
        );
        out.push_str(&self.instruction_preamble);
        out.push_str("\n\n");

        out.push_str(&open_tag(QUESTION_TAG));
        out.push('\n');
        out.push_str(&strip_markers(self.query));
        out.push('\n');
        out.push_str(&close_tag(QUESTION_TAG));
        out.push_str("\n\n");

        out.push_str(&open_tag(CONTEXT_TAG));
        out.push('\n');
        if !self.context.is_empty() {
            out.push_str(self.context.text());
            out.push('\n');
        }
        out.push_str(&close_tag(CONTEXT_TAG));

        if let Some(instruction) = self.user_instruction {
            out.push_str("\n\n");
            out.push_str(INSTRUCTION_HEADING);
            out.push('\n');
            out.push_str(instruction.trim());
        }
        out
    }
}

/// Sections recovered from a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrompt {
    pub query: String,
    pub fragments: Vec<String>,
    pub reference: Option<String>,
    pub user_instruction: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PromptParseError {
    #[error("Prompt section '{section}' is missing or unterminated")]
    MissingSection { section: &'static str },
}

fn section<'t>(text: &'t str, name: &'static str) -> Result<(&'t str, &'t str), PromptParseError> {
    let open = open_tag(name);
    let close = close_tag(name);
    let start = text
        .find(&open)
        .ok_or(PromptParseError::MissingSection { section: name })?
        + open.len();
    let len = text[start..]
        .find(&close)
        .ok_or(PromptParseError::MissingSection { section: name })?;
    Ok((&text[start..start + len], &text[start + len + close.len()..]))
}

/// Split a context block back into passages and the reference answer.
pub fn split_context(block: &str) -> (Vec<String>, Option<String>) {
    let (passages, reference) = match section(block, REFERENCE_TAG) {
        Ok((inner, _)) => {
            let before = block
                .find(&open_tag(REFERENCE_TAG))
                .map_or(block, |i| &block[..i]);
            (before, Some(inner.trim().to_string()))
        }
        Err(_) => (block, None),
    };

    let mut fragments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in passages.lines() {
        if is_delimiter_line(line) {
            let text = current.join("\n").trim().to_string();
            if !text.is_empty() {
                fragments.push(text);
            }
            current.clear();
        } else {
            current.push(line);
        }
    }
    let tail = current.join("\n").trim().to_string();
    if !tail.is_empty() {
        fragments.push(tail);
    }

    (fragments, reference.filter(|r| !r.is_empty()))
}

/// Parse a prompt produced by `PromptEnvelope::render`.
pub fn parse_prompt(rendered: &str) -> Result<ParsedPrompt, PromptParseError> {
    let (query, rest) = section(rendered, QUESTION_TAG)?;
    let (context, rest) = section(rest, CONTEXT_TAG)?;
    let (fragments, reference) = split_context(context);

    let user_instruction = rest
        .find(INSTRUCTION_HEADING)
        .map(|i| rest[i + INSTRUCTION_HEADING.len()..].trim().to_string())
        .filter(|i| !i.is_empty());

    Ok(ParsedPrompt {
        query: query.trim().to_string(),
        fragments,
        reference,
        user_instruction,
    })
}
