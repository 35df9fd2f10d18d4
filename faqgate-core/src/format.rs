//! Plain-text rendering of an `AnswerResult` for display.

use crate::types::{AnswerOrigin, AnswerResult};

/// Display labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub question: String,
    pub answer: String,
    pub confidence: String,
    pub sources_heading: String,
    /// `{n}` is replaced with the 1-based reference number.
    pub reference: String,
    pub faq_reference: String,
    pub truncated_notice: String,
}

impl Labels {
    pub fn vietnamese() -> Self {
        Self {
            question: "Câu hỏi".into(),
            answer: "Trả lời".into(),
            confidence: "Độ chính xác".into(),
            sources_heading: "NGUỒN THAM KHẢO".into(),
            reference: "Tham khảo {n}".into(),
            faq_reference: "Tham khảo FAQ".into(),
            truncated_notice: "(Câu trả lời chưa đầy đủ do vượt quá giới hạn độ dài)".into(),
        }
    }

    pub fn english() -> Self {
        Self {
            question: "Question".into(),
            answer: "Answer".into(),
            confidence: "Confidence".into(),
            sources_heading: "SOURCES".into(),
            reference: "Reference {n}".into(),
            faq_reference: "FAQ reference".into(),
            truncated_notice: "(Answer incomplete: output limit reached)".into(),
        }
    }

    /// Labels for a language tag; anything but English gets Vietnamese.
    pub fn for_language(language: &str) -> Self {
        if language.eq_ignore_ascii_case("en") || language.to_ascii_lowercase().starts_with("en-") {
            Self::english()
        } else {
            Self::vietnamese()
        }
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::vietnamese()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnswerFormatter {
    labels: Labels,
}

impl AnswerFormatter {
    pub fn new(labels: Labels) -> Self {
        Self { labels }
    }

    pub fn render(&self, result: &AnswerResult) -> String {
        let l = &self.labels;
        let mut out = format!(
            "{}: {}\n\n{}: {}",
            l.question, result.query, l.answer, result.answer_text
        );

        match &result.origin {
            AnswerOrigin::ExactMatch {
                confidence_score, ..
            } => {
                out.push_str(&format!("\n\n{}: {:.2}", l.confidence, confidence_score));
            }
            AnswerOrigin::Generated(meta) => {
                if meta.truncated {
                    out.push('\n');
                    out.push_str(&l.truncated_notice);
                }
                out.push_str(&format!("\n\n==={}===", l.sources_heading));
                for (i, citation) in result.citations.iter().enumerate() {
                    let label = l.reference.replace("{n}", &(i + 1).to_string());
                    out.push_str(&format!(
                        "\n{label} [{}]:\n{}",
                        citation.source_id, citation.excerpt
                    ));
                }
                if let Some(reference) = &result.supplementary_reference {
                    out.push_str(&format!("\n\n{}:\n{reference}", l.faq_reference));
                }
            }
        }
        out
    }
}
