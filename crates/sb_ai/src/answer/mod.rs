//! Answers to free-text questions over retrieved chunks.
//!
//! With a configured model the answer is generated from a tutor prompt built from
//! the ranked chunks; otherwise (or when generation fails) it is an extractive
//! summary of the top two chunks.

use serde::{Deserialize, Serialize};

use crate::index::SearchHit;
use crate::llm::Llm;

mod prompts;

pub use prompts::tutor_prompt;

const EXTRACTIVE_HEADER: &str = "Here’s the summary from the most relevant sections:\n\n";
const EXTRACTIVE_CHUNKS: usize = 2;
const EXTRACTIVE_CHARS: usize = 400;
pub const NO_MATCHES_ANSWER: &str = "No relevant passages were found in the document.";

/// A generator plus the model to run it with.
#[derive(Clone, Copy)]
pub struct Answerer<'a> {
    pub llm: &'a dyn Llm,
    pub model: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Generated,
    Extractive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
}

/// `[Chunk <position>] <text>` blocks separated by blank lines, best hit first.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| format!("[Chunk {}] {}", h.meta.chunk_position, h.meta.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn extractive_answer(hits: &[SearchHit]) -> String {
    let parts: Vec<String> = hits
        .iter()
        .take(EXTRACTIVE_CHUNKS)
        .map(|h| h.meta.text.chars().take(EXTRACTIVE_CHARS).collect())
        .collect();
    format!("{EXTRACTIVE_HEADER}{}", parts.join("\n\n"))
}

pub fn answer_question(
    hits: &[SearchHit],
    question: &str,
    answerer: Option<Answerer<'_>>,
) -> Answer {
    if hits.is_empty() {
        return Answer {
            text: NO_MATCHES_ANSWER.to_string(),
            kind: AnswerKind::Extractive,
        };
    }

    if let Some(a) = answerer {
        let prompt = tutor_prompt(&build_context(hits), question);
        match a.llm.generate(a.model, &prompt) {
            Ok(text) => {
                return Answer {
                    text: text.trim().to_string(),
                    kind: AnswerKind::Generated,
                }
            }
            Err(e) => {
                tracing::warn!(
                    model = a.model,
                    err = %e,
                    "answer generation failed; using extractive summary"
                );
            }
        }
    }

    Answer {
        text: extractive_answer(hits),
        kind: AnswerKind::Extractive,
    }
}
