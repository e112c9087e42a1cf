use serde::{Deserialize, Serialize};

pub const TRUE_LABEL: &str = "True";
pub const FALSE_LABEL: &str = "False";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[serde(rename = "mcq")]
    MultipleChoice,
    #[serde(rename = "tf")]
    TrueFalse,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "mcq",
            QuestionKind::TrueFalse => "tf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mcq" => Some(Self::MultipleChoice),
            "tf" => Some(Self::TrueFalse),
            _ => None,
        }
    }
}

/// A generated quiz item.
///
/// `chunk_ref` is the zero-based position of the chunk the question was derived from.
/// Questions are immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "qtype")]
pub enum Question {
    /// Cloze prompt (`____` marks the blank) with the answer among `options`.
    #[serde(rename = "mcq")]
    MultipleChoice {
        prompt: String,
        options: Vec<String>,
        answer: String,
        chunk_ref: u32,
    },
    /// Assertion whose truth value is `answer`.
    #[serde(rename = "tf")]
    TrueFalse {
        prompt: String,
        answer: bool,
        chunk_ref: u32,
    },
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        match self {
            Question::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            Question::TrueFalse { .. } => QuestionKind::TrueFalse,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Question::MultipleChoice { prompt, .. } | Question::TrueFalse { prompt, .. } => prompt,
        }
    }

    pub fn chunk_ref(&self) -> u32 {
        match self {
            Question::MultipleChoice { chunk_ref, .. } | Question::TrueFalse { chunk_ref, .. } => {
                *chunk_ref
            }
        }
    }

    /// Canonical answer as presented to the user ("True"/"False" for true/false items).
    pub fn answer_text(&self) -> String {
        match self {
            Question::MultipleChoice { answer, .. } => answer.clone(),
            Question::TrueFalse { answer: true, .. } => TRUE_LABEL.to_string(),
            Question::TrueFalse { answer: false, .. } => FALSE_LABEL.to_string(),
        }
    }

    pub fn options(&self) -> Vec<String> {
        match self {
            Question::MultipleChoice { options, .. } => options.clone(),
            Question::TrueFalse { .. } => vec![TRUE_LABEL.to_string(), FALSE_LABEL.to_string()],
        }
    }

    /// Grading is trimmed and case-insensitive.
    pub fn is_correct(&self, submitted: &str) -> bool {
        submitted.trim().to_lowercase() == self.answer_text().trim().to_lowercase()
    }

    pub fn with_chunk_ref(self, new_ref: u32) -> Self {
        match self {
            Question::MultipleChoice {
                prompt,
                options,
                answer,
                ..
            } => Question::MultipleChoice {
                prompt,
                options,
                answer,
                chunk_ref: new_ref,
            },
            Question::TrueFalse { prompt, answer, .. } => Question::TrueFalse {
                prompt,
                answer,
                chunk_ref: new_ref,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quiz {
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// How many items of each kind to generate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizRequest {
    pub num_mcq: usize,
    pub num_tf: usize,
}

impl Default for QuizRequest {
    fn default() -> Self {
        Self { num_mcq: 7, num_tf: 3 }
    }
}
