//! Heuristic quiz generation from chunk text.
//!
//! Multiple-choice items are cloze prompts built around a salient term; true/false
//! items negate the first " is " of a chunk's opening sentence. All randomness
//! comes from the caller's RNG so a seeded RNG reproduces a quiz exactly.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::RegexBuilder;

use crate::domain::{Question, Quiz, QuizRequest};

pub mod salience;
mod stopwords;

pub use salience::top_terms_per_chunk;

pub const BLANK: &str = "____";
const MCQ_SALIENT_TERMS: usize = 12;
const MAX_ANSWER_WORDS: usize = 3;
const MAX_DISTRACTORS: usize = 3;
const MCQ_FALLBACK_CHARS: usize = 200;
const TF_FALLBACK_CHARS: usize = 150;
const EXPLAIN_PASSAGE_CHARS: usize = 500;

fn prefix_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Split after `.`, `?` or `!` wherever whitespace follows.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut prev: Option<char> = None;
    let mut in_break = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if !in_break && matches!(prev, Some('.' | '?' | '!')) {
                out.push(&text[start..i]);
                in_break = true;
            }
        } else if in_break {
            start = i;
            in_break = false;
        }
        if !in_break {
            prev = Some(c);
        }
    }
    if !in_break {
        out.push(&text[start..]);
    }
    out
}

/// Replace the first case-insensitive occurrence of `answer` in `sentence` with the blank.
fn blank_out(sentence: &str, answer: &str) -> Option<String> {
    let re = RegexBuilder::new(&regex::escape(answer))
        .case_insensitive(true)
        .build()
        .ok()?;
    Some(re.replacen(sentence, 1, BLANK).into_owned())
}

/// Cloze multiple-choice items, at most one per chunk, until `n` are made.
///
/// A bigram answer that spans a removed stop word or a sentence break
/// ("powerhouse cell") never appears verbatim in the text. Such an item keeps
/// its fallback sentence unblanked.
pub fn generate_mcq<S, R>(chunks: &[S], n: usize, rng: &mut R) -> Vec<Question>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let top_terms = top_terms_per_chunk(chunks, MCQ_SALIENT_TERMS);
    let pool: BTreeSet<&str> = top_terms.iter().flatten().map(String::as_str).collect();

    let mut out = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if out.len() >= n {
            break;
        }
        let candidates: Vec<&str> = top_terms[i]
            .iter()
            .map(String::as_str)
            .filter(|t| t.split_whitespace().count() <= MAX_ANSWER_WORDS)
            .collect();
        let Some(answer) = candidates.choose(rng).copied() else {
            continue;
        };

        let text = chunk.as_ref().trim();
        let sentences = split_sentences(text);
        let answer_lc = answer.to_lowercase();
        let containing: Vec<&str> = sentences
            .iter()
            .copied()
            .filter(|s| s.to_lowercase().contains(&answer_lc))
            .collect();
        let base = match containing.choose(rng) {
            Some(s) => s.to_string(),
            None => match sentences[..sentences.len().min(3)].choose(rng) {
                Some(s) => s.to_string(),
                None => prefix_chars(chunk.as_ref(), MCQ_FALLBACK_CHARS),
            },
        };
        let Some(prompt) = blank_out(&base, answer) else {
            tracing::debug!(chunk = i, answer, "could not build cloze pattern");
            continue;
        };

        let prompt_lc = prompt.to_lowercase();
        let mut distractors: Vec<&str> = pool
            .iter()
            .copied()
            .filter(|t| {
                let lc = t.to_lowercase();
                lc != answer_lc && !prompt_lc.contains(&lc)
            })
            .collect();
        distractors.shuffle(rng);
        distractors.truncate(MAX_DISTRACTORS);

        let mut options: Vec<String> = std::iter::once(answer)
            .chain(distractors)
            .map(str::to_string)
            .collect();
        options.shuffle(rng);

        out.push(Question::MultipleChoice {
            prompt,
            options,
            answer: answer.to_string(),
            chunk_ref: i as u32,
        });
    }
    out
}

pub fn generate_tf<S: AsRef<str>>(chunks: &[S], n: usize) -> Vec<Question> {
    let mut out = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if out.len() >= n {
            break;
        }
        let text = chunk.as_ref().trim();
        if text.is_empty() {
            continue;
        }
        let sentence = match split_sentences(text).first() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => prefix_chars(text, TF_FALLBACK_CHARS),
        };
        let (prompt, answer) = if sentence.contains(" is ") {
            (sentence.replacen(" is ", " is not ", 1), false)
        } else {
            (sentence, true)
        };
        out.push(Question::TrueFalse {
            prompt,
            answer,
            chunk_ref: i as u32,
        });
    }
    out
}

/// Feedback for a wrong answer: the opening of the source passage and the correct answer.
pub fn explain_for_wrong(chunk_text: &str, question: &Question) -> String {
    format!(
        "Let's clarify. Here is the key passage: {} ... Focus on the terms used in the question. The correct answer is: {}",
        prefix_chars(chunk_text, EXPLAIN_PASSAGE_CHARS),
        question.answer_text()
    )
}

/// Multiple-choice items first, then true/false items.
pub fn generate_quiz<S, R>(chunks: &[S], request: QuizRequest, rng: &mut R) -> Quiz
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    let mut questions = generate_mcq(chunks, request.num_mcq, rng);
    questions.extend(generate_tf(chunks, request.num_tf));
    tracing::debug!(
        chunks = chunks.len(),
        questions = questions.len(),
        "generated quiz"
    );
    Quiz { questions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{chunk_words, normalize_text};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cell_chunks() -> Vec<String> {
        let text = normalize_text(
            "The mitochondria is the powerhouse of the cell. It produces ATP through respiration.",
        );
        chunk_words(&text, 8, 2).into_iter().map(|c| c.text).collect()
    }

    fn biology() -> Vec<&'static str> {
        vec![
            "Photosynthesis converts light energy into chemical energy. Chlorophyll absorbs red and blue light.",
            "The nucleus stores genetic information. Ribosomes assemble proteins from amino acids.",
            "Osmosis moves water across a membrane. Diffusion spreads solutes from high to low concentration.",
            "Enzymes lower activation energy. Substrates bind at the active site.",
        ]
    }

    #[test]
    fn sentences_split_after_terminal_punctuation() {
        assert_eq!(
            split_sentences("One. Two?  Three! four 3.5 five"),
            vec!["One.", "Two?", "Three!", "four 3.5 five"]
        );
        assert_eq!(split_sentences("Trailing. "), vec!["Trailing."]);
    }

    #[test]
    fn tf_negates_first_is() {
        let qs = generate_tf(&cell_chunks(), 1);
        assert_eq!(
            qs,
            vec![Question::TrueFalse {
                prompt: "The mitochondria is not the powerhouse of the cell.".to_string(),
                answer: false,
                chunk_ref: 0,
            }]
        );
    }

    #[test]
    fn tf_without_is_stays_true_and_skips_blank_chunks() {
        let chunks = ["   ", "Cells divide. More text."];
        let qs = generate_tf(&chunks, 3);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].prompt(), "Cells divide.");
        assert_eq!(qs[0].answer_text(), "True");
        assert_eq!(qs[0].chunk_ref(), 1);
    }

    #[test]
    fn mcq_items_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        let qs = generate_mcq(&biology(), 10, &mut rng);
        assert_eq!(qs.len(), 4);
        for q in &qs {
            let Question::MultipleChoice { prompt, options, answer, .. } = q else {
                panic!("expected multiple choice");
            };
            assert!(options.len() <= 4);
            assert_eq!(options.iter().filter(|o| *o == answer).count(), 1);
            assert!(!prompt.is_empty());
        }
    }

    #[test]
    fn distractors_never_appear_in_prompt() {
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            for q in generate_mcq(&biology(), 4, &mut rng) {
                let Question::MultipleChoice { prompt, options, answer, .. } = q else {
                    panic!("expected multiple choice");
                };
                let prompt_lc = prompt.to_lowercase();
                for o in options.iter().filter(|o| **o != answer) {
                    assert!(
                        !prompt_lc.contains(&o.to_lowercase()),
                        "seed={seed}; distractor {o:?} in {prompt:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn thin_material_still_emits_question() {
        let mut rng = StdRng::seed_from_u64(2);
        let qs = generate_mcq(&["Mitochondria."], 1, &mut rng);
        assert_eq!(
            qs,
            vec![Question::MultipleChoice {
                prompt: "____.".to_string(),
                options: vec!["mitochondria".to_string()],
                answer: "mitochondria".to_string(),
                chunk_ref: 0,
            }]
        );

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let qs = generate_mcq(&["Cells divide."], 1, &mut rng);
            assert_eq!(qs.len(), 1);
            let Question::MultipleChoice { options, answer, .. } = &qs[0] else {
                panic!("expected multiple choice");
            };
            assert!(options.len() < 4, "seed={seed}; options={options:?}");
            assert!(options.contains(answer));
        }
    }

    #[test]
    fn unmatched_answer_falls_back_to_leading_sentences() {
        let chunk = "Cells. Divide. Rapidly. Mitosis.";
        let leading = ["Cells.", "Divide.", "Rapidly."];
        let mut fallbacks = 0;
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let qs = generate_mcq(&[chunk], 1, &mut rng);
            assert_eq!(qs.len(), 1);
            let Question::MultipleChoice { prompt, answer, .. } = &qs[0] else {
                panic!("expected multiple choice");
            };
            if answer.contains(' ') {
                // bigrams cross sentence breaks, so no sentence holds them
                fallbacks += 1;
                assert!(leading.contains(&prompt.as_str()), "seed={seed}; prompt={prompt:?}");
                assert!(!prompt.contains(BLANK));
            } else {
                assert!(prompt.contains(BLANK), "seed={seed}; prompt={prompt:?}");
            }
        }
        assert!(fallbacks > 0);
    }

    #[test]
    fn mcq_respects_n_and_seed() {
        let a = generate_mcq(&biology(), 2, &mut StdRng::seed_from_u64(42));
        let b = generate_mcq(&biology(), 2, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn no_material_means_no_questions() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty: [&str; 0] = [];
        assert!(generate_quiz(&empty, QuizRequest::default(), &mut rng).is_empty());
        assert!(generate_mcq(&["the of and"], 3, &mut rng).is_empty());
    }

    #[test]
    fn quiz_lists_mcq_before_tf() {
        let mut rng = StdRng::seed_from_u64(3);
        let quiz = generate_quiz(&biology(), QuizRequest { num_mcq: 2, num_tf: 2 }, &mut rng);
        let kinds: Vec<&str> = quiz.questions.iter().map(|q| q.kind().as_str()).collect();
        assert_eq!(kinds, vec!["mcq", "mcq", "tf", "tf"]);
    }

    #[test]
    fn explanation_quotes_passage_and_answer() {
        let q = Question::TrueFalse {
            prompt: "x".to_string(),
            answer: false,
            chunk_ref: 0,
        };
        let long = "a".repeat(600);
        let e = explain_for_wrong(&long, &q);
        assert!(e.starts_with("Let's clarify. Here is the key passage: "));
        assert!(e.contains(&format!("{} ...", "a".repeat(500))));
        assert!(!e.contains(&"a".repeat(501)));
        assert!(e.ends_with("The correct answer is: False"));
    }
}
