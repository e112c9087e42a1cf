//! TF-IDF term salience over a set of chunks.
//!
//! Scores are computed against the whole chunk set at once: a term common to
//! every chunk is less salient than one concentrated in a few.

use std::collections::{BTreeMap, HashMap};

use super::stopwords::is_stop_word;

pub const MAX_FEATURES: usize = 2000;

/// Lower-cased runs of two or more word characters.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Unigrams followed by bigrams of adjacent kept tokens.
fn terms(text: &str) -> Vec<String> {
    let toks = tokens(text);
    let mut out = toks.clone();
    out.extend(toks.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

fn starts_with_ascii_letter(term: &str) -> bool {
    term.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Most salient terms of each chunk, best first.
///
/// Only positive-score terms beginning with an ASCII letter are kept; ties are
/// broken alphabetically. The result has one entry per input chunk.
pub fn top_terms_per_chunk<S: AsRef<str>>(chunks: &[S], top_n: usize) -> Vec<Vec<String>> {
    let counts: Vec<HashMap<String, usize>> = chunks
        .iter()
        .map(|c| {
            let mut m = HashMap::new();
            for t in terms(c.as_ref()) {
                *m.entry(t).or_insert(0) += 1;
            }
            m
        })
        .collect();

    // Corpus frequency and document frequency per term; BTreeMap keeps ties alphabetical.
    let mut corpus: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for m in &counts {
        for (t, n) in m {
            let e = corpus.entry(t.as_str()).or_insert((0, 0));
            e.0 += n;
            e.1 += 1;
        }
    }

    let mut ranked: Vec<(&str, (usize, usize))> = corpus.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(MAX_FEATURES);

    let n_docs = chunks.len() as f64;
    let idf: HashMap<&str, f64> = ranked
        .iter()
        .map(|(t, (_, df))| (*t, ((1.0 + n_docs) / (1.0 + *df as f64)).ln() + 1.0))
        .collect();

    counts
        .iter()
        .map(|m| {
            let mut scored: Vec<(&str, f64)> = m
                .iter()
                .filter_map(|(t, n)| idf.get(t.as_str()).map(|w| (t.as_str(), *n as f64 * w)))
                .collect();
            let norm = scored.iter().map(|(_, s)| s * s).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, s) in scored.iter_mut() {
                    *s /= norm;
                }
            }
            scored.retain(|(t, s)| *s > 0.0 && starts_with_ascii_letter(t));
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            scored
                .into_iter()
                .take(top_n)
                .map(|(t, _)| t.to_string())
                .collect()
        })
        .collect()
}
