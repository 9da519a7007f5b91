//! Text-similarity deduplication.
//!
//! Prevents near-duplicate tasks from reappearing across rotations. Two
//! texts are similar when their normalized forms are equal, one contains
//! the other (both at least 4 chars), or their character-bigram sets have
//! a Jaccard index of at least 0.55.

use std::collections::BTreeSet;

/// Jaccard threshold above which two texts count as the same task.
pub const SIMILARITY_THRESHOLD: f64 = 0.55;

/// Minimum normalized length for the containment rule.
const CONTAINMENT_MIN_LEN: usize = 4;

/// Case-fold and strip everything that is not alphanumeric.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn bigrams(s: &str) -> BTreeSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaccard index of the two texts' character-bigram sets. Zero when either
/// set is empty.
pub fn bigram_jaccard(a: &str, b: &str) -> f64 {
    let (sa, sb) = (bigrams(a), bigrams(b));
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    intersection as f64 / union as f64
}

/// Whether two task texts are near-duplicates.
pub fn is_similar(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if na == nb {
        return true;
    }
    if na.len() >= CONTAINMENT_MIN_LEN
        && nb.len() >= CONTAINMENT_MIN_LEN
        && (na.contains(&nb) || nb.contains(&na))
    {
        return true;
    }
    bigram_jaccard(&na, &nb) >= SIMILARITY_THRESHOLD
}

/// Whether a candidate collides with anything already in the corpus
/// (live board titles plus shuffle history).
pub fn conflicts_with_any<'a>(
    candidate: &str,
    corpus: impl IntoIterator<Item = &'a str>,
) -> bool {
    corpus.into_iter().any(|text| is_similar(candidate, text))
}
