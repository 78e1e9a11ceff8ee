//! Longest-common-subsequence text matching for OCR output.
//!
//! OCR frequently drops or mangles individual characters, so target labels
//! are matched by LCS ratio rather than equality.

/// Length of the longest common subsequence of `a` and `b`.
pub fn lcs_len(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ch_a in &a {
        for (j, ch_b) in b.iter().enumerate() {
            current[j + 1] = if ch_a == ch_b {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// LCS similarity ratio in `[0, 1]`, relative to the longer string.
///
/// Two empty strings are considered identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    lcs_len(a, b) as f64 / longest as f64
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuzzyMatch {
    /// Index into the candidate slice.
    pub index: usize,
    pub score: f64,
}

/// Best candidate whose similarity to `target` clears `threshold`.
///
/// Ties keep the earliest candidate, so caller-supplied ordering acts as a
/// priority.
pub fn best_match(target: &str, candidates: &[&str], threshold: f64) -> Option<FuzzyMatch> {
    let mut best: Option<FuzzyMatch> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = similarity(target, candidate);
        if score < threshold {
            continue;
        }
        if best.is_none_or(|current| score > current.score) {
            best = Some(FuzzyMatch { index, score });
        }
    }
    best
}
