//! Approximate name matching for free-text item mentions.
//!
//! Similarity is the Ratcliff/Obershelp ratio `2·M / (|a| + |b|)`, where `M` is
//! the number of characters covered by recursively extracted longest common
//! blocks. Ratios live in `0.0..=1.0`.

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.55;
pub const MIN_QUERY_CHARS: usize = 2;

const SCORE_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub struct FuzzyMatcher {
    threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self { threshold: DEFAULT_SIMILARITY_THRESHOLD }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuzzyMatch<'c> {
    pub candidate: &'c str,
    pub score: f64,
}

impl FuzzyMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: threshold.clamp(0.0, 1.0) }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best candidate at or above the threshold. Candidates are expected to be
    /// case-folded already; the query is folded here.
    ///
    /// Ties on score go to the shorter candidate, then the lexicographically
    /// smaller one, so the result never depends on candidate order.
    pub fn best_match<'c, I>(&self, query: &str, candidates: I) -> Option<FuzzyMatch<'c>>
    where
        I: IntoIterator<Item = &'c str>,
    {
        let query = query.trim().to_lowercase();
        if query.chars().count() < MIN_QUERY_CHARS {
            return None;
        }

        let mut best: Option<FuzzyMatch<'c>> = None;
        for candidate in candidates {
            let score = similarity_ratio(&query, candidate);
            if score + SCORE_EPSILON < self.threshold {
                continue;
            }
            let replace = match &best {
                None => true,
                Some(current) => {
                    if (score - current.score).abs() > SCORE_EPSILON {
                        score > current.score
                    } else {
                        let (len, current_len) =
                            (candidate.chars().count(), current.candidate.chars().count());
                        len < current_len || (len == current_len && candidate < current.candidate)
                    }
                }
            };
            if replace {
                best = Some(FuzzyMatch { candidate, score });
            }
        }
        best
    }
}

pub fn similarity_ratio(left: &str, right: &str) -> f64 {
    let left = left.chars().collect::<Vec<_>>();
    let right = right.chars().collect::<Vec<_>>();
    let total = left.len() + right.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&left, &right);
    (2 * matched) as f64 / total as f64
}

fn matching_chars(left: &[char], right: &[char]) -> usize {
    if left.is_empty() || right.is_empty() {
        return 0;
    }
    let (left_start, right_start, len) = longest_common_block(left, right);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&left[..left_start], &right[..right_start])
        + matching_chars(&left[left_start + len..], &right[right_start + len..])
}

/// Longest common contiguous block, earliest in `left` on ties.
fn longest_common_block(left: &[char], right: &[char]) -> (usize, usize, usize) {
    let mut previous = vec![0usize; right.len() + 1];
    let mut current = vec![0usize; right.len() + 1];
    let (mut best_left, mut best_right, mut best_len) = (0, 0, 0);

    for (i, left_char) in left.iter().enumerate() {
        for (j, right_char) in right.iter().enumerate() {
            current[j + 1] = if left_char == right_char { previous[j] + 1 } else { 0 };
            if current[j + 1] > best_len {
                best_len = current[j + 1];
                best_left = i + 1 - best_len;
                best_right = j + 1 - best_len;
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (best_left, best_right, best_len)
}

#[cfg(test)]
mod tests {
    use super::{similarity_ratio, FuzzyMatcher};

    #[test]
    fn ratio_matches_reference_values() {
        assert!((similarity_ratio("margherita", "margherita") - 1.0).abs() < 1e-9);
        assert!((similarity_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert!((similarity_ratio("", "") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn typo_resolves_above_threshold() {
        let matcher = FuzzyMatcher::default();
        let candidates = ["margherita", "diavola", "coca-cola"];
        let found = matcher.best_match("Margarita", candidates).expect("typo should match");
        assert_eq!(found.candidate, "margherita");
    }

    #[test]
    fn short_query_never_matches() {
        let matcher = FuzzyMatcher::new(0.0);
        assert!(matcher.best_match("m", ["m", "margherita"]).is_none());
        assert!(matcher.best_match("  ", ["m"]).is_none());
    }

    #[test]
    fn dissimilar_query_is_rejected() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.best_match("XYZ123", ["margherita", "diavola", "tiramisù"]).is_none());
    }

    #[test]
    fn ties_prefer_shorter_then_lexicographic_candidate() {
        let matcher = FuzzyMatcher::new(0.1);
        // Both score 2/3 against "abcd".
        let found = matcher.best_match("abcd", ["abcdwxyz", "ab"]).expect("match");
        assert_eq!(found.candidate, "ab");

        let found = matcher.best_match("ab", ["abyy", "abxx"]).expect("match");
        assert_eq!(found.candidate, "abxx");
    }
}
