//! Text matching over title+description (spec §4.7.2): exact phrase
//! equality, prefix contains, and trigram similarity for Arabic-aware
//! fuzziness (e.g. «تويوتا» vs «طويوطة»).

use crate::model::TextMatchType;
use std::collections::HashSet;

const TRIGRAM_THRESHOLD: f64 = 0.2;

fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return HashSet::from([s.to_string()]);
    }
    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Sorensen-Dice coefficient over character trigrams, in [0, 1].
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    (2.0 * intersection as f64) / (ta.len() + tb.len()) as f64
}

fn rank(match_type: TextMatchType) -> u8 {
    match match_type {
        TextMatchType::Exact => 3,
        TextMatchType::Prefix => 2,
        TextMatchType::Trigram => 1,
        TextMatchType::None => 0,
    }
}

/// Best match type any keyword achieves against `haystack` (title+description,
/// OR-combined across the expanded keyword set).
pub fn best_text_match(keywords: &[String], haystack: &str) -> TextMatchType {
    let haystack_fold = haystack.to_lowercase();
    let mut best = TextMatchType::None;

    for keyword in keywords {
        let keyword_fold = keyword.trim().to_lowercase();
        if keyword_fold.is_empty() {
            continue;
        }

        let candidate = if haystack_fold == keyword_fold {
            TextMatchType::Exact
        } else if haystack_fold.contains(&keyword_fold) {
            TextMatchType::Prefix
        } else if haystack_fold
            .split_whitespace()
            .map(|token| trigram_similarity(&keyword_fold, token))
            .fold(0.0, f64::max)
            >= TRIGRAM_THRESHOLD
        {
            TextMatchType::Trigram
        } else {
            TextMatchType::None
        };

        if rank(candidate) > rank(best) {
            best = candidate;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_equality_beats_everything() {
        let result = best_text_match(&["toyota".to_string()], "toyota");
        assert_eq!(result, TextMatchType::Exact);
    }

    #[test]
    fn substring_is_prefix() {
        let result = best_text_match(&["camry".to_string()], "toyota camry for sale");
        assert_eq!(result, TextMatchType::Prefix);
    }

    #[test]
    fn arabic_typo_is_caught_by_trigram() {
        let result = best_text_match(&["تويوتا".to_string()], "سيارة طويوطة كامري للبيع");
        assert_eq!(result, TextMatchType::Trigram);
    }

    #[test]
    fn unrelated_text_has_no_match() {
        let result = best_text_match(&["غواصة".to_string()], "شقة للايجار في دمشق");
        assert_eq!(result, TextMatchType::None);
    }

    #[test]
    fn best_match_wins_across_multiple_keywords() {
        let result = best_text_match(
            &["غير موجود".to_string(), "toyota".to_string()],
            "toyota",
        );
        assert_eq!(result, TextMatchType::Exact);
    }
}
