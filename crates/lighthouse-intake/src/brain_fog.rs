//! Brain-fog estimate from the full story transcript.
//!
//! Computed once at finalization. Each indicator group counts at most once,
//! however many of its phrases appear.

use std::sync::OnceLock;

use regex::Regex;

use lighthouse_core::types::BrainFogScore;

/// Score given when no indicator appears. Grief alone carries some load.
pub const BASELINE: u8 = 2;

const INDICATORS: &[&[&str]] = &[
    &["confused", "confusing"],
    &["overwhelmed", "overwhelming"],
    &["can't think", "cant think", "cannot think"],
    &["foggy", "brain fog", "in a fog"],
    &["can't focus", "cannot focus", "can't concentrate", "cannot concentrate"],
    &["don't know what to do", "dont know what to do"],
    &["can't remember", "cannot remember", "don't remember", "dont remember"],
    &["numb"],
    &["blur"],
    &["scattered"],
    &["in shock"],
];

/// One whole-word pattern per indicator group.
fn indicator_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INDICATORS
            .iter()
            .map(|group| {
                let alternatives: Vec<String> = group.iter().map(|p| regex::escape(p)).collect();
                Regex::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
                    .expect("indicator pattern is valid")
            })
            .collect()
    })
}

/// Number of distinct indicator groups present in `transcript`. Phrases
/// match whole words only, so "numb" does not count inside "number".
pub fn count_indicators(transcript: &str) -> usize {
    let text = transcript
        .to_lowercase()
        .replace(['\u{2019}', '\u{2018}'], "'");
    indicator_patterns()
        .iter()
        .filter(|pattern| pattern.is_match(&text))
        .count()
}

/// Map indicator count to a 1..=5 score: 0 → 2, 1 → 3, 2 → 4, 3+ → 5.
pub fn score_brain_fog(transcript: &str) -> BrainFogScore {
    let count = count_indicators(transcript).min(3) as u8;
    BrainFogScore::new(BASELINE + count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_indicators_is_baseline() {
        assert_eq!(score_brain_fog("My father passed on Tuesday.").value(), 2);
        assert_eq!(score_brain_fog("").value(), 2);
    }

    #[test]
    fn test_single_indicator_scores_three() {
        assert_eq!(score_brain_fog("I'm so overwhelmed right now.").value(), 3);
    }

    #[test]
    fn test_two_indicators_score_four() {
        assert_eq!(score_brain_fog("I'm confused and I feel numb.").value(), 4);
    }

    #[test]
    fn test_three_or_more_indicators_score_five() {
        let transcript = "I'm confused, overwhelmed, and I can't think straight. Everything is a blur.";
        assert_eq!(count_indicators(transcript), 4);
        assert_eq!(score_brain_fog(transcript).value(), 5);
    }

    #[test]
    fn test_repeated_indicator_counts_once() {
        assert_eq!(
            score_brain_fog("Confused. So confused. It's all confusing.").value(),
            3
        );
    }

    #[test]
    fn test_curly_apostrophes_and_case() {
        assert_eq!(count_indicators("I CAN\u{2019}T THINK"), 1);
    }

    #[test]
    fn test_grief_words_alone_are_not_indicators() {
        assert_eq!(count_indicators("I lost my mom and I'm so sad."), 0);
    }

    #[test]
    fn test_indicators_inside_longer_words_do_not_count() {
        let transcript =
            "My name is Sam. I need the phone number for the funeral home. The photos are blurry.";
        assert_eq!(count_indicators(transcript), 0);
        assert_eq!(score_brain_fog(transcript).value(), 2);

        assert_eq!(count_indicators("Everything is a blur and I feel numb."), 2);
    }
}
