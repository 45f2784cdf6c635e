//! Keyword extraction for the metadata fallback search.

use lazy_static::lazy_static;
use std::collections::HashSet;

/// Keywords passed to the metadata search
pub const MAX_KEYWORDS: usize = 10;

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = [
        "what", "which", "where", "when", "who", "how", "many", "much",
        "have", "been", "that", "this", "with", "from", "they", "each",
        "highest", "lowest", "average", "total", "count", "find", "show",
        "list", "give", "most", "least", "more", "than", "over", "last",
        "first", "were", "does", "also", "into", "some", "only", "their",
        "there", "these", "those", "very", "just", "will", "would",
        "could", "should", "across", "between", "within", "using", "based",
    ]
    .into_iter()
    .collect();
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Lowercased search keywords for `question`.
///
/// Words of four or more characters that are not stopwords, falling back to
/// any word of four or more characters, then to every word. At most
/// `MAX_KEYWORDS` are returned, in question order.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let words: Vec<String> = question
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c| matches!(c, '\'' | '"' | '?' | ',')).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    let long = |w: &&String| w.chars().count() > 3;

    let mut keywords: Vec<String> = words
        .iter()
        .filter(long)
        .filter(|w| !is_stopword(w))
        .cloned()
        .collect();
    if keywords.is_empty() {
        keywords = words.iter().filter(long).cloned().collect();
    }
    if keywords.is_empty() {
        keywords = words;
    }

    keywords.truncate(MAX_KEYWORDS);
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_keywords_drops_stopwords_and_short_words() {
        let keywords = extract_keywords("Which sellers have the highest average review score?");
        assert_eq!(keywords, vec!["sellers", "review", "score"]);
    }

    #[test]
    fn test_extract_keywords_falls_back_to_long_words() {
        assert_eq!(extract_keywords("Show the most"), vec!["show", "most"]);
    }

    #[test]
    fn test_extract_keywords_falls_back_to_all_words() {
        assert_eq!(extract_keywords("top 5 by SKU"), vec!["top", "5", "by", "sku"]);
    }

    #[test]
    fn test_extract_keywords_caps_count() {
        let question = "alpha bravo charlie delta echoes foxtrot golfer hotel india juliet kilos limas";
        let keywords = extract_keywords(question);
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords[0], "alpha");
        assert_eq!(keywords[9], "juliet");
    }
}
