use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::schema::Token;

/// Interval index over an ordered token list.
///
/// Contract: `active_at` returns the FIRST token in list order whose interval
/// contains the query time. When intervals overlap, list position breaks the
/// tie — not start time. Callers rely on this for reproducible caption
/// selection, so any acceleration structure layered on top must keep breaking
/// ties by original index; plain pre-sorting by start time is an observable
/// behavior change and is not an allowed optimization.
#[derive(Debug, Clone, Default)]
pub struct TokenIndex {
    tokens: Vec<Token>,
}

impl TokenIndex {
    /// Tokens are kept exactly in caller order; no sorting, no dedup.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// First token in list order with `start <= t < end`, or None.
    /// Pure: repeated queries at the same `t` return the same entry.
    pub fn active_at(&self, t: f64) -> Option<&Token> {
        self.tokens.iter().find(|token| token.contains(t))
    }

    /// Tokens whose start falls inside `[from, to)`, in list order.
    pub fn in_range(&self, from: f64, to: f64) -> Vec<Token> {
        self.tokens
            .iter()
            .filter(|token| token.start >= from && token.start < to)
            .cloned()
            .collect()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Load a `[{word, start, end}]` JSON token list and validate every entry.
pub fn load_tokens(path: &Path) -> Result<Vec<Token>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read token file {}", path.display()))?;
    let tokens: Vec<Token> = serde_json::from_str(&contents)
        .map_err(|error| anyhow!("failed to parse token json in {}: {error}", path.display()))?;

    for (index, token) in tokens.iter().enumerate() {
        token
            .validate()
            .with_context(|| format!("invalid token at index {index} in {}", path.display()))?;
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TokenIndex {
        TokenIndex::new(vec![
            Token::new("pehla", 0.5, 1.2),
            Token::new("doosra", 1.2, 2.0),
            Token::new("overlap", 0.8, 1.5),
        ])
    }

    #[test]
    fn active_at_returns_first_in_list_order() {
        let index = index();
        // 1.0 is inside both "pehla" and "overlap"; list order wins.
        assert_eq!(index.active_at(1.0).map(|t| t.word.as_str()), Some("pehla"));
        // 1.3 is inside both "doosra" and "overlap"; "doosra" comes first.
        assert_eq!(
            index.active_at(1.3).map(|t| t.word.as_str()),
            Some("doosra")
        );
    }

    #[test]
    fn active_at_is_repeatable() {
        let index = index();
        let first = index.active_at(0.9).map(|t| t.word.clone());
        for _ in 0..10 {
            assert_eq!(index.active_at(0.9).map(|t| t.word.clone()), first);
        }
    }

    #[test]
    fn active_at_misses_return_none() {
        let index = index();
        assert!(index.active_at(0.0).is_none());
        assert!(index.active_at(2.0).is_none());
        assert!(TokenIndex::default().active_at(1.0).is_none());
    }

    #[test]
    fn interval_end_is_exclusive() {
        let index = TokenIndex::new(vec![Token::new("a", 1.0, 2.0)]);
        assert!(index.active_at(2.0).is_none());
        assert!(index.active_at(1.0).is_some());
    }

    #[test]
    fn in_range_filters_on_start_time() {
        let index = index();
        let hits = index.in_range(0.8, 1.2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].word, "overlap");

        // Range start is inclusive, end exclusive.
        let hits = index.in_range(0.5, 1.2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].word, "pehla");
        assert_eq!(hits[1].word, "overlap");
    }

    #[test]
    fn tolerates_unsorted_input() {
        let index = TokenIndex::new(vec![
            Token::new("late", 5.0, 6.0),
            Token::new("early", 1.0, 2.0),
        ]);
        assert_eq!(index.active_at(1.5).map(|t| t.word.as_str()), Some("early"));
        assert_eq!(index.active_at(5.5).map(|t| t.word.as_str()), Some("late"));
    }
}
