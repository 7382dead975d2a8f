use std::collections::BTreeMap;

use crate::schema::Token;

/// Safety margin subtracted from the total duration for the terminal
/// boundary, so the final segment never runs into trailing silence.
pub const END_SAFETY_MARGIN: f64 = 0.1;

/// How many leading transcript words the diagnostic preview shows when an
/// expected name never matched.
const PREVIEW_WORDS: usize = 30;

/// Folds recognizer spellings onto canonical segment names. Words without an
/// alias entry resolve to themselves.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn canonical<'a>(&'a self, word: &'a str) -> &'a str {
        self.entries.get(word).map_or(word, String::as_str)
    }
}

/// Start time per canonical name plus the terminal entry marking the end of
/// the usable audio span. At most one start per name; first occurrence wins.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryMap {
    starts: BTreeMap<String, f64>,
    terminal: f64,
}

impl BoundaryMap {
    pub fn start_of(&self, name: &str) -> Option<f64> {
        self.starts.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.starts.contains_key(name)
    }

    pub fn terminal(&self) -> f64 {
        self.terminal
    }

    pub fn resolved_count(&self) -> usize {
        self.starts.len()
    }
}

/// Diagnostics the caller must surface: which expected names matched, which
/// never appeared, and a short preview of the words actually heard near the
/// start of the transcript to aid manual correction.
#[derive(Debug, Clone)]
pub struct BoundaryReport {
    pub detected: Vec<String>,
    pub missing: Vec<String>,
    pub preview: Vec<Token>,
}

impl BoundaryReport {
    pub fn log(&self) {
        eprintln!("detected boundaries: {:?}", self.detected);
        if !self.missing.is_empty() {
            eprintln!("WARNING missing boundaries: {:?}", self.missing);
            for token in &self.preview {
                eprintln!("  heard {:?} @ {:.2}s", token.word, token.start);
            }
        }
    }
}

/// Scan tokens in order; resolve each word through the alias table; record
/// the first occurrence of every requested name. Later occurrences of an
/// already-recorded name are ignored. Names never matched stay absent — the
/// caller skips those segments, non-fatally.
pub fn detect_boundaries(
    names: &[&str],
    tokens: &[Token],
    aliases: &AliasTable,
    total_duration: f64,
) -> (BoundaryMap, BoundaryReport) {
    let mut starts = BTreeMap::new();
    for token in tokens {
        let canonical = aliases.canonical(&token.word);
        if names.contains(&canonical) && !starts.contains_key(canonical) {
            starts.insert(canonical.to_owned(), token.start);
        }
    }

    let map = BoundaryMap {
        starts,
        terminal: total_duration - END_SAFETY_MARGIN,
    };

    let detected = names
        .iter()
        .filter(|name| map.contains(name))
        .map(|name| (*name).to_owned())
        .collect::<Vec<_>>();
    let missing = names
        .iter()
        .filter(|name| !map.contains(name))
        .map(|name| (*name).to_owned())
        .collect::<Vec<_>>();
    let preview = if missing.is_empty() {
        Vec::new()
    } else {
        tokens.iter().take(PREVIEW_WORDS).cloned().collect()
    };

    (
        map,
        BoundaryReport {
            detected,
            missing,
            preview,
        },
    )
}
