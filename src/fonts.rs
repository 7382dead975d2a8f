use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use fontdue::Font;

/// Unicode block driving face selection. One Devanagari character anywhere in
/// the text is enough to select the Devanagari face.
const DEVANAGARI_START: char = '\u{0900}';
const DEVANAGARI_END: char = '\u{097F}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Devanagari,
}

pub fn contains_devanagari(text: &str) -> bool {
    text.chars()
        .any(|ch| ch >= DEVANAGARI_START && ch <= DEVANAGARI_END)
}

pub fn script_of(text: &str) -> Script {
    if contains_devanagari(text) {
        Script::Devanagari
    } else {
        Script::Latin
    }
}

/// Both caption faces, loaded up front so a missing font fails the render
/// before any frame is produced rather than silently skipping captions.
pub struct FontLibrary {
    latin: Font,
    devanagari: Font,
}

impl FontLibrary {
    /// Try each candidate in preference order: an explicit fonts directory
    /// first, then well-known system locations.
    pub fn load(fonts_dir: Option<&Path>) -> Result<Self> {
        let latin = load_first_font(&latin_candidates(fonts_dir), "latin")?;
        let devanagari = load_first_font(&devanagari_candidates(fonts_dir), "devanagari")?;
        Ok(Self { latin, devanagari })
    }

    pub fn for_script(&self, script: Script) -> &Font {
        match script {
            Script::Latin => &self.latin,
            Script::Devanagari => &self.devanagari,
        }
    }

    pub fn for_text(&self, text: &str) -> &Font {
        self.for_script(script_of(text))
    }
}

fn latin_candidates(fonts_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = fonts_dir {
        candidates.push(dir.join("Arial-Bold.ttf"));
    }
    candidates.extend(
        [
            "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates
}

fn devanagari_candidates(fonts_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = fonts_dir {
        candidates.push(dir.join("NotoSansDevanagari-Bold.ttf"));
        candidates.push(dir.join("ITFDevanagari.ttc"));
    }
    candidates.extend(
        [
            "/usr/share/fonts/truetype/noto/NotoSansDevanagari-Bold.ttf",
            "/usr/share/fonts/truetype/noto/NotoSansDevanagari-Regular.ttf",
            "/System/Library/Fonts/Supplemental/ITFDevanagari.ttc",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates
}

/// Walk the preference list; unreadable or unparsable candidates are skipped,
/// exhausting the list is a fatal configuration error.
fn load_first_font(candidates: &[PathBuf], label: &str) -> Result<Font> {
    let mut attempted = Vec::new();
    for path in candidates {
        attempted.push(path.display().to_string());
        let Ok(bytes) = fs::read(path) else {
            continue;
        };
        match Font::from_bytes(bytes, fontdue::FontSettings::default()) {
            Ok(font) => return Ok(font),
            Err(_) => continue,
        }
    }
    bail!(
        "no usable {label} caption font found; tried in order: [{}]. \
         Provide one via --fonts <dir>",
        attempted.join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devanagari_detection_scans_whole_text() {
        assert!(contains_devanagari("मेष"));
        assert!(contains_devanagari("mixed मकर text"));
        assert!(!contains_devanagari("Expense Alert"));
        assert!(!contains_devanagari(""));
    }

    #[test]
    fn script_selection_prefers_devanagari_on_any_hit() {
        assert_eq!(script_of("राशिफल"), Script::Devanagari);
        assert_eq!(script_of("Leo"), Script::Latin);
        assert_eq!(script_of("Leo राशि"), Script::Devanagari);
    }

    #[test]
    fn exhausted_candidate_list_is_fatal() {
        let error = load_first_font(&[PathBuf::from("/nonexistent/missing.ttf")], "latin")
            .expect_err("missing fonts should fail");
        let message = format!("{error}");
        assert!(message.contains("latin"));
        assert!(message.contains("/nonexistent/missing.ttf"));
    }

    #[test]
    fn fonts_dir_is_preferred_over_system_paths() {
        let candidates = latin_candidates(Some(Path::new("/project/fonts")));
        assert_eq!(candidates[0], PathBuf::from("/project/fonts/Arial-Bold.ttf"));
        assert!(candidates.len() > 1);
    }
}
