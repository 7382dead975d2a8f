use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::convert::ConversionMode;
use crate::schema::Token;

/// All caption variants of one transcription, cached together so a repeat
/// upload of the same bytes costs zero recognizer/converter calls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptSet {
    pub source: Vec<Token>,
    pub romanized: Vec<Token>,
    pub translated: Vec<Token>,
}

impl TranscriptSet {
    pub fn variant(&self, mode: ConversionMode) -> &[Token] {
        match mode {
            ConversionMode::Identity => &self.source,
            ConversionMode::Transliterate => &self.romanized,
            ConversionMode::Translate => &self.translated,
        }
    }
}

fn column_for(mode: ConversionMode) -> &'static str {
    match mode {
        ConversionMode::Identity => "source",
        ConversionMode::Transliterate => "romanized",
        ConversionMode::Translate => "translated",
    }
}

/// Whole-file content digest. Identical bytes under different names hit the
/// same cache row; the filename column is informational only.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open {} for fingerprinting", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(out)
}

/// SQLite-backed transcript cache keyed by content fingerprint.
pub struct TranscriptCache {
    connection: Connection,
}

impl TranscriptCache {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open transcript cache {}", path.display()))?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS transcripts (
                    file_hash  TEXT PRIMARY KEY,
                    filename   TEXT NOT NULL,
                    source     TEXT NOT NULL,
                    romanized  TEXT NOT NULL,
                    translated TEXT NOT NULL,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )
            .context("failed to create transcripts table")?;
        Ok(Self { connection })
    }

    pub fn get(&self, file_hash: &str) -> Result<Option<TranscriptSet>> {
        let row = self
            .connection
            .query_row(
                "SELECT source, romanized, translated FROM transcripts WHERE file_hash = ?1",
                params![file_hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .context("failed to query transcript cache")?;

        let Some((source, romanized, translated)) = row else {
            return Ok(None);
        };
        Ok(Some(TranscriptSet {
            source: serde_json::from_str(&source).context("corrupt cached source tokens")?,
            romanized: serde_json::from_str(&romanized)
                .context("corrupt cached romanized tokens")?,
            translated: serde_json::from_str(&translated)
                .context("corrupt cached translated tokens")?,
        }))
    }

    pub fn put(&self, file_hash: &str, filename: &str, set: &TranscriptSet) -> Result<()> {
        self.connection
            .execute(
                "INSERT OR REPLACE INTO transcripts (file_hash, filename, source, romanized, translated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    file_hash,
                    filename,
                    serde_json::to_string(&set.source)?,
                    serde_json::to_string(&set.romanized)?,
                    serde_json::to_string(&set.translated)?,
                ],
            )
            .context("failed to store transcript set")?;
        Ok(())
    }

    /// Persist reviewer edits for one variant without touching the others.
    pub fn update(&self, file_hash: &str, mode: ConversionMode, tokens: &[Token]) -> Result<()> {
        let sql = format!(
            "UPDATE transcripts SET {} = ?1 WHERE file_hash = ?2",
            column_for(mode)
        );
        self.connection
            .execute(&sql, params![serde_json::to_string(tokens)?, file_hash])
            .context("failed to update transcript variant")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample_set() -> TranscriptSet {
        TranscriptSet {
            source: vec![Token::new("नमस्ते", 0.0, 0.5)],
            romanized: vec![Token::new("namaste", 0.0, 0.5)],
            translated: vec![Token::new("hello", 0.0, 0.5)],
        }
    }

    #[test]
    fn fingerprint_depends_on_bytes_not_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("first.mp4");
        let b = dir.path().join("second.mp4");
        std::fs::write(&a, b"same bytes").expect("write a");
        std::fs::write(&b, b"same bytes").expect("write b");

        assert_eq!(
            fingerprint_file(&a).expect("hash a"),
            fingerprint_file(&b).expect("hash b")
        );

        let mut file = std::fs::File::create(&b).expect("truncate b");
        file.write_all(b"different bytes").expect("rewrite b");
        drop(file);
        assert_ne!(
            fingerprint_file(&a).expect("hash a"),
            fingerprint_file(&b).expect("hash b")
        );
    }

    #[test]
    fn round_trip_preserves_all_variants() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TranscriptCache::open(&dir.path().join("captions.db")).expect("open cache");
        let set = sample_set();

        assert!(cache.get("abc123").expect("get").is_none());
        cache.put("abc123", "clip.mp4", &set).expect("put");
        let loaded = cache.get("abc123").expect("get").expect("hit");
        assert_eq!(loaded, set);
    }

    #[test]
    fn update_replaces_only_one_variant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TranscriptCache::open(&dir.path().join("captions.db")).expect("open cache");
        cache.put("abc123", "clip.mp4", &sample_set()).expect("put");

        let edited = vec![Token::new("namaskar", 0.0, 0.5)];
        cache
            .update("abc123", ConversionMode::Transliterate, &edited)
            .expect("update");

        let loaded = cache.get("abc123").expect("get").expect("hit");
        assert_eq!(loaded.romanized, edited);
        assert_eq!(loaded.source, sample_set().source);
        assert_eq!(loaded.translated, sample_set().translated);
    }

    #[test]
    fn put_overwrites_existing_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = TranscriptCache::open(&dir.path().join("captions.db")).expect("open cache");
        cache.put("abc123", "clip.mp4", &sample_set()).expect("put");

        let replacement = TranscriptSet::default();
        cache
            .put("abc123", "clip.mp4", &replacement)
            .expect("overwrite");
        let loaded = cache.get("abc123").expect("get").expect("hit");
        assert!(loaded.source.is_empty());
    }
}
