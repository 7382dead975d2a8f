use anyhow::{bail, Result};

use crate::schema::Token;

/// How a transcript's words get rewritten for captioning. Resolved once at
/// call entry; each variant carries its fixed instruction template as data.
/// The network call that consumes the template lives outside this crate —
/// this module only owns the templates and the alignment of results back
/// onto the original timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Keep the recognized words as-is.
    Identity,
    /// Devanagari to casual Roman-script rendering, word for word.
    Transliterate,
    /// Devanagari to an English equivalent, word for word.
    Translate,
}

/// Conversions are requested in fixed-size slices so one malformed reply
/// can only misalign a bounded window of the transcript.
pub const CONVERSION_BATCH_SIZE: usize = 50;

impl ConversionMode {
    /// Instruction template for the external converter. `None` means no call
    /// is needed at all.
    pub fn instruction(self) -> Option<&'static str> {
        match self {
            Self::Identity => None,
            Self::Transliterate => Some(
                "You are a Hinglish transliterator. Convert each Hindi word from Devanagari \
                 to natural Roman script Hinglish (the way people type Hindi casually on \
                 WhatsApp). Keep English words as-is. \
                 Return JSON as {\"words\": [...]} with one string per input word, in order.",
            ),
            Self::Translate => Some(
                "You are a translator. Translate each Hindi word from Devanagari to its \
                 English equivalent. For single words, give the best single English word or \
                 short phrase. \
                 Return JSON as {\"words\": [...]} with one string per input word, in order.",
            ),
        }
    }
}

/// What to do when a conversion batch comes back shorter than its input.
/// Padding keeps the timeline length intact at the cost of mixing scripts in
/// one caption stream; failing surfaces the short batch to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortBatchPolicy {
    #[default]
    PadWithOriginal,
    Fail,
}

/// Re-attach converted words to the original timing. Output length always
/// equals input length: short results are padded per `policy`, overlong
/// results are truncated. The timeline is never silently shortened.
pub fn merge_converted(
    original: &[Token],
    converted: Vec<String>,
    policy: ShortBatchPolicy,
) -> Result<Vec<Token>> {
    if converted.len() < original.len() {
        match policy {
            ShortBatchPolicy::Fail => bail!(
                "conversion returned {} words for {} inputs",
                converted.len(),
                original.len()
            ),
            ShortBatchPolicy::PadWithOriginal => {}
        }
    }

    let mut words = converted;
    while words.len() < original.len() {
        words.push(original[words.len()].word.clone());
    }
    words.truncate(original.len());

    Ok(original
        .iter()
        .zip(words)
        .map(|(token, word)| Token::new(word, token.start, token.end))
        .collect())
}

/// Chunk a token list into conversion batches of at most
/// `CONVERSION_BATCH_SIZE` words each.
pub fn conversion_batches(tokens: &[Token]) -> impl Iterator<Item = Vec<&str>> {
    tokens.chunks(CONVERSION_BATCH_SIZE).map(|chunk| {
        chunk
            .iter()
            .map(|token| token.word.as_str())
            .collect::<Vec<_>>()
    })
}
