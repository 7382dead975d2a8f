use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Recognizer timestamps arrive as 100-nanosecond ticks.
pub const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// One recognized spoken word with its time interval, in seconds.
///
/// Tokens are caller-owned input: possibly unsorted, possibly overlapping,
/// never mutated during a render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl Token {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Convert a recognizer offset/duration pair from ticks at the boundary.
    pub fn from_ticks(word: impl Into<String>, offset_ticks: u64, duration_ticks: u64) -> Self {
        let start = offset_ticks as f64 / TICKS_PER_SECOND;
        let end = (offset_ticks + duration_ticks) as f64 / TICKS_PER_SECOND;
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Active-interval containment: `start <= t < end`.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start.is_finite() || !self.end.is_finite() {
            bail!("token '{}' has a non-finite timestamp", self.word);
        }
        if self.start < 0.0 {
            bail!(
                "token '{}' starts before zero ({:.3}s)",
                self.word,
                self.start
            );
        }
        if self.start > self.end {
            bail!(
                "token '{}' has start {:.3}s after end {:.3}s",
                self.word,
                self.start,
                self.end
            );
        }
        Ok(())
    }
}

/// Where the caption band sits on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionAnchor {
    /// Band starts just below the vertical midline. The caption-burn mode.
    CenterBand,
    /// Band anchored at 80% of frame height. The assembly mode.
    BottomBand,
}

impl CaptionAnchor {
    pub fn band_top(self, frame_height: u32) -> u32 {
        match self {
            Self::CenterBand => frame_height / 2 + 20,
            Self::BottomBand => (f64::from(frame_height) * 0.80) as u32,
        }
    }
}

/// Caption layout policy. Geometry only; glyph work lives in `captions`.
#[derive(Debug, Clone, Copy)]
pub struct CaptionStyle {
    pub anchor: CaptionAnchor,
    /// Floor for legibility on narrow outputs.
    pub min_font_size: f32,
    /// Font size = frame_width / size_divisor, floored at min_font_size.
    pub size_divisor: u32,
    pub pad_y: u32,
    pub shadow_offset: i32,
    pub band_color: [u8; 4],
    pub shadow_color: [u8; 4],
    pub fill_color: [u8; 4],
}

impl CaptionStyle {
    pub fn for_anchor(anchor: CaptionAnchor) -> Self {
        match anchor {
            CaptionAnchor::CenterBand => Self {
                anchor,
                min_font_size: 40.0,
                size_divisor: 12,
                pad_y: 20,
                shadow_offset: 3,
                band_color: [0, 0, 0, 180],
                shadow_color: [0, 0, 0, 200],
                fill_color: [255, 230, 0, 255],
            },
            CaptionAnchor::BottomBand => Self {
                anchor,
                min_font_size: 32.0,
                size_divisor: 12,
                pad_y: 16,
                shadow_offset: 2,
                band_color: [0, 0, 0, 180],
                shadow_color: [0, 0, 0, 200],
                fill_color: [255, 230, 0, 255],
            },
        }
    }

    pub fn font_size(&self, frame_width: u32) -> f32 {
        ((frame_width / self.size_divisor) as f32).max(self.min_font_size)
    }
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self::for_anchor(CaptionAnchor::CenterBand)
    }
}

fn default_fps() -> u32 {
    30
}

/// One named entry of the output timeline and the clip that fills it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentSource {
    /// Canonical name, located in the transcript to find the cut point.
    pub name: String,
    pub clip: PathBuf,
}

/// Assembly manifest: ordered segment names with clips, the alias table that
/// folds recognizer spellings onto canonical names, and the shared narration
/// audio the cut points are discovered in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblyManifest {
    pub segments: Vec<SegmentSource>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    pub audio: PathBuf,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Usable audio span in seconds. Probed from the audio file when absent.
    #[serde(default)]
    pub total_duration: Option<f64>,
}

impl AssemblyManifest {
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            bail!("assembly manifest must define at least one segment");
        }
        if self.fps == 0 {
            bail!("assembly manifest fps must be greater than zero");
        }
        if let Some(total) = self.total_duration {
            if !total.is_finite() || total <= 0.0 {
                bail!("assembly manifest total_duration must be positive, got {total}");
            }
        }
        Ok(())
    }

    pub fn ordered_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect()
    }
}
