use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::boundaries::{detect_boundaries, AliasTable, BoundaryMap};
use crate::captions::CaptionPainter;
use crate::decoding::{probe_duration, probe_media, FfmpegInput};
use crate::encoding::{AudioSource, EncodeSettings, FfmpegPipe};
use crate::fonts::FontLibrary;
use crate::progress::{ProgressTracker, RenderControl};
use crate::schema::{AssemblyManifest, CaptionAnchor, CaptionStyle, Token};
use crate::tokens::TokenIndex;

/// Extra loop repetitions past the computed minimum, so a clip never
/// underruns its segment even at the trim edge.
pub const LOOP_SAFETY_REPEATS: u32 = 2;

/// One resolved span of the output timeline. Derived from the boundary map,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    /// Tokens whose start falls inside `[start, end)`, at absolute times.
    pub tokens: Vec<Token>,
}

/// Pair each resolved boundary with the next resolved boundary (or the
/// terminal entry), in requested-name order. Unresolved names are skipped;
/// non-positive durations are dropped with a warning, not fatally.
pub fn plan_segments(names: &[&str], map: &BoundaryMap, tokens: &[Token]) -> Vec<SegmentPlan> {
    let index = TokenIndex::new(tokens.to_vec());
    let mut plans = Vec::new();
    for (position, name) in names.iter().enumerate() {
        let Some(start) = map.start_of(name) else {
            continue;
        };
        let end = names[position + 1..]
            .iter()
            .find_map(|next| map.start_of(next))
            .unwrap_or_else(|| map.terminal());
        let duration = end - start;
        if duration <= 0.0 {
            eprintln!(
                "WARNING dropping segment '{}': non-positive duration {:.3}s",
                name, duration
            );
            continue;
        }
        plans.push(SegmentPlan {
            name: (*name).to_owned(),
            start,
            end,
            duration,
            tokens: index.in_range(start, end),
        });
    }
    plans
}

/// How many end-to-end repetitions of a clip cover a segment before the trim.
pub fn loop_repeats(segment_duration: f64, clip_duration: f64) -> u32 {
    (segment_duration / clip_duration).floor() as u32 + LOOP_SAFETY_REPEATS
}

/// Everything one segment's frame loop needs, computed up front. Replaces
/// ad-hoc closures capturing segment state: the frame function below is pure
/// in this context plus a frame index.
#[derive(Debug)]
struct SegmentContext {
    name: String,
    start: f64,
    end: f64,
    duration: f64,
    clip: PathBuf,
    /// Exact trim: the segment emits precisely this many frames.
    frame_count: u64,
    /// Upper bound on clip opens; guards against a clip that decodes to
    /// nothing looping forever.
    max_opens: u32,
    /// Segment tokens shifted to intra-segment time.
    local_tokens: TokenIndex,
}

impl SegmentContext {
    fn from_plan(plan: SegmentPlan, clip: PathBuf, clip_duration: f64, fps: f64) -> Self {
        let local_tokens = TokenIndex::new(
            plan.tokens
                .iter()
                .map(|token| {
                    Token::new(
                        token.word.clone(),
                        token.start - plan.start,
                        token.end - plan.start,
                    )
                })
                .collect(),
        );
        Self {
            name: plan.name,
            start: plan.start,
            end: plan.end,
            duration: plan.duration,
            clip,
            frame_count: (plan.duration * fps).round() as u64,
            max_opens: loop_repeats(plan.duration, clip_duration) + 1,
            local_tokens,
        }
    }
}

/// Sequential frame source that re-opens its clip on EOF, up to `max_opens`.
struct LoopedClipReader {
    clip: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    current: Option<FfmpegInput>,
    opens: u32,
    max_opens: u32,
}

impl LoopedClipReader {
    fn new(clip: &Path, width: u32, height: u32, fps: f64, max_opens: u32) -> Self {
        Self {
            clip: clip.to_path_buf(),
            width,
            height,
            fps,
            current: None,
            opens: 0,
            max_opens,
        }
    }

    fn next_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            match &self.current {
                Some(reader) => {
                    if let Some(frame) = reader.read_frame() {
                        return Ok(frame);
                    }
                    // EOF: close this pass and loop back around.
                    if let Some(finished) = self.current.take() {
                        finished.finish()?;
                    }
                }
                None => {
                    if self.opens >= self.max_opens {
                        bail!(
                            "clip {} looped {} times without yielding enough frames",
                            self.clip.display(),
                            self.opens
                        );
                    }
                    self.current = Some(FfmpegInput::spawn(
                        &self.clip,
                        self.width,
                        self.height,
                        Some(self.fps),
                    )?);
                    self.opens += 1;
                }
            }
        }
    }

    fn close(mut self) -> Result<()> {
        match self.current.take() {
            Some(reader) => reader.finish(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssemblySummary {
    pub segments_rendered: usize,
    pub frames_emitted: u64,
}

/// Stitch the manifest's clips into one timeline cut by the transcript.
///
/// Diagnostics (detected vs missing names, per-segment timing) go to stderr;
/// they are part of the operation's contract, not optional logging.
pub fn assemble(
    manifest: &AssemblyManifest,
    tokens: &[Token],
    fonts_dir: Option<&Path>,
    output: &Path,
    control: &mut RenderControl,
) -> Result<AssemblySummary> {
    let total_duration = match manifest.total_duration {
        Some(total) => total,
        None => probe_duration(&manifest.audio)?,
    };

    let names = manifest.ordered_names();
    let aliases = AliasTable::new(manifest.aliases.clone());
    let (map, report) = detect_boundaries(&names, tokens, &aliases, total_duration);
    report.log();

    if map.resolved_count() == 0 {
        bail!("no segments detected in transcript; nothing to assemble");
    }

    let plans = plan_segments(&names, &map, tokens);
    let first_resolved_start = plans
        .first()
        .map(|plan| plan.start)
        .unwrap_or_else(|| map.terminal());

    // Fonts fail fast before any clip is opened.
    let fonts = FontLibrary::load(fonts_dir)?;
    let mut painter = CaptionPainter::new(fonts, CaptionStyle::for_anchor(CaptionAnchor::BottomBand));

    let fps = f64::from(manifest.fps);
    let mut geometry: Option<(u32, u32)> = None;
    let mut contexts = Vec::new();
    for plan in plans {
        let clip = manifest
            .segments
            .iter()
            .find(|segment| segment.name == plan.name)
            .map(|segment| segment.clip.clone())
            .with_context(|| format!("segment '{}' has no clip mapping", plan.name))?;

        // An unreadable or zero-duration clip kills this segment only.
        let info = match probe_media(&clip) {
            Ok(info) => info,
            Err(error) => {
                eprintln!("WARNING skipping segment '{}': {error:#}", plan.name);
                continue;
            }
        };

        // The first renderable clip fixes the output geometry; every later
        // clip is decoded scaled to it.
        geometry.get_or_insert((info.width, info.height));

        let context = SegmentContext::from_plan(plan, clip, info.duration, fps);
        if context.frame_count == 0 {
            eprintln!(
                "WARNING skipping segment '{}': shorter than one frame",
                context.name
            );
            continue;
        }
        contexts.push(context);
    }

    if contexts.is_empty() {
        bail!("no renderable segments; aborting instead of writing an empty file");
    }
    let Some((width, height)) = geometry else {
        bail!("no renderable segments; aborting instead of writing an empty file");
    };

    let frames_total: u64 = contexts.iter().map(|context| context.frame_count).sum();
    let mut tracker = ProgressTracker::with_total(frames_total);

    let settings = EncodeSettings {
        width,
        height,
        fps,
        audio: Some(AudioSource::trimmed(
            &manifest.audio,
            first_resolved_start,
            map.terminal(),
        )),
    };
    let encoder = FfmpegPipe::spawn(&settings, output)?;

    for context in &contexts {
        eprintln!(
            "  {}: {:.2}s -> {:.2}s ({:.1}s, {} frames)",
            context.name, context.start, context.end, context.duration, context.frame_count
        );

        let mut reader =
            LoopedClipReader::new(&context.clip, width, height, fps, context.max_opens);
        let rendered = render_segment(
            context,
            &mut reader,
            &mut painter,
            width,
            height,
            fps,
            &encoder,
            &mut tracker,
            control,
        );
        // The clip handle is released on success and failure alike.
        let closed = reader.close();
        rendered?;
        closed?;
    }

    let frames_emitted = tracker.frames_emitted();
    encoder.finish()?;

    Ok(AssemblySummary {
        segments_rendered: contexts.len(),
        frames_emitted,
    })
}

/// Emit one segment's frames. Pure in (context, frame index): the active
/// caption is looked up at intra-segment time, never via shared counters.
fn render_segment(
    context: &SegmentContext,
    reader: &mut LoopedClipReader,
    painter: &mut CaptionPainter,
    width: u32,
    height: u32,
    fps: f64,
    encoder: &FfmpegPipe,
    tracker: &mut ProgressTracker,
    control: &mut RenderControl,
) -> Result<()> {
    for frame_index in 0..context.frame_count {
        control.ensure_not_cancelled()?;
        let frame = reader
            .next_frame()
            .with_context(|| format!("while looping clip for segment '{}'", context.name))?;

        let t_local = frame_index as f64 / fps;
        let composed = match context.local_tokens.active_at(t_local) {
            Some(token) => painter.compose(&frame, width, height, &token.word),
            None => frame,
        };
        encoder.write_frame(composed)?;
        control.report(tracker.frame_emitted());
    }
    Ok(())
}
