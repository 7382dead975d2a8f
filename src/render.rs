use std::path::Path;

use anyhow::Result;

use crate::captions::CaptionPainter;
use crate::decoding::{probe_media, FfmpegInput, MediaInfo};
use crate::encoding::{AudioSource, EncodeSettings, FfmpegPipe};
use crate::fonts::FontLibrary;
use crate::progress::{ProgressTracker, RenderControl};
use crate::schema::{CaptionStyle, Token};
use crate::tokens::TokenIndex;
use crate::zoom;

/// Decode `video`, burn the active caption onto each frame, re-attach the
/// source audio, and write `output`. Frames with no active token pass
/// through byte-identical, so an empty token list is a plain re-encode with
/// the same frame count.
pub fn burn_captions(
    video: &Path,
    tokens: Vec<Token>,
    style: CaptionStyle,
    fonts_dir: Option<&Path>,
    output: &Path,
    control: &mut RenderControl,
) -> Result<MediaInfo> {
    let info = probe_media(video)?;
    // Missing fonts abort before any frame is decoded.
    let fonts = FontLibrary::load(fonts_dir)?;
    let mut painter = CaptionPainter::new(fonts, style);
    let index = TokenIndex::new(tokens);

    render_transformed(video, &info, output, control, |frame, t| {
        match index.active_at(t) {
            Some(token) => painter.compose(&frame, info.width, info.height, &token.word),
            None => frame,
        }
    })?;
    Ok(info)
}

/// Decode `video`, apply the alternating zoom to each frame, re-attach the
/// source audio, and write `output`.
pub fn apply_effects(
    video: &Path,
    output: &Path,
    control: &mut RenderControl,
) -> Result<MediaInfo> {
    let info = probe_media(video)?;
    render_transformed(video, &info, output, control, |frame, t| {
        zoom::apply_zoom(&frame, info.width, info.height, t)
    })?;
    Ok(info)
}

/// Shared single-source frame loop: pull-based, one frame decoded,
/// transformed, and encoded at a time, with per-frame progress and a
/// cancellation check on every iteration.
fn render_transformed(
    video: &Path,
    info: &MediaInfo,
    output: &Path,
    control: &mut RenderControl,
    mut transform: impl FnMut(Vec<u8>, f64) -> Vec<u8>,
) -> Result<()> {
    let decoder = FfmpegInput::spawn(video, info.width, info.height, None)?;
    let settings = EncodeSettings {
        width: info.width,
        height: info.height,
        fps: info.fps,
        audio: Some(AudioSource::whole(video)),
    };
    let encoder = FfmpegPipe::spawn(&settings, output)?;

    let mut tracker = ProgressTracker::new(info.fps, info.duration);
    let report_every = (info.fps.round() as u64).max(1);

    let mut frame_index: u64 = 0;
    while let Some(frame) = decoder.read_frame() {
        control.ensure_not_cancelled()?;
        let t = frame_index as f64 / info.fps;
        encoder.write_frame(transform(frame, t))?;
        control.report(tracker.frame_emitted());

        if frame_index % report_every == 0 {
            eprintln!(
                "rendered frame {}/{}",
                frame_index + 1,
                tracker.frames_total()
            );
        }
        frame_index += 1;
    }

    decoder.finish()?;
    encoder.finish()?;
    Ok(())
}
