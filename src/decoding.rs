use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

/// Geometry and timing of a media file, probed up front so frame loops know
/// their dimensions and `frames_total` before the first frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe a video source. Unreadable or zero-duration sources are fatal for
/// the render that needed them.
pub fn probe_media(path: &Path) -> Result<MediaInfo> {
    let probe = run_ffprobe(path, true)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| anyhow!("no video stream in {}", path.display()))?;

    let width = stream
        .width
        .ok_or_else(|| anyhow!("missing width for {}", path.display()))?;
    let height = stream
        .height
        .ok_or_else(|| anyhow!("missing height for {}", path.display()))?;
    let fps = stream
        .r_frame_rate
        .as_deref()
        .map(parse_rational)
        .transpose()?
        .ok_or_else(|| anyhow!("missing frame rate for {}", path.display()))?;
    let duration = parse_duration(&probe, path)?;

    if width == 0 || height == 0 {
        bail!("zero-sized video stream in {}", path.display());
    }
    if fps <= 0.0 {
        bail!("non-positive frame rate in {}", path.display());
    }

    Ok(MediaInfo {
        width,
        height,
        fps,
        duration,
    })
}

/// Probe just the container duration; works for audio-only files.
pub fn probe_duration(path: &Path) -> Result<f64> {
    let probe = run_ffprobe(path, false)?;
    parse_duration(&probe, path)
}

fn run_ffprobe(path: &Path, video_stream: bool) -> Result<ProbeOutput> {
    let mut command = Command::new("ffprobe");
    command.arg("-v").arg("error");
    if video_stream {
        command
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height,r_frame_rate:format=duration");
    } else {
        command.arg("-show_entries").arg("format=duration");
    }
    command.arg("-of").arg("json").arg(path);

    let output = command
        .output()
        .with_context(|| format!("failed to run ffprobe on {}", path.display()))?;
    if !output.status.success() {
        bail!(
            "ffprobe failed on {} with status {}: {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    serde_json::from_slice(&output.stdout)
        .with_context(|| format!("failed to parse ffprobe output for {}", path.display()))
}

fn parse_duration(probe: &ProbeOutput, path: &Path) -> Result<f64> {
    let duration = probe
        .format
        .duration
        .as_deref()
        .ok_or_else(|| anyhow!("no duration reported for {}", path.display()))?
        .parse::<f64>()
        .with_context(|| format!("unparsable duration for {}", path.display()))?;
    if duration <= 0.0 {
        bail!("zero-duration source {}", path.display());
    }
    Ok(duration)
}

fn parse_rational(raw: &str) -> Result<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num
                .parse()
                .with_context(|| format!("bad frame rate '{raw}'"))?;
            let den: f64 = den
                .parse()
                .with_context(|| format!("bad frame rate '{raw}'"))?;
            if den == 0.0 {
                bail!("zero denominator in frame rate '{raw}'");
            }
            Ok(num / den)
        }
        None => raw
            .parse()
            .with_context(|| format!("bad frame rate '{raw}'")),
    }
}

/// Streaming raw-RGBA frame source backed by an ffmpeg child process and a
/// reader thread. Frames arrive scaled to the requested geometry and, when
/// `fps` is given, resampled to the requested rate, so downstream loops can
/// count frames instead of seconds.
pub struct FfmpegInput {
    receiver: mpsc::Receiver<Vec<u8>>,
    worker: Option<JoinHandle<Result<()>>>,
    child: Child,
}

impl FfmpegInput {
    pub fn spawn(input_path: &Path, width: u32, height: u32, fps: Option<f64>) -> Result<Self> {
        let size = format!("{}x{}", width, height);
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let input_path = input_path.to_path_buf();

        let mut command = Command::new("ffmpeg");
        command
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&input_path)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("-s")
            .arg(size)
            .arg("-sws_flags")
            .arg("area");
        if let Some(fps) = fps {
            command.arg("-r").arg(format!("{fps}"));
        }
        let mut child = command
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn ffmpeg decoder for {}", input_path.display()))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;
        let frame_size = (width * height * 4) as usize;

        let worker = thread::Builder::new()
            .name("burnin-ffmpeg-decoder".to_owned())
            .spawn(move || {
                loop {
                    let mut buffer = vec![0u8; frame_size];
                    match stdout.read_exact(&mut buffer) {
                        Ok(_) => {
                            if sender.send(buffer).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                        Err(e) => return Err(anyhow!("failed to read from ffmpeg: {e}")),
                    }
                }
                Ok(())
            })
            .context("failed to spawn ffmpeg reader thread")?;

        Ok(Self {
            receiver,
            worker: Some(worker),
            child,
        })
    }

    /// Next decoded frame, or None at end of stream.
    pub fn read_frame(&self) -> Option<Vec<u8>> {
        self.receiver.recv().ok()
    }

    pub fn finish(mut self) -> Result<()> {
        let _ = self.child.kill();
        let _ = self.child.wait();

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("ffmpeg reader thread panicked")),
            }
        } else {
            Ok(())
        }
    }
}

/// Renders run repeatedly in a long-lived host process; a decoder abandoned
/// on an early abort must not leave its child running.
impl Drop for FfmpegInput {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_frame_rates_parse() {
        assert!((parse_rational("30/1").unwrap() - 30.0).abs() < 1e-9);
        assert!((parse_rational("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_rational("24").unwrap() - 24.0).abs() < 1e-9);
        assert!(parse_rational("30/0").is_err());
        assert!(parse_rational("abc").is_err());
    }

    #[test]
    fn probe_output_json_shape_parses() {
        let raw = r#"{
            "streams": [{"width": 1920, "height": 1080, "r_frame_rate": "30/1"}],
            "format": {"duration": "12.5"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(raw).expect("probe json should parse");
        assert_eq!(probe.streams[0].width, Some(1920));
        assert_eq!(probe.format.duration.as_deref(), Some("12.5"));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let probe: ProbeOutput = serde_json::from_str(
            r#"{"streams": [], "format": {"duration": "0.0"}}"#,
        )
        .expect("probe json should parse");
        assert!(parse_duration(&probe, Path::new("clip.mp4")).is_err());
    }
}
