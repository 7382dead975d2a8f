use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};

/// Shared audio track muxed over the encoded video, optionally trimmed to an
/// absolute `[start, end]` window before attachment.
#[derive(Debug, Clone)]
pub struct AudioSource {
    pub path: PathBuf,
    pub trim: Option<(f64, f64)>,
}

impl AudioSource {
    pub fn whole(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            trim: None,
        }
    }

    pub fn trimmed(path: &Path, start: f64, end: f64) -> Self {
        Self {
            path: path.to_path_buf(),
            trim: Some((start, end)),
        }
    }
}

/// Output geometry, rate, and the audio to attach once over the whole
/// encoded stream.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub audio: Option<AudioSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegMode {
    Auto,
    System,
    Sidecar,
}

/// Raw-RGBA-in, H.264/AAC-out encoder over an ffmpeg child process.
///
/// Frames are written to a temporary sibling of the output path; only a
/// successful `finish` renames it into place, so a failed or abandoned
/// render never leaves a partial file at the final location.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    temp_path: PathBuf,
    output_path: PathBuf,
}

trait VideoEncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()>;
}

struct SystemFfmpegBackend {
    settings: EncodeSettings,
    container: &'static str,
    temp_path: PathBuf,
}

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend {
    settings: EncodeSettings,
    container: &'static str,
    temp_path: PathBuf,
}

impl FfmpegPipe {
    pub fn spawn(settings: &EncodeSettings, output_path: &Path) -> Result<Self> {
        Self::spawn_with_mode(settings, output_path, FfmpegMode::Auto)
    }

    pub fn spawn_with_mode(
        settings: &EncodeSettings,
        output_path: &Path,
        mode: FfmpegMode,
    ) -> Result<Self> {
        let container = container_format(output_path);
        let temp_path = temp_output_path(output_path);
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let backend = select_backend(mode, settings.clone(), container, temp_path.clone())?;
        let worker_name = format!("burnin-ffmpeg-encoder-{}", backend.mode_label());

        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || backend.run(receiver))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            temp_path,
            output_path: output_path.to_path_buf(),
        })
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("failed to enqueue frame for ffmpeg"))
    }

    /// Close the stream, wait for ffmpeg, and move the finished file into
    /// place. The temp file is cleaned up on every failure path.
    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("ffmpeg worker thread panicked")),
        }

        fs::rename(&self.temp_path, &self.output_path).with_context(|| {
            format!(
                "failed to move encoded output into place at {}",
                self.output_path.display()
            )
        })
    }
}

impl Drop for FfmpegPipe {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        if self.temp_path.exists() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

fn select_backend(
    mode: FfmpegMode,
    settings: EncodeSettings,
    container: &'static str,
    temp_path: PathBuf,
) -> Result<Box<dyn VideoEncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend {
            settings,
            container,
            temp_path,
        })),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend {
                    settings,
                    container,
                    temp_path,
                }))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                Err(anyhow!(
                    "ffmpeg sidecar mode requested but burnin was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                ))
            }
        }
    }
}

impl VideoEncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        run_ffmpeg_process(
            Path::new("ffmpeg"),
            receiver,
            &self.settings,
            self.container,
            &self.temp_path,
            self.mode_label(),
        )
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl VideoEncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        run_ffmpeg_process(
            &path,
            receiver,
            &self.settings,
            self.container,
            &self.temp_path,
            self.mode_label(),
        )
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    settings: &EncodeSettings,
    container: &'static str,
    temp_path: &Path,
    mode_label: &str,
) -> Result<()> {
    // Basic sanity check on output path
    let path_str = temp_path.to_string_lossy();
    if path_str.len() > 1024 {
        bail!("Output path is suspiciously long");
    }
    if path_str.chars().any(|c| c.is_control()) {
        bail!("Output path contains invalid control characters");
    }

    let args = ffmpeg_args(settings, container, temp_path);
    let mut command = Command::new(ffmpeg_path);
    command
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}, args='{}'): {error}",
                    ffmpeg_path.display(),
                    args.join(" ")
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (mode={mode_label}, resolved_path={}, args='{}', stderr_tail='{}')",
            ffmpeg_path.display(),
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

fn ffmpeg_args(settings: &EncodeSettings, container: &'static str, temp_path: &Path) -> Vec<String> {
    let size = format!("{}x{}", settings.width, settings.height);
    let mut args = ffmpeg_rawvideo_input_args(&size, settings.fps);
    if let Some(audio) = &settings.audio {
        args.extend(ffmpeg_audio_input_args(audio));
    }
    args.extend(ffmpeg_h264_output_args(settings.audio.is_some()));
    args.push("-f".to_owned());
    args.push(container.to_owned());
    args.push(temp_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: f64) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        format!("{fps}"),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

pub fn ffmpeg_audio_input_args(audio: &AudioSource) -> Vec<String> {
    let mut args = Vec::new();
    if let Some((start, end)) = audio.trim {
        args.push("-ss".to_owned());
        args.push(format!("{start}"));
        args.push("-to".to_owned());
        args.push(format!("{end}"));
    }
    args.push("-i".to_owned());
    args.push(audio.path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_h264_output_args(has_audio: bool) -> Vec<String> {
    let mut args = vec![
        "-map".to_owned(),
        "0:v".to_owned(),
    ];
    if has_audio {
        // `?` keeps sources without an audio stream from failing the mux.
        args.push("-map".to_owned());
        args.push("1:a?".to_owned());
    }
    args.extend(
        [
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-shortest",
            "-movflags",
            "+faststart",
        ]
        .iter()
        .map(|s| (*s).to_owned()),
    );
    args
}

fn container_format(output_path: &Path) -> &'static str {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "mov" => "mov",
        "mkv" => "matroska",
        _ => "mp4",
    }
}

fn temp_output_path(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    name.push_str(".partial");
    output_path.with_file_name(name)
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}
