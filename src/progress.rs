use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Error, Result};

/// Per-encode frame counter. Lives for one encode call; reset by making a
/// new one. The reported fraction is monotonically non-decreasing and
/// clamped to 1.0 even when the decoder delivers a frame more than expected.
#[derive(Debug)]
pub struct ProgressTracker {
    frames_emitted: u64,
    frames_total: u64,
}

impl ProgressTracker {
    /// `frames_total = round(fps * duration)`, floored at 1 so the fraction
    /// is always well-defined.
    pub fn new(fps: f64, duration_seconds: f64) -> Self {
        Self::with_total((fps * duration_seconds).round() as u64)
    }

    pub fn with_total(frames_total: u64) -> Self {
        Self {
            frames_emitted: 0,
            frames_total: frames_total.max(1),
        }
    }

    /// Count one emitted frame and return the current fraction in `[0, 1]`.
    pub fn frame_emitted(&mut self) -> f32 {
        self.frames_emitted += 1;
        self.fraction()
    }

    pub fn fraction(&self) -> f32 {
        (self.frames_emitted as f64 / self.frames_total as f64).min(1.0) as f32
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total
    }
}

/// Shared abort flag. The frame-producing loops check it once per frame and
/// surface `Cancelled` immediately, without buffering further frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Distinct, non-retryable cancellation signal. Deliberately carries no
/// message payload; discover it in an anyhow chain via `was_cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render cancelled")
    }
}

impl std::error::Error for Cancelled {}

pub fn was_cancelled(error: &Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<Cancelled>().is_some())
}

/// Caller hooks for one render call: an optional per-frame progress callback
/// (hot path — must stay cheap) and an optional cancellation token.
#[derive(Default)]
pub struct RenderControl<'a> {
    progress: Option<Box<dyn FnMut(f32) + 'a>>,
    cancel: Option<CancelToken>,
}

impl<'a> RenderControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, callback: impl FnMut(f32) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Invoke once per emitted frame.
    pub fn report(&mut self, fraction: f32) {
        if let Some(callback) = self.progress.as_mut() {
            callback(fraction);
        }
    }

    /// Checked once per frame by every frame-producing loop.
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Cancelled.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_floored_at_one() {
        let tracker = ProgressTracker::new(30.0, 0.0);
        assert_eq!(tracker.frames_total(), 1);
    }

    #[test]
    fn full_run_reaches_exactly_one() {
        // 10 seconds at 30 fps = 300 frames.
        let mut tracker = ProgressTracker::new(30.0, 10.0);
        assert_eq!(tracker.frames_total(), 300);
        let mut last = 0.0f32;
        for _ in 0..300 {
            let fraction = tracker.frame_emitted();
            assert!(fraction >= last, "progress must be non-decreasing");
            last = fraction;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn fraction_is_clamped_past_total() {
        let mut tracker = ProgressTracker::with_total(2);
        tracker.frame_emitted();
        tracker.frame_emitted();
        assert_eq!(tracker.frame_emitted(), 1.0);
    }

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelled_error_is_discoverable_in_chain() {
        let control = RenderControl::new().with_cancel_token({
            let token = CancelToken::new();
            token.cancel();
            token
        });
        let error = control
            .ensure_not_cancelled()
            .expect_err("cancelled token should error");
        assert!(was_cancelled(&error));

        let plain = anyhow::anyhow!("some other failure");
        assert!(!was_cancelled(&plain));
    }

    #[test]
    fn control_without_token_never_cancels() {
        let control = RenderControl::new();
        control
            .ensure_not_cancelled()
            .expect("no token means no cancellation");
    }

    #[test]
    fn progress_callback_sees_each_frame() {
        let mut seen = Vec::new();
        {
            let mut control = RenderControl::new().with_progress(|f| seen.push(f));
            let mut tracker = ProgressTracker::with_total(4);
            for _ in 0..4 {
                let fraction = tracker.frame_emitted();
                control.report(fraction);
            }
        }
        assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
    }
}
