//! Host-side frame scheduling for animated filters.
//!
//! A [`FramePacer`] decides when the next frame is due, a [`TimeSource`] says
//! what timestamp that frame represents, and [`run_frames`] glues them into a
//! loop that keeps calling back until the callback asks to stop or the
//! [`CancellationToken`] is tripped. The token is checked before every
//! reschedule, so a stop never interrupts a frame in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Refresh rate assumed when the caller does not pick one.
pub const DEFAULT_REFRESH_HZ: f32 = 60.0;

const PACING_SLACK: Duration = Duration::from_micros(250);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("frame rate must be a finite number, got {0}")]
    InvalidFps(f32),
}

/// Shared stop flag. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// How often frames should be produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePacing {
    /// Render as fast as the callback allows.
    Uncapped,
    /// Render at most `fps` frames per second.
    Capped { fps: f32 },
}

impl FramePacing {
    /// Maps an optional fps request: `None` follows [`DEFAULT_REFRESH_HZ`],
    /// zero or negative values disable the cap.
    pub fn from_fps(fps: Option<f32>) -> Result<Self, SchedulerError> {
        match fps {
            None => Ok(FramePacing::Capped {
                fps: DEFAULT_REFRESH_HZ,
            }),
            Some(value) if !value.is_finite() => Err(SchedulerError::InvalidFps(value)),
            Some(value) if value <= 0.0 => Ok(FramePacing::Uncapped),
            Some(value) => Ok(FramePacing::Capped { fps: value }),
        }
    }

    fn interval(self) -> Option<Duration> {
        match self {
            FramePacing::Uncapped => None,
            FramePacing::Capped { fps } => Some(Duration::from_secs_f32(1.0 / fps)),
        }
    }
}

impl Default for FramePacing {
    fn default() -> Self {
        FramePacing::Capped {
            fps: DEFAULT_REFRESH_HZ,
        }
    }
}

/// Accumulates elapsed time and releases a frame once a full interval has
/// passed, carrying the remainder so the average rate holds under jitter.
#[derive(Debug)]
pub struct FramePacer {
    target_interval: Option<Duration>,
    accumulator: Duration,
    last_tick: Option<Instant>,
}

impl FramePacer {
    pub fn new(pacing: FramePacing) -> Self {
        Self {
            target_interval: pacing.interval(),
            accumulator: Duration::ZERO,
            last_tick: None,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.accumulator = Duration::ZERO;
        self.last_tick = Some(now);
    }

    pub fn should_render(&mut self, now: Instant) -> bool {
        match (self.target_interval, self.last_tick) {
            (Some(interval), Some(last)) => {
                let delta = now.saturating_duration_since(last);
                self.last_tick = Some(now);
                self.accumulator = self.accumulator.saturating_add(delta);
                if self.accumulator + PACING_SLACK < interval {
                    false
                } else {
                    self.accumulator = self.accumulator.saturating_sub(interval);
                    true
                }
            }
            (Some(_), None) | (None, _) => {
                self.last_tick = Some(now);
                true
            }
        }
    }

    /// Time left before the next frame is due, as of the last `should_render`.
    pub fn until_next(&self) -> Duration {
        match self.target_interval {
            Some(interval) => interval.saturating_sub(self.accumulator + PACING_SLACK),
            None => Duration::ZERO,
        }
    }
}

/// Snapshot of the time state handed to a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds since the animation started.
    pub seconds: f64,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f64, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where frame timestamps originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.origin.elapsed().as_secs_f64(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Deterministic source that advances by a fixed step per frame. Used for
/// offline rendering where wall-clock time is irrelevant.
#[derive(Debug, Clone, Copy)]
pub struct FixedStepTimeSource {
    step: f64,
    frame: u64,
}

impl FixedStepTimeSource {
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.as_secs_f64(),
            frame: 0,
        }
    }

    pub fn from_fps(fps: f32) -> Self {
        let step = if fps > 0.0 {
            Duration::from_secs_f32(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Self::new(step)
    }
}

impl TimeSource for FixedStepTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.step * self.frame as f64, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// What a frame callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    Stop,
}

/// Drives `on_frame` until it returns [`FrameControl::Stop`], returns an
/// error, or `token` is cancelled. Returns the number of frames rendered.
pub fn run_frames<T, F, E>(
    token: &CancellationToken,
    pacing: FramePacing,
    time_source: &mut T,
    mut on_frame: F,
) -> Result<u64, E>
where
    T: TimeSource + ?Sized,
    F: FnMut(TimeSample) -> Result<FrameControl, E>,
{
    let mut pacer = FramePacer::new(pacing);
    let mut frames = 0u64;
    time_source.reset();

    while !token.is_cancelled() {
        let now = Instant::now();
        if !pacer.should_render(now) {
            thread::sleep(pacer.until_next());
            continue;
        }

        let sample = time_source.sample();
        let control = on_frame(sample)?;
        frames += 1;
        if control == FrameControl::Stop {
            tracing::debug!(frames, "frame callback requested stop");
            return Ok(frames);
        }

        if matches!(pacing, FramePacing::Uncapped) {
            thread::yield_now();
        }
    }

    tracing::debug!(frames, "frame loop cancelled");
    Ok(frames)
}
