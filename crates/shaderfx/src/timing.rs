use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Stages of a single filter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ModelBuild,
    ProgramCompile,
    TextureUpload,
    Draw,
    Readback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::ModelBuild => "model build",
            Phase::ProgramCompile => "program compile",
            Phase::TextureUpload => "texture upload",
            Phase::Draw => "draw",
            Phase::Readback => "readback",
        };
        f.write_str(label)
    }
}

/// Receives the wall time spent in each [`Phase`].
pub trait PhaseTimer {
    fn record(&mut self, phase: Phase, elapsed: Duration);
}

/// Emits one `debug` event per phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPhaseTimer;

impl PhaseTimer for TracingPhaseTimer {
    fn record(&mut self, phase: Phase, elapsed: Duration) {
        tracing::debug!(
            phase = %phase,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "filter phase finished"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPhaseTimer;

impl PhaseTimer for NoopPhaseTimer {
    fn record(&mut self, _phase: Phase, _elapsed: Duration) {}
}

/// Keeps every record in order, for callers that want to report totals.
#[derive(Debug, Default, Clone)]
pub struct PhaseTimings {
    records: Vec<(Phase, Duration)>,
}

impl PhaseTimings {
    pub fn records(&self) -> &[(Phase, Duration)] {
        &self.records
    }

    pub fn total(&self, phase: Phase) -> Duration {
        self.records
            .iter()
            .filter(|(recorded, _)| *recorded == phase)
            .map(|(_, elapsed)| *elapsed)
            .sum()
    }
}

impl PhaseTimer for PhaseTimings {
    fn record(&mut self, phase: Phase, elapsed: Duration) {
        self.records.push((phase, elapsed));
    }
}

/// Shared sink, so a caller can keep reading timings recorded by a pipeline
/// that owns the other handle.
impl<T: PhaseTimer> PhaseTimer for Arc<Mutex<T>> {
    fn record(&mut self, phase: Phase, elapsed: Duration) {
        if let Ok(mut inner) = self.lock() {
            inner.record(phase, elapsed);
        }
    }
}

/// Runs `work` and reports how long it took.
pub(crate) fn timed<T>(
    timer: &mut dyn PhaseTimer,
    phase: Phase,
    work: impl FnOnce() -> T,
) -> T {
    let started = Instant::now();
    let output = work();
    timer.record(phase, started.elapsed());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timings_accumulate_per_phase() {
        let mut timings = PhaseTimings::default();
        timings.record(Phase::Draw, Duration::from_millis(2));
        timings.record(Phase::Readback, Duration::from_millis(5));
        timings.record(Phase::Draw, Duration::from_millis(3));
        assert_eq!(timings.total(Phase::Draw), Duration::from_millis(5));
        assert_eq!(timings.records().len(), 3);
    }

    #[test]
    fn timed_reports_its_phase() {
        let mut timings = PhaseTimings::default();
        let value = timed(&mut timings, Phase::ModelBuild, || 7);
        assert_eq!(value, 7);
        assert_eq!(timings.records()[0].0, Phase::ModelBuild);
    }

    #[test]
    fn shared_sink_is_visible_to_both_handles() {
        let shared = Arc::new(Mutex::new(PhaseTimings::default()));
        let mut sink = Arc::clone(&shared);
        sink.record(Phase::Readback, Duration::from_millis(1));
        assert_eq!(shared.lock().unwrap().records().len(), 1);
    }
}
