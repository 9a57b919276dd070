use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{DownloadOutcome, DownloadPhase, ProgressEvent};

/// Receives progress from a running download.
///
/// Implementations may be called from any thread; UI state must be updated
/// through a channel or other thread-safe handoff.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent, fraction: Option<f32>);

    fn on_phase(&self, _phase: DownloadPhase) {}
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Phase(DownloadPhase),
    Progress {
        event: ProgressEvent,
        fraction: Option<f32>,
    },
    Completed(DownloadOutcome),
}

/// Forwards everything into a channel the UI drains.
pub struct ChannelSink(pub UnboundedSender<DownloadEvent>);

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: ProgressEvent, fraction: Option<f32>) {
        let _ = self.0.send(DownloadEvent::Progress { event, fraction });
    }

    fn on_phase(&self, phase: DownloadPhase) {
        let _ = self.0.send(DownloadEvent::Phase(phase));
    }
}

/// Compute the completion ratio and hand the event to the sink.
///
/// Never panics: a failing sink only pauses the progress display.
pub(crate) fn forward_progress(
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
    event: ProgressEvent,
) {
    if cancel.is_cancelled() {
        return;
    }
    let delivered = catch_unwind(AssertUnwindSafe(|| {
        let fraction = event.fraction();
        sink.on_progress(event, fraction);
    }));
    if delivered.is_err() {
        debug!("progress sink panicked; event dropped");
    }
}

/// Drives the per-request state machine and reports transitions.
pub(crate) struct PhaseTracker<'a> {
    phase: DownloadPhase,
    sink: &'a dyn ProgressSink,
}

impl<'a> PhaseTracker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            phase: DownloadPhase::Idle,
            sink,
        }
    }

    pub(crate) fn phase(&self) -> DownloadPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: DownloadPhase) {
        if !self.phase.can_advance_to(next) {
            debug!(from = ?self.phase, to = ?next, "ignoring invalid phase transition");
            return;
        }
        debug!(from = ?self.phase, to = ?next, "phase");
        self.phase = next;

        let sink = self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.on_phase(next))).is_err() {
            debug!("progress sink panicked on phase change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fractions: Mutex<Vec<Option<f32>>>,
        phases: Mutex<Vec<DownloadPhase>>,
    }

    impl ProgressSink for Recorder {
        fn on_progress(&self, _event: ProgressEvent, fraction: Option<f32>) {
            self.fractions.lock().unwrap().push(fraction);
        }

        fn on_phase(&self, phase: DownloadPhase) {
            self.phases.lock().unwrap().push(phase);
        }
    }

    struct Exploding;

    impl ProgressSink for Exploding {
        fn on_progress(&self, _event: ProgressEvent, _fraction: Option<f32>) {
            panic!("display went away");
        }

        fn on_phase(&self, _phase: DownloadPhase) {
            panic!("display went away");
        }
    }

    #[test]
    fn test_forward_computes_fraction() {
        let sink = Recorder::default();
        let cancel = CancellationToken::new();
        forward_progress(&sink, &cancel, ProgressEvent::downloading(Some(1), Some(4)));
        forward_progress(&sink, &cancel, ProgressEvent::downloading(Some(1), None));
        assert_eq!(*sink.fractions.lock().unwrap(), vec![Some(0.25), None]);
    }

    #[test]
    fn test_forward_stops_after_cancel() {
        let sink = Recorder::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        forward_progress(&sink, &cancel, ProgressEvent::finished());
        assert!(sink.fractions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_sink_is_swallowed() {
        let cancel = CancellationToken::new();
        forward_progress(&Exploding, &cancel, ProgressEvent::finished());

        let mut tracker = PhaseTracker::new(&Exploding);
        tracker.advance(DownloadPhase::Validating);
        assert_eq!(tracker.phase(), DownloadPhase::Validating);
    }

    #[test]
    fn test_tracker_rejects_reentry() {
        let sink = Recorder::default();
        let mut tracker = PhaseTracker::new(&sink);
        tracker.advance(DownloadPhase::Validating);
        tracker.advance(DownloadPhase::Fetching);
        tracker.advance(DownloadPhase::Failed);
        tracker.advance(DownloadPhase::Done);
        tracker.advance(DownloadPhase::Validating);

        assert_eq!(tracker.phase(), DownloadPhase::Failed);
        assert_eq!(
            *sink.phases.lock().unwrap(),
            vec![
                DownloadPhase::Validating,
                DownloadPhase::Fetching,
                DownloadPhase::Failed
            ]
        );
    }
}
