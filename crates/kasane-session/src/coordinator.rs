//! The execution coordinator: one operation at a time against the
//! current source image, with results committed atomically from the
//! caller's perspective.
//!
//! [`Coordinator::run`] copies the source, spawns the worker, and
//! returns immediately. The caller's (interactive) thread then drains
//! [`SessionEvent`]s via [`poll_event`](Coordinator::poll_event) or
//! [`wait_event`](Coordinator::wait_event); the completion commit —
//! history recording, output installation — happens inside that drain,
//! never on the worker, so no torn state is ever observable.
//!
//! While a run is in flight every other mutation (a second run, undo,
//! redo, loads and clears) is rejected with
//! [`SessionError::OperationInFlight`].

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread::JoinHandle;

use kasane_ops::{CancelToken, Image, Operation, OperationError};

use crate::history::{History, HistoryError};
use crate::state::SessionState;
use crate::worker::{self, WorkerMessage};

/// Errors surfaced by coordinator entry points. Completion failures are
/// not errors here — they arrive as [`SessionEvent::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `run` was called with no source image loaded. No state change.
    #[error("no source image is loaded")]
    NoSourceImage,

    /// A mutation was attempted while a run is in flight.
    #[error("an operation is already in flight")]
    OperationInFlight,

    /// Undo/redo with an empty stack; handled locally by the caller.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Event drained on the interactive thread.
#[derive(Debug)]
pub enum SessionEvent {
    /// A progress milestone from the in-flight operation.
    Progress {
        /// Percentage in `[0, 100]`.
        percent: u8,
        /// Milestone message.
        message: String,
    },
    /// The run succeeded and its result is now the output.
    Completed {
        /// The new output label, `"Output (<operation name>)"`.
        label: String,
    },
    /// The run failed; output and history are untouched.
    Failed {
        /// Name of the failed operation.
        operation: &'static str,
        /// The underlying failure.
        error: OperationError,
    },
    /// The run was cancelled; output and history are untouched.
    Cancelled {
        /// Name of the cancelled operation.
        operation: &'static str,
    },
}

impl SessionEvent {
    /// Whether this event ends the in-flight run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Options for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// The run replays a redone operation: redo already adjusted the
    /// stacks, so completion skips history recording.
    pub replay_from_redo: bool,
}

struct InFlight {
    rx: Receiver<WorkerMessage>,
    handle: JoinHandle<()>,
    cancel: CancelToken,
    replay_from_redo: bool,
    operation_name: &'static str,
}

/// Session coordinator: owns the state slots, the history stacks, and at
/// most one background run. Construct one per application session and
/// thread it explicitly — there is no ambient instance.
#[derive(Default)]
pub struct Coordinator {
    state: SessionState,
    history: History,
    inflight: Option<InFlight>,
}

impl Coordinator {
    /// Fresh session: empty state, empty history, nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the image slots.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Read-only view of the history stacks.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Whether a run is currently in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.inflight.is_some()
    }

    /// Record where the output was saved (provenance only).
    pub fn mark_output_saved(&mut self, path: PathBuf) {
        self.state.mark_output_saved(path);
    }

    /// Install a new source image. Clears the output and both history
    /// stacks: the output history is tied to the lifetime of a given
    /// source.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OperationInFlight`] while a run is active.
    pub fn load_source(&mut self, image: Image, path: Option<PathBuf>) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.state.set_source(image, path);
        self.history.clear();
        log::info!("Source image loaded; output and history reset.");
        Ok(())
    }

    /// Clear the source image. The output goes with it; the history
    /// stacks are preserved (current behavior — see DESIGN.md).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OperationInFlight`] while a run is active.
    pub fn clear_source(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.state.clear_source();
        log::info!("Source image cleared. Output image also cleared.");
        Ok(())
    }

    /// Clear only the output image; history is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OperationInFlight`] while a run is active.
    pub fn clear_output(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.state.reset_output();
        log::info!("Output cleared. History preserved.");
        Ok(())
    }

    /// Explicitly empty both history stacks.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OperationInFlight`] while a run is active.
    pub fn clear_history(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.history.clear();
        Ok(())
    }

    /// Start an operation against a copy of the current source image.
    /// Returns as soon as the worker is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSourceImage`] when nothing is loaded,
    /// [`SessionError::OperationInFlight`] when a run is already active
    /// (concurrent execution is a precondition violation, not a queue),
    /// and [`SessionError::WorkerSpawn`] if the thread cannot start. In
    /// every case no state has changed.
    pub fn run(&mut self, operation: Operation) -> Result<(), SessionError> {
        self.run_with(operation, RunOptions::default())
    }

    /// [`run`](Self::run) with explicit options.
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run).
    pub fn run_with(
        &mut self,
        operation: Operation,
        options: RunOptions,
    ) -> Result<(), SessionError> {
        if self.inflight.is_some() {
            return Err(SessionError::OperationInFlight);
        }
        // Always a copy of the original source, regardless of the
        // operation's uses_original_source declaration.
        let source = self
            .state
            .source()
            .cloned()
            .ok_or(SessionError::NoSourceImage)?;

        let (tx, rx) = channel();
        let cancel = CancelToken::new();
        let operation_name = operation.name();
        let handle = worker::spawn(operation, source, tx, cancel.clone())?;
        self.inflight = Some(InFlight {
            rx,
            handle,
            cancel,
            replay_from_redo: options.replay_from_redo,
            operation_name,
        });
        log::info!("Operation '{operation_name}' started.");
        Ok(())
    }

    /// Request cancellation of the in-flight run, if any. The run winds
    /// down cooperatively; a [`SessionEvent::Cancelled`] arrives through
    /// the normal event drain.
    pub fn cancel(&mut self) {
        if let Some(inflight) = &self.inflight {
            inflight.cancel.cancel();
            log::info!("Cancellation requested for '{}'.", inflight.operation_name);
        }
    }

    /// Non-blocking drain of the next event from the in-flight run.
    /// Returns `None` when idle or when no message is pending.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        let message = match &self.inflight {
            Some(inflight) => match inflight.rx.try_recv() {
                Ok(message) => Some(message),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => None,
            },
            None => return None,
        };
        self.dispatch(message)
    }

    /// Blocking drain of the next event from the in-flight run. Returns
    /// `None` when idle.
    pub fn wait_event(&mut self) -> Option<SessionEvent> {
        let message = match &self.inflight {
            Some(inflight) => inflight.rx.recv().ok(),
            None => return None,
        };
        self.dispatch(message)
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.inflight.is_some() {
            return Err(SessionError::OperationInFlight);
        }
        Ok(())
    }

    /// Translate a worker message into a session event, committing the
    /// completion when the message is terminal. `None` means the worker
    /// died without delivering a result.
    fn dispatch(&mut self, message: Option<WorkerMessage>) -> Option<SessionEvent> {
        match message {
            Some(WorkerMessage::Progress(percent, message)) => {
                Some(SessionEvent::Progress { percent, message })
            }
            Some(WorkerMessage::Done { operation, result }) => {
                let inflight = self.inflight.take()?;
                let _ = inflight.handle.join();
                Some(self.complete(&operation, result, inflight.replay_from_redo))
            }
            None => {
                let inflight = self.inflight.take()?;
                let _ = inflight.handle.join();
                log::error!(
                    "Worker for '{}' terminated without a result.",
                    inflight.operation_name,
                );
                Some(SessionEvent::Failed {
                    operation: inflight.operation_name,
                    error: OperationError::Computation(
                        "worker terminated without a result".to_string(),
                    ),
                })
            }
        }
    }

    /// Commit a finished run. On success the pre-operation output state
    /// is recorded (unless this run replayed a redo) and the result
    /// installed; on failure or cancellation nothing changes.
    fn complete(
        &mut self,
        operation: &Operation,
        result: Result<Image, OperationError>,
        replay_from_redo: bool,
    ) -> SessionEvent {
        let name = operation.name();
        match result {
            Ok(image) => {
                if replay_from_redo {
                    log::info!("Operation '{name}' replayed from redo; history untouched.");
                } else {
                    self.history.record(self.state.output_snapshot());
                }
                let label = format!("Output ({name})");
                self.state.install_output(image, label.clone());
                log::info!("Operation '{name}' completed successfully.");
                SessionEvent::Completed { label }
            }
            Err(OperationError::Cancelled) => {
                log::info!("Operation '{name}' cancelled; output unchanged.");
                SessionEvent::Cancelled { operation: name }
            }
            Err(error) => {
                log::error!("Operation '{name}' failed: {error}");
                SessionEvent::Failed {
                    operation: name,
                    error,
                }
            }
        }
    }

    /// Restore the previous output state. Synchronous and fast: only
    /// already-materialized snapshots move between the stacks.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OperationInFlight`] while a run is active
    /// and [`HistoryError::NothingToUndo`] (wrapped) when the undo stack
    /// is empty; both leave everything unchanged.
    pub fn undo(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let restored = self.history.undo(self.state.output_snapshot())?;
        log::info!("Undo: restored '{}'.", restored.label);
        self.state.restore_output(restored);
        Ok(())
    }

    /// Mirror of [`undo`](Self::undo).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OperationInFlight`] while a run is active
    /// and [`HistoryError::NothingToRedo`] (wrapped) when the redo stack
    /// is empty; both leave everything unchanged.
    pub fn redo(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let restored = self.history.redo(self.state.output_snapshot())?;
        log::info!("Redo: restored '{}'.", restored.label);
        self.state.restore_output(restored);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use kasane_ops::OperationKind;
    use kasane_ops::chan_vese::ChanVeseParams;
    use kasane_ops::conversion::GrayscaleParams;
    use kasane_ops::edge::{EdgeDetectParams, EdgeFilterKind};

    use crate::state::DEFAULT_OUTPUT_LABEL;

    use super::*;

    fn rgb_source() -> Image {
        Image::Rgb(RgbImage::from_fn(12, 12, |x, y| {
            Rgb([
                u8::try_from(x * 20).unwrap_or(255),
                u8::try_from(y * 20).unwrap_or(255),
                80,
            ])
        }))
    }

    fn grayscale_op() -> Operation {
        Operation::new(OperationKind::Grayscale(GrayscaleParams::default()))
    }

    fn sobel_op() -> Operation {
        Operation::new(OperationKind::EdgeDetect(
            EdgeDetectParams::new(EdgeFilterKind::Sobel, None, 0.0).unwrap(),
        ))
    }

    /// A run slow enough that cancellation and re-entrancy checks land
    /// while it is still iterating.
    fn slow_op() -> Operation {
        Operation::new(OperationKind::ChanVese(
            ChanVeseParams::new(2000, 1e-6, 0.25, 1.0, 1.0, 0.5).unwrap(),
        ))
    }

    /// Drain every event until the run terminates.
    fn drain(coordinator: &mut Coordinator) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = coordinator.wait_event() {
            events.push(event);
        }
        events
    }

    fn run_to_completion(coordinator: &mut Coordinator, operation: Operation) {
        coordinator.run(operation).unwrap();
        let events = drain(coordinator);
        assert!(
            matches!(events.last(), Some(SessionEvent::Completed { .. })),
            "expected completion, got {:?}",
            events.last(),
        );
    }

    #[test]
    fn run_without_source_fails_immediately() {
        let mut coordinator = Coordinator::new();
        assert!(matches!(
            coordinator.run(grayscale_op()),
            Err(SessionError::NoSourceImage),
        ));
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn successful_run_installs_output_and_records_history() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        run_to_completion(&mut coordinator, grayscale_op());

        assert!(coordinator.state().output().is_some());
        assert_eq!(
            coordinator.state().output_label(),
            "Output (RGB to Grayscale)",
        );
        // The pre-operation "no output" state was recorded.
        assert_eq!(coordinator.history().undo_depth(), 1);
        assert_eq!(coordinator.history().redo_depth(), 0);
    }

    #[test]
    fn progress_events_precede_completion() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        coordinator.run(grayscale_op()).unwrap();
        let events = drain(&mut coordinator);

        let progress_count = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Progress { .. }))
            .count();
        assert!(progress_count >= 2, "expected progress milestones");
        assert!(events.last().unwrap().is_terminal());
    }

    #[test]
    fn sobel_undo_redo_restores_bit_for_bit() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        run_to_completion(&mut coordinator, sobel_op());

        let sobel_output = coordinator.state().output().cloned().unwrap();
        let sobel_label = coordinator.state().output_label().to_string();

        // Undo reverts to the "no output" state.
        coordinator.undo().unwrap();
        assert!(coordinator.state().output().is_none());
        assert_eq!(coordinator.state().output_label(), DEFAULT_OUTPUT_LABEL);

        // Redo restores the Sobel result exactly.
        coordinator.redo().unwrap();
        assert_eq!(coordinator.state().output(), Some(&sobel_output));
        assert_eq!(coordinator.state().output_label(), sobel_label);
    }

    #[test]
    fn failed_run_changes_nothing() {
        let mut coordinator = Coordinator::new();
        // Grayscale requires a color image; a gray source makes it fail.
        let gray = Image::Gray(GrayImage::from_pixel(8, 8, Luma([100])));
        coordinator.load_source(gray, None).unwrap();
        coordinator.run(grayscale_op()).unwrap();
        let events = drain(&mut coordinator);

        assert!(matches!(
            events.last(),
            Some(SessionEvent::Failed {
                operation: "RGB to Grayscale",
                error: OperationError::InvalidInput(_),
            }),
        ));
        assert!(coordinator.state().output().is_none());
        assert_eq!(coordinator.history().undo_depth(), 0);
    }

    #[test]
    fn second_run_while_in_flight_is_rejected() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        coordinator.run(slow_op()).unwrap();

        assert!(matches!(
            coordinator.run(grayscale_op()),
            Err(SessionError::OperationInFlight),
        ));
        assert!(matches!(
            coordinator.undo(),
            Err(SessionError::OperationInFlight),
        ));
        assert!(matches!(
            coordinator.load_source(rgb_source(), None),
            Err(SessionError::OperationInFlight),
        ));

        coordinator.cancel();
        let _ = drain(&mut coordinator);
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn cancelled_run_leaves_state_untouched() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        coordinator.run(slow_op()).unwrap();
        coordinator.cancel();
        let events = drain(&mut coordinator);

        assert!(
            matches!(events.last(), Some(SessionEvent::Cancelled { .. })),
            "expected cancellation, got {:?}",
            events.last(),
        );
        assert!(coordinator.state().output().is_none());
        assert_eq!(coordinator.history().undo_depth(), 0);
    }

    #[test]
    fn new_completion_clears_the_redo_stack() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        run_to_completion(&mut coordinator, grayscale_op());
        coordinator.undo().unwrap();
        assert_eq!(coordinator.history().redo_depth(), 1);

        run_to_completion(&mut coordinator, sobel_op());
        assert_eq!(coordinator.history().redo_depth(), 0);
    }

    #[test]
    fn redo_replay_skips_history_recording() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        let depth_before = coordinator.history().undo_depth();
        coordinator
            .run_with(
                sobel_op(),
                RunOptions {
                    replay_from_redo: true,
                },
            )
            .unwrap();
        let _ = drain(&mut coordinator);
        assert_eq!(coordinator.history().undo_depth(), depth_before);
        assert!(coordinator.state().output().is_some());
    }

    #[test]
    fn loading_a_source_clears_output_and_history() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        run_to_completion(&mut coordinator, grayscale_op());
        assert!(coordinator.history().can_undo());

        coordinator.load_source(rgb_source(), None).unwrap();
        assert!(coordinator.state().output().is_none());
        assert!(!coordinator.history().can_undo());
        assert!(!coordinator.history().can_redo());
    }

    #[test]
    fn clearing_the_source_preserves_history() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        run_to_completion(&mut coordinator, grayscale_op());

        coordinator.clear_source().unwrap();
        assert!(coordinator.state().source().is_none());
        assert!(coordinator.state().output().is_none());
        assert!(coordinator.history().can_undo());
    }

    #[test]
    fn undo_with_empty_history_is_a_local_error() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        assert!(matches!(
            coordinator.undo(),
            Err(SessionError::History(HistoryError::NothingToUndo)),
        ));
        // State is untouched.
        assert!(coordinator.state().source().is_some());
    }

    #[test]
    fn consecutive_runs_stack_history() {
        let mut coordinator = Coordinator::new();
        coordinator.load_source(rgb_source(), None).unwrap();
        run_to_completion(&mut coordinator, grayscale_op());
        run_to_completion(&mut coordinator, sobel_op());
        assert_eq!(coordinator.history().undo_depth(), 2);

        // Two undos walk back through grayscale to "no output".
        coordinator.undo().unwrap();
        assert_eq!(
            coordinator.state().output_label(),
            "Output (RGB to Grayscale)",
        );
        coordinator.undo().unwrap();
        assert!(coordinator.state().output().is_none());
    }
}
