//! The background worker thread running one operation at a time.
//!
//! Progress updates and the completion result travel over a single
//! channel, so they arrive on the interactive thread in order and the
//! completion is only committed once every preceding progress message
//! has been drained. Send failures are swallowed: a disconnected
//! receiver means the session is gone and there is nobody left to tell.

use std::io;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use kasane_ops::{CancelToken, Image, Operation, OperationError, Progress, ProgressSink};

/// Message from the worker to the session.
pub(crate) enum WorkerMessage {
    /// A progress milestone from the running operation.
    Progress(u8, String),
    /// The run finished; the operation comes back with its result.
    Done {
        operation: Operation,
        result: Result<Image, OperationError>,
    },
}

/// Progress sink forwarding milestones into the session channel.
pub(crate) struct ChannelSink {
    tx: Sender<WorkerMessage>,
}

impl ProgressSink for ChannelSink {
    fn report(&self, percent: u8, message: &str) {
        let _ = self
            .tx
            .send(WorkerMessage::Progress(percent, message.to_string()));
    }
}

/// Spawn the worker thread for one run. The operation applies to `source`
/// off the interactive thread; the result follows the progress stream
/// through `tx`.
pub(crate) fn spawn(
    mut operation: Operation,
    source: Image,
    tx: Sender<WorkerMessage>,
    cancel: CancelToken,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("kasane-worker".to_string())
        .spawn(move || {
            let sink = ChannelSink { tx: tx.clone() };
            let progress = Progress::new(&sink, cancel);
            let result = operation.apply(&source, &progress);
            let _ = tx.send(WorkerMessage::Done { operation, result });
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::mpsc;

    use image::{Rgb, RgbImage};
    use kasane_ops::OperationKind;
    use kasane_ops::conversion::GrayscaleParams;

    use super::*;

    #[test]
    fn worker_reports_progress_then_done() {
        let (tx, rx) = mpsc::channel();
        let source = Image::Rgb(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
        let operation = Operation::new(OperationKind::Grayscale(GrayscaleParams::default()));
        let handle = spawn(operation, source, tx, CancelToken::new()).unwrap();
        handle.join().unwrap();

        let messages: Vec<WorkerMessage> = rx.iter().collect();
        assert!(
            matches!(messages.last(), Some(WorkerMessage::Done { result: Ok(_), .. })),
            "expected a successful Done as the final message",
        );
        let progress_count = messages
            .iter()
            .filter(|m| matches!(m, WorkerMessage::Progress(..)))
            .count();
        assert!(progress_count >= 2, "expected start and completion reports");
    }

    #[test]
    fn dropped_receiver_does_not_panic_the_worker() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let source = Image::Rgb(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
        let operation = Operation::new(OperationKind::Grayscale(GrayscaleParams::default()));
        let handle = spawn(operation, source, tx, CancelToken::new()).unwrap();
        assert!(handle.join().is_ok());
    }
}
