//! Undo/redo history over output snapshots.
//!
//! Two LIFO stacks of [`HistoryEntry`] values, mutated exclusively
//! through [`record`](History::record) (operation completion),
//! [`undo`](History::undo) / [`redo`](History::redo), and the explicit
//! [`clear`](History::clear). Nothing else in the session ever touches
//! the stacks — loading a new source clears them through the
//! coordinator, never silently.

use kasane_ops::Image;

/// One saved output state: the image (or `None` for "no output exists
/// yet") and the display label it was shown under.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Snapshot of the output slot, absent when no output existed.
    pub image: Option<Image>,
    /// Display label of that state, e.g. `"Output (Sobel Edge Detection)"`.
    pub label: String,
}

impl HistoryEntry {
    /// Build an entry from an output snapshot and its label.
    #[must_use]
    pub fn new(image: Option<Image>, label: impl Into<String>) -> Self {
        Self {
            image,
            label: label.into(),
        }
    }
}

/// Attempted to undo or redo with nothing on the corresponding stack.
/// A local no-op for the caller, never a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The undo stack is empty.
    #[error("nothing to undo")]
    NothingToUndo,
    /// The redo stack is empty.
    #[error("nothing to redo")]
    NothingToRedo,
}

/// The undo/redo stack pair. One instance per session, threaded
/// explicitly into the coordinator.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl History {
    /// Fresh history with both stacks empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an undo is currently possible.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether a redo is currently possible.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of entries on the undo stack.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of entries on the redo stack.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Record a successful, non-redo operation completion: push the
    /// pre-operation output state onto the undo stack and empty the redo
    /// stack unconditionally.
    pub fn record(&mut self, previous: HistoryEntry) {
        self.undo.push(previous);
        if !self.redo.is_empty() {
            self.redo.clear();
            log::info!("Redo stack cleared due to new operation.");
        }
    }

    /// Pop the most recent undo entry, pushing the state being replaced
    /// onto the redo stack. The returned entry is installed as the
    /// current output by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToUndo`] when the undo stack is
    /// empty; both stacks are left unchanged.
    pub fn undo(&mut self, current: HistoryEntry) -> Result<HistoryEntry, HistoryError> {
        let restored = self.undo.pop().ok_or(HistoryError::NothingToUndo)?;
        self.redo.push(current);
        Ok(restored)
    }

    /// Mirror of [`undo`](Self::undo): pop the most recent redo entry,
    /// pushing the replaced state onto the undo stack.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToRedo`] when the redo stack is
    /// empty; both stacks are left unchanged.
    pub fn redo(&mut self, current: HistoryEntry) -> Result<HistoryEntry, HistoryError> {
        let restored = self.redo.pop().ok_or(HistoryError::NothingToRedo)?;
        self.undo.push(current);
        Ok(restored)
    }

    /// Empty both stacks. Only reachable through an explicit user
    /// command or a source reload, never automatically on completion.
    pub fn clear(&mut self) {
        if self.can_undo() || self.can_redo() {
            self.undo.clear();
            self.redo.clear();
            log::info!("Undo/Redo history cleared.");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    fn entry(value: u8, label: &str) -> HistoryEntry {
        HistoryEntry::new(
            Some(Image::Gray(GrayImage::from_pixel(2, 2, Luma([value])))),
            label,
        )
    }

    #[test]
    fn fresh_history_has_nothing_to_undo_or_redo() {
        let history = History::new();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn record_pushes_undo_and_clears_redo() {
        let mut history = History::new();
        history.record(entry(1, "Output"));
        let _ = history.undo(entry(2, "Output (A)")).unwrap();
        assert!(history.can_redo());

        // A new completion empties the redo stack regardless of contents.
        history.record(entry(3, "Output"));
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn undo_on_empty_stack_errors_and_changes_nothing() {
        let mut history = History::new();
        let result = history.undo(entry(1, "Output"));
        assert_eq!(result.unwrap_err(), HistoryError::NothingToUndo);
        assert_eq!(history.undo_depth(), 0);
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn redo_on_empty_stack_errors_and_changes_nothing() {
        let mut history = History::new();
        let result = history.redo(entry(1, "Output"));
        assert_eq!(result.unwrap_err(), HistoryError::NothingToRedo);
        assert_eq!(history.undo_depth(), 0);
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn undo_returns_the_recorded_entry() {
        let mut history = History::new();
        let previous = entry(7, "Output (Sobel Edge Detection)");
        history.record(previous.clone());
        let restored = history.undo(entry(9, "Output (Prewitt Edge Detection)")).unwrap();
        assert_eq!(restored, previous);
        assert!(history.can_redo());
    }

    #[test]
    fn k_undos_then_k_redos_restore_the_final_state() {
        // Simulate a session: states 0..=3, each completion recording the
        // previous state. "Current" after all completions is state 3.
        let mut history = History::new();
        for i in 0..3u8 {
            history.record(entry(i, &format!("Output ({i})")));
        }
        let mut current = entry(3, "Output (3)");
        let final_state = current.clone();

        // k = 3 undos...
        for _ in 0..3 {
            let restored = history.undo(current.clone()).unwrap();
            current = restored;
        }
        assert_eq!(current, entry(0, "Output (0)"));

        // ...then k = 3 redos bring back the pre-undo state.
        for _ in 0..3 {
            let restored = history.redo(current.clone()).unwrap();
            current = restored;
        }
        assert_eq!(current, final_state);
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 3);
    }

    #[test]
    fn clear_empties_both_stacks() {
        let mut history = History::new();
        history.record(entry(1, "Output"));
        let _ = history.undo(entry(2, "Output (A)")).unwrap();
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn absent_image_entries_round_trip() {
        // The very first completion records "no output yet".
        let mut history = History::new();
        history.record(HistoryEntry::new(None, "Output"));
        let restored = history.undo(entry(5, "Output (A)")).unwrap();
        assert_eq!(restored.image, None);
        assert_eq!(restored.label, "Output");
    }
}
