//! The two live image slots and their provenance.
//!
//! The source is set only by an explicit load and is read-only for
//! operations (they receive copies). The output slot is owned by the
//! coordinator/history pairing and mutated only on the interactive
//! thread, after a background run has fully completed.

use std::path::{Path, PathBuf};

use kasane_ops::Image;

use crate::history::HistoryEntry;

/// Label shown for the output slot before any operation has run.
pub const DEFAULT_OUTPUT_LABEL: &str = "Output";

/// Source and output images plus their file-path provenance.
#[derive(Debug)]
pub struct SessionState {
    source: Option<Image>,
    source_path: Option<PathBuf>,
    output: Option<Image>,
    output_path: Option<PathBuf>,
    output_label: String,
}

impl SessionState {
    /// Empty state: no source, no output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            source_path: None,
            output: None,
            output_path: None,
            output_label: DEFAULT_OUTPUT_LABEL.to_string(),
        }
    }

    /// The loaded source image, if any.
    #[must_use]
    pub const fn source(&self) -> Option<&Image> {
        self.source.as_ref()
    }

    /// Where the source was loaded from, if known.
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// The current output image, if any.
    #[must_use]
    pub const fn output(&self) -> Option<&Image> {
        self.output.as_ref()
    }

    /// Where the output was last saved to, if anywhere.
    #[must_use]
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Display label of the output slot.
    #[must_use]
    pub fn output_label(&self) -> &str {
        &self.output_label
    }

    /// Install a new source image, clearing the output slot. The caller
    /// (the coordinator) also clears the history stacks.
    pub(crate) fn set_source(&mut self, image: Image, path: Option<PathBuf>) {
        self.source = Some(image);
        self.source_path = path;
        self.reset_output();
    }

    /// Clear the source; the output goes with it.
    pub(crate) fn clear_source(&mut self) {
        self.source = None;
        self.source_path = None;
        self.reset_output();
    }

    /// Clear only the output slot.
    pub(crate) fn reset_output(&mut self) {
        self.output = None;
        self.output_path = None;
        self.output_label = DEFAULT_OUTPUT_LABEL.to_string();
    }

    /// Install a freshly computed output under its display label.
    pub(crate) fn install_output(&mut self, image: Image, label: String) {
        self.output = Some(image);
        self.output_path = None;
        self.output_label = label;
    }

    /// Restore an output state popped from a history stack.
    pub(crate) fn restore_output(&mut self, entry: HistoryEntry) {
        self.output = entry.image;
        self.output_path = None;
        self.output_label = entry.label;
    }

    /// Snapshot the current output state (image copy + label) for a
    /// history stack.
    #[must_use]
    pub(crate) fn output_snapshot(&self) -> HistoryEntry {
        HistoryEntry::new(self.output.clone(), self.output_label.clone())
    }

    /// Record where the output was saved.
    pub fn mark_output_saved(&mut self, path: PathBuf) {
        self.output_path = Some(path);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
