//! Progress and plotting collaborators consumed by the execution engine.
//!
//! Both are installed by the embedding application and handed to function
//! bodies only while enabled on the execution context.

use crate::label::Entry;

/// Severity of a message sent through a [`ProgressNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Notice,
    Warning,
    Error,
}

/// Sink for progress messages and cooperative cancellation.
pub trait ProgressNotifier {
    fn send_log_message(&mut self, severity: MessageSeverity, message: &str);

    /// Advances the progress counter by `step` units.
    fn step_progress(&mut self, step: usize);

    /// True once the caller has asked to stop. Polling is cooperative.
    fn is_cancelling(&self) -> bool;
}

/// Visualization hook invoked by function bodies.
pub trait Plotter {
    fn redraw(&mut self, label: &Entry);
}

/// Notifier that discards everything and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ProgressNotifier for NullNotifier {
    fn send_log_message(&mut self, _severity: MessageSeverity, _message: &str) {}

    fn step_progress(&mut self, _step: usize) {}

    fn is_cancelling(&self) -> bool {
        false
    }
}
