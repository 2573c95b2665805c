use crate::document::Document;
use crate::logbook::LogBook;
use crate::notifier::{MessageSeverity, Plotter, ProgressNotifier};
use crate::tx::TxData;
use std::any::Any;

/// Everything a function body may use while it runs.
pub struct FunctionScope<'a> {
    doc: &'a mut Document,
    user_data: Option<&'a mut (dyn Any + 'static)>,
    tx_data: Option<&'a TxData>,
    progress: Option<&'a mut (dyn ProgressNotifier + 'static)>,
    plotter: Option<&'a mut (dyn Plotter + 'static)>,
}

impl<'a> FunctionScope<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self {
            doc,
            user_data: None,
            tx_data: None,
            progress: None,
            plotter: None,
        }
    }

    pub(crate) fn with_user_data(mut self, user_data: Option<&'a mut (dyn Any + 'static)>) -> Self {
        self.user_data = user_data;
        self
    }

    pub(crate) fn with_tx_data(mut self, tx_data: Option<&'a TxData>) -> Self {
        self.tx_data = tx_data;
        self
    }

    pub fn with_progress(mut self, progress: Option<&'a mut (dyn ProgressNotifier + 'static)>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_plotter(mut self, plotter: Option<&'a mut (dyn Plotter + 'static)>) -> Self {
        self.plotter = plotter;
        self
    }

    pub fn doc(&self) -> &Document {
        &*self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut *self.doc
    }

    pub fn logbook(&self) -> LogBook {
        LogBook::new()
    }

    /// User data bound to the running function's GUID, if of type `T`.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data
            .as_deref()
            .and_then(|data| data.downcast_ref::<T>())
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data
            .as_deref_mut()
            .and_then(|data| data.downcast_mut::<T>())
    }

    pub fn tx_data(&self) -> Option<&TxData> {
        self.tx_data
    }

    pub fn progress(&mut self) -> Option<&mut (dyn ProgressNotifier + 'static)> {
        self.progress.as_deref_mut()
    }

    pub fn plotter(&mut self) -> Option<&mut (dyn Plotter + 'static)> {
        self.plotter.as_deref_mut()
    }

    pub fn is_cancelling(&self) -> bool {
        self.progress
            .as_deref()
            .is_some_and(|progress| progress.is_cancelling())
    }

    /// Forwards a message to the progress notifier when one is enabled.
    pub fn send_message(&mut self, severity: MessageSeverity, message: &str) {
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.send_log_message(severity, message);
        }
    }
}
