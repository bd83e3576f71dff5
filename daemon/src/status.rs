use common::StatusMessage;

/// Receiver of the controller's ordered success/error messages
pub trait StatusSink: Send {
    fn publish(&mut self, message: &StatusMessage);
}

/// Status sink that forwards messages to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&mut self, message: &StatusMessage) {
        if message.is_error() {
            log::error!("{}", message.text);
        } else {
            log::info!("{}", message.text);
        }
    }
}
