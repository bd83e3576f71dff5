use tokio::sync::mpsc;

use crate::resolver::{RequestId, Resolution};

/// External inputs to the controller, applied at the start of the next tick
#[derive(Debug)]
pub enum ControllerEvent {
    /// Leave `inert` and start the sequence
    Init,
    /// Answer to a resolver request
    ClipsResolved {
        request: RequestId,
        result: Resolution,
    },
    /// Use `next` at the next advance regardless of the active clip's rule
    Skip,
    /// Tear down the running sequence
    Stop,
    /// Return a stopped sequence to `inert`
    Restart,
}

/// Cloneable handle for posting events to a controller
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<ControllerEvent>);

impl EventSender {
    /// Returns `false` when the controller is gone
    pub fn send(&self, event: ControllerEvent) -> bool {
        self.0.send(event).is_ok()
    }
}

pub(super) fn channel() -> (EventSender, mpsc::UnboundedReceiver<ControllerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}
