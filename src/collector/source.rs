//! Subscribe/unsubscribe adapter over the platform collector.
//!
//! The hook backends push events into a channel from their own thread.
//! `HookClickSource` drains that channel on a dispatcher thread and hands
//! each event to the current subscriber, so the measurement loop never
//! touches the hook runtime directly.

use crate::collector::types::InputEvent;
use crate::collector::{Collector, CollectorConfig, CollectorError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receives input events on the delivering thread.
pub trait InputSubscriber: Send + Sync {
    fn on_event(&self, event: InputEvent);
}

/// Anything that can deliver input events to one subscriber at a time.
///
/// After `unsubscribe` returns, the subscriber receives no further events.
pub trait ClickSource {
    fn subscribe(&mut self, subscriber: Arc<dyn InputSubscriber>) -> Result<(), CollectorError>;
    fn unsubscribe(&mut self);
}

/// How long the dispatcher waits on the channel before re-checking its flag.
const DISPATCH_POLL: Duration = Duration::from_millis(20);

/// Thread forwarding events from a channel to one subscriber.
///
/// Once `stop` returns, the subscriber receives no further events.
pub struct Dispatcher {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(receiver: Receiver<InputEvent>, subscriber: Arc<dyn InputSubscriber>) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let handle = thread::spawn(move || {
            while flag.load(Ordering::SeqCst) {
                match receiver.recv_timeout(DISPATCH_POLL) {
                    Ok(event) => {
                        // Re-check so nothing is delivered once stop began
                        if !flag.load(Ordering::SeqCst) {
                            break;
                        }
                        subscriber.on_event(event);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::warn!("input collector disconnected");
                        break;
                    }
                }
            }
        });

        Self {
            active,
            handle: Some(handle),
        }
    }

    /// Stop forwarding and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Click source backed by the OS input hook.
pub struct HookClickSource {
    collector: Collector,
    dispatcher: Option<Dispatcher>,
}

impl HookClickSource {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            collector: Collector::new(config),
            dispatcher: None,
        }
    }

    /// Whether a subscriber is currently registered.
    pub fn is_subscribed(&self) -> bool {
        self.dispatcher.is_some()
    }
}

impl ClickSource for HookClickSource {
    fn subscribe(&mut self, subscriber: Arc<dyn InputSubscriber>) -> Result<(), CollectorError> {
        if self.dispatcher.is_some() {
            return Err(CollectorError::AlreadyRunning);
        }

        // Events left over from an earlier subscription belong to nobody
        while self.collector.try_recv().is_some() {}

        self.collector.start()?;
        let receiver = self.collector.receiver().clone();
        self.dispatcher = Some(Dispatcher::start(receiver, subscriber));
        tracing::debug!("input subscriber registered");
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.stop();
            tracing::debug!("input subscriber removed");
        }
        self.collector.stop();
    }
}

impl Drop for HookClickSource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
