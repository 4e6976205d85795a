//! Off-thread dispatch with a single pending slot.
//!
//! Some strategies block for a while (a simulated button hold takes a full
//! second). When that must not stall the sample thread, actions are handed to
//! a worker through a one-element slot: if the worker is still busy, a newer
//! action replaces the pending one instead of queueing behind it.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, info};

use crate::config::Action;
use crate::dispatch::{ActionDispatcher, ActionSink, DispatchOutcome};
use crate::notify::Notifier;
use crate::Result;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Action>,
    shutdown: bool,
}

type Shared = Arc<(Mutex<Slot>, Condvar)>;

pub struct DispatchWorker {
    shared: Shared,
    handle: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    pub fn spawn(dispatcher: ActionDispatcher, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let shared: Shared = Arc::new((Mutex::new(Slot::default()), Condvar::new()));
        let worker_shared = shared.clone();

        let handle = thread::Builder::new()
            .name("magnet-dispatch".into())
            .spawn(move || run(dispatcher, notifier, worker_shared))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Put `action` in the slot. Returns the action it replaced, if any.
    pub fn enqueue(&self, action: Action) -> Option<Action> {
        let (lock, cvar) = &*self.shared;
        let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        let replaced = slot.pending.replace(action);
        cvar.notify_one();
        replaced
    }
}

impl ActionSink for DispatchWorker {
    fn submit(&mut self, action: Action) -> Option<DispatchOutcome> {
        if let Some(stale) = self.enqueue(action) {
            info!("dispatch busy: {} superseded by {}", stale, action);
        }
        None
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
            slot.shutdown = true;
            cvar.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(mut dispatcher: ActionDispatcher, notifier: Arc<dyn Notifier>, shared: Shared) {
    let (lock, cvar) = &*shared;
    loop {
        let action = {
            let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
            while slot.pending.is_none() && !slot.shutdown {
                slot = cvar.wait(slot).unwrap_or_else(|e| e.into_inner());
            }
            match slot.pending.take() {
                Some(action) => action,
                None => break,
            }
        };

        let outcome = dispatcher.dispatch(action, notifier.as_ref());
        debug!(
            "dispatch worker: {} finished, succeeded={}",
            outcome.action, outcome.succeeded
        );
    }
    debug!("dispatch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::fallback::FallbackChain;
    use crate::dispatch::{MediaKey, MediaKeys};
    use crate::notify::NullNotifier;
    use std::sync::mpsc;

    struct GatedKeys {
        sent: Arc<Mutex<Vec<MediaKey>>>,
        started: mpsc::Sender<()>,
        gate: Option<mpsc::Receiver<()>>,
    }

    impl MediaKeys for GatedKeys {
        fn send(&mut self, key: MediaKey) -> Result<()> {
            self.sent.lock().unwrap().push(key);
            let _ = self.started.send(());
            // only the first press blocks
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
            Ok(())
        }
    }

    #[test]
    fn newest_action_wins_while_busy() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let keys = GatedKeys {
            sent: sent.clone(),
            started: started_tx,
            gate: Some(gate_rx),
        };
        let dispatcher = ActionDispatcher::new(Box::new(keys), FallbackChain::new(Vec::new()));
        let mut worker = DispatchWorker::spawn(dispatcher, Arc::new(NullNotifier)).unwrap();

        assert!(worker.submit(Action::MediaToggle).is_none());
        started_rx.recv().unwrap();

        assert_eq!(worker.enqueue(Action::MediaNext), None);
        assert_eq!(worker.enqueue(Action::MediaPrevious), Some(Action::MediaNext));
        assert_eq!(worker.enqueue(Action::VolumeUp), Some(Action::MediaPrevious));

        gate_tx.send(()).unwrap();
        started_rx.recv().unwrap();
        drop(worker);

        assert_eq!(*sent.lock().unwrap(), vec![MediaKey::PlayPause, MediaKey::VolumeUp]);
    }

    #[test]
    fn drop_stops_idle_worker() {
        let dispatcher = ActionDispatcher::new(
            Box::new(crate::dispatch::NullMediaKeys),
            FallbackChain::new(Vec::new()),
        );
        let worker = DispatchWorker::spawn(dispatcher, Arc::new(NullNotifier)).unwrap();
        drop(worker);
    }
}
