//! Background OPEN to HALF_OPEN scheduling for local breakers.
//!
//! One thread per scheduled breaker. It blocks on a channel of capacity one,
//! so arming while a signal is already pending is a no-op and at most one
//! timer is ever outstanding. The thread holds only a weak reference to the
//! breaker and exits once the breaker is dropped.

use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::breaker::{BreakerInner, WatchStep};

// Longest single sleep, so a dropped breaker releases its thread promptly.
const MAX_NAP: Duration = Duration::from_secs(1);

/// Sending half, kept by the breaker.
pub(crate) struct ArmSignal {
    tx: Mutex<SyncSender<()>>,
}

impl ArmSignal {
    /// Requests a promotion check once the reset timeout elapses.
    pub(crate) fn arm(&self) {
        match self.tx.lock().try_send(()) {
            Ok(()) => trace!("half-open watcher armed"),
            Err(TrySendError::Full(())) => trace!("half-open watcher already armed"),
            Err(TrySendError::Disconnected(())) => {
                warn!("half-open watcher is gone, falling back to lazy promotion")
            }
        }
    }
}

/// Receiving half, moved into the watcher thread.
pub(crate) struct ArmListener {
    rx: Receiver<()>,
}

pub(crate) fn channel() -> (ArmSignal, ArmListener) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ArmSignal { tx: Mutex::new(tx) }, ArmListener { rx })
}

impl ArmListener {
    pub(crate) fn spawn(self, target: Weak<BreakerInner>) -> io::Result<()> {
        let name = target
            .upgrade()
            .map_or_else(|| "breaker".to_string(), |inner| inner.name().to_string());

        thread::Builder::new()
            .name(format!("{name}-half-open"))
            .spawn(move || self.run(target))?;
        Ok(())
    }

    fn run(self, target: Weak<BreakerInner>) {
        while self.rx.recv().is_ok() {
            loop {
                let Some(inner) = target.upgrade() else {
                    return;
                };
                match inner.promote_if_due() {
                    WatchStep::Done => break,
                    WatchStep::Wait(delay) => {
                        drop(inner);
                        thread::sleep(delay.min(MAX_NAP));
                    }
                }
            }
        }
    }
}
