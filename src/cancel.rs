//! Cancellation signal threaded through the workflow.
//!
//! A [`CancelTrigger`] records the first [`CancelReason`]; every clone of the
//! matching [`CancelSignal`] observes it. Backed by a `tokio::sync::watch`
//! channel so waiters can `select!` on [`CancelSignal::cancelled`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Operator interrupt (Ctrl-C).
    Interrupted,
    /// The configured deadline passed.
    DeadlineElapsed(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Interrupted => f.write_str("interrupted by operator"),
            CancelReason::DeadlineElapsed(d) => write!(f, "deadline of {}s elapsed", d.as_secs()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<Option<CancelReason>>,
}

#[derive(Debug, Clone)]
pub struct CancelTrigger {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (CancelTrigger, CancelSignal) {
    let (tx, rx) = watch::channel(None);
    (CancelTrigger { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_trigger, signal) = channel();
        signal
    }

    /// The reason, if the signal has already fired.
    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pends forever if every trigger is
    /// dropped without firing.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

impl CancelTrigger {
    /// Fire the signal. Only the first reason is kept.
    pub fn cancel(&self, reason: CancelReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// Fire with [`CancelReason::DeadlineElapsed`] once `after` has passed.
    pub fn cancel_after(&self, after: Duration) -> tokio::task::JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            trigger.cancel(CancelReason::DeadlineElapsed(after));
        })
    }
}
