//! # Deferrals
//!
//! Single-use completion tokens. A responder that needs time to finish
//! handling an event takes a [`Deferral`] and completes it when done; the
//! event source waits for every outstanding deferral before moving on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct Countdown {
    outstanding: AtomicUsize,
    notify: Notify,
}

impl Countdown {
    fn signal(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }
}

/// Hands out deferrals and waits for them.
#[derive(Clone, Default)]
pub struct DeferralManager {
    countdown: Arc<Countdown>,
}

impl DeferralManager {
    /// Create a manager with no outstanding deferrals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a deferral. The next [`DeferralManager::signal_and_wait`] will
    /// not return before it is completed.
    pub fn get_deferral(&self) -> Deferral {
        self.countdown.outstanding.fetch_add(1, Ordering::AcqRel);
        Deferral {
            countdown: Some(Arc::clone(&self.countdown)),
        }
    }

    /// Number of deferrals not completed yet.
    pub fn outstanding(&self) -> usize {
        self.countdown.outstanding.load(Ordering::Acquire)
    }

    /// Wait until every deferral handed out so far is completed.
    pub async fn signal_and_wait(&self) {
        loop {
            let notified = self.countdown.notify.notified();
            if self.outstanding() == 0 {
                return;
            }
            debug!("Waiting for {} deferral(s)", self.outstanding());
            notified.await;
        }
    }
}

/// Single-use completion token. Dropping it completes it.
#[must_use = "a deferral completes as soon as it is dropped"]
pub struct Deferral {
    countdown: Option<Arc<Countdown>>,
}

impl Deferral {
    /// Signal completion.
    pub fn complete(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.signal();
        }
    }
}

impl Drop for Deferral {
    fn drop(&mut self) {
        self.signal();
    }
}

impl std::fmt::Debug for Deferral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferral")
            .field("pending", &self.countdown.is_some())
            .finish()
    }
}
