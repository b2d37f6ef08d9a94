//! Single-flight token refresh
//!
//! However many requests fail with 401 at once, exactly one of them (the
//! leader) performs the refresh exchange. The rest become followers: they
//! park on a oneshot channel and receive the leader's outcome when it
//! settles. The idle/refreshing flag and the waiter queue live in one enum
//! behind one lock, so "start or join" is a single atomic step and the queue
//! can only be non-empty while a refresh is in flight.
//!
//! The lock is a `std::sync::Mutex` and is never held across an `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use common::Secret;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::RefreshError;

/// What every participant in one refresh attempt receives.
pub type RefreshOutcome = Result<Secret<String>, RefreshError>;

#[derive(Default)]
enum State {
    #[default]
    Idle,
    Refreshing { waiters: VecDeque<Queued> },
}

/// A parked follower. `position` is its 1-based place in the queue.
struct Queued {
    position: usize,
    tx: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

/// Result of joining a refresh.
pub enum Ticket<'a> {
    /// Caller must perform the exchange and then settle.
    Leader(LeaderGuard<'a>),
    /// Caller waits for the leader's outcome.
    Follower(Waiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // No code path panics while holding the lock, so a poisoned state
        // is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Become the leader of a new refresh, or queue behind the one in flight.
    pub fn begin_or_enqueue(&self) -> Ticket<'_> {
        let mut state = self.lock();
        match &mut *state {
            State::Idle => {
                *state = State::Refreshing {
                    waiters: VecDeque::new(),
                };
                debug!("token refresh started");
                Ticket::Leader(LeaderGuard {
                    coordinator: self,
                    settled: false,
                })
            }
            State::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                let position = waiters.len() + 1;
                waiters.push_back(Queued { position, tx });
                debug!(position, "queued behind in-flight token refresh");
                Ticket::Follower(Waiter { position, rx })
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), State::Refreshing { .. })
    }

    /// Followers currently parked on the in-flight refresh.
    pub fn pending_waiters(&self) -> usize {
        match &*self.lock() {
            State::Idle => 0,
            State::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Return to idle and hand `outcome` to every queued waiter in enqueue
    /// order. Returns the queue positions in the order they were notified.
    fn settle(&self, outcome: &RefreshOutcome) -> Vec<usize> {
        let waiters = match std::mem::replace(&mut *self.lock(), State::Idle) {
            State::Idle => VecDeque::new(),
            State::Refreshing { waiters } => waiters,
        };
        waiters
            .into_iter()
            .map(|waiter| {
                // A waiter whose request was cancelled has dropped its receiver.
                let _ = waiter.tx.send(outcome.clone());
                waiter.position
            })
            .collect()
    }
}

/// Held by the request performing the exchange. Dropping it without calling
/// [`settle`](LeaderGuard::settle) fails every waiter with
/// `RefreshError::Abandoned` and returns the coordinator to idle.
pub struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    /// Hand `outcome` to every waiter. Returns how many were notified.
    pub fn settle(self, outcome: &RefreshOutcome) -> usize {
        self.settle_in_order(outcome).len()
    }

    fn settle_in_order(mut self, outcome: &RefreshOutcome) -> Vec<usize> {
        self.settled = true;
        let order = self.coordinator.settle(outcome);
        debug!(
            waiters = order.len(),
            success = outcome.is_ok(),
            "token refresh settled"
        );
        order
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let notified = self.coordinator.settle(&Err(RefreshError::Abandoned));
            warn!(waiters = notified.len(), "token refresh abandoned by its leader");
        }
    }
}

/// A follower's handle on the in-flight refresh.
pub struct Waiter {
    position: usize,
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl Waiter {
    /// 1-based place in the queue of the refresh it joined.
    pub fn position(&self) -> usize {
        self.position
    }

    pub async fn outcome(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}
