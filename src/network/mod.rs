//! Network connectivity monitor.
//!
//! Holds a single online/offline flag fed by whatever signal the host has
//! (OS events, a health probe, a CLI flag) and fans out transitions to
//! synchronous subscribers and async watchers. Repeated identical signals
//! are debounced: only real transitions notify.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::remote::RemoteStore;

/// Observed connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    #[must_use]
    pub const fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Handle returned by [`NetworkMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(Connectivity) + Send + Sync>;

/// Connectivity flag with debounced change notification.
pub struct NetworkMonitor {
    tx: watch::Sender<Connectivity>,
    subscribers: Mutex<Vec<(SubscriptionId, Handler)>>,
    // Held from the state change until every handler has seen it.
    notify: Mutex<()>,
    next_id: AtomicU64,
}

impl NetworkMonitor {
    #[must_use]
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            subscribers: Mutex::new(Vec::new()),
            notify: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Record an observed signal. Returns `true` if it was a transition.
    ///
    /// Safe to call from several threads: transitions are applied and
    /// delivered one at a time, so handlers see them in the order they took
    /// effect. A handler must not call `report` itself.
    pub fn report(&self, observed: Connectivity) -> bool {
        let _ordered = self
            .notify
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let changed = self.tx.send_if_modified(|current| {
            if *current == observed {
                false
            } else {
                *current = observed;
                true
            }
        });

        if !changed {
            debug!(state = observed.as_str(), "Connectivity unchanged");
            return false;
        }

        info!(state = observed.as_str(), "Connectivity changed");
        for handler in self.handlers() {
            handler(observed);
        }
        true
    }

    /// Register a callback for transitions.
    ///
    /// The handler is invoked once immediately with the current state, then on
    /// every transition, on the thread that reported it.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Connectivity) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(handler);
        self.lock_subscribers().push((id, Arc::clone(&handler)));
        handler(self.current());
        id
    }

    /// Remove a callback. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Async view of the flag.
    ///
    /// The receiver starts out marked changed, so the first `changed().await`
    /// resolves immediately with the current state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        rx
    }

    // Handlers run outside the lock so they may subscribe or unsubscribe.
    fn handlers(&self) -> Vec<Handler> {
        self.lock_subscribers()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Handler)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("current", &self.current())
            .field("subscribers", &self.lock_subscribers().len())
            .finish()
    }
}

/// Ping the remote every `interval` and report the result.
///
/// Used where the host offers no connectivity events. The first probe runs
/// immediately.
pub fn spawn_probe<R>(monitor: Arc<NetworkMonitor>, remote: Arc<R>, interval: Duration) -> JoinHandle<()>
where
    R: RemoteStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = remote.ping().await;
            debug!(remote = remote.name(), reachable, "Connectivity probe");
            monitor.report(Connectivity::from_online(reachable));
        }
    })
}
