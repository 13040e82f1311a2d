//! Loading-state signal.
//!
//! A process-wide loading indicator, toggled by page lifecycle events and
//! observed by a progress UI.
//!
//! | Event | Effect |
//! |-------|--------|
//! | [`PageEvent::NavigationStart`] | [`show`](LoadingSignal::show) |
//! | [`PageEvent::FormSubmitStart`] | [`show`](LoadingSignal::show) |
//! | [`PageEvent::NavigationEnd`] | [`hide`](LoadingSignal::hide) |
//! | [`PageEvent::FormSubmitEnd`] | [`hide`](LoadingSignal::hide) |
//!
//! `show` and `hide` are idempotent and do not count: two overlapping
//! starts are ended by a single stop. Observers are only notified of real
//! transitions.
//!
//! # Example
//!
//! ```no_run
//! use live_socket::{LoadingSignal, PageEvent};
//!
//! # async fn example() {
//! let signal = LoadingSignal::new();
//! let mut state_rx = signal.subscribe();
//!
//! signal.handle(PageEvent::NavigationStart);
//! state_rx.changed().await.ok();
//! assert!(signal.is_loading());
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::session::SessionEvent;
use crate::socket::LiveSocket;

// ============================================================================
// LoadingState
// ============================================================================

/// State of the loading indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    /// Nothing in progress.
    #[default]
    Idle,
    /// A navigation or submission is in progress.
    Loading,
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
        }
    }
}

// ============================================================================
// PageEvent
// ============================================================================

/// Page lifecycle events dispatched by the routing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// A navigation started.
    NavigationStart,
    /// A navigation finished.
    NavigationEnd,
    /// A form submission started.
    FormSubmitStart,
    /// A form submission finished.
    FormSubmitEnd,
}

impl PageEvent {
    /// Returns `true` for start events.
    #[inline]
    #[must_use]
    pub const fn is_start(self) -> bool {
        matches!(self, Self::NavigationStart | Self::FormSubmitStart)
    }
}

// ============================================================================
// LoadingSignal
// ============================================================================

struct LoadingInner {
    state_tx: watch::Sender<LoadingState>,
    shown: AtomicU64,
    hidden: AtomicU64,
}

/// Loading indicator service.
///
/// Create one at startup and hand clones to whoever dispatches page events
/// or renders progress.
#[derive(Clone)]
pub struct LoadingSignal {
    inner: Arc<LoadingInner>,
}

impl Default for LoadingSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingSignal")
            .field("state", &self.state())
            .field("show_count", &self.show_count())
            .field("hide_count", &self.hide_count())
            .finish()
    }
}

impl LoadingSignal {
    /// Creates an idle signal.
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LoadingState::Idle);
        Self {
            inner: Arc::new(LoadingInner {
                state_tx,
                shown: AtomicU64::new(0),
                hidden: AtomicU64::new(0),
            }),
        }
    }

    /// Shows the indicator. Returns `true` if it was hidden.
    pub fn show(&self) -> bool {
        let changed = self.transition(LoadingState::Loading);
        if changed {
            self.inner.shown.fetch_add(1, Ordering::Relaxed);
        }
        changed
    }

    /// Hides the indicator. Returns `true` if it was shown.
    pub fn hide(&self) -> bool {
        let changed = self.transition(LoadingState::Idle);
        if changed {
            self.inner.hidden.fetch_add(1, Ordering::Relaxed);
        }
        changed
    }

    /// Applies a page lifecycle event.
    pub fn handle(&self, event: PageEvent) {
        trace!(?event, "Page event");
        if event.is_start() {
            self.show();
        } else {
            self.hide();
        }
    }

    /// Returns a receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.inner.state_tx.subscribe()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LoadingState {
        *self.inner.state_tx.borrow()
    }

    /// Returns `true` while loading.
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state() == LoadingState::Loading
    }

    /// Number of idle → loading transitions.
    #[inline]
    #[must_use]
    pub fn show_count(&self) -> u64 {
        self.inner.shown.load(Ordering::Relaxed)
    }

    /// Number of loading → idle transitions.
    #[inline]
    #[must_use]
    pub fn hide_count(&self) -> u64 {
        self.inner.hidden.load(Ordering::Relaxed)
    }

    /// Drives the signal from a socket's session events.
    ///
    /// Shows while a transport attempt is in flight and hides once the
    /// session opens, gives up or disconnects. The task ends with the
    /// session.
    pub fn follow(&self, socket: &LiveSocket) -> JoinHandle<()> {
        let signal = self.clone();
        let mut events = socket.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Connecting { .. }) => {
                        signal.show();
                    }
                    Ok(
                        SessionEvent::Open { .. }
                        | SessionEvent::GaveUp { .. }
                        | SessionEvent::Disconnected { .. },
                    ) => {
                        signal.hide();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Loading signal lagged behind session events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn transition(&self, target: LoadingState) -> bool {
        let changed = self.inner.state_tx.send_if_modified(|state| {
            if *state == target {
                false
            } else {
                *state = target;
                true
            }
        });

        if changed {
            debug!(state = %target, "Loading state changed");
        }
        changed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::SocketConfig;
    use crate::transport::mock::{Behavior, MockTransports};

    #[test]
    fn test_starts_idle() {
        let signal = LoadingSignal::new();
        assert_eq!(signal.state(), LoadingState::Idle);
        assert!(!signal.is_loading());
    }

    #[test]
    fn test_overlapping_shows_hidden_once() {
        let signal = LoadingSignal::new();
        let mut state_rx = signal.subscribe();

        assert!(signal.show());
        assert!(!signal.show());
        assert!(signal.hide());

        assert_eq!(signal.state(), LoadingState::Idle);
        assert_eq!(signal.show_count(), 1);
        assert_eq!(signal.hide_count(), 1);

        // Stays hidden
        assert!(!signal.hide());
        assert_eq!(signal.hide_count(), 1);
        assert_eq!(*state_rx.borrow_and_update(), LoadingState::Idle);
    }

    #[test]
    fn test_redundant_calls_do_not_notify() {
        let signal = LoadingSignal::new();
        let mut state_rx = signal.subscribe();

        signal.hide();
        assert!(!state_rx.has_changed().unwrap_or(true));

        signal.show();
        assert!(state_rx.has_changed().unwrap_or(false));
        state_rx.borrow_and_update();

        signal.show();
        assert!(!state_rx.has_changed().unwrap_or(true));
    }

    #[test]
    fn test_page_events() {
        let signal = LoadingSignal::new();

        signal.handle(PageEvent::NavigationStart);
        assert!(signal.is_loading());

        signal.handle(PageEvent::FormSubmitStart);
        signal.handle(PageEvent::NavigationEnd);
        assert!(!signal.is_loading());

        signal.handle(PageEvent::FormSubmitEnd);
        assert_eq!(signal.hide_count(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let signal = LoadingSignal::new();
        let clone = signal.clone();

        clone.show();
        assert!(signal.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_socket() {
        let mock = MockTransports::new([Behavior::Silent]);
        let socket = LiveSocket::builder("http://localhost:4000/live")
            .config(SocketConfig::new().with_heartbeat(None))
            .transport_factory(mock.clone())
            .build()
            .expect("build");

        let signal = LoadingSignal::new();
        let mut state_rx = signal.subscribe();
        let _task = signal.follow(&socket);

        socket.connect().expect("connect");
        state_rx
            .wait_for(|s| *s == LoadingState::Loading)
            .await
            .expect("loading");

        mock.emit(0, crate::transport::TransportEvent::Open);
        state_rx
            .wait_for(|s| *s == LoadingState::Idle)
            .await
            .expect("idle");

        assert_eq!(signal.show_count(), 1);
        assert_eq!(signal.hide_count(), 1);
    }
}
