use tracing::{debug, info};

use crate::remote::PushSignal;

/// Whether push invalidations are currently honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No push channel; `Changed` signals are ignored.
    #[default]
    Disconnected,
    /// Push channel open; `Changed` signals invalidate the caches.
    Connected,
}

/// What the session must do in response to a push signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Nothing to do.
    Ignore,
    /// The channel came up.
    Connected,
    /// The channel went down. Caches stay as they are.
    Disconnected,
    /// Invalidate the queue and records caches.
    Invalidate,
}

/// Two-state machine turning push signals into cache work.
#[derive(Debug, Default)]
pub struct SyncTrigger {
    state: ConnectionState,
}

impl SyncTrigger {
    /// Trigger in the `Disconnected` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Applies `signal` and returns the work it calls for.
    pub fn on_signal(&mut self, signal: PushSignal) -> SyncAction {
        match (self.state, signal) {
            (ConnectionState::Disconnected, PushSignal::Opened) => {
                info!("push channel connected");
                self.state = ConnectionState::Connected;
                SyncAction::Connected
            }
            (ConnectionState::Connected, PushSignal::Changed) => SyncAction::Invalidate,
            (ConnectionState::Connected, PushSignal::Closed) => {
                info!("push channel disconnected");
                self.state = ConnectionState::Disconnected;
                SyncAction::Disconnected
            }
            (state, signal) => {
                debug!(?state, ?signal, "push signal ignored");
                SyncAction::Ignore
            }
        }
    }
}
