//! Value-typed references to subscriptions.

use std::sync::{Arc, Weak};

use crate::error::SignalError;
use crate::signal::{ErasedSignal, Signal};

/// An opaque, copyable reference to one subscription.
///
/// Handles hold a weak reference to their signal's control block plus the
/// subscription's slot id, so they are equally valid before and after the
/// signal value is moved, and they observe `is_active() == false` once the
/// signal is dropped. Copies are peers: disconnecting through one makes
/// every copy inactive. Dropping a handle does *not* disconnect anything.
#[derive(Clone, Debug, Default)]
pub struct ConnectionHandle {
    control: Option<Weak<dyn ErasedSignal>>,
    id: u64,
}

impl ConnectionHandle {
    pub(crate) fn for_subscription(control: Weak<dyn ErasedSignal>, id: u64) -> Self {
        Self { control: Some(control), id }
    }

    pub(crate) fn slot_id(&self) -> u64 { self.id }

    fn upgrade(&self) -> Option<Arc<dyn ErasedSignal>> { self.control.as_ref()?.upgrade() }

    /// True iff the signal is alive and the subscription has not been
    /// disconnected. Never fails.
    pub fn is_active(&self) -> bool {
        match self.upgrade() {
            Some(signal) => signal.is_live(self.id),
            None => false,
        }
    }

    /// True iff this handle was issued by `signal` (same control block
    /// identity, surviving moves of the signal value). Default-constructed
    /// handles belong to no signal. Never fails.
    pub fn belongs_to<Args>(&self, signal: &Signal<Args>) -> bool {
        match self.upgrade() {
            Some(control) => Arc::as_ptr(&control) as *const () == signal.control_addr(),
            None => false,
        }
    }

    /// Disconnects the addressed subscription. No-op on an inactive handle;
    /// calling it twice is fine.
    pub fn disconnect(&self) {
        if let Some(signal) = self.upgrade() {
            signal.disconnect_id(self.id);
        }
    }

    /// Sets the subscription's blocked flag, returning the previous value.
    pub fn block(&self, blocked: bool) -> Result<bool, SignalError> {
        let signal = self.upgrade().ok_or(SignalError::UnknownHandle)?;
        signal.set_blocked(self.id, blocked).ok_or(SignalError::UnknownHandle)
    }

    /// Reads the subscription's blocked flag.
    pub fn is_blocked(&self) -> Result<bool, SignalError> {
        let signal = self.upgrade().ok_or(SignalError::UnknownHandle)?;
        signal.blocked(self.id).ok_or(SignalError::UnknownHandle)
    }
}

/// Scoped blocker: blocks a connection on construction and restores the
/// *previous* blocked state when dropped, so a connection that was already
/// blocked stays blocked afterwards.
pub struct ConnectionBlocker {
    handle: ConnectionHandle,
    was_blocked: bool,
}

impl ConnectionBlocker {
    /// Blocks the addressed connection, failing eagerly with
    /// [`SignalError::UnknownHandle`] if the handle is not live.
    pub fn new(handle: &ConnectionHandle) -> Result<Self, SignalError> {
        let was_blocked = handle.block(true)?;
        Ok(Self { handle: handle.clone(), was_blocked })
    }
}

impl Drop for ConnectionBlocker {
    fn drop(&mut self) {
        // The signal may be gone by now; nothing left to restore then.
        let _ = self.handle.block(self.was_blocked);
    }
}
