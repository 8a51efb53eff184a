//! Typed multicast signals.

use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::error::SignalError;
use crate::evaluator::ConnectionEvaluator;
use crate::handle::ConnectionHandle;
use crate::slot::{IntoBoundSlot, IntoMethodSlot, IntoSlot, SlotFn};

/// A typed multicast emission point.
///
/// `Args` is the payload tuple the signal emits: `()`, `(A,)`, `(A, B)`, …
/// Subscribers are invoked in connect order. A `Signal` is movable but not
/// clonable; its identity lives in a shared control block, so outstanding
/// [`ConnectionHandle`]s keep resolving after the signal value is moved.
///
/// A single signal is externally synchronized for `connect`/`disconnect`/
/// `emit`, but distinct signals are fully independent: deferred connects and
/// emits on different signals may race freely, even when they share one
/// [`ConnectionEvaluator`].
pub struct Signal<Args = ()> {
    inner: Arc<SignalInner<Args>>,
}

impl<Args> Signal<Args> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                state: Mutex::new(SignalState { subscriptions: Vec::new(), next_id: 0, emit_depth: 0 }),
            }),
        }
    }

    /// Identity of this signal's control block, used by handles for
    /// `belongs_to` checks.
    pub(crate) fn control_addr(&self) -> *const () { Arc::as_ptr(&self.inner) as *const () }
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self { Self::new() }
}

impl<Args> Signal<Args>
where Args: Send + 'static
{
    /// Connects a slot, returning a handle addressing the new subscription.
    ///
    /// The slot's parameters may be any prefix of the payload tuple's
    /// fields; trailing emit arguments it doesn't name are discarded.
    /// Channel senders connect too and receive a clone of the whole payload.
    pub fn connect<Marker, S>(&self, slot: S) -> ConnectionHandle
    where S: IntoSlot<Args, Marker> {
        self.install(slot.into_slot(), None)
    }

    /// Connects a slot with a tuple of bound arguments prepended to every
    /// invocation: at emit time the slot receives `(bound…, emit…)`
    /// truncated to its arity.
    pub fn connect_bound<Marker, S, Bound>(&self, slot: S, bound: Bound) -> ConnectionHandle
    where S: IntoBoundSlot<Args, Bound, Marker> {
        self.install(slot.into_bound_slot(bound), None)
    }

    /// Connects a method on a shared instance. The method receives
    /// `&mut Recv` followed by a prefix of the payload fields.
    pub fn connect_method<Marker, S, Recv>(&self, instance: &Arc<Mutex<Recv>>, method: S) -> ConnectionHandle
    where S: IntoMethodSlot<Recv, Args, Marker> {
        self.install(method.into_method_slot(instance.clone()), None)
    }

    /// Connects a deferred slot: `emit` captures the arguments by value and
    /// enqueues the invocation on `evaluator` instead of running it inline.
    ///
    /// The subscription holds only a weak link to the evaluator; if the
    /// evaluator is dropped, later emissions skip this slot.
    pub fn connect_deferred<Marker, S>(&self, evaluator: &Arc<ConnectionEvaluator>, slot: S) -> ConnectionHandle
    where S: IntoSlot<Args, Marker> {
        self.install(slot.into_slot(), Some(Arc::downgrade(evaluator)))
    }

    /// Deferred counterpart of [`connect_bound`](Self::connect_bound).
    pub fn connect_deferred_bound<Marker, S, Bound>(
        &self,
        evaluator: &Arc<ConnectionEvaluator>,
        slot: S,
        bound: Bound,
    ) -> ConnectionHandle
    where S: IntoBoundSlot<Args, Bound, Marker> {
        self.install(slot.into_bound_slot(bound), Some(Arc::downgrade(evaluator)))
    }

    fn install(&self, slot: SlotFn<Args>, evaluator: Option<Weak<ConnectionEvaluator>>) -> ConnectionHandle {
        let mut state = self.inner.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        trace!(slot_id = id, deferred = evaluator.is_some(), "connected slot");
        state.subscriptions.push(Subscription { id, slot, evaluator, blocked: false, disconnected: false });

        let erased: Arc<dyn ErasedSignal> = self.inner.clone();
        let control: Weak<dyn ErasedSignal> = Arc::downgrade(&erased);
        ConnectionHandle::for_subscription(control, id)
    }

    /// Synchronously broadcasts `args` to every subscriber.
    ///
    /// The subscriber set is snapshotted at entry: slots connected during
    /// this emission are not invoked by it. Each snapshotted entry's
    /// disconnected/blocked flags are re-read just before invocation, so a
    /// slot disconnected by an earlier slot in the same emission is skipped.
    /// Immediate slots run inline on the calling thread; deferred slots get
    /// a clone of `args` enqueued on their evaluator. Reentrant `emit` from
    /// inside a slot is fine. Slot panics propagate to the caller and leave
    /// the subscriber set intact.
    pub fn emit(&self, args: Args)
    where Args: Clone {
        let snapshot: Vec<_> = {
            let mut state = self.inner.state.lock().unwrap();
            state.emit_depth += 1;
            state
                .subscriptions
                .iter()
                .filter(|sub| !sub.disconnected)
                .map(|sub| (sub.id, Arc::clone(&sub.slot), sub.evaluator.clone()))
                .collect()
        };
        trace!(subscribers = snapshot.len(), "emit");

        // Decrements the depth and sweeps tombstones even if a slot panics.
        let _quiesce = EmitGuard { inner: &*self.inner };

        for (id, slot, evaluator) in snapshot {
            {
                let state = self.inner.state.lock().unwrap();
                match state.subscriptions.iter().find(|sub| sub.id == id) {
                    Some(sub) if !sub.disconnected && !sub.blocked => {}
                    _ => continue,
                }
            }

            match &evaluator {
                None => slot(&args),
                Some(weak) => {
                    let Some(evaluator) = weak.upgrade() else {
                        trace!(slot_id = id, "evaluator dropped, skipping deferred slot");
                        continue;
                    };
                    let erased: Arc<dyn ErasedSignal> = self.inner.clone();
                    let control: Weak<dyn ErasedSignal> = Arc::downgrade(&erased);
                    let args = args.clone();
                    evaluator.enqueue(Box::new(move || {
                        // A disconnect that lands between emit and evaluate
                        // suppresses the invocation. If the whole signal is
                        // gone the invocation still runs; it owns its
                        // arguments and its slot.
                        if let Some(signal) = control.upgrade()
                            && !signal.is_live(id)
                        {
                            trace!(slot_id = id, "skipping invocation for disconnected slot");
                            return;
                        }
                        slot(&args);
                    }));
                }
            }
        }
    }

    /// Marks the addressed subscription disconnected. Idempotent; silently
    /// does nothing for a dead handle or a handle of a different signal.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        if handle.belongs_to(self) {
            self.inner.disconnect_id(handle.slot_id());
        }
    }

    /// Disconnects every current subscription.
    pub fn disconnect_all(&self) {
        let mut state = self.inner.state.lock().unwrap();
        trace!(subscribers = state.subscriptions.len(), "disconnecting all slots");
        if state.emit_depth == 0 {
            state.subscriptions.clear();
        } else {
            for sub in &mut state.subscriptions {
                sub.disconnected = true;
            }
        }
    }

    /// Sets the blocked flag of the addressed subscription and returns the
    /// previous value. A blocked subscription stays connected but is skipped
    /// by emissions until unblocked.
    pub fn block_connection(&self, handle: &ConnectionHandle, blocked: bool) -> Result<bool, SignalError> {
        if !handle.belongs_to(self) {
            return Err(SignalError::UnknownHandle);
        }
        self.inner.set_blocked(handle.slot_id(), blocked).ok_or(SignalError::UnknownHandle)
    }

    /// Reads the blocked flag of the addressed subscription.
    pub fn is_connection_blocked(&self, handle: &ConnectionHandle) -> Result<bool, SignalError> {
        if !handle.belongs_to(self) {
            return Err(SignalError::UnknownHandle);
        }
        self.inner.blocked(handle.slot_id()).ok_or(SignalError::UnknownHandle)
    }
}

/// Shared control block of one signal identity.
///
/// The `Arc` around it *is* the signal's identity: moving the [`Signal`]
/// moves the `Arc`, dropping the last `Arc` flips every outstanding handle
/// inactive. Handles and queued deferred invocations reach it through
/// `Weak<dyn ErasedSignal>`.
pub(crate) struct SignalInner<Args> {
    state: Mutex<SignalState<Args>>,
}

struct SignalState<Args> {
    /// Ordered by insertion; ids are monotonic and never reused.
    subscriptions: Vec<Subscription<Args>>,
    next_id: u64,
    /// Number of in-flight emissions. Tombstoned records are only erased
    /// when this returns to zero.
    emit_depth: usize,
}

struct Subscription<Args> {
    id: u64,
    slot: SlotFn<Args>,
    /// `Some` for deferred subscriptions.
    evaluator: Option<Weak<ConnectionEvaluator>>,
    blocked: bool,
    /// Tombstone; never cleared once set.
    disconnected: bool,
}

/// The type-erased face of a signal's control block, shared by handles of
/// every payload type.
pub(crate) trait ErasedSignal: Send + Sync {
    fn disconnect_id(&self, id: u64);
    fn set_blocked(&self, id: u64, blocked: bool) -> Option<bool>;
    fn blocked(&self, id: u64) -> Option<bool>;
    fn is_live(&self, id: u64) -> bool;
}

impl<Args: 'static> ErasedSignal for SignalInner<Args> {
    fn disconnect_id(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        if state.emit_depth == 0 {
            state.subscriptions.retain(|sub| sub.id != id);
            trace!(slot_id = id, "disconnected slot");
        } else if let Some(sub) = state.subscriptions.iter_mut().find(|sub| sub.id == id) {
            sub.disconnected = true;
            trace!(slot_id = id, "disconnected slot mid-emission");
        }
    }

    fn set_blocked(&self, id: u64, blocked: bool) -> Option<bool> {
        let mut state = self.state.lock().unwrap();
        let sub = state.subscriptions.iter_mut().find(|sub| sub.id == id && !sub.disconnected)?;
        Some(std::mem::replace(&mut sub.blocked, blocked))
    }

    fn blocked(&self, id: u64) -> Option<bool> {
        let state = self.state.lock().unwrap();
        let sub = state.subscriptions.iter().find(|sub| sub.id == id && !sub.disconnected)?;
        Some(sub.blocked)
    }

    fn is_live(&self, id: u64) -> bool {
        let state = self.state.lock().unwrap();
        state.subscriptions.iter().any(|sub| sub.id == id && !sub.disconnected)
    }
}

struct EmitGuard<'a, Args> {
    inner: &'a SignalInner<Args>,
}

impl<Args> Drop for EmitGuard<'_, Args> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        state.emit_depth -= 1;
        if state.emit_depth == 0 {
            state.subscriptions.retain(|sub| !sub.disconnected);
        }
    }
}
