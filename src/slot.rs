//! Type-erased slot adapters.
//!
//! A signal stores every subscriber as a [`SlotFn`] taking the full payload
//! tuple by reference. The conversion traits in this module build that
//! adapter at connect time: they clone out the tuple fields the slot
//! actually consumes and drop the rest, so a slot's parameters only need to
//! be a prefix of the signal's payload.

use std::sync::{Arc, Mutex};

/// The erased form every subscriber is stored as.
pub type SlotFn<Args> = Arc<dyn Fn(&Args) + Send + Sync + 'static>;

/// Conversion into a [`SlotFn`] for [`Signal::connect`](crate::Signal::connect).
///
/// Implemented for closures whose parameters are a prefix of the payload
/// tuple's fields (excess trailing emit arguments are discarded), and for
/// channel senders, which forward a clone of the whole payload.
///
/// `Marker` only exists to keep the prefix impls coherent; inference always
/// picks it for you.
pub trait IntoSlot<Args, Marker> {
    fn into_slot(self) -> SlotFn<Args>;
}

/// Conversion for [`Signal::connect_bound`](crate::Signal::connect_bound):
/// `bound` is a tuple prepended to every invocation, so the slot receives
/// `(bound…, emit…)` truncated to its arity.
pub trait IntoBoundSlot<Args, Bound, Marker> {
    fn into_bound_slot(self, bound: Bound) -> SlotFn<Args>;
}

/// Conversion for [`Signal::connect_method`](crate::Signal::connect_method):
/// the slot receives `&mut T` borrowed from the shared instance, followed by
/// a prefix of the payload fields.
pub trait IntoMethodSlot<Recv, Args, Marker> {
    fn into_method_slot(self, instance: Arc<Mutex<Recv>>) -> SlotFn<Args>;
}

impl<Func> IntoSlot<(), ()> for Func
where Func: Fn() + Send + Sync + 'static
{
    fn into_slot(self) -> SlotFn<()> { Arc::new(move |_args: &()| self()) }
}

macro_rules! slot_for_tuple {
    // slots that ignore every emitted argument
    ( ($($all:ident),+) => () ) => {
        impl<Func, $($all),+> IntoSlot<($($all,)+), ()> for Func
        where
            Func: Fn() + Send + Sync + 'static,
            $($all: Clone + Send + Sync + 'static,)+
        {
            fn into_slot(self) -> SlotFn<($($all,)+)> { Arc::new(move |_args: &($($all,)+)| self()) }
        }
    };
    // slots that consume a non-empty prefix of the emitted arguments
    ( ($($all:ident),+) => ($($taken:ident),+ ; $($idx:tt),+) ) => {
        impl<Func, $($all),+> IntoSlot<($($all,)+), ($($taken,)+)> for Func
        where
            Func: Fn($($taken),+) + Send + Sync + 'static,
            $($all: Clone + Send + Sync + 'static,)+
        {
            fn into_slot(self) -> SlotFn<($($all,)+)> {
                Arc::new(move |args: &($($all,)+)| self($(args.$idx.clone()),+))
            }
        }
    };
}

slot_for_tuple!((T0) => ());
slot_for_tuple!((T0) => (T0; 0));
slot_for_tuple!((T0, T1) => ());
slot_for_tuple!((T0, T1) => (T0; 0));
slot_for_tuple!((T0, T1) => (T0, T1; 0, 1));
slot_for_tuple!((T0, T1, T2) => ());
slot_for_tuple!((T0, T1, T2) => (T0; 0));
slot_for_tuple!((T0, T1, T2) => (T0, T1; 0, 1));
slot_for_tuple!((T0, T1, T2) => (T0, T1, T2; 0, 1, 2));
slot_for_tuple!((T0, T1, T2, T3) => ());
slot_for_tuple!((T0, T1, T2, T3) => (T0; 0));
slot_for_tuple!((T0, T1, T2, T3) => (T0, T1; 0, 1));
slot_for_tuple!((T0, T1, T2, T3) => (T0, T1, T2; 0, 1, 2));
slot_for_tuple!((T0, T1, T2, T3) => (T0, T1, T2, T3; 0, 1, 2, 3));

/// Marker for the channel-sender impls below.
pub struct ChannelMarker;

// Connecting a channel sender delivers a clone of the whole payload, the
// multi-threaded counterpart of a closure slot.
impl<Args> IntoSlot<Args, ChannelMarker> for std::sync::mpsc::Sender<Args>
where Args: Clone + Send + Sync + 'static
{
    fn into_slot(self) -> SlotFn<Args> {
        Arc::new(move |args: &Args| {
            let _ = self.send(args.clone()); // Ignore send errors
        })
    }
}

#[cfg(feature = "tokio")]
impl<Args> IntoSlot<Args, ChannelMarker> for tokio::sync::mpsc::UnboundedSender<Args>
where Args: Clone + Send + Sync + 'static
{
    fn into_slot(self) -> SlotFn<Args> {
        Arc::new(move |args: &Args| {
            let _ = self.send(args.clone()); // Ignore send errors
        })
    }
}

macro_rules! bound_slot_for_tuple {
    // bound arguments only, every emitted argument ignored
    ( ($($all:ident),*) ; ($($bound:ident),+ ; $($bidx:tt),+) => () ) => {
        impl<Func, $($bound,)+ $($all),*> IntoBoundSlot<($($all,)*), ($($bound,)+), ($($bound,)+)> for Func
        where
            Func: Fn($($bound),+) + Send + Sync + 'static,
            $($bound: Clone + Send + Sync + 'static,)+
            $($all: Clone + Send + Sync + 'static,)*
        {
            fn into_bound_slot(self, bound: ($($bound,)+)) -> SlotFn<($($all,)*)> {
                Arc::new(move |_args: &($($all,)*)| self($(bound.$bidx.clone()),+))
            }
        }
    };
    // bound arguments followed by a non-empty prefix of the emitted arguments
    ( ($($all:ident),+) ; ($($bound:ident),+ ; $($bidx:tt),+) => ($($taken:ident),+ ; $($tidx:tt),+) ) => {
        impl<Func, $($bound,)+ $($all),+> IntoBoundSlot<($($all,)+), ($($bound,)+), ($($bound,)+ $($taken,)+)> for Func
        where
            Func: Fn($($bound,)+ $($taken),+) + Send + Sync + 'static,
            $($bound: Clone + Send + Sync + 'static,)+
            $($all: Clone + Send + Sync + 'static,)+
        {
            fn into_bound_slot(self, bound: ($($bound,)+)) -> SlotFn<($($all,)+)> {
                Arc::new(move |args: &($($all,)+)| self($(bound.$bidx.clone(),)+ $(args.$tidx.clone()),+))
            }
        }
    };
}

bound_slot_for_tuple!(() ; (B0; 0) => ());
bound_slot_for_tuple!((T0) ; (B0; 0) => ());
bound_slot_for_tuple!((T0) ; (B0; 0) => (T0; 0));
bound_slot_for_tuple!((T0, T1) ; (B0; 0) => ());
bound_slot_for_tuple!((T0, T1) ; (B0; 0) => (T0; 0));
bound_slot_for_tuple!((T0, T1) ; (B0; 0) => (T0, T1; 0, 1));
bound_slot_for_tuple!(() ; (B0, B1; 0, 1) => ());
bound_slot_for_tuple!((T0) ; (B0, B1; 0, 1) => ());
bound_slot_for_tuple!((T0) ; (B0, B1; 0, 1) => (T0; 0));
bound_slot_for_tuple!((T0, T1) ; (B0, B1; 0, 1) => ());
bound_slot_for_tuple!((T0, T1) ; (B0, B1; 0, 1) => (T0; 0));
bound_slot_for_tuple!((T0, T1) ; (B0, B1; 0, 1) => (T0, T1; 0, 1));

macro_rules! method_slot_for_tuple {
    ( ($($all:ident),*) => () ) => {
        impl<Func, Recv, $($all),*> IntoMethodSlot<Recv, ($($all,)*), ()> for Func
        where
            Func: Fn(&mut Recv) + Send + Sync + 'static,
            Recv: Send + 'static,
            $($all: Clone + Send + Sync + 'static,)*
        {
            fn into_method_slot(self, instance: Arc<Mutex<Recv>>) -> SlotFn<($($all,)*)> {
                Arc::new(move |_args: &($($all,)*)| {
                    let mut instance = instance.lock().unwrap();
                    self(&mut instance)
                })
            }
        }
    };
    ( ($($all:ident),+) => ($($taken:ident),+ ; $($idx:tt),+) ) => {
        impl<Func, Recv, $($all),+> IntoMethodSlot<Recv, ($($all,)+), ($($taken,)+)> for Func
        where
            Func: Fn(&mut Recv, $($taken),+) + Send + Sync + 'static,
            Recv: Send + 'static,
            $($all: Clone + Send + Sync + 'static,)+
        {
            fn into_method_slot(self, instance: Arc<Mutex<Recv>>) -> SlotFn<($($all,)+)> {
                Arc::new(move |args: &($($all,)+)| {
                    let mut instance = instance.lock().unwrap();
                    self(&mut instance, $(args.$idx.clone()),+)
                })
            }
        }
    };
}

method_slot_for_tuple!(() => ());
method_slot_for_tuple!((T0) => ());
method_slot_for_tuple!((T0) => (T0; 0));
method_slot_for_tuple!((T0, T1) => ());
method_slot_for_tuple!((T0, T1) => (T0; 0));
method_slot_for_tuple!((T0, T1) => (T0, T1; 0, 1));

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn prefix_slot_discards_trailing_arguments() {
        let seen = Arc::new(AtomicI32::new(0));
        let slot: SlotFn<(i32, bool)> = {
            let seen = seen.clone();
            (move |value: i32| seen.store(value, Ordering::SeqCst)).into_slot()
        };

        slot(&(7, true));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn nullary_slot_ignores_all_arguments() {
        let calls = Arc::new(AtomicI32::new(0));
        let slot: SlotFn<(String, i32)> = {
            let calls = calls.clone();
            (move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .into_slot()
        };

        slot(&("hello".to_string(), 1));
        slot(&("again".to_string(), 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bound_slot_prepends_bound_arguments() {
        let seen = Arc::new(Mutex::new((0, 0)));
        let slot: SlotFn<(i32, bool)> = {
            let seen = seen.clone();
            (move |bound: i32, signalled: i32| {
                *seen.lock().unwrap() = (bound, signalled);
            })
            .into_bound_slot((5,))
        };

        slot(&(10, false));
        assert_eq!(*seen.lock().unwrap(), (5, 10));
    }

    #[test]
    fn channel_sender_receives_payload_clone() {
        let (tx, rx) = std::sync::mpsc::channel();
        let slot: SlotFn<(i32,)> = tx.into_slot();

        slot(&(42,));
        assert_eq!(rx.try_recv().unwrap(), (42,));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn method_slot_borrows_the_instance() {
        let numbers = Arc::new(Mutex::new(vec![1, 2, 3]));
        let slot: SlotFn<(i32,)> =
            (|v: &mut Vec<i32>, x: i32| v.push(x)).into_method_slot(numbers.clone());

        slot(&(4,));
        assert_eq!(*numbers.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}
