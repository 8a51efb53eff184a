/*!
Typed signal/slot dispatch with synchronous and deferred delivery.

A [`Signal`] broadcasts a payload tuple to its subscribers in connect order.
Immediate subscriptions run inline on the emitting thread; deferred
subscriptions capture the arguments by value and park the invocation on a
shared [`ConnectionEvaluator`] until some thread drains it. Every
subscription is addressed by a copyable [`ConnectionHandle`] that survives
moves of the signal and can disconnect or block its connection from
anywhere.

# Basic usage

```rust
use sigslot::{ConnectionEvaluator, Signal};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

let signal = Signal::<(String, i32)>::new();
let total = Arc::new(AtomicI32::new(0));

let handle = signal.connect({
    let total = total.clone();
    move |_label: String, value: i32| {
        total.fetch_add(value, Ordering::SeqCst);
    }
});

signal.emit(("The answer:".to_string(), 42));
assert_eq!(total.load(Ordering::SeqCst), 42);

// Deferred delivery: arguments are captured now, the slot runs when some
// thread drains the evaluator.
let evaluator = Arc::new(ConnectionEvaluator::new());
signal.connect_deferred(&evaluator, {
    let total = total.clone();
    move |_label: String, value: i32| {
        total.fetch_add(value, Ordering::SeqCst);
    }
});

signal.emit(("Again:".to_string(), 1));
assert_eq!(total.load(Ordering::SeqCst), 43); // immediate slot only

evaluator.evaluate_deferred_connections();
assert_eq!(total.load(Ordering::SeqCst), 44);

handle.disconnect();
```

Slots don't have to consume the whole payload: a slot whose parameters are
a prefix of the tuple discards the rest, and channel senders connect
directly (`std::sync::mpsc::Sender`, plus tokio's unbounded sender behind
the `tokio` feature).
*/

mod error;
pub mod evaluator;
pub mod handle;
pub mod signal;
pub mod slot;

pub use error::SignalError;
pub use evaluator::ConnectionEvaluator;
pub use handle::{ConnectionBlocker, ConnectionHandle};
pub use signal::Signal;
pub use slot::{IntoBoundSlot, IntoMethodSlot, IntoSlot};
