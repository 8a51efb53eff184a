//! Deferred invocation queue shared between signals.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::debug;

/// A queued nullary closure. Emit arguments are already captured by value;
/// the closure re-checks its subscription's disconnected flag when run.
pub(crate) type PendingInvocation = Box<dyn FnOnce() + Send>;

/// A thread-safe FIFO of pending deferred invocations.
///
/// Any number of signals may share one evaluator through an
/// `Arc<ConnectionEvaluator>`. Signals enqueue from whatever thread calls
/// `emit`; some thread of the caller's choosing drains the queue with
/// [`evaluate_deferred_connections`](Self::evaluate_deferred_connections).
/// The crate never spawns a thread of its own.
pub struct ConnectionEvaluator {
    queue: Mutex<VecDeque<PendingInvocation>>,
}

impl ConnectionEvaluator {
    pub fn new() -> Self { Self { queue: Mutex::new(VecDeque::new()) } }

    /// Appends an invocation. Safe from any thread.
    pub(crate) fn enqueue(&self, invocation: PendingInvocation) {
        self.queue.lock().unwrap().push_back(invocation);
    }

    /// Drains the queue, running each pending invocation in enqueue order on
    /// the calling thread.
    ///
    /// The whole pending batch is claimed up front by swapping the queue out
    /// under the mutex, and no lock is held while invocations run. Work
    /// enqueued during the drain (including by a drained closure emitting
    /// again, or by another thread) stays queued for the next call, so two
    /// back-to-back drains with no emission in between run the batch exactly
    /// once. A concurrent drain on another thread finds the queue already
    /// claimed and returns having run nothing.
    ///
    /// If an invocation panics, the not-yet-run remainder of the batch is
    /// put back at the front of the queue before the panic propagates, so
    /// the next drain resumes where this one stopped.
    pub fn evaluate_deferred_connections(&self) {
        let batch = std::mem::take(&mut *self.queue.lock().unwrap());
        if batch.is_empty() {
            return;
        }
        debug!(pending = batch.len(), "evaluating deferred connections");

        let mut batch = UnwindGuard { evaluator: self, batch };
        while let Some(invocation) = batch.batch.pop_front() {
            invocation();
        }
    }
}

impl Default for ConnectionEvaluator {
    fn default() -> Self { Self::new() }
}

/// Returns unclaimed work to the front of the live queue if the drain loop
/// unwinds out of an invocation.
struct UnwindGuard<'a> {
    evaluator: &'a ConnectionEvaluator,
    batch: VecDeque<PendingInvocation>,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let mut queue = self.evaluator.queue.lock().unwrap();
        while let Some(invocation) = self.batch.pop_back() {
            queue.push_front(invocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_invocation(order: &Arc<Mutex<Vec<usize>>>, tag: usize) -> PendingInvocation {
        let order = order.clone();
        Box::new(move || order.lock().unwrap().push(tag))
    }

    #[test]
    fn drains_in_enqueue_order() {
        let evaluator = ConnectionEvaluator::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..4 {
            evaluator.enqueue(counting_invocation(&order, tag));
        }
        evaluator.evaluate_deferred_connections();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn second_drain_runs_nothing_without_new_work() {
        let evaluator = ConnectionEvaluator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        evaluator.enqueue(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        evaluator.evaluate_deferred_connections();
        evaluator.evaluate_deferred_connections();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn work_enqueued_by_a_drained_closure_waits_for_the_next_drain() {
        let evaluator = Arc::new(ConnectionEvaluator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_calls = calls.clone();
        let inner_evaluator = evaluator.clone();
        evaluator.enqueue(Box::new(move || {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            let chained = inner_calls.clone();
            inner_evaluator.enqueue(Box::new(move || {
                chained.fetch_add(10, Ordering::SeqCst);
            }));
        }));

        evaluator.evaluate_deferred_connections();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        evaluator.evaluate_deferred_connections();
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn reentrant_evaluate_sees_only_work_enqueued_after_the_claim() {
        let evaluator = Arc::new(ConnectionEvaluator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_evaluator = evaluator.clone();
        let inner_calls = calls.clone();
        evaluator.enqueue(Box::new(move || {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            // The outer drain already claimed the whole batch, so this runs
            // nothing and certainly doesn't re-run the current invocation.
            inner_evaluator.evaluate_deferred_connections();
        }));

        evaluator.evaluate_deferred_connections();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_invocation_preserves_the_remainder() {
        let evaluator = ConnectionEvaluator::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        evaluator.enqueue(counting_invocation(&order, 0));
        evaluator.enqueue(Box::new(|| panic!("slot failure")));
        evaluator.enqueue(counting_invocation(&order, 2));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            evaluator.evaluate_deferred_connections();
        }));
        assert!(result.is_err());
        assert_eq!(*order.lock().unwrap(), vec![0]);

        evaluator.evaluate_deferred_connections();
        assert_eq!(*order.lock().unwrap(), vec![0, 2]);
    }

    #[test]
    fn concurrent_enqueues_all_survive() {
        let evaluator = Arc::new(ConnectionEvaluator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let evaluator = evaluator.clone();
                let calls = calls.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        let calls = calls.clone();
                        evaluator.enqueue(Box::new(move || {
                            calls.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                });
            }
        });

        evaluator.evaluate_deferred_connections();
        assert_eq!(calls.load(Ordering::SeqCst), 800);
    }
}
